//! Parsing of the `BRANCH:CRN,BRANCH:CRN` course lists given in the environment.

use tracing::warn;

/// One section to enroll in, with the subject branch whose schedule lists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseTarget {
    pub branch: String,
    pub crn: String,
}

/// Parsed course list, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseTargets(Vec<CourseTarget>);

impl CourseTargets {
    pub fn crns(&self) -> Vec<String> {
        self.iter().map(|t| t.crn.clone()).collect()
    }

    /// Branch codes, parallel to [`crns`](Self::crns).
    pub fn branches(&self) -> Vec<String> {
        self.iter().map(|t| t.branch.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CourseTarget> {
        self.0.iter()
    }
}

/// Parse `"EHB:23603,MYZ:23622"`.
///
/// Tokens without a `:` are skipped with a warning; tokens with an empty
/// branch or CRN are skipped silently. Branch codes are upper-cased.
pub fn parse_course_targets(raw: &str) -> CourseTargets {
    let targets = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let Some((branch, crn)) = token.split_once(':') else {
                warn!(token, "Invalid CRN entry (expected BRANCH:CRN), skipping");
                return None;
            };
            let branch = branch.trim().to_uppercase();
            let crn = crn.trim();
            (!branch.is_empty() && !crn.is_empty()).then(|| CourseTarget {
                branch,
                crn: crn.to_string(),
            })
        })
        .collect();
    CourseTargets(targets)
}

/// Parse a plain comma-separated CRN list (`"23603, 23622"`).
pub fn parse_crn_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|crn| !crn.is_empty())
        .map(str::to_string)
        .collect()
}
