//! Subject-branch catalog (e.g. `EHB` → 113) used to build schedule page URLs.
//!
//! The catalog is a JSON export of the portal's branch dropdown:
//! `[{"dersBransKodu": "EHB", "bransKoduId": 113, ...}, ...]`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use reqwest::Url;
use tracing::warn;

use crate::obs::json::parse_json_with_context;

#[derive(Debug, thiserror::Error)]
pub enum BranchCatalogError {
    #[error("failed to read branch catalog {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse branch catalog {path}")]
    Parse {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Deserialize)]
struct BranchEntry {
    #[serde(rename = "dersBransKodu", default)]
    code: Value,
    #[serde(rename = "bransKoduId", default)]
    id: Value,
}

/// Branch code (upper-case) → numeric branch id.
#[derive(Debug, Clone, Default)]
pub struct BranchCatalog {
    ids: HashMap<String, i64>,
}

impl BranchCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BranchCatalogError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| BranchCatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&body).map_err(|source| BranchCatalogError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Entries without a code or without an integer id are skipped.
    pub fn from_json(body: &str) -> anyhow::Result<Self> {
        let entries: Vec<BranchEntry> = parse_json_with_context(body)?;
        let ids = entries
            .into_iter()
            .filter_map(|entry| {
                let code = match entry.code {
                    Value::String(s) => s,
                    Value::Null => return None,
                    other => other.to_string(),
                }
                .trim()
                .to_uppercase();
                let id = entry.id.as_i64()?;
                (!code.is_empty()).then_some((code, id))
            })
            .collect();
        Ok(Self { ids })
    }

    pub fn id_of(&self, code: &str) -> Option<i64> {
        self.ids.get(&code.to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Schedule search URL per distinct branch code, sorted by code.
    ///
    /// Codes missing from the catalog are logged and left out.
    pub fn schedule_urls(
        &self,
        schedule_base: &Url,
        program_level: &str,
        codes: &[String],
    ) -> Vec<(String, String)> {
        let distinct: BTreeSet<String> = codes.iter().map(|c| c.to_uppercase()).collect();

        distinct
            .into_iter()
            .filter_map(|code| match self.id_of(&code) {
                Some(id) => {
                    let mut url = schedule_base.clone();
                    url.query_pairs_mut()
                        .append_pair("programSeviyeTipiAnahtari", program_level)
                        .append_pair("dersBransKoduId", &id.to_string());
                    Some((code, url.to_string()))
                }
                None => {
                    warn!(branch = code.as_str(), "Branch code not found in catalog, its CRNs cannot be watched");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"[
        {"dersBransKodu": "EHB", "bransKoduId": 113, "dersBransAdi": "Elektronik"},
        {"dersBransKodu": "myz", "bransKoduId": 201},
        {"dersBransKodu": "", "bransKoduId": 5},
        {"dersBransKodu": "BAD", "bransKoduId": "7"},
        {"bransKoduId": 9}
    ]"#;

    fn base() -> Url {
        Url::parse("https://obs.itu.edu.tr/public/DersProgram/DersProgramSearch").unwrap()
    }

    #[test]
    fn test_from_json_skips_invalid_entries() {
        let catalog = BranchCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.id_of("EHB"), Some(113));
        assert_eq!(catalog.id_of("MYZ"), Some(201));
        assert_eq!(catalog.id_of("BAD"), None);
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(BranchCatalog::from_json(r#"{"EHB": 113}"#).is_err());
    }

    #[test]
    fn test_schedule_urls_dedupes_and_skips_unknown() {
        let catalog = BranchCatalog::from_json(CATALOG).unwrap();
        let codes = vec!["ehb".to_string(), "EHB".to_string(), "XYZ".to_string(), "MYZ".to_string()];
        let urls = catalog.schedule_urls(&base(), "LS", &codes);

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].0, "EHB");
        assert_eq!(
            urls[0].1,
            "https://obs.itu.edu.tr/public/DersProgram/DersProgramSearch?programSeviyeTipiAnahtari=LS&dersBransKoduId=113"
        );
        assert_eq!(urls[1].0, "MYZ");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = BranchCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.id_of("ehb"), Some(113));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BranchCatalog::load("/nonexistent/derskodlari.json").unwrap_err();
        assert!(matches!(err, BranchCatalogError::Read { .. }));
    }
}
