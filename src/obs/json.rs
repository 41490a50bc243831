//! JSON decoding with path-aware error messages.

use anyhow::Result;

/// Deserialize `body`, reporting the failing JSON path and a short excerpt of
/// the offending line when decoding fails.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let msg = msg
            .strip_suffix(&format!(" at line {line} column {column}"))
            .unwrap_or(&msg);
        let msg = describe_mismatch(msg);

        let location = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!("at path '{path}': ")
        };
        anyhow::anyhow!(
            "{location}{msg} (line {line} col {column})\n{}",
            excerpt(body, line, column)
        )
    })
}

/// Rewrite serde's "invalid type: X, expected Y" into "expected Y, got X".
fn describe_mismatch(msg: &str) -> String {
    msg.strip_prefix("invalid type: ")
        .and_then(|rest| rest.split_once(", expected "))
        .map(|(actual, expected)| format!("expected {}, got {actual}", expected.trim()))
        .unwrap_or_else(|| msg.to_string())
}

/// A window of up to 20 characters around `column` on `line`, with a caret.
fn excerpt(body: &str, line: usize, column: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let idx = column.saturating_sub(1).min(target.len());
    let start = idx.saturating_sub(10);
    let end = (idx + 10).min(target.len());
    let slice: String = target[start..end].iter().collect();

    format!("...{slice}...\n   {}^", " ".repeat(idx - start))
}
