//! `.env` parsing for the launcher.

use crate::utils::error::{PulseError, Result};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: String,
    pub value: String,
    /// 1-based line number in the source file.
    pub line: usize,
}

/// Parser for `KEY=VALUE` environment files.
///
/// Rules:
/// - blank lines and lines starting with `#` are skipped
/// - an optional leading `export ` is dropped
/// - the first `=` separates key from value; both are trimmed
/// - one pair of matching surrounding quotes is stripped from the value
/// - lines without `=` are skipped with a warning
pub struct DotenvParser;

impl DotenvParser {
    /// # Errors
    ///
    /// Returns an error naming the line when a key is empty.
    pub fn parse(content: &str) -> Result<Vec<EnvEntry>> {
        let mut entries = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("Skipping line {} of env file: no '=' found", line_no);
                continue;
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(PulseError::bootstrap(
                    "env_file",
                    format!("empty key on line {}", line_no),
                ));
            }

            entries.push(EnvEntry {
                key: key.to_string(),
                value: unquote(value.trim()).to_string(),
                line: line_no,
            });
        }

        Ok(entries)
    }

    /// Reads and parses `path`. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let vars = Self::parse(&content)?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect();
        Ok(Some(vars))
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let content = r"
# POSTHOG_API_KEY=commented-out
POSTHOG_PROJECT=259946

   # indented comment
PORT=5050
";
        let entries = DotenvParser::parse(content).unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["POSTHOG_PROJECT", "PORT"]);
        assert_eq!(entries[0].line, 3);
    }

    #[test]
    fn test_value_keeps_everything_after_first_equals() {
        let entries = DotenvParser::parse("URL=https://x.test/?a=1&b=2").unwrap();
        assert_eq!(entries[0].value, "https://x.test/?a=1&b=2");
    }

    #[test]
    fn test_export_prefix_and_quotes() {
        let entries =
            DotenvParser::parse("export TOKEN=\"pat 123\"\nNAME='Connected Montreal'\nEMPTY=").unwrap();
        assert_eq!(entries[0].key, "TOKEN");
        assert_eq!(entries[0].value, "pat 123");
        assert_eq!(entries[1].value, "Connected Montreal");
        assert_eq!(entries[2].value, "");
    }

    #[test]
    fn test_mismatched_quotes_are_kept() {
        let entries = DotenvParser::parse("A=\"open").unwrap();
        assert_eq!(entries[0].value, "\"open");
    }

    #[test]
    fn test_line_without_equals_is_skipped() {
        let entries = DotenvParser::parse("JUSTAWORD\nKEY=value").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "KEY");
    }

    #[test]
    fn test_empty_key_is_an_error() {
        let err = DotenvParser::parse("OK=1\n=value").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(DotenvParser::load(&dir.path().join(".env")).unwrap().is_none());
    }

    #[test]
    fn test_load_later_duplicates_win() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "PORT=1\nPORT=2\n").unwrap();
        let vars = DotenvParser::load(&path).unwrap().unwrap();
        assert_eq!(vars.get("PORT").map(String::as_str), Some("2"));
    }
}
