//! Flat `key = value` defaults-file extraction
//!
//! One record per assignment line. Blank lines and `#` comments are skipped,
//! and a key assigned twice keeps the later value.

use crate::variables::{parse_number, runtime_type_name, strip_quotes};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single assignment from the defaults file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TfvarsRecord {
    pub value: Value,
    #[serde(rename = "type")]
    pub var_type: String,
    /// Raw right-hand side, as written.
    pub original: String,
    pub source: String,
}

/// Parse a defaults file into per-key records.
pub fn extract(content: &str) -> BTreeMap<String, TfvarsRecord> {
    let line_re = Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(.+)$").unwrap();
    let mut records = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let caps = match line_re.captures(trimmed) {
            Some(caps) => caps,
            None => continue,
        };
        let key = caps[1].to_string();
        let raw = caps[2].trim().to_string();
        let unquoted = strip_quotes(&raw).unwrap_or(&raw);
        let value = match unquoted {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => parse_number(other).unwrap_or_else(|| Value::String(other.to_string())),
        };
        let record = TfvarsRecord {
            var_type: runtime_type_name(&value).to_string(),
            value,
            original: raw,
            source: "tfvars".to_string(),
        };
        records.insert(key, record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_assignments() {
        let content = r#"
# defaults for staging
region = "us-west-2"
replicas = 3

enable_logging = true
"#;
        let records = extract(content);
        assert_eq!(records.len(), 3);
        assert_eq!(records.get("region").unwrap().value, json!("us-west-2"));
        assert_eq!(records.get("region").unwrap().var_type, "string");
        assert_eq!(records.get("replicas").unwrap().value, json!(3));
        assert_eq!(records.get("replicas").unwrap().var_type, "number");
        assert_eq!(records.get("enable_logging").unwrap().value, json!(true));
        assert_eq!(records.get("enable_logging").unwrap().var_type, "boolean");
    }

    #[test]
    fn test_original_keeps_raw_text() {
        let records = extract("region = \"us-west-2\"\n");
        let record = records.get("region").unwrap();
        assert_eq!(record.original, "\"us-west-2\"");
        assert_eq!(record.source, "tfvars");
    }

    #[test]
    fn test_single_quotes_stripped() {
        let records = extract("name = 'staging'\n");
        assert_eq!(records.get("name").unwrap().value, json!("staging"));
    }

    #[test]
    fn test_later_assignment_overwrites() {
        let records = extract("port = 80\nport = 8080\n");
        assert_eq!(records.get("port").unwrap().value, json!(8080));
    }

    #[test]
    fn test_non_assignment_lines_skipped() {
        let content = "just some prose\n= no key\n9starts_with_digit = 1\nok = 1\n";
        let records = extract(content);
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("ok"));
    }

    #[test]
    fn test_quoted_boolean_stays_boolean() {
        // One quote layer is stripped before coercion, so "true" is a bool.
        let records = extract("flag = \"true\"\n");
        assert_eq!(records.get("flag").unwrap().value, json!(true));
    }
}
