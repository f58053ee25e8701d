//! Best-effort variable discovery in prose documentation
//!
//! Four matcher strategies behind one trait, tried in a fixed order: markdown
//! table rows, bulleted definitions, colon definitions, and bare headings.
//! The first pattern to name a variable wins; later patterns only fill names
//! not already present. Every record is a guess and is treated as such by the
//! merge step (documentation never makes a variable required).

use crate::variables::{parse_number, runtime_type_name, strip_quotes};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A variable mention recovered from documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeRecord {
    pub value: Value,
    #[serde(rename = "type")]
    pub var_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub source: String,
}

impl ReadmeRecord {
    fn new(value: Value, var_type: String, description: String, original: Option<String>) -> Self {
        Self {
            value,
            var_type,
            description,
            original,
            source: "readme".to_string(),
        }
    }
}

/// One extraction heuristic over the whole document.
pub trait DocPattern {
    fn name(&self) -> &'static str;
    /// Candidate records, in document order. Callers apply first-writer-wins.
    fn attempt(&self, text: &str) -> Vec<(String, ReadmeRecord)>;
}

/// Run all patterns in their fixed precedence order.
pub fn extract(content: &str) -> BTreeMap<String, ReadmeRecord> {
    let patterns: Vec<Box<dyn DocPattern>> = vec![
        Box::new(TableRowPattern),
        Box::new(BulletPattern),
        Box::new(ColonPattern),
        Box::new(HeadingPattern),
    ];
    let mut records: BTreeMap<String, ReadmeRecord> = BTreeMap::new();
    for pattern in &patterns {
        for (name, record) in pattern.attempt(content) {
            if !records.contains_key(&name) {
                log::debug!("readme pattern '{}' matched '{}'", pattern.name(), name);
                records.insert(name, record);
            }
        }
    }
    records
}

fn is_identifier(name: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap();
    re.is_match(name)
}

fn strip_backticks(raw: &str) -> &str {
    raw.trim().trim_matches('`').trim()
}

/// Coerce a documentation value hint. Placeholders become the empty string,
/// quoted or bare booleans and numbers coerce, anything else stays raw text.
fn coerce_doc_value(raw: &str) -> (Value, Option<String>) {
    let trimmed = strip_backticks(raw);
    if trimmed.is_empty() || trimmed == "-" {
        return (Value::String(String::new()), None);
    }
    let original = Some(trimmed.to_string());
    let unquoted = strip_quotes(trimmed).unwrap_or(trimmed);
    let value = match unquoted {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => parse_number(other).unwrap_or_else(|| Value::String(other.to_string())),
    };
    (value, original)
}

/// Infer a type name from an explicit hint cell, falling back to the runtime
/// type of the coerced value.
fn infer_type(hint: &str, value: &Value) -> String {
    let lowered = strip_backticks(hint).to_lowercase();
    if lowered.contains("bool") {
        "boolean".to_string()
    } else if lowered.contains("number") || lowered.contains("int") {
        "number".to_string()
    } else if lowered.contains("string") {
        "string".to_string()
    } else {
        runtime_type_name(value).to_string()
    }
}

/// Split an optional trailing `(default: ...)` off a description.
fn split_default_suffix(text: &str) -> (String, Option<String>) {
    let re = Regex::new(r"(?i)\(default:\s*([^)]*)\)\s*$").unwrap();
    match re.captures(text) {
        Some(caps) => {
            let default = caps[1].trim().to_string();
            let description = text[..caps.get(0).unwrap().start()].trim().to_string();
            (description, Some(default))
        }
        None => (text.trim().to_string(), None),
    }
}

/// `| name | description | type | default |` table rows.
struct TableRowPattern;

impl DocPattern for TableRowPattern {
    fn name(&self) -> &'static str {
        "table-row"
    }

    fn attempt(&self, text: &str) -> Vec<(String, ReadmeRecord)> {
        let mut out = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if !trimmed.starts_with('|') || !trimmed.ends_with('|') {
                continue;
            }
            let cells: Vec<&str> = trimmed[1..trimmed.len() - 1].split('|').collect();
            if cells.len() < 4 {
                continue;
            }
            let name = strip_backticks(cells[0]);
            // Header row ("Variable", "Variables", ...) and separator rows
            if name.to_lowercase().contains("variable") {
                continue;
            }
            if name.chars().all(|c| c == '-' || c == ':' || c == ' ') {
                continue;
            }
            if !is_identifier(name) {
                continue;
            }
            let description = cells[1].trim().to_string();
            let (value, original) = coerce_doc_value(cells[3]);
            let var_type = infer_type(cells[2], &value);
            out.push((
                name.to_string(),
                ReadmeRecord::new(value, var_type, description, original),
            ));
        }
        out
    }
}

/// `- `name`: description (default: ...)` bullets.
struct BulletPattern;

impl DocPattern for BulletPattern {
    fn name(&self) -> &'static str {
        "bullet"
    }

    fn attempt(&self, text: &str) -> Vec<(String, ReadmeRecord)> {
        let re = Regex::new(r"(?m)^\s*[-*+]\s+`([A-Za-z_][A-Za-z0-9_-]*)`\s*[:\-–—]?\s*(.*)$")
            .unwrap();
        let mut out = Vec::new();
        for caps in re.captures_iter(text) {
            let name = caps[1].to_string();
            let (description, default) = split_default_suffix(&caps[2]);
            let (value, original) = match &default {
                Some(d) => coerce_doc_value(d),
                None => (Value::String(String::new()), None),
            };
            let var_type = runtime_type_name(&value).to_string();
            out.push((
                name,
                ReadmeRecord::new(value, var_type, description, original),
            ));
        }
        out
    }
}

/// `name: description (Default: ...)` at line start.
struct ColonPattern;

impl DocPattern for ColonPattern {
    fn name(&self) -> &'static str {
        "colon-definition"
    }

    fn attempt(&self, text: &str) -> Vec<(String, ReadmeRecord)> {
        let re = Regex::new(r"(?m)^([A-Za-z_][A-Za-z0-9_-]*):[ \t]+(.*)$").unwrap();
        let mut out = Vec::new();
        for caps in re.captures_iter(text) {
            let name = caps[1].to_string();
            let (description, default) = split_default_suffix(&caps[2]);
            let (value, original) = match &default {
                Some(d) => coerce_doc_value(d),
                None => (Value::String(String::new()), None),
            };
            let var_type = runtime_type_name(&value).to_string();
            out.push((
                name,
                ReadmeRecord::new(value, var_type, description, original),
            ));
        }
        out
    }
}

/// Level-2/3 headings whose text is exactly an identifier.
///
/// Name discovery only: the record is empty apart from the name, so the
/// variable surfaces in the merged model without inventing a description.
struct HeadingPattern;

impl DocPattern for HeadingPattern {
    fn name(&self) -> &'static str {
        "heading"
    }

    fn attempt(&self, text: &str) -> Vec<(String, ReadmeRecord)> {
        let re = Regex::new(r"(?m)^#{2,3}[ \t]+`?([A-Za-z_][A-Za-z0-9_-]*)`?\s*$").unwrap();
        let mut out = Vec::new();
        for caps in re.captures_iter(text) {
            out.push((
                caps[1].to_string(),
                ReadmeRecord::new(
                    Value::String(String::new()),
                    "string".to_string(),
                    String::new(),
                    None,
                ),
            ));
        }
        out
    }
}
