//! Declaration-block extraction from raw HCL text
//!
//! This is deliberately not an HCL parser. The scanner normalizes the text
//! (comments stripped, whitespace collapsed), walks `variable "name" { ... }`
//! blocks with an explicit brace-depth counter, and pulls individual fields
//! out of each body with anchored patterns. Everything it does not recognize
//! it tolerates: a block it cannot balance produces no record, expressions it
//! cannot coerce are carried as raw text.

use crate::variables::{parse_number, DisplayType, VariableRecord, VariableSource};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Extract variable declarations from several files.
///
/// Files are processed in the order given; a later file re-declaring a name
/// overwrites the earlier record.
pub fn extract_from_files<'a, I>(files: I) -> BTreeMap<String, VariableRecord>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut merged = BTreeMap::new();
    for (file_name, content) in files {
        let extracted = extract_from_file(content, file_name);
        log::debug!(
            "Extracted {} variable declaration(s) from {}",
            extracted.len(),
            file_name
        );
        merged.extend(extracted);
    }
    merged
}

/// Extract variable declarations from one configuration file.
pub fn extract_from_file(source: &str, file_name: &str) -> BTreeMap<String, VariableRecord> {
    let normalized = normalize(source);
    let mut records = BTreeMap::new();
    for (name, body) in scan_blocks(&normalized) {
        records.insert(name, build_record(&body, file_name));
    }
    records
}

/// Strip comments and collapse whitespace runs to single spaces.
///
/// Comment stripping is quote-aware so `//` inside a description string (a
/// URL, say) survives. The result is stable under repeated application.
pub fn normalize(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let quote = c;
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let d = chars[i];
                    out.push(d);
                    i += 1;
                    if d == '\\' && i < chars.len() {
                        out.push(chars[i]);
                        i += 1;
                    } else if d == quote {
                        break;
                    }
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '/' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locate `variable "<name>" { ... }` blocks and return (name, body) pairs.
///
/// The body is everything between the block's braces, at arbitrary nesting
/// depth. Blocks whose braces never balance are skipped without a record.
fn scan_blocks(normalized: &str) -> Vec<(String, String)> {
    let header = Regex::new(r#"\bvariable\s*["']([A-Za-z_][A-Za-z0-9_-]*)["']\s*\{"#).unwrap();
    let mut blocks = Vec::new();
    for caps in header.captures_iter(normalized) {
        let whole = caps.get(0).unwrap();
        let open_idx = whole.end() - 1;
        match balanced_end(normalized, open_idx) {
            Some(close_idx) => {
                let body = normalized[open_idx + 1..close_idx].trim().to_string();
                blocks.push((caps[1].to_string(), body));
            }
            None => {
                log::warn!(
                    "Skipping unbalanced variable block '{}' (no matching close brace)",
                    &caps[1]
                );
            }
        }
    }
    blocks
}

/// Find the index of the delimiter closing the one at `open_idx`.
///
/// Tracks nesting depth without bound and ignores delimiters inside quoted
/// strings (escapes honored). Returns None when the text ends first.
fn balanced_end(text: &str, open_idx: usize) -> Option<usize> {
    let open = text[open_idx..].chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };
    let mut depth: usize = 0;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in text[open_idx..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            in_string = Some(c);
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(open_idx + offset);
            }
        }
    }
    None
}

/// The default value as captured from a block body, before coercion.
#[derive(Debug, Clone, PartialEq)]
enum RawDefault {
    Absent,
    /// Quoted string, unescaped, with the original quoted text retained.
    Quoted(String, String),
    /// Balanced `[...]` or `{...}` literal, kept verbatim.
    Complex(String),
    /// Bare token.
    Token(String),
}

fn build_record(body: &str, file_name: &str) -> VariableRecord {
    let declared_type = capture_type(body);
    let description = capture_description(body).unwrap_or_default();
    let sensitive = capture_bool_field(body, "sensitive").unwrap_or(false);
    let nullable = capture_bool_field(body, "nullable").unwrap_or(true);
    let raw_default = capture_default(body);

    let (value, original) = coerce_default(&raw_default);
    let display_type = match &declared_type {
        Some(t) => DisplayType::from_declared(t),
        None => DisplayType::from_value(&value),
    };
    let required = value.is_null() && !nullable;

    VariableRecord {
        value,
        display_type,
        original,
        description,
        declared_type: Some(declared_type.unwrap_or_else(|| "string".to_string())),
        sensitive,
        nullable,
        required,
        source_file: Some(file_name.to_string()),
        sources: vec![VariableSource::Terraform],
    }
}

fn capture_type(body: &str) -> Option<String> {
    let re = Regex::new(r"\btype\s*=\s*([^\s,\}\]]+)").unwrap();
    re.captures(body).map(|c| c[1].to_string())
}

fn capture_description(body: &str) -> Option<String> {
    let re = Regex::new(r#"\bdescription\s*=\s*(?:"((?:\\.|[^"\\])*)"|'((?:\\.|[^'\\])*)')"#)
        .unwrap();
    let caps = re.captures(body)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(unescape(raw))
}

fn capture_bool_field(body: &str, field: &str) -> Option<bool> {
    let re = Regex::new(&format!(r"\b{}\s*=\s*(true|false)\b", field)).unwrap();
    re.captures(body).map(|c| &c[1] == "true")
}

fn capture_default(body: &str) -> RawDefault {
    let re = Regex::new(r"\bdefault\s*=\s*").unwrap();
    let m = match re.find(body) {
        Some(m) => m,
        None => return RawDefault::Absent,
    };
    let rest = &body[m.end()..];
    let first = match rest.chars().next() {
        Some(c) => c,
        None => return RawDefault::Absent,
    };
    match first {
        '"' | '\'' => {
            let quoted = Regex::new(r#"^(?:"((?:\\.|[^"\\])*)"|'((?:\\.|[^'\\])*)')"#).unwrap();
            match quoted.captures(rest) {
                Some(caps) => {
                    let inner = caps.get(1).or_else(|| caps.get(2)).unwrap().as_str();
                    RawDefault::Quoted(unescape(inner), caps[0].to_string())
                }
                None => RawDefault::Absent,
            }
        }
        '[' | '{' => match balanced_end(rest, 0) {
            Some(close) => RawDefault::Complex(rest[..=close].to_string()),
            None => RawDefault::Absent,
        },
        _ => {
            let token = Regex::new(r"^([^\s,\}\]\)]+)").unwrap();
            match token.captures(rest) {
                Some(caps) => RawDefault::Token(caps[1].to_string()),
                None => RawDefault::Absent,
            }
        }
    }
}

/// Coerce a captured default to a runtime value, in the fixed precedence:
/// `null`, booleans, quoted strings, numbers, then raw text.
fn coerce_default(raw: &RawDefault) -> (Value, Option<String>) {
    match raw {
        RawDefault::Absent => (Value::Null, None),
        RawDefault::Quoted(inner, original) => {
            (Value::String(inner.clone()), Some(original.clone()))
        }
        RawDefault::Complex(text) => (Value::String(text.clone()), Some(text.clone())),
        RawDefault::Token(token) => {
            let value = match token.as_str() {
                "null" => Value::Null,
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => parse_number(other).unwrap_or_else(|| Value::String(other.to_string())),
            };
            (value, Some(token.clone()))
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_well_formed_variable() {
        let source = r#"
variable "region" {
  type        = string
  default     = "us-west-2"
  description = "AWS region"
}
"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("region").expect("region extracted");
        assert_eq!(record.value, json!("us-west-2"));
        assert_eq!(record.display_type, DisplayType::String);
        assert_eq!(record.declared_type.as_deref(), Some("string"));
        assert_eq!(record.description, "AWS region");
        assert!(!record.sensitive);
        assert!(record.nullable);
        assert!(!record.required);
        assert_eq!(record.source_file.as_deref(), Some("main.tf"));
        assert_eq!(record.sources, vec![VariableSource::Terraform]);
    }

    #[test]
    fn test_required_sensitive_variable() {
        let source = r#"
variable "token" {
  type      = string
  nullable  = false
  sensitive = true
}
"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("token").unwrap();
        assert_eq!(record.value, Value::Null);
        assert!(record.required);
        assert!(record.sensitive);
        assert!(!record.nullable);
    }

    #[test]
    fn test_default_coercion_round_trip() {
        let cases = [
            ("default = null", Value::Null, DisplayType::String),
            ("default = true", json!(true), DisplayType::Boolean),
            ("default = false", json!(false), DisplayType::Boolean),
            ("default = 42", json!(42), DisplayType::Number),
            ("default = 2.5", json!(2.5), DisplayType::Number),
            ("default = \"x\"", json!("x"), DisplayType::String),
        ];
        for (field, expected_value, expected_display) in cases {
            let source = format!("variable \"v\" {{ {} }}", field);
            let records = extract_from_file(&source, "main.tf");
            let record = records.get("v").unwrap();
            assert_eq!(record.value, expected_value, "case: {}", field);
            assert_eq!(record.display_type, expected_display, "case: {}", field);
        }
    }

    #[test]
    fn test_required_flag_all_combinations() {
        // (default clause, nullable clause, expected required)
        let cases = [
            ("default = \"x\"", "nullable = true", false),
            ("default = \"x\"", "nullable = false", false),
            ("", "nullable = true", false),
            ("", "nullable = false", true),
        ];
        for (default, nullable, expected) in cases {
            let source = format!("variable \"v\" {{ {} {} }}", default, nullable);
            let records = extract_from_file(&source, "main.tf");
            let record = records.get("v").unwrap();
            assert_eq!(
                record.required, expected,
                "case: default={:?} nullable={:?}",
                default, nullable
            );
            assert_eq!(record.required, record.value.is_null() && !record.nullable);
        }
    }

    #[test]
    fn test_nested_validation_block() {
        let source = r#"
variable "environment" {
  type        = string
  default     = "dev"
  description = "Target environment"

  validation {
    condition     = contains(["dev", "staging", "prod"], var.environment)
    error_message = "Unknown environment."
  }
}

variable "after" {
  type = number
  default = 1
}
"#;
        let records = extract_from_file(source, "main.tf");
        assert_eq!(records.len(), 2);
        assert_eq!(records.get("environment").unwrap().value, json!("dev"));
        assert_eq!(records.get("after").unwrap().value, json!(1));
    }

    #[test]
    fn test_deeply_nested_object_default() {
        // More than one level of nesting balances fine with the depth scanner.
        let source = r#"
variable "topology" {
  type = map(object({ zones = list(string) }))
  default = {
    primary = {
      zones = ["a", "b"]
    }
  }
}
"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("topology").unwrap();
        assert_eq!(record.display_type, DisplayType::Object);
        let raw = record.value.as_str().unwrap();
        assert!(raw.starts_with('{'));
        assert!(raw.ends_with('}'));
        assert!(raw.contains("zones"));
    }

    #[test]
    fn test_braces_inside_string_default() {
        let source = r#"variable "fmt" { default = "prefix-{}-suffix" }"#;
        let records = extract_from_file(source, "main.tf");
        assert_eq!(records.get("fmt").unwrap().value, json!("prefix-{}-suffix"));
    }

    #[test]
    fn test_unbalanced_block_produces_no_record() {
        let source = r#"
variable "broken" {
  type = string
  default = "x"
"#;
        let records = extract_from_file(source, "main.tf");
        assert!(records.is_empty());
    }

    #[test]
    fn test_comments_stripped_including_urls_in_strings() {
        let source = r#"
// leading comment
variable "docs" {
  /* block
     comment */
  description = "See https://example.com/docs" # trailing
  default     = "x"
}
"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("docs").unwrap();
        assert_eq!(record.description, "See https://example.com/docs");
        assert_eq!(record.value, json!("x"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let source = "variable \"a\" {\n  // c\n  type = string /* x */\n}\n# end";
        let once = normalize(source);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_escaped_quotes_in_default() {
        let source = r#"variable "msg" { default = "say \"hi\"" }"#;
        let records = extract_from_file(source, "main.tf");
        assert_eq!(records.get("msg").unwrap().value, json!("say \"hi\""));
    }

    #[test]
    fn test_duplicate_across_files_last_wins() {
        let first = r#"variable "region" { default = "us-east-1" }"#;
        let second = r#"variable "region" { default = "eu-west-1" }"#;
        let records = extract_from_files(vec![("a.tf", first), ("b.tf", second)]);
        let record = records.get("region").unwrap();
        assert_eq!(record.value, json!("eu-west-1"));
        assert_eq!(record.source_file.as_deref(), Some("b.tf"));
    }

    #[test]
    fn test_type_defaults_to_string_when_absent() {
        let source = r#"variable "plain" { description = "no type" }"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("plain").unwrap();
        assert_eq!(record.declared_type.as_deref(), Some("string"));
        assert_eq!(record.display_type, DisplayType::String);
    }

    #[test]
    fn test_untyped_default_infers_display_type() {
        let source = r#"variable "count" { default = 3 }"#;
        let records = extract_from_file(source, "main.tf");
        assert_eq!(
            records.get("count").unwrap().display_type,
            DisplayType::Number
        );
    }

    #[test]
    fn test_list_default_kept_as_raw_text() {
        let source = r#"variable "zones" { type = list(string) default = ["a", "b"] }"#;
        let records = extract_from_file(source, "main.tf");
        let record = records.get("zones").unwrap();
        assert_eq!(record.display_type, DisplayType::Array);
        assert_eq!(record.value, json!(r#"["a", "b"]"#));
        assert_eq!(record.original.as_deref(), Some(r#"["a", "b"]"#));
        // A raw complex literal still counts as a present default.
        assert!(!record.required);
    }
}
