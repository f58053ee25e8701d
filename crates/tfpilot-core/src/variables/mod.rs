//! Variable extraction and reconciliation
//!
//! Three extractors feed one merge step. `terraform` pulls declaration
//! blocks out of raw HCL, `tfvars` reads the flat defaults file, and
//! `readme` applies a sequence of prose heuristics. `merge` reconciles the
//! three maps into the canonical [`VariableRecord`] model with `sources`
//! provenance. All of it is pure computation over already-fetched text;
//! records live for a single parse-then-deploy cycle and are never
//! persisted.

pub mod merge;
pub mod readme;
pub mod terraform;
pub mod tfvars;

pub use merge::{merge_variables, MergeOptions};
pub use readme::{DocPattern, ReadmeRecord};
pub use tfvars::TfvarsRecord;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display-level type of a variable, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl DisplayType {
    /// Derive the display type from a declared HCL type expression.
    ///
    /// Collection types match by substring so parameterized forms like
    /// `list(string)` or `map(object({...}))` resolve without evaluation.
    pub fn from_declared(declared: &str) -> Self {
        let t = declared.trim().to_lowercase();
        if t == "bool" || t == "boolean" {
            DisplayType::Boolean
        } else if t == "number" {
            DisplayType::Number
        } else if t.contains("list") || t.contains("set") {
            DisplayType::Array
        } else if t.contains("map") || t.contains("object") {
            DisplayType::Object
        } else {
            DisplayType::String
        }
    }

    /// Infer a display type from an already-coerced value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => DisplayType::Boolean,
            Value::Number(_) => DisplayType::Number,
            Value::String(s) => {
                let t = s.trim_start();
                if t.starts_with('[') {
                    DisplayType::Array
                } else if t.starts_with('{') {
                    DisplayType::Object
                } else {
                    DisplayType::String
                }
            }
            Value::Array(_) => DisplayType::Array,
            Value::Object(_) => DisplayType::Object,
            Value::Null => DisplayType::String,
        }
    }

    /// Map a runtime type name (as used by the tfvars and readme
    /// extractors) back to a display type.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "boolean" => DisplayType::Boolean,
            "number" => DisplayType::Number,
            "array" => DisplayType::Array,
            "object" => DisplayType::Object,
            _ => DisplayType::String,
        }
    }
}

/// Which extractor contributed to a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    Terraform,
    Tfvars,
    Readme,
}

/// The canonical variable model, keyed by name in the merged map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRecord {
    /// Resolved runtime value. Complex HCL literals are carried as raw text.
    pub value: Value,
    pub display_type: DisplayType,
    /// Unparsed default-value text, retained for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Raw declared type expression, present only for declaration-sourced
    /// records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub sensitive: bool,
    pub nullable: bool,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub sources: Vec<VariableSource>,
}

impl VariableRecord {
    /// Append a provenance label, keeping first-seen order and uniqueness.
    pub fn add_source(&mut self, source: VariableSource) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }
}

/// Parse a numeric literal, preferring integers over floats.
pub(crate) fn parse_number(raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return serde_json::Number::from_f64(f).map(Value::Number);
        }
    }
    None
}

/// Strip one layer of matching single or double quotes.
pub(crate) fn strip_quotes(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    if raw.len() >= 2 {
        let first = raw.chars().next()?;
        if (first == '"' || first == '\'') && raw.ends_with(first) {
            return Some(&raw[1..raw.len() - 1]);
        }
    }
    None
}

/// Runtime type name of a coerced value (`boolean`, `number` or `string`).
pub(crate) fn runtime_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        _ => "string",
    }
}
