//! Rendering the on-disk inputs for the provisioning executable
//!
//! The defaults artifact is one `name = value` line per non-sensitive
//! variable. Sensitive variables never reach this file; they travel as
//! `TF_VAR_<name>` process environment instead.

use crate::config::BackendConfig;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Render the variable-defaults artifact, excluding sensitive names.
pub fn render_tfvars(values: &BTreeMap<String, Value>, sensitive: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for (name, value) in values {
        if sensitive.contains(name) {
            continue;
        }
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&render_value(value));
        out.push('\n');
    }
    out
}

/// Render one value in HCL literal syntax.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            // A string beginning with a bracket is a pre-rendered collection
            // literal (complex defaults are carried as raw text) and passes
            // through unquoted.
            let trimmed = s.trim_start();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                s.clone()
            } else {
                quote(s)
            }
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let mut out = String::from("{\n");
            for (key, item) in map {
                out.push_str("  ");
                out.push_str(&render_key(key));
                out.push_str(" = ");
                out.push_str(&render_value(item));
                out.push('\n');
            }
            out.push('}');
            out
        }
    }
}

fn render_key(key: &str) -> String {
    if key.contains('-') || key.contains(' ') {
        quote(key)
    } else {
        key.to_string()
    }
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Render the backend-state configuration as `backend.tf.json` content.
pub fn render_backend(backend: &BackendConfig) -> String {
    let mut by_type = serde_json::Map::new();
    by_type.insert(backend.backend_type.clone(), json!(backend.settings));
    let document = json!({ "terraform": { "backend": by_type } });
    serde_json::to_string_pretty(&document).unwrap_or_default()
}
