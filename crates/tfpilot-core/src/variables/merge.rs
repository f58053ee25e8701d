//! Reconciliation of the three extractor outputs
//!
//! Declaration blocks are authoritative for type, sensitivity, nullability
//! and the required flag. Documentation only ever augments descriptions (or
//! contributes names the declarations missed, never as required inputs). The
//! defaults file participates only when the caller opts in, in which case its
//! value wins. Output is deterministic: records are keyed in a BTreeMap and
//! `sources` keeps first-seen insertion order.

use crate::variables::{
    DisplayType, ReadmeRecord, TfvarsRecord, VariableRecord, VariableSource,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Let the defaults file override declaration-sourced values.
    pub apply_tfvars: bool,
}

pub fn merge_variables(
    terraform: BTreeMap<String, VariableRecord>,
    readme: &BTreeMap<String, ReadmeRecord>,
    tfvars: &BTreeMap<String, TfvarsRecord>,
    options: MergeOptions,
) -> BTreeMap<String, VariableRecord> {
    let mut merged = terraform;

    // Documentation fills in missing descriptions on declared variables.
    for (name, record) in merged.iter_mut() {
        if record.description.is_empty() {
            if let Some(doc) = readme.get(name) {
                if !doc.description.is_empty() {
                    record.description = doc.description.clone();
                    record.add_source(VariableSource::Readme);
                }
            }
        }
    }

    // Names only the documentation knows about become best-effort records.
    for (name, doc) in readme {
        if merged.contains_key(name) {
            continue;
        }
        merged.insert(
            name.clone(),
            VariableRecord {
                value: doc.value.clone(),
                display_type: DisplayType::from_type_name(&doc.var_type),
                original: doc.original.clone(),
                description: doc.description.clone(),
                declared_type: None,
                sensitive: false,
                nullable: true,
                required: false,
                source_file: None,
                sources: vec![VariableSource::Readme],
            },
        );
    }

    if options.apply_tfvars {
        for (name, assignment) in tfvars {
            if let Some(record) = merged.get_mut(name) {
                record.value = assignment.value.clone();
                record.original = Some(assignment.original.clone());
                record.add_source(VariableSource::Tfvars);
            }
        }
    }

    merged
}
