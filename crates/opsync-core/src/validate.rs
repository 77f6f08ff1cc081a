//! Read-only consistency checks over the metadata document and the source.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{FetchError, ResolveError};
use crate::fetch::ContentStore;
use crate::metadata::{Metadata, snapshot_at_commit};
use crate::operation::{Operation, operations_equal, sort_operations};
use crate::plan::PlanMatcher;

/// Check `metadata` against the service methods found in source.
///
/// Every check runs; the returned issues are empty when everything is
/// consistent.
pub fn validate(metadata: &Metadata, source_methods: &[String]) -> Vec<String> {
    let mut issues = Vec::new();
    validate_methods_exist(metadata, source_methods, &mut issues);
    validate_method_operations(metadata, &mut issues);
    validate_operation_lists(metadata, &mut issues);
    validate_stale_operations(metadata, &mut issues);
    issues
}

fn validate_methods_exist(metadata: &Metadata, source_methods: &[String], issues: &mut Vec<String>) {
    let declared: HashSet<&str> = metadata.methods.iter().map(|m| m.name.as_str()).collect();
    let in_source: BTreeSet<&str> = source_methods.iter().map(String::as_str).collect();

    for name in &in_source {
        if !declared.contains(name) {
            issues.push(format!(
                "Method {name} does not exist in metadata.yaml. Please add it."
            ));
        }
    }
    for method in &metadata.methods {
        if !in_source.contains(method.name.as_str()) {
            issues.push(format!(
                "Method {} in metadata.yaml does not exist in the code. Please remove it.",
                method.name
            ));
        }
    }
}

fn validate_method_operations(metadata: &Metadata, issues: &mut Vec<String>) {
    let index = metadata.operation_index();
    let mut seen_methods = HashSet::new();
    for method in &metadata.methods {
        if !seen_methods.insert(method.name.as_str()) {
            issues.push(format!("Method {} is duplicated in metadata.yaml.", method.name));
        }
        if method.openapi_operations.is_empty() {
            issues.push(format!("Method {} has no operations.", method.name));
        }
        let mut seen_ops = HashSet::new();
        for op_name in &method.openapi_operations {
            if !seen_ops.insert(op_name.as_str()) {
                issues.push(format!(
                    "Method {} has duplicate operation: {op_name}.",
                    method.name
                ));
            }
            if index.contains(op_name) {
                continue;
            }
            match index.candidates(op_name) {
                [] => issues.push(format!(
                    "Method {} has operation which does not exist: {op_name}.",
                    method.name
                )),
                [_] => issues.push(format!(
                    "Method {} has operation which does not use the canonical name. \
                     You may be able to fix this automatically by running `opsync canonize`: {op_name}.",
                    method.name
                )),
                many => issues.push(
                    ResolveError::Ambiguous {
                        method: method.name.clone(),
                        operation: op_name.clone(),
                        candidates: many.to_vec(),
                    }
                    .to_string(),
                ),
            }
        }
    }
}

fn validate_operation_lists(metadata: &Metadata, issues: &mut Vec<String>) {
    let mut openapi_names: HashMap<&str, usize> = HashMap::new();
    for op in &metadata.openapi_ops {
        *openapi_names.entry(op.name.as_str()).or_default() += 1;
    }
    let mut duplicated: Vec<&str> = openapi_names
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| *name)
        .collect();
    duplicated.sort();
    for name in duplicated {
        issues.push(format!("Name {name} is duplicated in openapi_operations."));
    }

    let mut manual_names = HashSet::new();
    for op in &metadata.manual_ops {
        if !manual_names.insert(op.name.as_str()) {
            issues.push(format!("Name {} is duplicated in operations.", op.name));
        }
        if openapi_names.contains_key(op.name.as_str()) {
            issues.push(format!(
                "Name {} is in both operations and openapi_operations.",
                op.name
            ));
        }
    }

    for over in &metadata.override_ops {
        if !openapi_names.contains_key(over.name.as_str())
            && !manual_names.contains(over.name.as_str())
        {
            issues.push(format!(
                "Override {} does not match any operation in operations or openapi_operations.",
                over.name
            ));
        }
    }
}

fn validate_stale_operations(metadata: &Metadata, issues: &mut Vec<String>) {
    for op in metadata.stale_operations() {
        let methods = metadata.methods_for_operation(&op.name);
        if methods.is_empty() {
            issues.push(format!(
                "Operation {} is no longer in any OpenAPI description. Please remove it.",
                op.name
            ));
        } else {
            issues.push(format!(
                "Operation {} is no longer in any OpenAPI description but is used by {}.",
                op.name,
                methods.join(", ")
            ));
        }
    }
}

/// Check that the live part of `openapi_operations` is exactly what its recorded commit produces.
pub async fn validate_remote(
    metadata: &Metadata,
    store: Arc<dyn ContentStore>,
    matcher: &PlanMatcher,
    descriptions_dir: &str,
) -> Result<Vec<String>, FetchError> {
    if metadata.git_commit.is_empty() {
        return Ok(vec![
            "openapi_commit is not set; run `opsync update-openapi` first.".to_string(),
        ]);
    }
    let regenerated =
        snapshot_at_commit(store, matcher, descriptions_dir, &metadata.git_commit).await?;
    // Stale entries are reported by `validate`; a fresh snapshot never has them.
    let mut recorded: Vec<Operation> = metadata
        .openapi_ops
        .iter()
        .filter(|op| !op.openapi_files.is_empty())
        .cloned()
        .collect();
    sort_operations(&mut recorded);
    if operations_equal(&recorded, &regenerated) {
        return Ok(Vec::new());
    }
    Ok(vec![format!(
        "openapi_operations does not match the descriptions at commit {}. \
         Run `opsync update-openapi --ref {}` to regenerate it.",
        metadata.git_commit, metadata.git_commit
    )])
}
