//! Merging freshly fetched descriptions into the operation snapshot.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::debug;

use crate::error::ResolveError;
use crate::fetch::DescriptionFile;
use crate::operation::{Operation, normalized_op_name, op_name, sort_op_names, sort_operations};
use crate::plan::PlanMatcher;

/// Operations keyed by normalized identity, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    ops: IndexMap<String, Operation>,
}

impl OperationRegistry {
    /// Build from existing operations. Later duplicates of an identity are dropped.
    pub fn from_operations(ops: impl IntoIterator<Item = Operation>) -> Self {
        let mut registry = Self::default();
        for op in ops {
            registry.ops.entry(op.identity()).or_insert(op);
        }
        registry
    }

    /// Sorted by path, then verb.
    pub fn into_sorted(self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.ops.into_values().collect();
        sort_operations(&mut ops);
        ops
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Every operation, sorted, stale ones included.
    pub operations: Vec<Operation>,
    /// Names of operations that did not exist before.
    pub added: Vec<String>,
    /// Names of pre-existing operations whose record changed.
    pub changed: Vec<String>,
    /// Names of operations no fetched description contains any more.
    pub stale: Vec<String>,
}

impl Reconciliation {
    /// Operations minus the stale ones.
    pub fn live_operations(&self) -> Vec<Operation> {
        self.operations
            .iter()
            .filter(|op| !op.openapi_files.is_empty())
            .cloned()
            .collect()
    }
}

/// Merge `specs` (in plan order) into `current`.
///
/// All file lists are cleared first. The first occurrence of an identity in
/// this run resets its file list and refreshes its name, documentation URL
/// and summary. Later occurrences only append their file, keeping at most one
/// enterprise-server file per operation.
pub fn reconcile(
    current: &[Operation],
    specs: &[DescriptionFile],
    matcher: &PlanMatcher,
) -> Reconciliation {
    let before: HashMap<String, Operation> = current
        .iter()
        .map(|op| (op.identity(), op.clone()))
        .collect();

    let mut registry = OperationRegistry::from_operations(current.iter().cloned());
    for op in registry.ops.values_mut() {
        op.openapi_files.clear();
    }

    for desc in specs {
        for found in desc.spec.operations() {
            let name = op_name(&found.verb, &found.path);
            let key = normalized_op_name(&name);
            match registry.ops.get_mut(&key) {
                None => {
                    registry.ops.insert(
                        key,
                        Operation {
                            name,
                            documentation_url: found.documentation_url,
                            summary: found.summary,
                            openapi_files: vec![desc.filename.clone()],
                        },
                    );
                }
                Some(op) if op.openapi_files.is_empty() => {
                    op.name = name;
                    op.documentation_url = found.documentation_url;
                    op.summary = found.summary;
                    op.openapi_files.push(desc.filename.clone());
                }
                Some(op) => {
                    if op.openapi_files.contains(&desc.filename) {
                        continue;
                    }
                    if matcher.is_server_file(&desc.filename)
                        && op.openapi_files.iter().any(|f| matcher.is_server_file(f))
                    {
                        continue;
                    }
                    op.openapi_files.push(desc.filename.clone());
                }
            }
        }
    }

    let operations = registry.into_sorted();
    let mut result = Reconciliation {
        operations,
        ..Reconciliation::default()
    };
    for op in &result.operations {
        match before.get(&op.identity()) {
            None => result.added.push(op.name.clone()),
            Some(prev) if prev != op && !op.openapi_files.is_empty() => {
                result.changed.push(op.name.clone())
            }
            Some(_) => {}
        }
        if op.openapi_files.is_empty() {
            result.stale.push(op.name.clone());
        }
    }
    debug!(
        "reconciled {} operations: {} added, {} changed, {} stale",
        result.operations.len(),
        result.added.len(),
        result.changed.len(),
        result.stale.len()
    );
    result
}

/// Lookup table from normalized name to canonical names, built once per run.
#[derive(Debug, Clone, Default)]
pub struct OperationIndex {
    canonical: HashSet<String>,
    by_normalized: HashMap<String, Vec<String>>,
}

impl OperationIndex {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for name in names {
            if !index.canonical.insert(name.to_string()) {
                continue;
            }
            index
                .by_normalized
                .entry(normalized_op_name(name))
                .or_default()
                .push(name.to_string());
        }
        for candidates in index.by_normalized.values_mut() {
            sort_op_names(candidates);
        }
        index
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical.contains(name)
    }

    /// Canonical names sharing the normalized form of `name`.
    pub fn candidates(&self, name: &str) -> &[String] {
        self.by_normalized
            .get(&normalized_op_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve a possibly non-canonical reference made by `method`.
    pub fn resolve(&self, method: &str, name: &str) -> Result<String, ResolveError> {
        if self.contains(name) {
            return Ok(name.to_string());
        }
        match self.candidates(name) {
            [] => Err(ResolveError::Undefined {
                method: method.to_string(),
                operation: name.to_string(),
            }),
            [only] => Ok(only.clone()),
            many => Err(ResolveError::Ambiguous {
                method: method.to_string(),
                operation: name.to_string(),
                candidates: many.to_vec(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanConfig;
    use crate::parse;
    use crate::plan::PlanMatcher;

    fn matcher() -> PlanMatcher {
        PlanMatcher::new(&PlanConfig::default()).unwrap()
    }

    fn desc(dir: &str, paths: &[(&str, &str, Option<&str>)]) -> DescriptionFile {
        let mut body = String::from(r#"{"openapi":"3.0.3","info":{"title":"t","version":"1"},"paths":{"#);
        let entries: Vec<String> = paths
            .iter()
            .map(|(path, verb, url)| {
                let docs = url
                    .map(|u| format!(r#","externalDocs":{{"url":"{u}"}}"#))
                    .unwrap_or_default();
                format!(r#""{path}":{{"{verb}":{{"summary":"{verb} {path}"{docs}}}}}"#)
            })
            .collect();
        body.push_str(&entries.join(","));
        body.push_str("}}");
        let m = matcher();
        let plan = m.match_dir(dir).unwrap();
        DescriptionFile {
            filename: plan.file_path("descriptions"),
            plan,
            spec: parse::from_json(&body).unwrap(),
        }
    }

    #[test]
    fn scenario_public_cloud_and_two_servers() {
        let specs = vec![
            desc(
                "api.github.com",
                &[
                    ("/a/{a_id}", "get", Some("https://docs.github.com/rest/a#get-a")),
                    ("/a/b/{a_id}", "get", Some("https://docs.github.com/rest/a#get-b")),
                ],
            ),
            desc("ghec", &[("/a/b/{a_id}", "get", None)]),
            desc("ghes-3.10", &[("/a/b/{a_id}", "get", None)]),
            desc("ghes-3.9", &[("/a/b/{a_id}", "get", None)]),
        ];
        let result = reconcile(&[], &specs, &matcher());
        assert_eq!(result.operations.len(), 2);

        let a = &result.operations[1];
        assert_eq!(a.name, "GET /a/{a_id}");
        assert_eq!(a.openapi_files.len(), 1);

        let b = &result.operations[0];
        assert_eq!(b.name, "GET /a/b/{a_id}");
        assert_eq!(
            b.openapi_files,
            vec![
                "descriptions/api.github.com/api.github.com.json",
                "descriptions/ghec/ghec.json",
                "descriptions/ghes-3.10/ghes-3.10.json",
            ]
        );
        assert_eq!(
            b.documentation_url.as_deref(),
            Some("https://docs.github.com/rest/a#get-b")
        );
        assert_eq!(result.added.len(), 2);
        assert!(result.stale.is_empty());
    }

    #[test]
    fn server_file_cap_holds_for_many_versions() {
        let specs: Vec<_> = ["ghes-3.14", "ghes-3.13", "ghes-3.12", "ghes-3.11"]
            .iter()
            .map(|d| desc(d, &[("/x", "get", None)]))
            .collect();
        let result = reconcile(&[], &specs, &matcher());
        assert_eq!(result.operations.len(), 1);
        assert_eq!(
            result.operations[0].openapi_files,
            vec!["descriptions/ghes-3.14/ghes-3.14.json"]
        );
    }

    #[test]
    fn identity_ignores_parameter_names() {
        let specs = vec![
            desc("api.github.com", &[("/repos/{owner}/{repo}", "get", None)]),
            desc("ghec", &[("/repos/{org}/{name}", "get", None)]),
        ];
        let result = reconcile(&[], &specs, &matcher());
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].name, "GET /repos/{owner}/{repo}");
        assert_eq!(result.operations[0].openapi_files.len(), 2);
    }

    #[test]
    fn first_touch_refreshes_existing_record() {
        let current = vec![Operation {
            name: "GET /a/{old}".to_string(),
            documentation_url: Some("https://old".to_string()),
            summary: None,
            openapi_files: vec!["descriptions/ghec/ghec.json".to_string()],
        }];
        let specs = vec![
            desc("api.github.com", &[("/a/{new}", "get", Some("https://new"))]),
            desc("ghec", &[("/a/{other}", "get", Some("https://other"))]),
        ];
        let result = reconcile(&current, &specs, &matcher());
        let op = &result.operations[0];
        assert_eq!(op.name, "GET /a/{new}");
        assert_eq!(op.documentation_url.as_deref(), Some("https://new"));
        assert_eq!(op.openapi_files.len(), 2);
        assert_eq!(result.changed, vec!["GET /a/{new}"]);
        assert!(result.added.is_empty());
    }

    #[test]
    fn missing_operations_become_stale() {
        let current = vec![Operation {
            name: "DELETE /gone".to_string(),
            openapi_files: vec!["descriptions/ghec/ghec.json".to_string()],
            ..Operation::default()
        }];
        let specs = vec![desc("ghec", &[("/kept", "get", None)])];
        let result = reconcile(&current, &specs, &matcher());
        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.stale, vec!["DELETE /gone"]);
        assert_eq!(result.live_operations().len(), 1);
    }

    #[test]
    fn identities_are_unique() {
        let specs = vec![
            desc("api.github.com", &[("/a/{x}", "get", None), ("/a/{y}", "post", None)]),
            desc("ghec", &[("/a/{z}", "get", None), ("/a/{w}", "post", None)]),
            desc("ghes-3.10", &[("/a/{q}", "get", None)]),
        ];
        let result = reconcile(&[], &specs, &matcher());
        let mut ids: Vec<_> = result.operations.iter().map(|o| o.identity()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, 2);
    }

    #[test]
    fn resolve_canonicalizes_loose_reference() {
        let index = OperationIndex::new(["POST /a/{a_id}", "GET /a/{a_id}"]);
        assert_eq!(
            index.resolve("AService.Create", "post a/{a_id}").unwrap(),
            "POST /a/{a_id}"
        );
        assert_eq!(
            index.resolve("AService.Create", "POST /a/{a_id}").unwrap(),
            "POST /a/{a_id}"
        );
    }

    #[test]
    fn resolve_reports_undefined_and_ambiguous() {
        let index = OperationIndex::new(["GET /a/{x}", "GET /a/{y}"]);
        assert_eq!(
            index.resolve("AService.Get", "GET /b"),
            Err(ResolveError::Undefined {
                method: "AService.Get".to_string(),
                operation: "GET /b".to_string(),
            })
        );
        match index.resolve("AService.Get", "GET /a/{z}") {
            Err(ResolveError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["GET /a/{x}", "GET /a/{y}"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }
}
