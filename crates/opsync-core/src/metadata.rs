//! The persisted metadata document.
//!
//! ```yaml
//! methods:
//!   - name: RepositoriesService.Get
//!     openapi_operations:
//!       - GET /repos/{owner}/{repo}
//! operations: []           # manual operations missing from every description
//! operation_overrides: []  # corrections applied on top of the two lists above
//! openapi_commit: 0123abcd
//! openapi_operations: []   # snapshot reconciled from the descriptions
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, MetadataError, ResolveError};
use crate::fetch::{ContentStore, fetch_descriptions};
use crate::operation::{Operation, normalized_op_name, operations_equal, sort_operations};
use crate::plan::PlanMatcher;
use crate::reconcile::{OperationIndex, Reconciliation, reconcile};

/// A library method and the operations it implements, in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub openapi_operations: Vec<String>,
}

impl Method {
    /// The part after the receiver, e.g. `Get` for `RepositoriesService.Get`.
    pub fn short_name(&self) -> &str {
        self.name
            .split_once('.')
            .map(|(_, m)| m)
            .unwrap_or(&self.name)
    }
}

/// Root of `metadata.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<Method>,

    #[serde(rename = "operations", default, skip_serializing_if = "Vec::is_empty")]
    pub manual_ops: Vec<Operation>,

    #[serde(
        rename = "operation_overrides",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub override_ops: Vec<Operation>,

    #[serde(rename = "openapi_commit", default, skip_serializing_if = "String::is_empty")]
    pub git_commit: String,

    #[serde(
        rename = "openapi_operations",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub openapi_ops: Vec<Operation>,
}

impl Metadata {
    pub fn from_yaml(input: &str) -> Result<Self, MetadataError> {
        Ok(serde_yaml_ng::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = fs::read_to_string(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Sort every section so the serialized form is deterministic.
    pub fn normalize(&mut self) {
        self.methods.sort_by(|a, b| a.name.cmp(&b.name));
        sort_operations(&mut self.manual_ops);
        sort_operations(&mut self.override_ops);
        sort_operations(&mut self.openapi_ops);
    }

    pub fn to_yaml(&self) -> Result<String, MetadataError> {
        let mut sorted = self.clone();
        sorted.normalize();
        Ok(serde_yaml_ng::to_string(&sorted)?)
    }

    /// Write the document, leaving the file untouched when nothing changed.
    pub fn save(&self, path: &Path) -> Result<bool, MetadataError> {
        let content = self.to_yaml()?;
        if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
            return Ok(false);
        }
        fs::write(path, content).map_err(|source| MetadataError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }

    /// Openapi and manual operations merged, with overrides applied. Sorted.
    pub fn resolved_operations(&self) -> Vec<Operation> {
        let mut resolved: IndexMap<&str, Operation> = IndexMap::new();
        for op in self.openapi_ops.iter().chain(&self.manual_ops) {
            resolved.insert(op.name.as_str(), op.clone());
        }
        for over in &self.override_ops {
            let Some(target) = resolved.get_mut(over.name.as_str()) else {
                continue;
            };
            if over.documentation_url.is_some() {
                target.documentation_url.clone_from(&over.documentation_url);
            }
            if !over.openapi_files.is_empty() {
                target.openapi_files.clone_from(&over.openapi_files);
            }
        }
        let mut ops: Vec<Operation> = resolved.into_values().collect();
        sort_operations(&mut ops);
        ops
    }

    /// Resolution table over every known operation name.
    pub fn operation_index(&self) -> OperationIndex {
        OperationIndex::new(
            self.openapi_ops
                .iter()
                .chain(&self.manual_ops)
                .map(|op| op.name.as_str()),
        )
    }

    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.resolved_operations()
            .into_iter()
            .find(|op| op.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Resolved operations keyed by canonical name.
    pub fn resolved_by_name(&self) -> HashMap<String, Operation> {
        self.resolved_operations()
            .into_iter()
            .map(|op| (op.name.clone(), op))
            .collect()
    }

    /// The operations of `method_name`, in declared order.
    ///
    /// Non-canonical references are resolved through normalization; a
    /// reference matching zero or several operations is an error. Unknown
    /// methods have no operations.
    pub fn method_operations(&self, method_name: &str) -> Result<Vec<Operation>, ResolveError> {
        self.method_operations_with(method_name, &self.operation_index(), &self.resolved_by_name())
    }

    /// [`Metadata::method_operations`] against a prebuilt index and lookup,
    /// for callers resolving many methods.
    pub fn method_operations_with(
        &self,
        method_name: &str,
        index: &OperationIndex,
        resolved: &HashMap<String, Operation>,
    ) -> Result<Vec<Operation>, ResolveError> {
        let Some(method) = self.method(method_name) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(method.openapi_operations.len());
        for reference in &method.openapi_operations {
            let canonical = index.resolve(&method.name, reference)?;
            if let Some(op) = resolved.get(&canonical) {
                out.push(op.clone());
            }
        }
        Ok(out)
    }

    /// Methods listing `op_name` among their operations.
    pub fn methods_for_operation(&self, op_name: &str) -> Vec<&str> {
        let norm = normalized_op_name(op_name);
        self.methods
            .iter()
            .filter(|m| {
                m.openapi_operations
                    .iter()
                    .any(|o| normalized_op_name(o) == norm)
            })
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Rewrite every method's references to their canonical names.
    pub fn canonicalize_op_names(&mut self) -> Result<(), ResolveError> {
        let index = self.operation_index();
        for method in &mut self.methods {
            for reference in &mut method.openapi_operations {
                *reference = index.resolve(&method.name, reference)?;
            }
        }
        Ok(())
    }

    /// Resolved operations that no method references.
    pub fn unused_operations(&self) -> Vec<Operation> {
        let used: HashSet<String> = self
            .methods
            .iter()
            .flat_map(|m| m.openapi_operations.iter())
            .map(|o| normalized_op_name(o))
            .collect();
        self.resolved_operations()
            .into_iter()
            .filter(|op| !used.contains(&op.identity()))
            .collect()
    }

    /// Snapshot operations no longer present in any description.
    pub fn stale_operations(&self) -> Vec<&Operation> {
        self.openapi_ops
            .iter()
            .filter(|op| op.openapi_files.is_empty())
            .collect()
    }

    /// Fetch descriptions at `git_ref` and reconcile them into `openapi_ops`.
    ///
    /// Nothing is modified unless every download and parse succeeds. Stale
    /// operations stay in the snapshot with no files, for the validator to
    /// report. The commit is only recorded when the snapshot actually changes.
    pub async fn update_from_remote(
        &mut self,
        store: Arc<dyn ContentStore>,
        matcher: &PlanMatcher,
        descriptions_dir: &str,
        git_ref: &str,
    ) -> Result<Reconciliation, MetadataError> {
        let commit = store.commit_sha(git_ref).await?;
        let specs = fetch_descriptions(store, matcher, descriptions_dir, git_ref).await?;
        let result = reconcile(&self.openapi_ops, &specs, matcher);
        for name in &result.stale {
            warn!("{name} is no longer in any description");
        }
        let ops = result.operations.clone();
        let mut current = self.openapi_ops.clone();
        sort_operations(&mut current);
        if !operations_equal(&current, &ops) {
            info!(
                "openapi operations updated to {commit}: {} added, {} changed, {} stale",
                result.added.len(),
                result.changed.len(),
                result.stale.len()
            );
            self.openapi_ops = ops;
            self.git_commit = commit;
        }
        Ok(result)
    }
}

/// Regenerate the snapshot recorded at `git_commit` from scratch.
pub async fn snapshot_at_commit(
    store: Arc<dyn ContentStore>,
    matcher: &PlanMatcher,
    descriptions_dir: &str,
    git_commit: &str,
) -> Result<Vec<Operation>, FetchError> {
    let specs = fetch_descriptions(store, matcher, descriptions_dir, git_commit).await?;
    Ok(reconcile(&[], &specs, matcher).live_operations())
}
