use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::operation::PathItem;

/// Info object describing the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub version: String,
}

/// Top-level OpenAPI 3.x description. Components and schemas are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiSpec {
    pub openapi: String,

    pub info: Info,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub paths: IndexMap<String, PathItem>,
}

/// One operation found in a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedOperation {
    pub verb: String,
    pub path: String,
    pub documentation_url: Option<String>,
    pub summary: Option<String>,
}

impl OpenApiSpec {
    /// Every operation in document order.
    pub fn operations(&self) -> Vec<DescribedOperation> {
        let mut out = Vec::new();
        for (path, item) in &self.paths {
            for (verb, op) in item.operations() {
                out.push(DescribedOperation {
                    verb: verb.to_string(),
                    path: path.clone(),
                    documentation_url: op
                        .external_docs
                        .as_ref()
                        .map(|docs| docs.url.clone())
                        .filter(|url| !url.is_empty()),
                    summary: op.summary.clone(),
                });
            }
        }
        out
    }
}
