use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One API endpoint, named `"<VERB> <path>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub openapi_files: Vec<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn verb(&self) -> String {
        parse_op_name(&self.name).0
    }

    pub fn path(&self) -> String {
        parse_op_name(&self.name).1
    }

    /// The registry identity: verb plus wildcarded path.
    pub fn identity(&self) -> String {
        normalized_op_name(&self.name)
    }
}

/// Split `"get repos/{owner}"` into `("GET", "/repos/{owner}")`.
///
/// The first whitespace-separated token is the verb; the rest is the path,
/// which always gains a leading `/`.
pub fn parse_op_name(name: &str) -> (String, String) {
    let trimmed = name.trim();
    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };
    let path = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    };
    (verb.to_uppercase(), path)
}

/// Replace every templated path segment (`{x}` or percent-encoded) with `*`.
pub fn normalize_op_path(path: &str) -> String {
    if !path.contains(['{', '%']) {
        return path.to_string();
    }
    path.split('/')
        .map(|segment| {
            if segment.starts_with('{') || segment.starts_with('%') {
                "*"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical identity of an operation name, e.g. `"GET /repos/*/*"`.
pub fn normalized_op_name(name: &str) -> String {
    let (verb, path) = parse_op_name(name);
    format!("{verb} {}", normalize_op_path(&path))
        .trim()
        .to_string()
}

/// Build an operation name from its parts.
pub fn op_name(verb: &str, path: &str) -> String {
    format!("{} {}", verb.to_uppercase(), path)
}

fn compare_names(left: &str, right: &str) -> Ordering {
    let (left_verb, left_path) = parse_op_name(left);
    let (right_verb, right_path) = parse_op_name(right);
    left_path
        .cmp(&right_path)
        .then_with(|| left_verb.cmp(&right_verb))
}

/// Sort by path, then verb.
pub fn sort_operations(ops: &mut [Operation]) {
    ops.sort_by(|a, b| compare_names(&a.name, &b.name));
}

/// Sort operation names by path, then verb.
pub fn sort_op_names(names: &mut [String]) {
    names.sort_by(|a, b| compare_names(a, b));
}

pub fn operations_equal(a: &[Operation], b: &[Operation]) -> bool {
    a == b
}
