//! Rewriting service method doc comments.
//!
//! Annotation runs as parse → plan edits → apply → write-if-changed. Edits
//! are computed against the untouched source and applied in one pass, so the
//! planning step can be tested without touching the file system.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use url::Url;

use crate::config::AnnotateConfig;
use crate::error::AnnotateError;
use crate::gosrc::{FuncDecl, ServiceRules, go_files, parse_go_file};
use crate::metadata::{Metadata, Method};
use crate::operation::{Operation, sort_op_names};
use crate::reconcile::OperationIndex;

static DOC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*//\s*GitHub\s+API\s+docs:\s*(\S+)").expect("doc line regex")
});
static META_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*//\s*meta:operation\b").expect("meta line regex"));
static UNDOCUMENTED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*//\s*Note:.*\buses the undocumented GitHub API endpoint\b")
        .expect("undocumented line regex")
});

const LINK_PREFIX: &str = "// GitHub API docs: ";
const META_PREFIX: &str = "//meta:operation ";

/// Comparison key for documentation links.
///
/// Locale segments, the `enterprise-cloud@latest//` artifact and the query
/// string do not affect the key; path and fragment do.
pub fn link_key(link: &str) -> String {
    let fixed = link.replace("enterprise-cloud@latest//", "enterprise-cloud@latest/");
    let (path, fragment) = match Url::parse(&fixed) {
        Ok(url) => (
            url.path().to_string(),
            url.fragment().unwrap_or_default().to_string(),
        ),
        Err(_) => {
            let (rest, fragment) = fixed.split_once('#').unwrap_or((&fixed, ""));
            let path = rest.split_once('?').map_or(rest, |(p, _)| p);
            (path.to_string(), fragment.to_string())
        }
    };
    format!("{}#{}", strip_locale(&path), fragment)
}

pub fn links_equivalent(a: &str, b: &str) -> bool {
    link_key(a) == link_key(b)
}

fn is_locale(segment: &str) -> bool {
    let (lang, region) = segment.split_once('-').unwrap_or((segment, ""));
    lang.len() == 2
        && lang.bytes().all(|b| b.is_ascii_lowercase())
        && (region.is_empty() || (region.len() == 2 && region.bytes().all(|b| b.is_ascii_alphabetic())))
}

fn strip_locale(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, rest)) if is_locale(first) => format!("/{rest}"),
        None if is_locale(trimmed) => "/".to_string(),
        _ => path.to_string(),
    }
}

fn is_generated(line: &str) -> bool {
    DOC_LINE.is_match(line) || META_LINE.is_match(line) || UNDOCUMENTED_LINE.is_match(line)
}

fn is_empty_comment(line: &str) -> bool {
    line.trim()
        .strip_prefix("//")
        .is_some_and(|rest| rest.trim().is_empty())
}

/// Build the doc comment lines for a method implementing `ops`.
///
/// `existing` are the current comment lines; generated lines among them are
/// replaced, everything else is kept in order. `//meta:operation` directives
/// come last, behind a `//` line, which is where gofmt puts them.
pub fn doc_comment_lines(
    existing: &[&str],
    method_short_name: &str,
    ops: &[Operation],
    emit_operation_tags: bool,
) -> Vec<String> {
    let existing_links: Vec<&str> = existing
        .iter()
        .filter_map(|line| DOC_LINE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let mut lines: Vec<String> = existing
        .iter()
        .filter(|line| !is_generated(line))
        .map(|line| line.to_string())
        .collect();
    while lines.last().is_some_and(|l| is_empty_comment(l)) {
        lines.pop();
    }

    let mut seen_keys = HashSet::new();
    let mut links: Vec<String> = Vec::new();
    let mut undocumented: Vec<String> = Vec::new();
    for op in ops {
        match &op.documentation_url {
            Some(url) => {
                if !seen_keys.insert(link_key(url)) {
                    continue;
                }
                let text = existing_links
                    .iter()
                    .find(|existing| links_equivalent(existing, url))
                    .map_or_else(|| url.clone(), |existing| existing.to_string());
                links.push(text);
            }
            None => undocumented.push(op.name.clone()),
        }
    }
    links.sort();
    sort_op_names(&mut undocumented);
    undocumented.dedup();

    let mut tags: Vec<&str> = Vec::new();
    if emit_operation_tags {
        for op in ops {
            if !tags.contains(&op.name.as_str()) {
                tags.push(&op.name);
            }
        }
    }

    if lines.is_empty() && links.is_empty() && undocumented.is_empty() && tags.is_empty() {
        return lines;
    }
    if !lines.is_empty() {
        lines.push("//".to_string());
    }
    lines.extend(links.iter().map(|l| format!("{LINK_PREFIX}{l}")));
    lines.extend(undocumented.iter().map(|name| {
        format!("// Note: {method_short_name} uses the undocumented GitHub API endpoint \"{name}\".")
    }));
    if !tags.is_empty() && !lines.is_empty() {
        lines.push("//".to_string());
    }
    lines.extend(tags.iter().map(|name| format!("{META_PREFIX}{name}")));
    lines
}

/// Replacement of the byte range `start..end` of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEdit {
    /// `Receiver.Method` the edit belongs to.
    pub method: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Apply non-overlapping edits to `src`.
pub fn apply_edits(src: &str, edits: &[CommentEdit]) -> String {
    let mut ordered: Vec<&CommentEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| e.start);
    let mut out = String::with_capacity(src.len());
    let mut cursor = 0;
    for edit in ordered {
        out.push_str(&src[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&src[cursor..]);
    out
}

/// Counts reported by [`Annotator::annotate_dir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotateSummary {
    pub files_scanned: usize,
    pub files_updated: usize,
}

/// Per-run annotation context.
pub struct Annotator<'a> {
    metadata: &'a Metadata,
    index: OperationIndex,
    resolved: HashMap<String, Operation>,
    rules: ServiceRules,
    emit_operation_tags: bool,
}

/// The line terminator used on the line starting at `line_start`.
fn line_ending(src: &str, line_start: usize) -> &'static str {
    match src[line_start..].find('\n') {
        Some(n) if n > 0 && src.as_bytes()[line_start + n - 1] == b'\r' => "\r\n",
        _ => "\n",
    }
}

impl<'a> Annotator<'a> {
    pub fn new(metadata: &'a Metadata, config: &AnnotateConfig) -> Self {
        Self {
            metadata,
            index: metadata.operation_index(),
            resolved: metadata.resolved_by_name(),
            rules: ServiceRules::from(config),
            emit_operation_tags: config.emit_operation_tags,
        }
    }

    fn plan_edit(
        &self,
        src: &str,
        decl: &FuncDecl,
        method: &Method,
        ops: &[Operation],
    ) -> Option<CommentEdit> {
        let existing = decl.doc.as_ref().map(|d| d.lines()).unwrap_or_default();
        let lines = doc_comment_lines(
            &existing,
            method.short_name(),
            ops,
            self.emit_operation_tags,
        );
        let eol = line_ending(src, decl.line_start);
        let text = lines.join(eol);
        match &decl.doc {
            Some(doc) => {
                if src[doc.start()..doc.end()] == text {
                    return None;
                }
                Some(CommentEdit {
                    method: method.name.clone(),
                    start: doc.start(),
                    end: doc.end(),
                    text,
                })
            }
            None if text.is_empty() => None,
            None => Some(CommentEdit {
                method: method.name.clone(),
                start: decl.line_start,
                end: decl.line_start,
                text: format!("{text}{eol}"),
            }),
        }
    }

    /// Edits needed to bring the doc comments of `src` up to date.
    pub fn plan_edits(&self, path: &Path, src: &str) -> Result<Vec<CommentEdit>, AnnotateError> {
        let file = parse_go_file(src).map_err(|source| AnnotateError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let mut edits = Vec::new();
        for decl in &file.funcs {
            let Some(method) = self
                .rules
                .service_method(decl)
                .and_then(|name| self.metadata.method(&name))
            else {
                continue;
            };
            let ops = self
                .metadata
                .method_operations_with(&method.name, &self.index, &self.resolved)
                .map_err(|source| AnnotateError::Resolve {
                    path: path.to_path_buf(),
                    source,
                })?;
            if ops.is_empty() {
                continue;
            }
            if let Some(edit) = self.plan_edit(src, decl, method, &ops) {
                edits.push(edit);
            }
        }
        Ok(edits)
    }

    /// The annotated form of `src`.
    pub fn annotate_source(&self, path: &Path, src: &str) -> Result<String, AnnotateError> {
        let edits = self.plan_edits(path, src)?;
        Ok(apply_edits(src, &edits))
    }

    /// Rewrite one file in place. Returns whether its content changed.
    pub fn annotate_file(&self, path: &Path) -> Result<bool, AnnotateError> {
        let src = fs::read_to_string(path).map_err(|source| AnnotateError::Source {
            path: path.to_path_buf(),
            source: crate::error::SourceError::Read {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let updated = self.annotate_source(path, &src)?;
        if updated == src {
            return Ok(false);
        }
        fs::write(path, updated).map_err(|source| AnnotateError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("updated {}", path.display());
        Ok(true)
    }

    /// Rewrite every included Go file under `dir`.
    ///
    /// A failing file does not stop the others; all failures are returned
    /// together once every file has been processed.
    pub fn annotate_dir(&self, dir: &Path) -> Result<AnnotateSummary, AnnotateError> {
        let files = go_files(dir, &self.rules).map_err(|source| AnnotateError::Source {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut summary = AnnotateSummary::default();
        let mut failures = Vec::new();
        for path in files {
            summary.files_scanned += 1;
            match self.annotate_file(&path) {
                Ok(true) => summary.files_updated += 1,
                Ok(false) => {}
                Err(err) => failures.push(err),
            }
        }
        if !failures.is_empty() {
            return Err(AnnotateError::Batch(failures));
        }
        info!(
            "updated {} of {} files",
            summary.files_updated, summary.files_scanned
        );
        Ok(summary)
    }
}
