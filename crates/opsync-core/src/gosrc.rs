//! A declaration-level model of Go source files.
//!
//! Only what the annotator needs is recognized: comments, literals (so that
//! comment markers inside strings are ignored), bracket nesting, and the
//! header of every top-level `func` declaration together with its doc
//! comment group. Function bodies are skipped without being parsed.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::AnnotateConfig;
use crate::error::SourceError;

/// A single `//` or `/* */` comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Byte offset of the comment marker.
    pub start: usize,
    /// Byte offset just past the comment (before the newline).
    pub end: usize,
    pub line: usize,
    pub end_line: usize,
    /// No code precedes the comment on its line.
    pub own_line: bool,
    pub text: String,
}

/// Adjacent own-line comments directly above a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentGroup {
    pub comments: Vec<Comment>,
}

impl CommentGroup {
    pub fn start(&self) -> usize {
        self.comments.first().map(|c| c.start).unwrap_or(0)
    }

    pub fn end(&self) -> usize {
        self.comments.last().map(|c| c.end).unwrap_or(0)
    }

    pub fn lines(&self) -> Vec<&str> {
        self.comments.iter().map(|c| c.text.as_str()).collect()
    }
}

/// The receiver list of a method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    /// Number of receivers declared; valid Go has exactly one.
    pub count: usize,
    pub pointer: bool,
    /// Base type name, `None` when it is generic or otherwise not a plain identifier.
    pub type_name: Option<String>,
}

/// A top-level `func` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub line: usize,
    /// Byte offset of the start of the line holding `func`.
    pub line_start: usize,
    pub doc: Option<CommentGroup>,
}

/// Declarations found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoFile {
    pub funcs: Vec<FuncDecl>,
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic() || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

fn syntax(line: usize, message: impl Into<String>) -> SourceError {
    SourceError::Syntax {
        line,
        message: message.into(),
    }
}

/// Scan `src` and collect its top-level function declarations.
pub fn parse_go_file(src: &str) -> Result<GoFile, SourceError> {
    let bytes = src.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    let mut line = 1;
    let mut line_start = 0;
    let mut line_has_code = false;
    let mut brackets: Vec<(u8, usize)> = Vec::new();
    let mut comments: Vec<Comment> = Vec::new();
    let mut file = GoFile::default();

    while i < len {
        let b = bytes[i];
        match b {
            b'\n' => {
                i += 1;
                line += 1;
                line_start = i;
                line_has_code = false;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = src[i..].find('\n').map_or(len, |n| i + n);
                let end = if end > i && bytes[end - 1] == b'\r' {
                    end - 1
                } else {
                    end
                };
                if brackets.is_empty() {
                    comments.push(Comment {
                        start: i,
                        end,
                        line,
                        end_line: line,
                        own_line: !line_has_code,
                        text: src[i..end].to_string(),
                    });
                }
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let Some(close) = src[i + 2..].find("*/") else {
                    return Err(syntax(line, "unterminated block comment"));
                };
                let end = i + 2 + close + 2;
                let newlines = src[i..end].matches('\n').count();
                if brackets.is_empty() {
                    comments.push(Comment {
                        start: i,
                        end,
                        line,
                        end_line: line + newlines,
                        own_line: !line_has_code,
                        text: src[i..end].to_string(),
                    });
                }
                if newlines > 0 {
                    line += newlines;
                    line_start = src[..end].rfind('\n').map_or(0, |n| n + 1);
                }
                i = end;
            }
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i, line)?;
                line_has_code = true;
            }
            b'`' => {
                let Some(close) = src[i + 1..].find('`') else {
                    return Err(syntax(line, "unterminated raw string"));
                };
                let end = i + 1 + close + 1;
                let newlines = src[i..end].matches('\n').count();
                if newlines > 0 {
                    line += newlines;
                    line_start = src[..end].rfind('\n').map_or(0, |n| n + 1);
                }
                i = end;
                line_has_code = true;
            }
            b'(' | b'[' | b'{' => {
                brackets.push((b, line));
                i += 1;
                line_has_code = true;
            }
            b')' | b']' | b'}' => {
                let expected = match b {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(syntax(line, format!("unexpected `{}`", b as char)));
                    }
                }
                i += 1;
                line_has_code = true;
            }
            _ if is_ident_start(b) => {
                let start = i;
                while i < len && is_ident_char(bytes[i]) {
                    i += 1;
                }
                if &src[start..i] == "func" && brackets.is_empty() && !line_has_code {
                    if let Some((receiver, name)) = parse_func_header(src, i) {
                        let doc = doc_group(&comments, line);
                        file.funcs.push(FuncDecl {
                            name,
                            receiver,
                            line,
                            line_start,
                            doc,
                        });
                    }
                }
                line_has_code = true;
            }
            _ => {
                i += 1;
                line_has_code = true;
            }
        }
    }

    if let Some((open, open_line)) = brackets.last() {
        return Err(syntax(*open_line, format!("unclosed `{}`", *open as char)));
    }
    Ok(file)
}

/// Skip an interpreted string or rune literal starting at `start`.
fn skip_quoted(bytes: &[u8], start: usize, line: usize) -> Result<usize, SourceError> {
    let quote = bytes[start];
    let mut j = start + 1;
    loop {
        match bytes.get(j) {
            None | Some(b'\n') => {
                let what = if quote == b'"' { "string" } else { "rune" };
                return Err(syntax(line, format!("unterminated {what} literal")));
            }
            Some(b'\\') => j += 2,
            Some(&c) if c == quote => return Ok(j + 1),
            Some(_) => j += 1,
        }
    }
}

fn skip_blanks(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }
    i
}

/// Parse `(recv) Name` or `Name` following the `func` keyword at `i`.
fn parse_func_header(src: &str, i: usize) -> Option<(Option<Receiver>, String)> {
    let bytes = src.as_bytes();
    let mut i = skip_blanks(bytes, i);
    let receiver = if bytes.get(i) == Some(&b'(') {
        let mut depth = 0usize;
        let open = i;
        loop {
            match bytes.get(i)? {
                b'(' | b'[' => depth += 1,
                b')' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                b'\n' => return None,
                _ => {}
            }
            i += 1;
        }
        let receiver = parse_receiver(&src[open + 1..i]);
        i = skip_blanks(bytes, i + 1);
        Some(receiver)
    } else {
        None
    };
    let start = i;
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    if start == i {
        return None;
    }
    Some((receiver, src[start..i].to_string()))
}

fn parse_receiver(text: &str) -> Receiver {
    let text = text.trim();
    if text.is_empty() {
        return Receiver {
            count: 0,
            pointer: false,
            type_name: None,
        };
    }
    let top_level_commas = {
        let mut depth = 0i32;
        text.bytes()
            .filter(|b| {
                match b {
                    b'[' | b'(' => depth += 1,
                    b']' | b')' => depth -= 1,
                    _ => {}
                }
                *b == b',' && depth == 0
            })
            .count()
    };
    let type_text = if text.starts_with('*') {
        text
    } else {
        match text.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => text,
        }
    };
    let pointer = type_text.starts_with('*');
    let base = type_text.trim_start_matches('*').trim();
    let plain = !base.is_empty() && base.bytes().all(is_ident_char);
    Receiver {
        count: top_level_commas + 1,
        pointer,
        type_name: plain.then(|| base.to_string()),
    }
}

/// The comment group ending on the line right above `decl_line`.
fn doc_group(comments: &[Comment], decl_line: usize) -> Option<CommentGroup> {
    let mut group: Vec<Comment> = Vec::new();
    let mut next_line = decl_line;
    for comment in comments.iter().rev() {
        if comment.end_line + 1 != next_line || !comment.own_line {
            break;
        }
        next_line = comment.line;
        group.push(comment.clone());
    }
    if group.is_empty() {
        return None;
    }
    group.reverse();
    Some(CommentGroup { comments: group })
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Recognizes documentable service methods.
#[derive(Debug, Clone)]
pub struct ServiceRules {
    pub type_suffix: String,
    pub excluded_types: Vec<String>,
    pub excluded_files: Vec<String>,
}

impl From<&AnnotateConfig> for ServiceRules {
    fn from(config: &AnnotateConfig) -> Self {
        Self {
            type_suffix: config.type_suffix.clone(),
            excluded_types: config.excluded_types.clone(),
            excluded_files: config.excluded_files.clone(),
        }
    }
}

impl Default for ServiceRules {
    fn default() -> Self {
        Self::from(&AnnotateConfig::default())
    }
}

impl ServiceRules {
    /// Whether a file should be scanned at all.
    pub fn includes_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.ends_with(".go")
            && !name.ends_with("_test.go")
            && !self.excluded_files.iter().any(|f| f == name)
    }

    /// `Receiver.Method` for a documentable method, `None` otherwise.
    pub fn service_method(&self, decl: &FuncDecl) -> Option<String> {
        let receiver = decl.receiver.as_ref()?;
        if receiver.count != 1 || !receiver.pointer {
            return None;
        }
        let type_name = receiver.type_name.as_deref()?;
        if !is_exported(type_name)
            || !is_exported(&decl.name)
            || !type_name.ends_with(&self.type_suffix)
            || self.excluded_types.iter().any(|t| t == type_name)
        {
            return None;
        }
        Some(format!("{type_name}.{}", decl.name))
    }
}

/// Go files under `dir` that the rules include, sorted by path.
pub fn go_files(dir: &Path, rules: &ServiceRules) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SourceError::Walk {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() && rules.includes_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Every service method declared under `dir`.
pub fn service_methods_in_dir(
    dir: &Path,
    rules: &ServiceRules,
) -> Result<Vec<String>, SourceError> {
    let mut methods = Vec::new();
    for path in go_files(dir, rules)? {
        let src = std::fs::read_to_string(&path).map_err(|source| SourceError::Read {
            path: path.clone(),
            source,
        })?;
        let file = parse_go_file(&src)?;
        methods.extend(file.funcs.iter().filter_map(|f| rules.service_method(f)));
    }
    methods.sort();
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"package github

import "fmt"

// RepositoriesService handles repos.
type RepositoriesService service

// Get fetches a repository.
//
// GitHub API docs: https://docs.github.com/rest/repos/repos#get-a-repository
//
//meta:operation GET /repos/{owner}/{repo}
func (s *RepositoriesService) Get(ctx context.Context, owner, repo string) (*Repository, error) {
	u := fmt.Sprintf("repos/%v/%v", owner, repo) // not a doc comment
	s2 := "// also not a comment {"
	_ = '}'
	return nil, nil
}

/* block doc */
func (s RepositoriesService) ByValue() {}

func (s *RepositoriesService) unexported() {}

// Loose comment.

func (s *Generic[T]) Generic() {}

var handler = func() {}

func Standalone() {
	x := `raw
// still raw {`
	_ = x
}
"#;

    #[test]
    fn collects_top_level_funcs() {
        let file = parse_go_file(SRC).unwrap();
        let names: Vec<_> = file.funcs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Get", "ByValue", "unexported", "Generic", "Standalone"]
        );
    }

    #[test]
    fn attaches_doc_groups() {
        let file = parse_go_file(SRC).unwrap();
        let get = &file.funcs[0];
        let doc = get.doc.as_ref().unwrap();
        assert_eq!(
            doc.lines(),
            vec![
                "// Get fetches a repository.",
                "//",
                "// GitHub API docs: https://docs.github.com/rest/repos/repos#get-a-repository",
                "//",
                "//meta:operation GET /repos/{owner}/{repo}",
            ]
        );
        assert_eq!(&SRC[doc.start()..doc.start() + 6], "// Get");
        assert_eq!(file.funcs[1].doc.as_ref().unwrap().lines(), vec!["/* block doc */"]);
        assert!(file.funcs[2].doc.is_none());
        assert!(file.funcs[3].doc.is_none(), "blank line breaks the group");
    }

    #[test]
    fn parses_receivers() {
        let file = parse_go_file(SRC).unwrap();
        let get = file.funcs[0].receiver.as_ref().unwrap();
        assert_eq!(get.count, 1);
        assert!(get.pointer);
        assert_eq!(get.type_name.as_deref(), Some("RepositoriesService"));
        assert!(!file.funcs[1].receiver.as_ref().unwrap().pointer);
        assert_eq!(file.funcs[3].receiver.as_ref().unwrap().type_name, None);
        assert!(file.funcs[4].receiver.is_none());
    }

    #[test]
    fn recognizes_service_methods() {
        let rules = ServiceRules::default();
        let file = parse_go_file(SRC).unwrap();
        let methods: Vec<_> = file
            .funcs
            .iter()
            .filter_map(|f| rules.service_method(f))
            .collect();
        assert_eq!(methods, vec!["RepositoriesService.Get"]);
    }

    #[test]
    fn excluded_type_is_skipped() {
        let rules = ServiceRules::default();
        let file = parse_go_file("package x\n\nfunc (s *Service) Do() {}\n").unwrap();
        assert_eq!(rules.service_method(&file.funcs[0]), None);
    }

    #[test]
    fn reports_syntax_errors() {
        let err = parse_go_file("package x\n\nfunc A() {\n\ts := \"open\n}\n").unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 4, .. }));
        let err = parse_go_file("package x\n\nfunc A() {\n").unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 3, .. }));
        assert!(parse_go_file("package x\n/* open").is_err());
        assert!(parse_go_file("package x\nfunc A() )").is_err());
    }

    #[test]
    fn includes_only_plain_go_files() {
        let rules = ServiceRules::default();
        assert!(rules.includes_file(Path::new("github/repos.go")));
        assert!(!rules.includes_file(Path::new("github/repos_test.go")));
        assert!(!rules.includes_file(Path::new("github/github-accessors.go")));
        assert!(!rules.includes_file(Path::new("github/README.md")));
    }
}
