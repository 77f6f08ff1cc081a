use opsync_core::error::ParseError;
use opsync_core::parse;

const PUBLIC: &str = include_str!("fixtures/api.github.com.json");
const SERVER: &str = include_str!("fixtures/ghes-3.10.json");

#[test]
fn parse_public_description() {
    let spec = parse::from_json(PUBLIC).expect("should parse api.github.com.json");
    assert_eq!(spec.openapi, "3.0.3");
    assert_eq!(spec.info.title, "GitHub v3 REST API");
    assert_eq!(spec.paths.len(), 2);

    let ops = spec.operations();
    let names: Vec<String> = ops.iter().map(|o| format!("{} {}", o.verb, o.path)).collect();
    assert_eq!(
        names,
        vec![
            "GET /repos/{owner}/{repo}",
            "DELETE /repos/{owner}/{repo}",
            "GET /repos/{owner}/{repo}/hooks",
        ]
    );
    assert_eq!(
        ops[0].documentation_url.as_deref(),
        Some("https://docs.github.com/rest/repos/repos#get-a-repository")
    );
    assert_eq!(ops[0].summary.as_deref(), Some("Get a repository"));
    assert_eq!(ops[2].documentation_url, None);
}

#[test]
fn parse_server_description_keeps_path_literals() {
    let spec = parse::from_bytes("descriptions/ghes-3.10/ghes-3.10.json", SERVER.as_bytes())
        .expect("should parse ghes-3.10.json");
    let paths: Vec<&str> = spec.paths.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["/repos/{org}/{repo}", "/enterprise/settings/license"]);
}

#[test]
fn parse_yaml_by_extension() {
    let yaml = r#"
openapi: 3.1.0
info:
  title: Example
  version: "1"
paths:
  /orgs/{org}/hooks:
    post:
      summary: Create an organization webhook
      externalDocs:
        url: https://docs.github.com/rest/orgs/webhooks#create-an-organization-webhook
    get: {}
"#;
    let spec = parse::from_bytes("api.yaml", yaml.as_bytes()).expect("should parse yaml");
    let verbs: Vec<String> = spec.operations().into_iter().map(|o| o.verb).collect();
    assert_eq!(verbs, vec!["GET", "POST"]);
}

#[test]
fn empty_docs_url_is_absent() {
    let json = r#"{"openapi":"3.0.0","info":{"title":"t","version":"1"},
        "paths":{"/a":{"get":{"externalDocs":{"url":""}}}}}"#;
    let spec = parse::from_json(json).unwrap();
    assert_eq!(spec.operations()[0].documentation_url, None);
}

#[test]
fn reject_swagger_2() {
    let json = r#"{"openapi":"2.0","info":{"title":"t","version":"1"}}"#;
    let err = parse::from_json(json).unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedVersion(v) if v == "2.0"));
}

#[test]
fn reject_malformed_json() {
    let err = parse::from_json("{\"openapi\":").unwrap_err();
    assert!(matches!(err, ParseError::Json(_)));
}

#[test]
fn from_bytes_checks_encoding_and_version_for_both_formats() {
    let err = parse::from_bytes("api.json", b"{\"openapi\":\"3.0.0\xff\"}").unwrap_err();
    assert!(matches!(err, ParseError::Utf8(_)));

    let yaml = "openapi: 2.0.0\ninfo:\n  title: t\n  version: \"1\"\n";
    let err = parse::from_bytes("api.yml", yaml.as_bytes()).unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedVersion(v) if v == "2.0.0"));
}
