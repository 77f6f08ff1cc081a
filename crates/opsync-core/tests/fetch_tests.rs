use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use secrecy::SecretString;

use opsync_core::config::{PlanConfig, RemoteConfig};
use opsync_core::error::FetchError;
use opsync_core::fetch::{ContentStore, GitHubContents, fetch_descriptions};
use opsync_core::metadata::Metadata;
use opsync_core::plan::PlanMatcher;

const PUBLIC: &str = include_str!("fixtures/api.github.com.json");
const SERVER: &str = include_str!("fixtures/ghes-3.10.json");
const METADATA: &str = include_str!("fixtures/metadata.yaml");

const TOKEN: &str = "test-token";
const COMMIT: &str = "0123abc";

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {TOKEN}");
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str())
}

async fn contents(
    Path((owner, repo, path)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if owner != "github" || repo != "rest-api-description" || !query.contains_key("ref") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let raw = headers
        .get(header::ACCEPT)
        .is_some_and(|v| v == "application/vnd.github.raw+json");
    match (path.as_str(), raw) {
        ("descriptions", false) => axum::Json(serde_json::json!([
            { "name": "api.github.com", "type": "dir" },
            { "name": "ghes-2.22", "type": "dir" },
            { "name": "ghes-3.10", "type": "dir" },
            { "name": "README.md", "type": "file" },
        ]))
        .into_response(),
        ("descriptions/api.github.com/api.github.com.json", true) => PUBLIC.into_response(),
        ("descriptions/ghes-3.10/ghes-3.10.json", true) => SERVER.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn commit(Path((_, _, git_ref)): Path<(String, String, String)>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if git_ref != "main" {
        return StatusCode::NOT_FOUND.into_response();
    }
    axum::Json(serde_json::json!({ "sha": COMMIT })).into_response()
}

/// Serve a minimal contents API on a loopback port and return its base URL.
async fn serve() -> String {
    let app = Router::new()
        .route("/repos/{owner}/{repo}/contents/{*path}", get(contents))
        .route("/repos/{owner}/{repo}/commits/{git_ref}", get(commit));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn store(base: &str, token: &str) -> Arc<dyn ContentStore> {
    let remote = RemoteConfig {
        api_url: format!("{base}/"),
        ..RemoteConfig::default()
    };
    Arc::new(GitHubContents::new(&remote, &SecretString::from(token.to_string())).unwrap())
}

fn matcher() -> PlanMatcher {
    PlanMatcher::new(&PlanConfig::default()).unwrap()
}

#[tokio::test]
async fn fetches_selected_plans_in_order() {
    let base = serve().await;
    let files = fetch_descriptions(store(&base, TOKEN), &matcher(), "descriptions", "main")
        .await
        .unwrap();

    let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "descriptions/api.github.com/api.github.com.json",
            "descriptions/ghes-3.10/ghes-3.10.json",
        ]
    );
    assert_eq!(files[0].spec.operations().len(), 3);
    assert_eq!(files[1].plan.major, 3);
    assert_eq!(files[1].plan.minor, 10);
}

#[tokio::test]
async fn resolves_commit_sha() {
    let base = serve().await;
    let sha = store(&base, TOKEN).commit_sha("main").await.unwrap();
    assert_eq!(sha, COMMIT);
}

#[tokio::test]
async fn rejected_token_is_an_unexpected_status() {
    let base = serve().await;
    let err = fetch_descriptions(store(&base, "wrong"), &matcher(), "descriptions", "main")
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::UnexpectedStatus { status: 401, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn update_from_remote_reproduces_recorded_snapshot() {
    let base = serve().await;
    let expected = Metadata::from_yaml(METADATA).unwrap();

    let mut meta = Metadata::from_yaml(METADATA).unwrap();
    meta.openapi_ops.clear();
    meta.git_commit.clear();
    let report = meta
        .update_from_remote(store(&base, TOKEN), &matcher(), "descriptions", "main")
        .await
        .unwrap();

    assert!(report.stale.is_empty());
    assert_eq!(meta.git_commit, COMMIT);
    let names: Vec<&str> = meta.openapi_ops.iter().map(|op| op.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "GET /enterprise/settings/license",
            "DELETE /repos/{owner}/{repo}",
            "GET /repos/{owner}/{repo}",
            "GET /repos/{owner}/{repo}/hooks",
        ]
    );
    let get = meta
        .openapi_ops
        .iter()
        .find(|op| op.name == "GET /repos/{owner}/{repo}")
        .unwrap();
    assert_eq!(get, expected.operation("GET /repos/{owner}/{repo}").as_ref().unwrap());
}
