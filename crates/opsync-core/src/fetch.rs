//! Downloading OpenAPI descriptions from a content store.
//!
//! The store is a trait so the fan-out logic can be exercised without a
//! network; [`GitHubContents`] is the real implementation backed by reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::config::RemoteConfig;
use crate::error::FetchError;
use crate::parse;
use crate::parse::spec::OpenApiSpec;
use crate::plan::{Plan, PlanMatcher};

/// An entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Read access to a versioned file tree.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// List the entries of `path` at `git_ref`.
    async fn list_dir(&self, path: &str, git_ref: &str) -> Result<Vec<DirEntry>, FetchError>;

    /// Raw content of the file at `path` at `git_ref`.
    async fn download(&self, path: &str, git_ref: &str) -> Result<Vec<u8>, FetchError>;

    /// Resolve `git_ref` to a commit SHA.
    async fn commit_sha(&self, git_ref: &str) -> Result<String, FetchError>;
}

/// A parsed description together with the plan it belongs to.
#[derive(Debug, Clone)]
pub struct DescriptionFile {
    pub plan: Plan,
    /// Path inside the store, recorded in each operation's file list.
    pub filename: String,
    pub spec: OpenApiSpec,
}

/// List, filter, sort, download and parse all plan descriptions at `git_ref`.
///
/// Downloads run concurrently, one task per matched file. The first failure
/// aborts the remaining downloads and is returned as is. The result is in
/// plan order regardless of completion order.
pub async fn fetch_descriptions(
    store: Arc<dyn ContentStore>,
    matcher: &PlanMatcher,
    descriptions_dir: &str,
    git_ref: &str,
) -> Result<Vec<DescriptionFile>, FetchError> {
    let listing = store.list_dir(descriptions_dir, git_ref).await?;
    let dirs: Vec<String> = listing
        .into_iter()
        .filter(|e| e.kind.is_empty() || e.kind == "dir")
        .map(|e| e.name)
        .collect();
    let plans = matcher.select(&dirs);
    debug!("{} of {} description directories selected", plans.len(), dirs.len());

    let mut join_set: JoinSet<Result<(usize, Vec<u8>), FetchError>> = JoinSet::new();
    for (index, plan) in plans.iter().enumerate() {
        let store = Arc::clone(&store);
        let filename = plan.file_path(descriptions_dir);
        let git_ref = git_ref.to_string();
        join_set.spawn(async move {
            debug!("downloading {filename}@{git_ref}");
            let bytes = store.download(&filename, &git_ref).await?;
            Ok((index, bytes))
        });
    }

    let mut downloaded: Vec<Option<Vec<u8>>> = vec![None; plans.len()];
    while let Some(joined) = join_set.join_next().await {
        let result = joined.map_err(|e| FetchError::Join(e.to_string()));
        match result.and_then(|r| r) {
            Ok((index, bytes)) => downloaded[index] = Some(bytes),
            Err(err) => {
                join_set.abort_all();
                return Err(err);
            }
        }
    }

    plans
        .into_iter()
        .zip(downloaded)
        .map(|(plan, bytes)| {
            let filename = plan.file_path(descriptions_dir);
            let bytes = bytes.unwrap_or_default();
            let spec = parse::from_bytes(&filename, &bytes).map_err(|source| {
                FetchError::Description {
                    file: filename.clone(),
                    source,
                }
            })?;
            Ok(DescriptionFile {
                plan,
                filename,
                spec,
            })
        })
        .collect()
}

/// [`ContentStore`] over the GitHub REST contents API.
#[derive(Debug, Clone)]
pub struct GitHubContents {
    client: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

impl GitHubContents {
    pub fn new(remote: &RemoteConfig, token: &SecretString) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", token.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|_| FetchError::Transport("token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, HeaderValue::from_static("opsync"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: remote.api_url.trim_end_matches('/').to_string(),
            owner: remote.owner.clone(),
            repo: remote.repo.clone(),
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url, self.owner, self.repo, tail
        )
    }

    async fn get(
        &self,
        url: &str,
        accept: &'static str,
        git_ref: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        let resp = request.send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ContentStore for GitHubContents {
    async fn list_dir(&self, path: &str, git_ref: &str) -> Result<Vec<DirEntry>, FetchError> {
        let url = self.repo_url(&format!("contents/{path}"));
        let resp = self
            .get(&url, "application/vnd.github+json", Some(git_ref))
            .await?;
        resp.json::<Vec<DirEntry>>()
            .await
            .map_err(|e| FetchError::Decode {
                url,
                reason: e.to_string(),
            })
    }

    async fn download(&self, path: &str, git_ref: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.repo_url(&format!("contents/{path}"));
        let resp = self
            .get(&url, "application/vnd.github.raw+json", Some(git_ref))
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn commit_sha(&self, git_ref: &str) -> Result<String, FetchError> {
        let url = self.repo_url(&format!("commits/{git_ref}"));
        let resp = self.get(&url, "application/vnd.github+json", None).await?;
        let commit = resp
            .json::<CommitResponse>()
            .await
            .map_err(|e| FetchError::Decode {
                url,
                reason: e.to_string(),
            })?;
        Ok(commit.sha)
    }
}
