use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration loaded from `.opsync.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpsyncConfig {
    /// Metadata document, relative to the working directory.
    pub metadata_file: String,
    /// Directory holding the library's Go sources.
    pub source_dir: String,
    pub remote: RemoteConfig,
    pub plans: PlanConfig,
    pub annotate: AnnotateConfig,
}

impl Default for OpsyncConfig {
    fn default() -> Self {
        Self {
            metadata_file: "metadata.yaml".to_string(),
            source_dir: "github".to_string(),
            remote: RemoteConfig::default(),
            plans: PlanConfig::default(),
            annotate: AnnotateConfig::default(),
        }
    }
}

/// Where OpenAPI descriptions are downloaded from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub descriptions_dir: String,
    /// Environment variable holding the access token.
    pub token_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: "github".to_string(),
            repo: "rest-api-description".to_string(),
            descriptions_dir: "descriptions".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

/// Which description directories count as plans, and in what order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Ordered regexes with a `plan` group and optional `major`/`minor` groups.
    pub patterns: Vec<String>,
    /// Enterprise-server releases below this major version are ignored.
    pub min_server_major: u32,
    /// Plan name identifying enterprise-server descriptions.
    pub server_plan: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                r"^(?P<plan>api\.github\.com)(-(?P<major>\d+)\.(?P<minor>\d+))?$".to_string(),
                r"^(?P<plan>ghec)(-(?P<major>\d+)\.(?P<minor>\d+))?$".to_string(),
                r"^(?P<plan>ghes)(-(?P<major>\d+)\.(?P<minor>\d+))?$".to_string(),
            ],
            min_server_major: 3,
            server_plan: "ghes".to_string(),
        }
    }
}

/// How service methods are recognized and annotated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// Receiver type names must end with this suffix.
    pub type_suffix: String,
    pub excluded_types: Vec<String>,
    /// File names (not paths) that are never scanned.
    pub excluded_files: Vec<String>,
    /// Append `//meta:operation` lines after the doc links.
    pub emit_operation_tags: bool,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            type_suffix: "Service".to_string(),
            excluded_types: vec!["Service".to_string()],
            excluded_files: vec!["github-accessors.go".to_string()],
            emit_operation_tags: true,
        }
    }
}

impl OpsyncConfig {
    /// Check the parts of the config that can't be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plans.patterns.is_empty() {
            return Err(ConfigError::Invalid(
                "plans.patterns must not be empty".to_string(),
            ));
        }
        for pattern in &self.plans.patterns {
            let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            if !re.capture_names().flatten().any(|name| name == "plan") {
                return Err(ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: "missing a `plan` capture group".to_string(),
                });
            }
        }
        if self.annotate.type_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "annotate.type_suffix must not be empty".to_string(),
            ));
        }
        if self.remote.token_env.is_empty() {
            return Err(ConfigError::Invalid(
                "remote.token_env must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".opsync.yaml";

/// Load config from a YAML file. Returns `None` if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Option<OpsyncConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: OpsyncConfig =
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(config))
}
