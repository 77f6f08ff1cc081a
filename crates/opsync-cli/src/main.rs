use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use log::info;
use secrecy::SecretString;

use opsync_core::annotate::Annotator;
use opsync_core::config::{self, CONFIG_FILE_NAME, OpsyncConfig};
use opsync_core::error::ConfigError;
use opsync_core::fetch::{ContentStore, GitHubContents};
use opsync_core::gosrc::{self, ServiceRules};
use opsync_core::metadata::Metadata;
use opsync_core::plan::PlanMatcher;
use opsync_core::validate;

#[derive(Parser)]
#[command(
    name = "opsync",
    about = "Keep Go client methods in sync with the GitHub OpenAPI descriptions",
    version
)]
struct Cli {
    /// Directory the other paths are relative to
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    /// Metadata document (overrides `metadata_file` from the config)
    #[arg(long, global = true)]
    filename: Option<PathBuf>,

    /// Go source directory (overrides `source_dir` from the config)
    #[arg(long, global = true)]
    github_dir: Option<PathBuf>,

    /// Config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh openapi_operations from the description repository
    UpdateOpenapi {
        /// Git ref to fetch descriptions at
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
    },

    /// Rewrite the metadata document in canonical order
    Format,

    /// Check the metadata document against the Go sources
    Validate {
        /// Also check openapi_operations against the recorded commit
        #[arg(long)]
        github: bool,
    },

    /// List operations no method references
    Unused {
        /// Print JSON instead of one line per operation
        #[arg(long)]
        json: bool,
    },

    /// Rewrite doc comments on service methods
    UpdateGo,

    /// Replace operation references with their canonical names
    Canonize,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Resolved locations and configuration for one invocation.
struct Workspace {
    config: OpsyncConfig,
    metadata_path: PathBuf,
    source_dir: PathBuf,
}

impl Workspace {
    fn load(cli: &Cli) -> Result<Self> {
        let root = cli.working_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
        let config = config::load_config(&config_path)?.unwrap_or_default();
        config.validate()?;

        let metadata_path = root.join(
            cli.filename
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.metadata_file)),
        );
        let source_dir = root.join(
            cli.github_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.source_dir)),
        );
        Ok(Self {
            config,
            metadata_path,
            source_dir,
        })
    }

    fn metadata(&self) -> Result<Metadata> {
        Metadata::load(&self.metadata_path)
            .with_context(|| format!("failed to load {}", self.metadata_path.display()))
    }

    fn save(&self, metadata: &Metadata) -> Result<()> {
        if metadata
            .save(&self.metadata_path)
            .with_context(|| format!("failed to write {}", self.metadata_path.display()))?
        {
            info!("wrote {}", self.metadata_path.display());
        }
        Ok(())
    }

    fn matcher(&self) -> Result<PlanMatcher> {
        Ok(PlanMatcher::new(&self.config.plans)?)
    }

    fn store(&self) -> Result<Arc<dyn ContentStore>> {
        let env = &self.config.remote.token_env;
        let token = std::env::var(env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingToken(env.clone()))?;
        let store = GitHubContents::new(&self.config.remote, &SecretString::from(token))?;
        Ok(Arc::new(store))
    }

    fn rules(&self) -> ServiceRules {
        ServiceRules::from(&self.config.annotate)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        clap_complete::generate(shell, &mut cmd, "opsync", &mut std::io::stdout());
        return Ok(());
    }

    let ws = Workspace::load(&cli)?;
    match cli.command {
        Commands::UpdateOpenapi { git_ref } => cmd_update_openapi(&ws, &git_ref).await,
        Commands::Format => cmd_format(&ws),
        Commands::Validate { github } => cmd_validate(&ws, github).await,
        Commands::Unused { json } => cmd_unused(&ws, json),
        Commands::UpdateGo => cmd_update_go(&ws),
        Commands::Canonize => cmd_canonize(&ws),
        Commands::Completions { .. } => Ok(()),
    }
}

async fn cmd_update_openapi(ws: &Workspace, git_ref: &str) -> Result<()> {
    let mut metadata = ws.metadata()?;
    let matcher = ws.matcher()?;
    metadata
        .update_from_remote(
            ws.store()?,
            &matcher,
            &ws.config.remote.descriptions_dir,
            git_ref,
        )
        .await?;
    ws.save(&metadata)
}

fn cmd_format(ws: &Workspace) -> Result<()> {
    let mut metadata = ws.metadata()?;
    metadata.normalize();
    ws.save(&metadata)
}

async fn cmd_validate(ws: &Workspace, github: bool) -> Result<()> {
    let metadata = ws.metadata()?;
    let methods = gosrc::service_methods_in_dir(&ws.source_dir, &ws.rules())
        .with_context(|| format!("failed to scan {}", ws.source_dir.display()))?;
    let mut issues = validate::validate(&metadata, &methods);

    if github {
        let matcher = ws.matcher()?;
        issues.extend(
            validate::validate_remote(
                &metadata,
                ws.store()?,
                &matcher,
                &ws.config.remote.descriptions_dir,
            )
            .await?,
        );
    }

    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        eprintln!("{issue}");
    }
    anyhow::bail!(
        "found {} issue(s) in {}",
        issues.len(),
        ws.metadata_path.display()
    )
}

fn cmd_unused(ws: &Workspace, json: bool) -> Result<()> {
    let metadata = ws.metadata()?;
    let matcher = ws.matcher()?;
    let unused = metadata.unused_operations();

    if json {
        let entries: Vec<serde_json::Value> = unused
            .iter()
            .map(|op| {
                serde_json::json!({
                    "name": op.name,
                    "documentation_url": op.documentation_url,
                    "availability": matcher.availability(&op.openapi_files),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for op in &unused {
        let availability: Vec<&str> = matcher
            .availability(&op.openapi_files)
            .iter()
            .map(|a| a.as_str())
            .collect();
        match &op.documentation_url {
            Some(url) => println!("{} [{}] {url}", op.name, availability.join(", ")),
            None => println!("{} [{}]", op.name, availability.join(", ")),
        }
    }
    Ok(())
}

fn cmd_update_go(ws: &Workspace) -> Result<()> {
    let metadata = ws.metadata()?;
    let annotator = Annotator::new(&metadata, &ws.config.annotate);
    let summary = annotator.annotate_dir(&ws.source_dir)?;
    info!(
        "updated {} of {} file(s) in {}",
        summary.files_updated,
        summary.files_scanned,
        ws.source_dir.display()
    );
    Ok(())
}

fn cmd_canonize(ws: &Workspace) -> Result<()> {
    let mut metadata = ws.metadata()?;
    metadata.canonicalize_op_names()?;
    ws.save(&metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("opsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn paths_default_to_config_values() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let ws = Workspace::load(&parse(&["--working-dir", root, "format"])).unwrap();
        assert_eq!(ws.metadata_path, dir.path().join("metadata.yaml"));
        assert_eq!(ws.source_dir, dir.path().join("github"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "metadata_file: ops.yaml\nsource_dir: src\n",
        )
        .unwrap();
        let root = dir.path().to_str().unwrap();

        let ws = Workspace::load(&parse(&["--working-dir", root, "format"])).unwrap();
        assert_eq!(ws.metadata_path, dir.path().join("ops.yaml"));
        assert_eq!(ws.source_dir, dir.path().join("src"));

        let ws = Workspace::load(&parse(&[
            "--working-dir",
            root,
            "--filename",
            "other.yaml",
            "--github-dir",
            "go",
            "format",
        ]))
        .unwrap();
        assert_eq!(ws.metadata_path, dir.path().join("other.yaml"));
        assert_eq!(ws.source_dir, dir.path().join("go"));
    }

    #[test]
    fn missing_token_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "remote:\n  token_env: OPSYNC_TEST_TOKEN_THAT_IS_NEVER_SET\n",
        )
        .unwrap();
        let root = dir.path().to_str().unwrap();
        let ws = Workspace::load(&parse(&["--working-dir", root, "update-openapi"])).unwrap();
        let err = ws.store().err().unwrap();
        assert!(err.to_string().contains("OPSYNC_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn update_openapi_defaults_to_main() {
        match parse(&["update-openapi"]).command {
            Commands::UpdateOpenapi { git_ref } => assert_eq!(git_ref, "main"),
            _ => panic!("expected update-openapi"),
        }
    }
}
