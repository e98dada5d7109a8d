//! `dagship deploy`.

use anyhow::{Context as _, Result};
use clap::Args;
use dagship_config::{ProjectConfig, load_project_config};
use dagship_deployer::options::ALL_TESTS;
use dagship_deployer::{DeployMode, DeployOptions, DeployReport, Deployer};
use dagship_executor::DockerEngine;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{authenticated_context, load_global_config, platform_for};

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Deployment to deploy to. Prompts when not given
    #[arg(long, env = "DAGSHIP_DEPLOYMENT_ID")]
    pub deployment_id: Option<String>,

    /// Workspace of the deployment. Defaults to the context's workspace
    #[arg(long, env = "DAGSHIP_WORKSPACE_ID")]
    pub workspace_id: Option<String>,

    /// Check the DAGs import cleanly before deploying
    #[arg(long)]
    pub parse: bool,

    /// Run pytest before deploying: one file, or the whole test directory
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = ALL_TESTS)]
    pub pytest: Option<String>,

    /// Deploy an existing local image instead of building one
    #[arg(long)]
    pub image_name: Option<String>,

    /// Runtime version to build for, overriding detection
    #[arg(long)]
    pub runtime_version: Option<String>,

    /// Always pick the deployment interactively
    #[arg(long)]
    pub prompt: bool,

    /// Env file for the pre-deploy checks, relative to the project
    #[arg(long = "env", value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    pub fn mode(&self) -> DeployMode {
        DeployMode::from_flags(self.parse, self.pytest.as_deref())
    }

    /// Merge the flags over the project's defaults.
    pub fn build_options(&self, project: ProjectConfig) -> DeployOptions {
        let mut options = DeployOptions::new(&self.path);
        options.workspace_id = self.workspace_id.clone().unwrap_or_default();
        options.deployment_id = self.deployment_id.clone().or(project.deployment);
        options.mode = self.mode();
        options.prompt = self.prompt;
        options.env_file = self
            .env_file
            .clone()
            .or_else(|| project.env_file.map(PathBuf::from));
        if let Some(dockerfile) = project.dockerfile {
            options.dockerfile = dockerfile;
        }
        options.image_name = self.image_name.clone();
        options.runtime_version = self.runtime_version.clone();
        options
    }
}

pub async fn run(args: DeployArgs) -> Result<()> {
    let config = load_global_config()?;
    let context = authenticated_context(&config)?;

    let project = load_project_config(&args.path)
        .with_context(|| format!("failed to load project config in {}", args.path.display()))?;
    let options = args.build_options(project);
    debug!(?options, "Deploy options");

    let platform = platform_for(context)?;
    let engine = DockerEngine::new()?;
    let mut deployer = Deployer::new(platform, Arc::new(engine));

    let report = deployer.deploy(Some(context), options).await?;

    let mut stdout = std::io::stdout().lock();
    write_report(&mut stdout, &report, args.json)?;
    Ok(())
}

fn write_report(out: &mut dyn Write, report: &DeployReport, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }

    writeln!(out, "Successfully pushed image {}:{}", report.repository, report.tag)?;
    writeln!(
        out,
        "Deployed {} ({}) on runtime {}",
        report.release_name, report.deployment_id, report.runtime_version
    )?;
    writeln!(out, "Deployment can be accessed at the following URLs:")?;
    writeln!(out, " Deployment Dashboard: {}", report.dashboard_url)?;
    if !report.airflow_url.is_empty() {
        writeln!(out, " Airflow Dashboard: {}", report.airflow_url)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: DeployArgs,
    }

    fn parse(argv: &[&str]) -> DeployArgs {
        let mut full = vec!["deploy"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args
    }

    fn report() -> DeployReport {
        DeployReport {
            deployment_id: "dep-1".to_string(),
            release_name: "quasar-1234".to_string(),
            runtime_version: "4.2.6".to_string(),
            repository: "images.cloud.example.io/org-1/quasar-1234".to_string(),
            tag: "deploy-2026-03-01T14-05".to_string(),
            image_id: "img-1".to_string(),
            dashboard_url: "https://cloud.cloud.example.io/ws-1/deployments/dep-1".to_string(),
            airflow_url: String::new(),
        }
    }

    #[test]
    fn test_flags_override_project_config() {
        let args = parse(&["./etl", "--deployment-id", "dep-9", "--env", "ci.env"]);
        let project = ProjectConfig {
            deployment: Some("dep-1".to_string()),
            dockerfile: Some("Dockerfile.prod".to_string()),
            env_file: Some(".env".to_string()),
        };

        let options = args.build_options(project);
        assert_eq!(options.path, PathBuf::from("./etl"));
        assert_eq!(options.deployment_id.as_deref(), Some("dep-9"));
        assert_eq!(options.env_file, Some(PathBuf::from("ci.env")));
        assert_eq!(options.dockerfile, "Dockerfile.prod");
        assert_eq!(options.mode, DeployMode::None);
    }

    #[test]
    fn test_project_config_fills_gaps() {
        let args = parse(&["--pytest"]);
        let project = ProjectConfig {
            deployment: Some("dep-1".to_string()),
            dockerfile: None,
            env_file: Some(".env".to_string()),
        };

        let options = args.build_options(project);
        assert_eq!(options.path, PathBuf::from("."));
        assert_eq!(options.deployment_id.as_deref(), Some("dep-1"));
        assert_eq!(options.env_file, Some(PathBuf::from(".env")));
        assert_eq!(options.dockerfile, "Dockerfile");
        assert_eq!(options.mode, DeployMode::Pytest { file: None });
        assert!(options.workspace_id.is_empty());
    }

    #[test]
    fn test_write_report_text() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("images.cloud.example.io/org-1/quasar-1234:deploy-2026-03-01T14-05"));
        assert!(text.contains("Deployment Dashboard: https://cloud.cloud.example.io/ws-1/deployments/dep-1"));
        assert!(!text.contains("Airflow Dashboard"));
    }

    #[test]
    fn test_write_report_json() {
        let mut out = Vec::new();
        write_report(&mut out, &report(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["deploymentId"], "dep-1");
        assert_eq!(value["runtimeVersion"], "4.2.6");
    }
}
