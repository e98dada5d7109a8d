//! Deploy inputs and outputs.

use dagship_core::engine::DEFAULT_DOCKERFILE;
use serde::Serialize;
use std::path::PathBuf;

/// `--pytest` value meaning "run the whole test directory".
pub const ALL_TESTS: &str = "all-tests";

/// Which pre-deploy check to run on the built image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeployMode {
    #[default]
    None,
    Parse,
    /// Run pytest on one file, or the whole test directory when `file` is
    /// `None`.
    Pytest { file: Option<String> },
}

impl DeployMode {
    /// Build the mode from CLI flags. `--pytest` wins over `--parse`.
    pub fn from_flags(parse: bool, pytest: Option<&str>) -> Self {
        match pytest {
            Some(file) => {
                let file = file.trim();
                Self::Pytest {
                    file: (!file.is_empty() && file != ALL_TESTS).then(|| file.to_string()),
                }
            }
            None if parse => Self::Parse,
            None => Self::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Parse => "parse",
            Self::Pytest { .. } => "pytest",
        }
    }
}

/// Everything one deploy needs from the command line. Built once and passed
/// by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Project directory.
    pub path: PathBuf,
    /// Target workspace. Empty means the context default.
    pub workspace_id: String,
    /// Target deployment. `None` prompts.
    pub deployment_id: Option<String>,
    pub mode: DeployMode,
    /// Always prompt for the deployment, even when one is given.
    pub prompt: bool,
    /// Env file for in-image checks, relative to the project.
    pub env_file: Option<PathBuf>,
    /// Dockerfile name, relative to the project.
    pub dockerfile: String,
    /// Existing local image to deploy instead of building.
    pub image_name: Option<String>,
    /// Runtime version to build for, overriding detection.
    pub runtime_version: Option<String>,
}

impl DeployOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workspace_id: String::new(),
            deployment_id: None,
            mode: DeployMode::None,
            prompt: false,
            env_file: None,
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            image_name: None,
            runtime_version: None,
        }
    }
}

/// What a successful deploy produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub deployment_id: String,
    pub release_name: String,
    pub runtime_version: String,
    pub repository: String,
    pub tag: String,
    pub image_id: String,
    /// Deployment page on the platform dashboard.
    pub dashboard_url: String,
    /// Airflow web UI. Empty when the platform did not report one.
    pub airflow_url: String,
}
