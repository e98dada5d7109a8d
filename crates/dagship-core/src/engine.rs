//! Container engine traits and build types.
//!
//! The engine is split the same way the deploy pipeline uses it: an
//! `ImageHandler` bound to one image name (build, tag, label, push) and a
//! `ContainerHandler` bound to one project (runs checks inside an image).
//! Both are created through an `EngineFactory` so the pipeline never
//! constructs an engine itself.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::Result;

/// Dockerfile name used when the project does not configure one.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Image label carrying the runtime version baked into a runtime image.
pub const RUNTIME_IMAGE_LABEL: &str = "io.dagship.runtime.version";

/// Platforms the remote runtime accepts.
pub const DEPLOY_PLATFORMS: &[&str] = &["linux/amd64"];

/// Prefix of the line the engine appends to captured test output with the
/// test runner's exit status, e.g. `exit code 1`.
pub const EXIT_CODE_MARKER: &str = "exit code";

/// Local inputs needed to produce one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Project directory (the Docker build context).
    pub project_dir: PathBuf,
    /// Dockerfile name, relative to `project_dir`.
    pub dockerfile: String,
    /// Env file passed to in-container checks.
    pub env_file: Option<PathBuf>,
    /// Runtime version the image is built for.
    pub runtime_tag: String,
    /// Local image name to build into, e.g. `my-release/airflow:latest`.
    pub image: String,
}

impl BuildContext {
    pub fn new(project_dir: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            env_file: None,
            runtime_tag: String::new(),
            image: image.into(),
        }
    }

    /// Full path of the Dockerfile.
    pub fn dockerfile_path(&self) -> PathBuf {
        self.project_dir.join(&self.dockerfile)
    }
}

/// Local image name for a deployment's release.
pub fn image_name(release_name: &str, tag: &str) -> String {
    format!("{}/airflow:{}", release_name, tag)
}

/// Credentials for the remote image registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    /// Registry host, e.g. `images.example.io`.
    pub registry: String,
    pub username: String,
    pub token: String,
}

/// Operations on a single local image.
#[async_trait]
pub trait ImageHandler: Send + Sync {
    /// Name of the image this handler operates on.
    fn image(&self) -> &str;

    /// Build the image from a project directory.
    async fn build(&self, ctx: &BuildContext) -> Result<()>;

    /// Tag an existing local image as this handler's image.
    async fn tag_local_image(&self, source: &str) -> Result<()>;

    /// Read one metadata label. Returns an empty string when the label is absent.
    async fn get_label(&self, key: &str) -> Result<String>;

    /// Tag the image as `repository:tag` and upload it. Never retried.
    async fn push(&self, auth: &RegistryAuth, repository: &str, tag: &str) -> Result<()>;
}

/// Runs project checks inside a built image.
#[async_trait]
pub trait ContainerHandler: Send + Sync {
    /// Run the DAG integrity check. Any non-zero exit is an error.
    async fn parse(&self, image: &str) -> Result<()>;

    /// Run the project's tests and return the captured output, which ends
    /// with an `EXIT_CODE_MARKER` line. Only failures to run the tests at all
    /// are errors.
    async fn pytest(&self, test_file: Option<&str>, image: &str) -> Result<String>;
}

/// Creates engine handlers. Passed into the pipeline at construction.
pub trait EngineFactory: Send + Sync {
    fn image_handler(&self, image: &str) -> Arc<dyn ImageHandler>;

    fn container_handler(&self, ctx: &BuildContext) -> Result<Arc<dyn ContainerHandler>>;
}
