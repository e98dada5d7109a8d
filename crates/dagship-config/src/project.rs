//! Per-project deploy defaults.
//!
//! Read from `<project>/.dagship/config.kdl`:
//!
//! ```kdl
//! deployment "cl0dep123"
//! dockerfile "Dockerfile"
//! env-file ".env"
//! ```

use crate::nodes::first_string_arg;
use crate::{ConfigError, ConfigResult};
use kdl::KdlDocument;
use std::path::Path;
use tracing::debug;

const PROJECT_CONFIG: &str = ".dagship/config.kdl";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Deployment used when none is given on the command line.
    pub deployment: Option<String>,
    /// Dockerfile name relative to the project.
    pub dockerfile: Option<String>,
    /// Env file relative to the project.
    pub env_file: Option<String>,
}

impl ProjectConfig {
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;

        let mut config = Self::default();
        for node in doc.nodes() {
            let name = node.name().value();
            let slot = match name {
                "deployment" => &mut config.deployment,
                "dockerfile" => &mut config.dockerfile,
                "env-file" => &mut config.env_file,
                _ => continue,
            };
            let value = first_string_arg(node).ok_or_else(|| ConfigError::InvalidValue {
                field: name.to_string(),
                message: "expected a string argument".to_string(),
            })?;
            if slot.replace(value).is_some() {
                return Err(ConfigError::Duplicate(name.to_string()));
            }
        }

        Ok(config)
    }
}

/// Load the project config. A project without one gets the defaults.
pub fn load_project_config(project_dir: &Path) -> ConfigResult<ProjectConfig> {
    let path = project_dir.join(PROJECT_CONFIG);
    match std::fs::read_to_string(&path) {
        Ok(content) => ProjectConfig::parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No project config");
            Ok(ProjectConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}
