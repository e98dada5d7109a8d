//! KDL configuration parsing for dagship.
//!
//! This crate handles:
//! - The global config (`~/.dagship/config.kdl`): authentication contexts
//! - Per-project config (`<project>/.dagship/config.kdl`): deploy defaults

pub mod context;
pub mod error;
mod nodes;
pub mod project;

pub use context::{Context, GlobalConfig, config_home, global_config_path};
pub use error::{ConfigError, ConfigResult};
pub use project::{ProjectConfig, load_project_config};
