//! CLI command implementations.

pub mod auth;
pub mod deploy;
pub mod list;

use anyhow::{Context as _, Result};
use dagship_client::HttpPlatform;
use dagship_config::{Context, GlobalConfig, global_config_path};
use dagship_deployer::DeployError;
use std::sync::Arc;

/// Load the global config from its default location.
pub fn load_global_config() -> Result<GlobalConfig> {
    let path = global_config_path()?;
    Ok(GlobalConfig::load(&path)?)
}

/// The current context, if it carries a token.
pub fn authenticated_context(config: &GlobalConfig) -> Result<&Context> {
    config
        .current()
        .filter(|c| c.is_authenticated())
        .ok_or_else(|| DeployError::NoContextSet.into())
}

/// API client for a context.
pub fn platform_for(context: &Context) -> Result<Arc<HttpPlatform>> {
    let platform = HttpPlatform::new(&context.domain, context.token.clone())
        .with_context(|| format!("invalid platform domain: {}", context.domain))?;
    Ok(Arc::new(platform))
}
