//! `dagship login` and `dagship logout`.

use anyhow::{Context as _, Result};
use dagship_config::{Context, GlobalConfig, global_config_path};
use dagship_core::platform::Platform;
use dagship_deployer::selector::validate_workspace;
use tracing::info;

use super::platform_for;

pub async fn login(
    domain: &str,
    token: &str,
    workspace_id: Option<String>,
    organization_id: Option<String>,
) -> Result<()> {
    let path = global_config_path()?;
    let mut config = GlobalConfig::load(&path)?;

    let mut context = config
        .contexts
        .iter()
        .find(|c| c.domain == domain)
        .cloned()
        .unwrap_or_else(|| Context::new(domain));
    context.token = token.to_string();

    let platform = platform_for(&context)?;
    let context = authenticate(
        platform.as_ref(),
        context,
        workspace_id.as_deref(),
        organization_id,
    )
    .await?;

    info!(domain = %context.domain, workspace = %context.workspace, "Logged in");
    println!("Successfully authenticated to {}", context.domain);
    if !context.workspace.is_empty() {
        println!("Default workspace: {}", context.workspace);
    }

    config.set_current(context);
    config.save(&path)?;
    Ok(())
}

/// Check the token and settle the context's default workspace.
///
/// An explicit workspace must exist. Without one, a token that sees exactly
/// one workspace gets it as the default; otherwise the previous default is
/// kept.
pub async fn authenticate(
    platform: &dyn Platform,
    mut context: Context,
    workspace_id: Option<&str>,
    organization_id: Option<String>,
) -> Result<Context> {
    let workspace = match workspace_id {
        Some(id) => Some(validate_workspace(platform, id).await?),
        None => {
            let mut workspaces = platform
                .list_workspaces()
                .await
                .with_context(|| format!("failed to authenticate to {}", context.domain))?;
            if workspaces.len() == 1 {
                workspaces.pop()
            } else {
                None
            }
        }
    };

    if let Some(workspace) = workspace {
        context.workspace = workspace.id;
        if organization_id.is_none() {
            context.organization = workspace.organization_id;
        }
    }
    if let Some(org) = organization_id {
        context.organization = org;
    }
    Ok(context)
}

pub fn logout() -> Result<()> {
    let path = global_config_path()?;
    let mut config = GlobalConfig::load(&path)?;

    let Some(context) = config.current_mut() else {
        println!("No context set");
        return Ok(());
    };
    context.token.clear();
    let domain = context.domain.clone();

    config.save(&path)?;
    info!(domain = %domain, "Logged out");
    println!("Logged out of {}", domain);
    Ok(())
}
