//! `dagship workspace list` and `dagship deployment list`.

use anyhow::{Context as _, Result};
use dagship_core::platform::{Platform, Workspace};
use dagship_deployer::DeployError;
use dagship_deployer::selector::{validate_workspace, write_deployment_table, write_table};
use std::io::Write;

use super::{authenticated_context, load_global_config, platform_for};

pub async fn workspaces() -> Result<()> {
    let config = load_global_config()?;
    let context = authenticated_context(&config)?;
    let platform = platform_for(context)?;

    let workspaces = platform
        .list_workspaces()
        .await
        .context("failed to list workspaces")?;

    let mut stdout = std::io::stdout().lock();
    write_workspace_table(&mut stdout, &workspaces, &context.workspace)?;
    Ok(())
}

pub async fn deployments(workspace_id: Option<String>) -> Result<()> {
    let config = load_global_config()?;
    let context = authenticated_context(&config)?;
    let platform = platform_for(context)?;

    let workspace_id = workspace_id.unwrap_or_else(|| context.workspace.clone());
    let workspace = validate_workspace(platform.as_ref(), &workspace_id).await?;
    let deployments = platform
        .list_deployments(&workspace.id)
        .await
        .map_err(DeployError::step("list deployments"))?;

    let mut stdout = std::io::stdout().lock();
    if deployments.is_empty() {
        writeln!(stdout, "No deployments in workspace {}", workspace.id)?;
        return Ok(());
    }
    write_deployment_table(&mut stdout, &deployments)?;
    Ok(())
}

/// Workspace table with the context's default marked.
fn write_workspace_table(
    out: &mut dyn Write,
    workspaces: &[Workspace],
    current: &str,
) -> std::io::Result<()> {
    let rows: Vec<[String; 4]> = workspaces
        .iter()
        .map(|w| {
            [
                w.label.clone(),
                w.id.clone(),
                w.organization_id.clone(),
                if w.id == current { "*" } else { "" }.to_string(),
            ]
        })
        .collect();
    write_table(out, &["NAME", "ID", "ORGANIZATION", "CURRENT"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_table_marks_current() {
        let workspaces = vec![
            Workspace {
                id: "ws-1".to_string(),
                label: "Data Team".to_string(),
                organization_id: "org-1".to_string(),
            },
            Workspace {
                id: "ws-2".to_string(),
                label: "Sandbox".to_string(),
                organization_id: "org-1".to_string(),
            },
        ];
        let mut out = Vec::new();
        write_workspace_table(&mut out, &workspaces, "ws-2").unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(" NAME"));
        assert!(!lines[1].ends_with('*'));
        assert!(lines[2].ends_with('*'));
    }
}
