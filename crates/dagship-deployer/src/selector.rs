//! Workspace and deployment selection.

use dagship_core::platform::{Deployment, Platform, Workspace};
use std::io::{self, BufRead, Write};
use tracing::debug;

use crate::DeployError;

/// Source of interactive answers. Exactly one line is read per question.
pub trait LineReader: Send {
    fn next_line(&mut self) -> io::Result<String>;
}

impl<R: BufRead + Send> LineReader for R {
    fn next_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.read_line(&mut line)?;
        Ok(line)
    }
}

/// Reads answers from the process's standard input.
#[derive(Debug, Default)]
pub struct StdinReader;

impl LineReader for StdinReader {
    fn next_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    }
}

/// Check that `workspace_id` is one of the caller's workspaces.
pub async fn validate_workspace(
    platform: &dyn Platform,
    workspace_id: &str,
) -> Result<Workspace, DeployError> {
    if workspace_id.is_empty() {
        return Err(DeployError::NoWorkspaceId);
    }

    let workspaces = platform
        .list_workspaces()
        .await
        .map_err(DeployError::step("list workspaces"))?;

    workspaces
        .into_iter()
        .find(|w| w.id == workspace_id)
        .ok_or_else(|| DeployError::WorkspaceNotFound(workspace_id.to_string()))
}

/// Find an explicitly requested deployment.
pub fn find_deployment<'a>(
    deployments: &'a [Deployment],
    deployment_id: &str,
) -> Result<&'a Deployment, DeployError> {
    deployments
        .iter()
        .find(|d| d.id == deployment_id)
        .ok_or_else(|| DeployError::DeploymentNotFound(deployment_id.to_string()))
}

/// Show the deployments as a numbered table and read the user's pick.
pub fn prompt_user_for_deployment(
    domain: &str,
    workspace: &Workspace,
    deployments: &[Deployment],
    reader: &mut dyn LineReader,
    out: &mut dyn Write,
) -> Result<Deployment, DeployError> {
    if deployments.is_empty() {
        return Err(DeployError::NoDeployments);
    }

    let label = if workspace.label.is_empty() {
        &workspace.id
    } else {
        &workspace.label
    };
    writeln!(out, "Workspace: {} ({})", label, domain)?;
    writeln!(out, "Select which Deployment you want to deploy to:")?;
    write_deployment_table(out, deployments)?;
    write!(out, "\n> ")?;
    out.flush()?;

    let answer = reader.next_line().map_err(DeployError::Input)?;
    debug!(answer = %answer.trim(), "Deployment selection");

    let index = answer
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|i| (1..=deployments.len()).contains(i))
        .ok_or(DeployError::InvalidDeploymentKey)?;

    Ok(deployments[index - 1].clone())
}

/// Numbered deployment table, also used by `deployment list`.
pub fn write_deployment_table(out: &mut dyn Write, deployments: &[Deployment]) -> io::Result<()> {
    let headers = ["#", "LABEL", "DEPLOYMENT NAME", "DEPLOYMENT ID", "RUNTIME"];
    let rows: Vec<[String; 5]> = deployments
        .iter()
        .enumerate()
        .map(|(i, d)| {
            [
                (i + 1).to_string(),
                d.label.clone(),
                d.release_name.clone(),
                d.id.clone(),
                d.runtime_release.version.clone(),
            ]
        })
        .collect();
    write_table(out, &headers, &rows)
}

/// Left-aligned columns padded to the widest cell.
pub fn write_table<const N: usize>(
    out: &mut dyn Write,
    headers: &[&str; N],
    rows: &[[String; N]],
) -> io::Result<()> {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    writeln!(out, " {}", line(headers.to_vec()))?;
    for row in rows {
        writeln!(out, " {}", line(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}
