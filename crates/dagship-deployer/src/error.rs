//! Deploy pipeline errors.

use dagship_core::Error;
use dagship_executor::DockerfileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(
        "no context set, have you authenticated to the platform? Run dagship login and try again"
    )]
    NoContextSet,

    #[error("no workspace id provided")]
    NoWorkspaceId,

    #[error("no workspaces with id ({0}) found")]
    WorkspaceNotFound(String),

    #[error("no deployments found in this workspace")]
    NoDeployments,

    #[error("invalid deployment selection")]
    InvalidDeploymentKey,

    #[error("no deployment with id ({0}) found in this workspace")]
    DeploymentNotFound(String),

    #[error("failed to parse dockerfile: {path}")]
    DockerfileParse {
        path: String,
        #[source]
        source: DockerfileError,
    },

    #[error("runtime version {tag} is not a supported runtime release")]
    InvalidRuntimeTag { tag: String },

    #[error(
        "cannot deploy runtime version {candidate} to a deployment running {current}, downgrades are not supported"
    )]
    InvalidUpgrade { current: String, candidate: String },

    #[error(
        "your local DAGs did not parse, fix the listed errors or rerun the command without the '--parse' flag to deploy"
    )]
    DagsParseFailed(#[source] Error),

    #[error(
        "pytests failed, please fix failures or rerun the command without the '--pytest' flag to deploy"
    )]
    PytestFailed,

    #[error("failed to {operation}: {source}")]
    Step {
        operation: &'static str,
        #[source]
        source: Error,
    },

    #[error("failed to read deployment selection: {0}")]
    Input(#[source] std::io::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl DeployError {
    /// Wrap an engine or platform error with the operation that failed.
    pub fn step(operation: &'static str) -> impl FnOnce(Error) -> Self {
        move |source| Self::Step { operation, source }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoContextSet | Self::NoWorkspaceId => ErrorClass::Precondition,
            Self::WorkspaceNotFound(_)
            | Self::NoDeployments
            | Self::InvalidDeploymentKey
            | Self::DeploymentNotFound(_) => ErrorClass::Resolution,
            Self::DockerfileParse { .. }
            | Self::InvalidRuntimeTag { .. }
            | Self::InvalidUpgrade { .. }
            | Self::DagsParseFailed(_)
            | Self::PytestFailed => ErrorClass::Validation,
            Self::Step { source, .. } => match source {
                Error::InvalidInput(_) => ErrorClass::Precondition,
                Error::NotFound(_) => ErrorClass::Resolution,
                Error::BuildFailed(_) | Error::ExecutionFailed(_) => ErrorClass::Validation,
                Error::Unauthorized(_)
                | Error::Transport(_)
                | Error::Api { .. }
                | Error::PushFailed(_) => ErrorClass::Transport,
                Error::Internal(_) => ErrorClass::Other,
            },
            Self::Input(_) | Self::Output(_) => ErrorClass::Other,
        }
    }
}

/// Failure classes, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing authentication or required input.
    Precondition,
    /// Workspace or deployment could not be resolved.
    Resolution,
    /// Build, version or pre-deploy check failure.
    Validation,
    /// Remote API, registry or auth failure.
    Transport,
    Other,
}

impl ErrorClass {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Other => 1,
            Self::Precondition => 2,
            Self::Resolution => 3,
            Self::Validation => 4,
            Self::Transport => 5,
        }
    }
}
