//! dagship CLI tool.

use clap::{Parser, Subcommand, ValueEnum};
use dagship_config::ConfigError;
use dagship_deployer::DeployError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::deploy::DeployArgs;

#[derive(Parser)]
#[command(name = "dagship", version)]
#[command(about = "Build, check and deploy Airflow projects", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project image and deploy it to a deployment
    Deploy(DeployArgs),
    /// Authenticate with a platform domain
    Login {
        /// Platform domain, e.g. cloud.example.io
        #[arg(long, env = "DAGSHIP_DOMAIN")]
        domain: String,
        /// API token
        #[arg(long, env = "DAGSHIP_TOKEN", hide_env_values = true)]
        token: String,
        /// Default workspace for later commands
        #[arg(long)]
        workspace_id: Option<String>,
        /// Organization of the workspace
        #[arg(long)]
        organization_id: Option<String>,
    },
    /// Forget the token of the current context
    Logout,
    /// Workspace commands
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// Deployment commands
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommands {
    /// List accessible workspaces
    List,
}

#[derive(Subcommand)]
enum DeploymentCommands {
    /// List deployments in a workspace
    List {
        /// Workspace to list. Defaults to the context's workspace
        #[arg(long, env = "DAGSHIP_WORKSPACE_ID")]
        workspace_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<DeployError>().is_some() {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Deploy(args) => commands::deploy::run(args).await,
        Commands::Login {
            domain,
            token,
            workspace_id,
            organization_id,
        } => commands::auth::login(&domain, &token, workspace_id, organization_id).await,
        Commands::Logout => commands::auth::logout(),
        Commands::Workspace { command } => match command {
            WorkspaceCommands::List => commands::list::workspaces().await,
        },
        Commands::Deployment { command } => match command {
            DeploymentCommands::List { workspace_id } => {
                commands::list::deployments(workspace_id).await
            }
        },
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Exit code for a failed command: deploy errors by class, config problems
/// as precondition failures, anything else 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(deploy) = err.downcast_ref::<DeployError>() {
        return deploy.class().exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return dagship_deployer::ErrorClass::Precondition.exit_code();
    }
    if let Some(core) = err.downcast_ref::<dagship_core::Error>() {
        return DeployError::step("run command")(core.clone())
            .class()
            .exit_code();
    }
    1
}
