//! Deploy orchestrator.
//!
//! Sequences one deploy attempt:
//!
//! ```text
//! Idle -> WorkspaceValidated -> DeploymentResolved -> Built
//!      -> [Validated] -> Pushed -> Registered -> Done
//! ```
//!
//! Any failure moves to `Failed`. Nothing is pushed until the requested
//! checks pass, and nothing is registered until the push succeeds.

use chrono::{DateTime, Utc};
use dagship_config::Context;
use dagship_core::engine::{BuildContext, EngineFactory, RegistryAuth, image_name};
use dagship_core::platform::{ImageCreateInput, ImageDeployInput, Platform};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};

use crate::image::{
    BuildRequest, REGISTRY_USERNAME, build_image, deploy_tag, registry_host, repository,
};
use crate::selector::{
    LineReader, StdinReader, find_deployment, prompt_user_for_deployment, validate_workspace,
};
use crate::validator::{check_parse, check_pytest};
use crate::{DeployError, DeployMode, DeployOptions, DeployReport};

/// Where a deploy attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Idle,
    WorkspaceValidated,
    DeploymentResolved,
    Built,
    Validated,
    Pushed,
    Registered,
    Done,
    Failed,
}

impl DeployState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WorkspaceValidated => "workspace-validated",
            Self::DeploymentResolved => "deployment-resolved",
            Self::Built => "built",
            Self::Validated => "validated",
            Self::Pushed => "pushed",
            Self::Registered => "registered",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs deploys against a platform and a container engine.
pub struct Deployer {
    platform: Arc<dyn Platform>,
    engine: Arc<dyn EngineFactory>,
    input: Box<dyn LineReader>,
    output: Box<dyn Write + Send>,
    clock: fn() -> DateTime<Utc>,
    state: DeployState,
}

impl Deployer {
    /// Create a deployer reading answers from stdin and writing to stdout.
    pub fn new(platform: Arc<dyn Platform>, engine: Arc<dyn EngineFactory>) -> Self {
        Self {
            platform,
            engine,
            input: Box::new(StdinReader),
            output: Box::new(io::stdout()),
            clock: Utc::now,
            state: DeployState::Idle,
        }
    }

    pub fn with_input(mut self, input: Box<dyn LineReader>) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    /// Clock used for push tags.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Run one deploy attempt.
    pub async fn deploy(
        &mut self,
        context: Option<&Context>,
        options: DeployOptions,
    ) -> Result<DeployReport, DeployError> {
        self.state = DeployState::Idle;

        match self.run(context, options).await {
            Ok(report) => {
                self.transition(DeployState::Done, &report.deployment_id);
                Ok(report)
            }
            Err(e) => {
                error!(state = %self.state, error = %e, "Deploy failed");
                self.state = DeployState::Failed;
                Err(e)
            }
        }
    }

    fn transition(&mut self, to: DeployState, deployment_id: &str) {
        info!(from = %self.state, to = %to, deployment_id, "Deploy state changed");
        self.state = to;
    }

    async fn run(
        &mut self,
        context: Option<&Context>,
        options: DeployOptions,
    ) -> Result<DeployReport, DeployError> {
        let context = context
            .filter(|c| c.is_authenticated())
            .ok_or(DeployError::NoContextSet)?;

        let workspace_id = if options.workspace_id.is_empty() {
            context.workspace.as_str()
        } else {
            options.workspace_id.as_str()
        };
        let workspace = validate_workspace(self.platform.as_ref(), workspace_id).await?;
        self.transition(DeployState::WorkspaceValidated, "");

        let deployments = self
            .platform
            .list_deployments(&workspace.id)
            .await
            .map_err(DeployError::step("list deployments"))?;

        let deployment = match (&options.deployment_id, options.prompt) {
            (Some(id), false) => find_deployment(&deployments, id)?.clone(),
            _ => prompt_user_for_deployment(
                &context.domain,
                &workspace,
                &deployments,
                self.input.as_mut(),
                self.output.as_mut(),
            )?,
        };

        let catalog = if context.system_admin {
            self.platform.list_internal_runtime_releases().await
        } else {
            self.platform.list_public_runtime_releases().await
        }
        .map_err(DeployError::step("list runtime releases"))?;
        self.transition(DeployState::DeploymentResolved, &deployment.id);

        let image = image_name(&deployment.release_name, "latest");
        let images = self.engine.image_handler(&image);

        let mut ctx = BuildContext::new(&options.path, &image);
        ctx.dockerfile = options.dockerfile.clone();
        ctx.env_file = options.env_file.as_ref().map(|f| options.path.join(f));

        let runtime_version = build_image(
            images.as_ref(),
            BuildRequest {
                ctx: ctx.clone(),
                source_image: options.image_name.as_deref(),
                runtime_override: options.runtime_version.as_deref(),
                current_version: deployment.current_version(),
                catalog: &catalog,
            },
            self.output.as_mut(),
        )
        .await?;
        self.transition(DeployState::Built, &deployment.id);

        if options.mode != DeployMode::None {
            let containers = self
                .engine
                .container_handler(&ctx)
                .map_err(DeployError::step("prepare checks"))?;

            match &options.mode {
                DeployMode::Parse => {
                    check_parse(
                        containers.as_ref(),
                        &image,
                        &runtime_version,
                        self.output.as_mut(),
                    )
                    .await?
                }
                DeployMode::Pytest { file } => {
                    check_pytest(
                        containers.as_ref(),
                        file.as_deref(),
                        &image,
                        self.output.as_mut(),
                    )
                    .await?
                }
                DeployMode::None => {}
            }
            self.transition(DeployState::Validated, &deployment.id);
        }

        let organization = if context.organization.is_empty() {
            workspace.organization_id.as_str()
        } else {
            context.organization.as_str()
        };
        let registry = registry_host(&context.domain);
        let repository = repository(&registry, organization, &deployment.release_name);
        let tag = deploy_tag((self.clock)());
        let auth = RegistryAuth {
            registry,
            username: REGISTRY_USERNAME.to_string(),
            token: context.token.clone(),
        };

        writeln!(self.output, "Pushing image {}:{}", repository, tag)?;
        images
            .push(&auth, &repository, &tag)
            .await
            .map_err(DeployError::step("push image"))?;
        self.transition(DeployState::Pushed, &deployment.id);

        let created = self
            .platform
            .create_image(ImageCreateInput {
                deployment_id: deployment.id.clone(),
                tag: tag.clone(),
            })
            .await
            .map_err(DeployError::step("register image"))?;

        let deployed = self
            .platform
            .deploy_image(ImageDeployInput {
                image_id: created.id.clone(),
                tag: tag.clone(),
                repository: repository.clone(),
            })
            .await
            .map_err(DeployError::step("deploy image"))?;
        self.transition(DeployState::Registered, &deployment.id);

        let image_id = if deployed.id.is_empty() {
            created.id
        } else {
            deployed.id
        };

        Ok(DeployReport {
            dashboard_url: dashboard_url(&context.domain, &workspace.id, &deployment.id),
            airflow_url: airflow_url(&deployment.webserver_url),
            deployment_id: deployment.id,
            release_name: deployment.release_name,
            runtime_version,
            repository,
            tag,
            image_id,
        })
    }
}

fn dashboard_url(domain: &str, workspace_id: &str, deployment_id: &str) -> String {
    format!(
        "https://cloud.{}/{}/deployments/{}",
        domain, workspace_id, deployment_id
    )
}

fn airflow_url(webserver_url: &str) -> String {
    if webserver_url.is_empty() || webserver_url.contains("://") {
        webserver_url.to_string()
    } else {
        format!("https://{}", webserver_url)
    }
}
