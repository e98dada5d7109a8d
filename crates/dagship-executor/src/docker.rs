//! Local Docker engine.
//!
//! Images are built with the `docker` CLI so BuildKit and the user's
//! builder configuration apply. Everything else (inspect, tag, push and the
//! check containers) goes through the daemon API.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{PushImageOptions, TagImageOptions};
use bollard::models::HostConfig;
use dagship_core::engine::{
    BuildContext, ContainerHandler, DEPLOY_PLATFORMS, EXIT_CODE_MARKER, EngineFactory,
    ImageHandler, RegistryAuth,
};
use dagship_core::{Error, Result, RunId};
use futures::StreamExt;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Where the project is mounted inside check containers.
pub const PROJECT_MOUNT: &str = "/usr/local/airflow";

/// Tests run when no test file is given.
pub const DEFAULT_TEST_PATH: &str = "tests/";

/// Lines of build output kept for the error message.
const BUILD_OUTPUT_TAIL: usize = 25;

/// Loads every DAG in `dags/` and exits non-zero on import errors.
const PARSE_CHECK: &str = r#"import sys
from airflow.models import DagBag
bag = DagBag("dags", include_examples=False)
for path, error in bag.import_errors.items():
    print(f"{path}: {error}")
print(f"{len(bag.dags)} DAGs parsed, {len(bag.import_errors)} import errors")
sys.exit(1 if bag.import_errors else 0)
"#;

/// Engine backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
    docker_bin: String,
}

impl DockerEngine {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            docker_bin: "docker".to_string(),
        }
    }

    /// Use a different CLI binary for builds, e.g. `podman`.
    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    /// Whether the daemon answers.
    pub async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

impl EngineFactory for DockerEngine {
    fn image_handler(&self, image: &str) -> Arc<dyn ImageHandler> {
        Arc::new(DockerImageHandler {
            docker: self.docker.clone(),
            docker_bin: self.docker_bin.clone(),
            image: image.to_string(),
        })
    }

    fn container_handler(&self, ctx: &BuildContext) -> Result<Arc<dyn ContainerHandler>> {
        Ok(Arc::new(DockerContainerHandler::new(
            self.docker.clone(),
            ctx,
        )?))
    }
}

/// Image operations for one image name.
pub struct DockerImageHandler {
    docker: Docker,
    docker_bin: String,
    image: String,
}

#[async_trait]
impl ImageHandler for DockerImageHandler {
    fn image(&self) -> &str {
        &self.image
    }

    async fn build(&self, ctx: &BuildContext) -> Result<()> {
        let dockerfile = ctx.dockerfile_path();
        let args = build_args(ctx, &self.image);

        info!(
            image = %self.image,
            dockerfile = %dockerfile.display(),
            "Building image"
        );
        debug!(command = %format!("{} {}", self.docker_bin, args.join(" ")), "Running build");

        let mut child = Command::new(&self.docker_bin)
            .args(&args)
            .current_dir(&ctx.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::BuildFailed(format!("failed to run {}: {}", self.docker_bin, e))
            })?;

        let tail = Arc::new(OutputTail::new(BUILD_OUTPUT_TAIL));
        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(tail_lines(stdout, "stdout", tail.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(tail_lines(stderr, "stderr", tail.clone())));

        let status = child
            .wait()
            .await
            .map_err(|e| Error::BuildFailed(format!("failed waiting for build: {}", e)))?;

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(image = %self.image, code = %code, "Image build failed");
            return Err(Error::BuildFailed(format!(
                "docker build exited with {}\n{}",
                code,
                tail.lines().join("\n")
            )));
        }

        info!(image = %self.image, "Built image");
        Ok(())
    }

    async fn tag_local_image(&self, source: &str) -> Result<()> {
        let (repo, tag) = split_reference(&self.image);
        info!(source = %source, image = %self.image, "Tagging local image");

        self.docker
            .tag_image(source, Some(TagImageOptions { repo, tag }))
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => Error::NotFound(format!("image {}", source)),
                other => Error::Internal(format!("failed to tag {}: {}", source, other)),
            })
    }

    async fn get_label(&self, key: &str) -> Result<String> {
        match self.docker.inspect_image(&self.image).await {
            Ok(inspect) => Ok(inspect
                .config
                .and_then(|config| config.labels)
                .and_then(|mut labels| labels.remove(key))
                .unwrap_or_default()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            }) => Err(Error::NotFound(format!("image {}: {}", self.image, message))),
            Err(e) => Err(Error::Internal(format!(
                "failed to inspect {}: {}",
                self.image, e
            ))),
        }
    }

    async fn push(&self, auth: &RegistryAuth, repository: &str, tag: &str) -> Result<()> {
        let target = format!("{}:{}", repository, tag);

        self.docker
            .tag_image(
                &self.image,
                Some(TagImageOptions {
                    repo: repository,
                    tag,
                }),
            )
            .await
            .map_err(|e| {
                Error::PushFailed(format!("failed to tag {} as {}: {}", self.image, target, e))
            })?;

        let credentials = DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.token.clone()),
            serveraddress: Some(auth.registry.clone()),
            ..Default::default()
        };

        info!(image = %target, registry = %auth.registry, "Pushing image");
        let mut stream = self.docker.push_image(
            repository,
            Some(PushImageOptions { tag }),
            Some(credentials),
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(Error::PushFailed(error));
                    }
                    if let Some(status) = info.status {
                        debug!(status = %status, "Push progress");
                    }
                }
                Err(e) => return Err(Error::PushFailed(e.to_string())),
            }
        }

        info!(image = %target, "Pushed image");
        Ok(())
    }
}

/// Runs checks in throwaway containers with the project mounted.
pub struct DockerContainerHandler {
    docker: Docker,
    project_dir: PathBuf,
    env: Vec<String>,
    run_id: RunId,
}

/// Exit status and combined output of a check container.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CheckOutput {
    exit_code: i64,
    output: String,
}

impl DockerContainerHandler {
    pub fn new(docker: Docker, ctx: &BuildContext) -> Result<Self> {
        let env = match &ctx.env_file {
            Some(path) => read_env_file(path)?,
            None => Vec::new(),
        };

        let project_dir = ctx.project_dir.canonicalize().map_err(|e| {
            Error::InvalidInput(format!(
                "project directory {}: {}",
                ctx.project_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            docker,
            project_dir,
            env,
            run_id: RunId::new(),
        })
    }

    async fn run_check(&self, check: &str, image: &str, cmd: Vec<String>) -> Result<CheckOutput> {
        let name = container_name(check, &self.run_id);

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}:rw",
                self.project_dir.display(),
                PROJECT_MOUNT
            )]),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(cmd),
            env: Some(self.env.clone()),
            working_dir: Some(PROJECT_MOUNT.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        info!(container = %name, image = %image, "Creating container");
        self.docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to create container: {}", e)))?;

        let result = self.start_and_wait(&name).await;

        // The container is removed whatever happened
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(&name, Some(options)).await {
            warn!(container = %name, error = %e, "Failed to remove container");
        }

        result
    }

    async fn start_and_wait(&self, name: &str) -> Result<CheckOutput> {
        info!(container = %name, "Starting container");
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to start container: {}", e)))?;

        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(name, Some(options));

        let exit_code = match stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero exit as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                return Err(Error::ExecutionFailed(format!(
                    "Failed waiting for container: {}",
                    e
                )));
            }
            None => {
                return Err(Error::ExecutionFailed(
                    "Container wait ended without a status".to_string(),
                ));
            }
        };

        let output = self.collect_logs(name).await?;
        debug!(container = %name, exit_code, "Container exited");

        Ok(CheckOutput { exit_code, output })
    }

    async fn collect_logs(&self, name: &str) -> Result<String> {
        let options = LogsOptions::<String> {
            follow: false,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut output = String::new();

        while let Some(result) = stream.next().await {
            let chunk = result
                .map_err(|e| Error::ExecutionFailed(format!("Failed to read logs: {}", e)))?;
            let message = match chunk {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message }
                | LogOutput::StdIn { message } => message,
            };
            output.push_str(&String::from_utf8_lossy(&message));
        }

        Ok(output)
    }
}

#[async_trait]
impl ContainerHandler for DockerContainerHandler {
    async fn parse(&self, image: &str) -> Result<()> {
        let cmd = vec![
            "python".to_string(),
            "-c".to_string(),
            PARSE_CHECK.to_string(),
        ];
        let result = self.run_check("parse", image, cmd).await?;

        for line in result.output.lines() {
            debug!(target: "dagship::parse", "{}", line);
        }

        if result.exit_code != 0 {
            return Err(Error::ExecutionFailed(format!(
                "DAG parse exited with code {}\n{}",
                result.exit_code,
                result.output.trim_end()
            )));
        }
        Ok(())
    }

    async fn pytest(&self, test_file: Option<&str>, image: &str) -> Result<String> {
        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            pytest_script(test_file),
        ];
        let result = self.run_check("pytest", image, cmd).await?;
        Ok(result.output)
    }
}

fn container_name(check: &str, run_id: &RunId) -> String {
    format!("dagship-{}-{}", check, run_id.short())
}

fn build_args(ctx: &BuildContext, image: &str) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--platform".to_string(),
        DEPLOY_PLATFORMS.join(","),
        "-t".to_string(),
        image.to_string(),
        "-f".to_string(),
        ctx.dockerfile_path().display().to_string(),
    ];
    if !ctx.runtime_tag.is_empty() {
        args.push("--build-arg".to_string());
        args.push(format!("RUNTIME_VERSION={}", ctx.runtime_tag));
    }
    args.push(ctx.project_dir.display().to_string());
    args
}

/// The runner's status is echoed as the last line because the container
/// itself always exits through `echo`.
fn pytest_script(test_file: Option<&str>) -> String {
    let target = test_file.unwrap_or(DEFAULT_TEST_PATH);
    format!(
        "pytest --disable-warnings {}; echo \"{} $?\"",
        shell_quote(target),
        EXIT_CODE_MARKER
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Split `repo:tag` on the tag colon, ignoring a registry port.
fn split_reference(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(colon) => (
            &image[..name_start + colon],
            &image[name_start + colon + 1..],
        ),
        None => (image, "latest"),
    }
}

fn read_env_file(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::InvalidInput(format!(
            "env file path is incorrect: {}",
            path.display()
        )));
    }

    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| Error::InvalidInput(format!("env file {}: {}", path.display(), e)))?;

    let mut env = Vec::new();
    for item in iter {
        let (key, value) = item
            .map_err(|e| Error::InvalidInput(format!("env file {}: {}", path.display(), e)))?;
        env.push(format!("{}={}", key, value));
    }
    debug!(path = %path.display(), count = env.len(), "Loaded env file");
    Ok(env)
}

/// Last lines of a build's combined stdout and stderr, in arrival order.
struct OutputTail {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn lines(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().cloned().collect()
    }
}

async fn tail_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str, tail: Arc<OutputTail>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "dagship::build", stream, "{}", line);
        tail.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name() {
        let run_id = RunId::new();
        let name = container_name("parse", &run_id);
        assert!(name.starts_with("dagship-parse-"));
        assert!(name.ends_with(&run_id.short()));
        assert_ne!(name, container_name("pytest", &run_id));
    }

    #[test]
    fn test_build_args() {
        let mut ctx = BuildContext::new("/projects/etl", "etl/airflow:latest");
        ctx.runtime_tag = "4.2.5".to_string();

        let args = build_args(&ctx, "etl/airflow:latest");
        assert_eq!(
            args,
            vec![
                "build",
                "--platform",
                "linux/amd64",
                "-t",
                "etl/airflow:latest",
                "-f",
                "/projects/etl/Dockerfile",
                "--build-arg",
                "RUNTIME_VERSION=4.2.5",
                "/projects/etl",
            ]
        );
    }

    #[test]
    fn test_build_args_without_runtime_tag() {
        let ctx = BuildContext::new("/projects/etl", "etl/airflow:latest");
        let args = build_args(&ctx, "etl/airflow:latest");
        assert!(!args.iter().any(|a| a == "--build-arg"));
        assert_eq!(args.last().map(String::as_str), Some("/projects/etl"));
    }

    #[test]
    fn test_pytest_script() {
        assert_eq!(
            pytest_script(None),
            "pytest --disable-warnings 'tests/'; echo \"exit code $?\""
        );
        assert_eq!(
            pytest_script(Some("tests/test_dag's.py")),
            "pytest --disable-warnings 'tests/test_dag'\\''s.py'; echo \"exit code $?\""
        );
    }

    #[test]
    fn test_split_reference() {
        assert_eq!(
            split_reference("etl/airflow:latest"),
            ("etl/airflow", "latest")
        );
        assert_eq!(
            split_reference("localhost:5000/etl/airflow"),
            ("localhost:5000/etl/airflow", "latest")
        );
        assert_eq!(
            split_reference("images.example.io/org/dep:deploy-2026-01-01T00-00"),
            ("images.example.io/org/dep", "deploy-2026-01-01T00-00")
        );
    }

    #[test]
    fn test_read_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nAIRFLOW_VAR_A=1\nQUOTED=\"two words\"\n").unwrap();

        let env = read_env_file(&path).unwrap();
        assert_eq!(env, vec!["AIRFLOW_VAR_A=1", "QUOTED=two words"]);
    }

    #[test]
    fn test_read_env_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_env_file(&dir.path().join("nope.env")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("env file path is incorrect")));
    }

    #[tokio::test]
    async fn test_tail_lines_keeps_last_lines() {
        let input: String = (0..40).map(|i| format!("line {}\n", i)).collect();
        let tail = Arc::new(OutputTail::new(BUILD_OUTPUT_TAIL));
        tail_lines(input.as_bytes(), "stdout", tail.clone()).await;

        let lines = tail.lines();
        assert_eq!(lines.len(), BUILD_OUTPUT_TAIL);
        assert_eq!(lines.first().map(String::as_str), Some("line 15"));
        assert_eq!(lines.last().map(String::as_str), Some("line 39"));
    }

    #[tokio::test]
    async fn test_tail_merges_streams_in_arrival_order() {
        let tail = Arc::new(OutputTail::new(3));
        tail_lines("step 1\n".as_bytes(), "stdout", tail.clone()).await;
        tail_lines("warning: cache miss\n".as_bytes(), "stderr", tail.clone()).await;
        tail_lines("step 2\nstep 3\n".as_bytes(), "stdout", tail.clone()).await;
        tail_lines("error: pip install failed\n".as_bytes(), "stderr", tail.clone()).await;

        assert_eq!(
            tail.lines(),
            vec!["step 2", "step 3", "error: pip install failed"]
        );
    }
}
