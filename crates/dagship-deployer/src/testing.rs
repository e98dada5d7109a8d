//! Hand-written mocks for the platform and engine seams.

use async_trait::async_trait;
use dagship_core::engine::{
    BuildContext, ContainerHandler, EngineFactory, ImageHandler, RegistryAuth,
};
use dagship_core::platform::{
    Deployment, Image, ImageCreateInput, ImageDeployInput, Platform, RuntimeRelease, Workspace,
};
use dagship_core::{Error, Result};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Call counter.
#[derive(Debug, Default)]
pub(crate) struct Calls(AtomicUsize);

impl Calls {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) fn deployment(id: &str, release_name: &str, version: &str) -> Deployment {
    Deployment {
        id: id.to_string(),
        label: format!("{} label", id),
        release_name: release_name.to_string(),
        workspace_id: "ws-1".to_string(),
        runtime_release: RuntimeRelease {
            version: version.to_string(),
            airflow_version: "2.7.3".to_string(),
        },
        webserver_url: format!("{}.example.io/airflow", release_name),
        created_at: None,
    }
}

pub(crate) fn releases(versions: &[&str]) -> Vec<RuntimeRelease> {
    versions
        .iter()
        .map(|v| RuntimeRelease {
            version: v.to_string(),
            airflow_version: "2.7.3".to_string(),
        })
        .collect()
}

pub(crate) struct MockPlatform {
    pub workspaces: Result<Vec<Workspace>>,
    pub deployments: Result<Vec<Deployment>>,
    pub public_releases: Result<Vec<RuntimeRelease>>,
    pub internal_releases: Result<Vec<RuntimeRelease>>,
    pub create_image: Result<Image>,
    pub deploy_image: Result<Image>,

    pub list_workspaces_calls: Calls,
    pub list_deployments_calls: Calls,
    pub public_release_calls: Calls,
    pub internal_release_calls: Calls,
    pub create_image_calls: Calls,
    pub deploy_image_calls: Calls,

    pub created: Mutex<Vec<ImageCreateInput>>,
    pub deployed: Mutex<Vec<ImageDeployInput>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            workspaces: Ok(vec![Workspace {
                id: "ws-1".to_string(),
                label: "Data Team".to_string(),
                organization_id: "org-1".to_string(),
            }]),
            deployments: Ok(vec![deployment("dep-1", "quasar-1234", "4.2.5")]),
            public_releases: Ok(releases(&["4.2.5", "4.2.6"])),
            internal_releases: Ok(releases(&["4.2.5", "4.2.6", "4.3.0-rc1"])),
            create_image: Ok(Image {
                id: "img-1".to_string(),
                deployment_id: "dep-1".to_string(),
                ..Default::default()
            }),
            deploy_image: Ok(Image {
                id: "img-1".to_string(),
                deployment_id: "dep-1".to_string(),
                ..Default::default()
            }),
            list_workspaces_calls: Calls::default(),
            list_deployments_calls: Calls::default(),
            public_release_calls: Calls::default(),
            internal_release_calls: Calls::default(),
            create_image_calls: Calls::default(),
            deploy_image_calls: Calls::default(),
            created: Mutex::default(),
            deployed: Mutex::default(),
        }
    }
}

impl MockPlatform {
    pub(crate) fn total_calls(&self) -> usize {
        self.list_workspaces_calls.count()
            + self.list_deployments_calls.count()
            + self.public_release_calls.count()
            + self.internal_release_calls.count()
            + self.create_image_calls.count()
            + self.deploy_image_calls.count()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.list_workspaces_calls.hit();
        self.workspaces.clone()
    }

    async fn list_deployments(&self, _workspace_id: &str) -> Result<Vec<Deployment>> {
        self.list_deployments_calls.hit();
        self.deployments.clone()
    }

    async fn list_public_runtime_releases(&self) -> Result<Vec<RuntimeRelease>> {
        self.public_release_calls.hit();
        self.public_releases.clone()
    }

    async fn list_internal_runtime_releases(&self) -> Result<Vec<RuntimeRelease>> {
        self.internal_release_calls.hit();
        self.internal_releases.clone()
    }

    async fn create_image(&self, input: ImageCreateInput) -> Result<Image> {
        self.create_image_calls.hit();
        self.created.lock().unwrap().push(input);
        self.create_image.clone()
    }

    async fn deploy_image(&self, input: ImageDeployInput) -> Result<Image> {
        self.deploy_image_calls.hit();
        self.deployed.lock().unwrap().push(input);
        self.deploy_image.clone()
    }
}

pub(crate) struct MockImageHandler {
    pub build_result: Result<()>,
    pub tag_result: Result<()>,
    pub label: Result<String>,
    /// Label reported once a build has run. `None` keeps `label`.
    pub built_label: Option<String>,
    pub push_result: Result<()>,

    pub build_calls: Calls,
    pub tag_calls: Calls,
    pub label_calls: Calls,
    pub push_calls: Calls,

    pub builds: Mutex<Vec<BuildContext>>,
    pub pushes: Mutex<Vec<(RegistryAuth, String, String)>>,
}

impl Default for MockImageHandler {
    fn default() -> Self {
        Self {
            build_result: Ok(()),
            tag_result: Ok(()),
            label: Ok(String::new()),
            built_label: None,
            push_result: Ok(()),
            build_calls: Calls::default(),
            tag_calls: Calls::default(),
            label_calls: Calls::default(),
            push_calls: Calls::default(),
            builds: Mutex::default(),
            pushes: Mutex::default(),
        }
    }
}

#[async_trait]
impl ImageHandler for MockImageHandler {
    fn image(&self) -> &str {
        "mock/airflow:latest"
    }

    async fn build(&self, ctx: &BuildContext) -> Result<()> {
        self.build_calls.hit();
        self.builds.lock().unwrap().push(ctx.clone());
        self.build_result.clone()
    }

    async fn tag_local_image(&self, _source: &str) -> Result<()> {
        self.tag_calls.hit();
        self.tag_result.clone()
    }

    async fn get_label(&self, _key: &str) -> Result<String> {
        self.label_calls.hit();
        match &self.built_label {
            Some(label) if self.build_calls.count() > 0 => Ok(label.clone()),
            _ => self.label.clone(),
        }
    }

    async fn push(&self, auth: &RegistryAuth, repository: &str, tag: &str) -> Result<()> {
        self.push_calls.hit();
        self.pushes
            .lock()
            .unwrap()
            .push((auth.clone(), repository.to_string(), tag.to_string()));
        self.push_result.clone()
    }
}

pub(crate) struct MockContainerHandler {
    pub parse_result: Result<()>,
    pub pytest_result: Result<String>,

    pub parse_calls: Calls,
    pub pytest_calls: Calls,

    pub pytest_files: Mutex<Vec<Option<String>>>,
}

impl Default for MockContainerHandler {
    fn default() -> Self {
        Self {
            parse_result: Ok(()),
            pytest_result: Ok("1 passed\nexit code 0\n".to_string()),
            parse_calls: Calls::default(),
            pytest_calls: Calls::default(),
            pytest_files: Mutex::default(),
        }
    }
}

#[async_trait]
impl ContainerHandler for MockContainerHandler {
    async fn parse(&self, _image: &str) -> Result<()> {
        self.parse_calls.hit();
        self.parse_result.clone()
    }

    async fn pytest(&self, test_file: Option<&str>, _image: &str) -> Result<String> {
        self.pytest_calls.hit();
        self.pytest_files
            .lock()
            .unwrap()
            .push(test_file.map(str::to_string));
        self.pytest_result.clone()
    }
}

#[derive(Default)]
pub(crate) struct MockEngine {
    pub images: Arc<MockImageHandler>,
    pub containers: Arc<MockContainerHandler>,
    pub requested_images: Mutex<Vec<String>>,
}

impl MockEngine {
    pub(crate) fn new(images: MockImageHandler, containers: MockContainerHandler) -> Self {
        Self {
            images: Arc::new(images),
            containers: Arc::new(containers),
            requested_images: Mutex::default(),
        }
    }
}

impl EngineFactory for MockEngine {
    fn image_handler(&self, image: &str) -> Arc<dyn ImageHandler> {
        self.requested_images.lock().unwrap().push(image.to_string());
        self.images.clone()
    }

    fn container_handler(&self, _ctx: &BuildContext) -> Result<Arc<dyn ContainerHandler>> {
        Ok(self.containers.clone())
    }
}

/// Writer whose contents stay readable after it is moved into a `Deployer`.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) fn transport_error() -> Error {
    Error::Transport("connection refused".to_string())
}
