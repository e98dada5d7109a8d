//! Remote platform types and the `Platform` trait.
//!
//! The platform hosts workspaces, deployments and the runtime release
//! catalog. The deploy pipeline only ever reads workspaces and deployments;
//! the two image calls are the only mutations it performs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A workspace the caller has access to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub organization_id: String,
}

/// A published runtime release and the Airflow version it bundles.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRelease {
    pub version: String,
    #[serde(default)]
    pub airflow_version: String,
}

/// A remote deployment. Fetched fresh for every deploy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub release_name: String,
    #[serde(default)]
    pub workspace_id: String,
    pub runtime_release: RuntimeRelease,
    #[serde(default)]
    pub webserver_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Runtime version currently running on this deployment.
    pub fn current_version(&self) -> &str {
        &self.runtime_release.version
    }
}

/// Request to register a new image against a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCreateInput {
    pub deployment_id: String,
    pub tag: String,
}

/// Request to roll a deployment onto a registered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDeployInput {
    pub image_id: String,
    pub tag: String,
    pub repository: String,
}

/// An image record on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub repository: String,
}

/// Client for the remote platform API.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Workspaces visible to the authenticated user.
    async fn list_workspaces(&self) -> Result<Vec<Workspace>>;

    /// Deployments in a workspace.
    async fn list_deployments(&self, workspace_id: &str) -> Result<Vec<Deployment>>;

    /// Runtime releases published to everyone.
    async fn list_public_runtime_releases(&self) -> Result<Vec<RuntimeRelease>>;

    /// Runtime releases including internal builds (system admins only).
    async fn list_internal_runtime_releases(&self) -> Result<Vec<RuntimeRelease>>;

    /// Register an image record for a deployment.
    async fn create_image(&self, input: ImageCreateInput) -> Result<Image>;

    /// Deploy a registered image.
    async fn deploy_image(&self, input: ImageDeployInput) -> Result<Image>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_deserializes_from_camel_case() {
        let json = r#"{
            "id": "dep-1",
            "releaseName": "quasar-star-1234",
            "runtimeRelease": {"version": "4.2.5", "airflowVersion": "2.2.5"},
            "webserverUrl": "https://example.io/quasar"
        }"#;

        let deployment: Deployment = serde_json::from_str(json).unwrap();
        assert_eq!(deployment.id, "dep-1");
        assert_eq!(deployment.release_name, "quasar-star-1234");
        assert_eq!(deployment.current_version(), "4.2.5");
        assert_eq!(deployment.runtime_release.airflow_version, "2.2.5");
        assert!(deployment.created_at.is_none());
        assert!(deployment.workspace_id.is_empty());
    }

    #[test]
    fn test_image_deploy_input_serializes_camel_case() {
        let input = ImageDeployInput {
            image_id: "img-1".to_string(),
            tag: "deploy-2024-01-01T00-00".to_string(),
            repository: "images.example.io/org/dep".to_string(),
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["imageId"], "img-1");
        assert_eq!(value["repository"], "images.example.io/org/dep");
    }
}
