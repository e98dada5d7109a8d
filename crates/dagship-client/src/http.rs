//! `Platform` over the platform's REST API.

use async_trait::async_trait;
use dagship_core::Result;
use dagship_core::platform::{
    Deployment, Image, ImageCreateInput, ImageDeployInput, Platform, RuntimeRelease, Workspace,
};
use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::ClientError;

const USER_AGENT: &str = concat!("dagship/", env!("CARGO_PKG_VERSION"));

/// API root for a platform domain: `cloud.example.io` maps to
/// `https://api.cloud.example.io/v1/`. A domain with a scheme is used as the
/// API host directly, which is how local platforms are addressed.
pub fn api_base_url(domain: &str) -> std::result::Result<Url, ClientError> {
    let domain = domain.trim_end_matches('/');
    let base = if domain.starts_with("http://") || domain.starts_with("https://") {
        format!("{}/v1/", domain)
    } else {
        format!("https://api.{}/v1/", domain)
    };
    Ok(Url::parse(&base)?)
}

/// Platform API client authenticated with a bearer token.
pub struct HttpPlatform {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpPlatform {
    pub fn new(domain: &str, token: impl Into<String>) -> std::result::Result<Self, ClientError> {
        Ok(Self::with_base_url(api_base_url(domain)?, token))
    }

    /// Create against an explicit API root. The URL must end with `/`.
    pub fn with_base_url(base: Url, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            token: token.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> std::result::Result<Url, ClientError> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Ok(self.base.join(&path)?)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, ClientError> {
        debug!(url = %url, "GET");
        self.send(self.client.get(url)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> std::result::Result<T, ClientError> {
        debug!(url = %url, "POST");
        self.send(self.client.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, ClientError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn runtime_releases(&self, channel: &str) -> Result<Vec<RuntimeRelease>> {
        let mut url = self.url(&["runtime-releases"])?;
        url.query_pairs_mut().append_pair("channel", channel);
        Ok(self.get(url).await?)
    }
}

/// Prefer the API's `{"message": ...}` body, then the raw body, then the
/// status reason.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }

    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return err.message;
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        Ok(self.get(self.url(&["workspaces"])?).await?)
    }

    async fn list_deployments(&self, workspace_id: &str) -> Result<Vec<Deployment>> {
        Ok(self
            .get(self.url(&["workspaces", workspace_id, "deployments"])?)
            .await?)
    }

    async fn list_public_runtime_releases(&self) -> Result<Vec<RuntimeRelease>> {
        self.runtime_releases("public").await
    }

    async fn list_internal_runtime_releases(&self) -> Result<Vec<RuntimeRelease>> {
        self.runtime_releases("internal").await
    }

    async fn create_image(&self, input: ImageCreateInput) -> Result<Image> {
        let url = self.url(&["deployments", &input.deployment_id, "images"])?;
        Ok(self.post(url, &input).await?)
    }

    async fn deploy_image(&self, input: ImageDeployInput) -> Result<Image> {
        let url = self.url(&["images", &input.image_id, "deploy"])?;
        Ok(self.post(url, &input).await?)
    }
}
