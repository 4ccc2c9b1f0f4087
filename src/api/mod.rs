pub mod error;
pub mod models;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::session::Credential;

pub use error::ApiError;
pub use models::{
    Initiative, ListQuery, LoginRequest, LoginResponse, NewInitiative, PrioritizeItem,
    PrioritizedInitiative, PublicStatistics, Statistics, Status, Validate,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Every backend operation the portal client consumes.
#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn list_initiatives(&self, query: &ListQuery) -> Result<Vec<Initiative>, ApiError>;

    async fn get_initiative(&self, id: u64) -> Result<Initiative, ApiError>;

    async fn create_initiative(&self, request: &NewInitiative) -> Result<Initiative, ApiError>;

    async fn respond(
        &self,
        credential: &Credential,
        id: u64,
        response: &str,
    ) -> Result<(), ApiError>;

    async fn admin_statistics(&self, credential: &Credential) -> Result<Statistics, ApiError>;

    async fn public_statistics(&self) -> Result<PublicStatistics, ApiError>;

    async fn search_streets(&self, query: &str, limit: usize) -> Result<Vec<String>, ApiError>;

    async fn ai_prioritize(
        &self,
        credential: &Credential,
        items: &[PrioritizeItem],
    ) -> Result<Vec<PrioritizedInitiative>, ApiError>;

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;
}

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 10,
            proxy: None,
        }
    }
}

#[derive(Clone)]
pub struct HttpPortalApi {
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for HttpPortalApi {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpPortalApi")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn build_client(proxy: Option<&str>, timeout_seconds: u64) -> Result<reqwest::Client, ApiError> {
    let timeout = Duration::from_secs(if timeout_seconds == 0 {
        10
    } else {
        timeout_seconds
    });
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("pobude/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout);

    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| ApiError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ApiError::HttpClientBuild { source: e })
}

impl HttpPortalApi {
    pub fn new(options: &ClientOptions) -> Result<Self, ApiError> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_string();
        if reqwest::Url::parse(&base_url).is_err() {
            return Err(ApiError::InvalidBaseUrl {
                url: options.base_url.clone(),
            });
        }
        let client = build_client(options.proxy.as_deref(), options.timeout_seconds)?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, ApiError> {
        debug!(endpoint, "sending request");
        let response = request.send().await.map_err(|e| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        debug!(endpoint, status = status.as_u16(), bytes = body.len(), "response received");

        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: error::truncate_for_error(&body),
            });
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned + Validate>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(endpoint, request).await?;
        decode(endpoint, &body)
    }
}

pub(crate) fn decode<T: DeserializeOwned + Validate>(
    endpoint: &str,
    body: &str,
) -> Result<T, ApiError> {
    let value: T = serde_json::from_str(body).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source: e,
    })?;
    value.validate()?;
    Ok(value)
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn list_initiatives(&self, query: &ListQuery) -> Result<Vec<Initiative>, ApiError> {
        let request = self.client.get(self.url("/pobude")).query(&query.to_pairs());
        self.fetch("/pobude", request).await
    }

    async fn get_initiative(&self, id: u64) -> Result<Initiative, ApiError> {
        let endpoint = format!("/pobude/{id}");
        let request = self.client.get(self.url(&endpoint));
        self.fetch(&endpoint, request).await
    }

    async fn create_initiative(&self, request: &NewInitiative) -> Result<Initiative, ApiError> {
        let mut form = reqwest::multipart::Form::new()
            .text("title", request.title.clone())
            .text("description", request.description.clone())
            .text("location", request.location.clone())
            .text("latitude", request.latitude.to_string())
            .text("longitude", request.longitude.to_string())
            .text("email", request.email.clone());
        if let Some(category) = request.category.as_ref() {
            form = form.text("category", category.clone());
        }
        if let Some(path) = request.image.as_ref() {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ApiError::FileRead {
                    kind: "image",
                    path: path.display().to_string(),
                    source: e,
                })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string());
            form = form.part(
                "image",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }
        let req = self.client.post(self.url("/pobude")).multipart(form);
        self.fetch("/pobude", req).await
    }

    async fn respond(
        &self,
        credential: &Credential,
        id: u64,
        response: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/pobude/{id}/respond");
        let request = self
            .client
            .put(self.url(&endpoint))
            .bearer_auth(credential.token())
            .json(&models::RespondRequest {
                response: response.to_string(),
            });
        self.execute(&endpoint, request).await?;
        Ok(())
    }

    async fn admin_statistics(&self, credential: &Credential) -> Result<Statistics, ApiError> {
        let request = self
            .client
            .get(self.url("/admin/statistics"))
            .bearer_auth(credential.token());
        self.fetch("/admin/statistics", request).await
    }

    async fn public_statistics(&self) -> Result<PublicStatistics, ApiError> {
        let request = self.client.get(self.url("/statistics/public"));
        self.fetch("/statistics/public", request).await
    }

    async fn search_streets(&self, query: &str, limit: usize) -> Result<Vec<String>, ApiError> {
        let request = self
            .client
            .get(self.url("/streets/search"))
            .query(&[("q", query.to_string()), ("limit", limit.to_string())]);
        self.fetch("/streets/search", request).await
    }

    async fn ai_prioritize(
        &self,
        credential: &Credential,
        items: &[PrioritizeItem],
    ) -> Result<Vec<PrioritizedInitiative>, ApiError> {
        let request = self
            .client
            .post(self.url("/admin/ai-prioritize"))
            .bearer_auth(credential.token())
            .json(items);
        self.fetch("/admin/ai-prioritize", request).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let req = self.client.post(self.url("/login")).json(request);
        self.fetch("/login", req).await
    }
}
