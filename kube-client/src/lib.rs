use anyhow::{Context, Result};
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode,
};
use shared_types::{ObjectKey, ObjectList, Resource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Content type for server-side apply requests
pub const APPLY_PATCH_CONTENT_TYPE: &str = "application/apply-patch+yaml";

/// Connection settings for the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub field_manager: String,
    pub timeout: Duration,
}

impl KubeConfig {
    pub fn new(api_url: impl Into<String>, field_manager: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: None,
            token_file: None,
            ca_cert: None,
            field_manager: field_manager.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Typed REST client for declarative backend objects
pub struct KubeClient {
    client: ReqwestClient,
    base_url: String,
    token: Option<String>,
    field_manager: String,
}

impl KubeClient {
    /// Create a client without authentication
    pub fn new(base_url: impl Into<String>, field_manager: impl Into<String>) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            field_manager: field_manager.into(),
        })
    }

    /// Create a client from connection settings, reading token and CA files if set
    pub async fn from_config(config: &KubeConfig) -> Result<Self> {
        let mut builder = ReqwestClient::builder().timeout(config.timeout);
        if let Some(path) = &config.ca_cert {
            let pem = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read CA certificate {}", path.display()))?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        let token = match (&config.token, &config.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => {
                let token = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read token file {}", path.display()))?;
                Some(token.trim().to_string())
            }
            (None, None) => None,
        };

        Ok(Self {
            client: builder.build()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            field_manager: config.field_manager.clone(),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn collection_url<T: Resource>(&self, namespace: &str) -> String {
        format!(
            "{}/apis/{}/namespaces/{}/{}",
            self.base_url,
            T::API_VERSION,
            namespace,
            T::PLURAL
        )
    }

    fn object_url<T: Resource>(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.collection_url::<T>(&key.namespace), key.name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Fetch an object; `None` when the server answers 404
    pub async fn get<T: Resource>(&self, key: &ObjectKey) -> Result<Option<T>> {
        let url = self.object_url::<T>(key);
        debug!("GET {}", url);

        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response, "get", T::KIND, key).await?;
        Ok(Some(response.json().await?))
    }

    /// Server-side apply of the object's spec and metadata, forcing ownership
    pub async fn apply<T: Resource>(&self, obj: &T) -> Result<T> {
        let key = obj.key();
        let url = self.object_url::<T>(&key);
        self.send_apply(&url, obj, &key).await
    }

    /// Server-side apply against the status subresource
    pub async fn apply_status<T: Resource>(&self, obj: &T) -> Result<T> {
        let key = obj.key();
        let url = format!("{}/status", self.object_url::<T>(&key));
        self.send_apply(&url, obj, &key).await
    }

    async fn send_apply<T: Resource>(&self, url: &str, obj: &T, key: &ObjectKey) -> Result<T> {
        debug!("PATCH {} (apply as {})", url, self.field_manager);

        let body = serde_json::to_vec(obj)?;
        let response = self
            .request(Method::PATCH, url)
            .query(&[
                ("fieldManager", self.field_manager.as_str()),
                ("force", "true"),
            ])
            .header(CONTENT_TYPE, APPLY_PATCH_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let response = check_status(response, "apply", T::KIND, key).await?;
        Ok(response.json().await?)
    }

    /// Delete an object; `false` when it was already gone
    pub async fn delete<T: Resource>(&self, key: &ObjectKey) -> Result<bool> {
        let url = self.object_url::<T>(key);
        debug!("DELETE {}", url);

        let response = self.request(Method::DELETE, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        check_status(response, "delete", T::KIND, key).await?;
        Ok(true)
    }

    /// List objects in a namespace, optionally filtered by label selector
    pub async fn list<T: Resource>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<T>> {
        let url = self.collection_url::<T>(namespace);
        debug!("GET {} (selector {:?})", url, label_selector);

        let mut request = self.request(Method::GET, &url);
        if let Some(selector) = label_selector {
            request = request.query(&[("labelSelector", selector)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to list {} in {}: {} {}", T::PLURAL, namespace, status, body);
        }

        let list: ObjectList<T> = response.json().await?;
        Ok(list.items)
    }

    /// Check API server readiness
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/readyz", self.base_url);
        let response = self.request(Method::GET, &url).send().await?;
        Ok(response.status() == StatusCode::OK)
    }
}

async fn check_status(
    response: Response,
    verb: &str,
    kind: &str,
    key: &ObjectKey,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Failed to {verb} {kind} {key}: {status} {body}")
}
