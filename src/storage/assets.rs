//! Asset storage backends
//!
//! An `AssetStore` receives the bytes of one downloaded asset and returns the
//! location it now lives at. Three backends are provided:
//! - `DirectoryAssetStore`: content-addressed files below a local directory
//! - `HttpAssetStore`: POST to an upload endpoint that answers with JSON
//! - `DisabledAssetStore`: refuses every upload; assets are recorded only

use crate::crawler::{AssetError, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Where an uploaded asset ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub url: String,
    pub size: u64,
}

/// Destination for re-uploaded assets
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Returns false when assets should be recorded without being downloaded
    fn is_enabled(&self) -> bool {
        true
    }

    /// Stores `bytes` under `folder`
    ///
    /// # Arguments
    ///
    /// * `bytes` - The downloaded asset body
    /// * `resource_kind` - `"image"` for images, `"raw"` for scripts and stylesheets
    /// * `folder` - Namespaced path, e.g. `crawler/example.com/image`
    async fn upload(
        &self,
        bytes: Vec<u8>,
        resource_kind: &str,
        folder: &str,
    ) -> Result<UploadedAsset, AssetError>;
}

/// Store that refuses all uploads
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAssetStore;

#[async_trait]
impl AssetStore for DisabledAssetStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn upload(
        &self,
        _bytes: Vec<u8>,
        _resource_kind: &str,
        _folder: &str,
    ) -> Result<UploadedAsset, AssetError> {
        Err(AssetError::Disabled)
    }
}

/// Store that writes assets below a local directory
///
/// Files are named by the SHA-256 of their content, so the same asset found
/// on many pages is written once.
#[derive(Debug, Clone)]
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for DirectoryAssetStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        _resource_kind: &str,
        folder: &str,
    ) -> Result<UploadedAsset, AssetError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;

        let name = hex::encode(Sha256::digest(&bytes));
        let path = dir.join(name);
        let size = bytes.len() as u64;
        tokio::fs::write(&path, bytes).await?;

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let url = Url::from_file_path(&absolute)
            .map_err(|_| AssetError::Upload(format!("unrepresentable path {}", absolute.display())))?;

        Ok(UploadedAsset {
            url: url.to_string(),
            size,
        })
    }
}

/// Response body of the upload endpoint
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    bytes: Option<u64>,
}

/// Store that POSTs assets to an HTTP endpoint
///
/// The request body is the raw asset; `folder` and `resource_type` travel as
/// query parameters. Transient statuses are retried with the same policy the
/// page fetcher uses.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpAssetStore {
    /// Creates a new HttpAssetStore
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Upload URL
    /// * `api_key` - Optional bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AssetError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            retry: RetryPolicy::default(),
        })
    }

    /// Overrides the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        resource_kind: &str,
        folder: &str,
    ) -> Result<UploadedAsset, AssetError> {
        let size = bytes.len() as u64;
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .post(self.endpoint.clone())
                .query(&[("folder", folder), ("resource_type", resource_kind)])
                .body(bytes.clone());
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let retryable = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let body: UploadResponse = response.json().await?;
                    let url = body.secure_url.or(body.url).ok_or_else(|| {
                        AssetError::Upload("upload response carried no url".to_string())
                    })?;
                    return Ok(UploadedAsset {
                        url,
                        size: body.bytes.unwrap_or(size),
                    });
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !self.retry.is_retryable_status(status) {
                        return Err(AssetError::Upload(format!(
                            "upload endpoint answered {}",
                            status
                        )));
                    }
                    AssetError::Upload(format!("upload endpoint answered {}", status))
                }
                Err(e) if e.is_timeout() || e.is_connect() => AssetError::Http(e),
                Err(e) => return Err(AssetError::Http(e)),
            };

            if attempt >= self.retry.max_retries {
                return Err(retryable);
            }
            tokio::time::sleep(self.retry.backoff(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_disabled_store_refuses() {
        let store = DisabledAssetStore;
        assert!(!store.is_enabled());
        let result = store.upload(vec![1, 2, 3], "image", "crawler/x/image").await;
        assert!(matches!(result, Err(AssetError::Disabled)));
    }

    #[tokio::test]
    async fn test_directory_store_writes_content_addressed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryAssetStore::new(dir.path());

        let first = store
            .upload(b"body{}".to_vec(), "raw", "crawler/example.com/stylesheet")
            .await
            .unwrap();
        let second = store
            .upload(b"body{}".to_vec(), "raw", "crawler/example.com/stylesheet")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.size, 6);
        assert!(first.url.starts_with("file://"));

        let written: Vec<_> = std::fs::read_dir(dir.path().join("crawler/example.com/stylesheet"))
            .unwrap()
            .collect();
        assert_eq!(written.len(), 1);
    }

    #[tokio::test]
    async fn test_http_store_uploads_with_folder_and_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(query_param("folder", "crawler/example.com/image"))
            .and(query_param("resource_type", "image"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://cdn.example.net/a.png",
                "bytes": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/upload", server.uri())).unwrap();
        let store =
            HttpAssetStore::new(endpoint, Some("secret".to_string()), Duration::from_secs(5))
                .unwrap();

        let uploaded = store
            .upload(vec![1, 2, 3], "image", "crawler/example.com/image")
            .await
            .unwrap();
        assert_eq!(uploaded.url, "https://cdn.example.net/a.png");
        assert_eq!(uploaded.size, 3);
    }

    #[tokio::test]
    async fn test_http_store_retries_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "url": "http://cdn.example.net/x" })),
            )
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let store = HttpAssetStore::new(endpoint, None, Duration::from_secs(5))
            .unwrap()
            .with_retry(fast_retry());

        let uploaded = store.upload(vec![0; 10], "raw", "crawler/x/script").await.unwrap();
        assert_eq!(uploaded.url, "http://cdn.example.net/x");
        assert_eq!(uploaded.size, 10);
    }

    #[tokio::test]
    async fn test_http_store_gives_up_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let store = HttpAssetStore::new(endpoint, None, Duration::from_secs(5))
            .unwrap()
            .with_retry(fast_retry());

        let result = store.upload(vec![1], "image", "crawler/x/image").await;
        assert!(matches!(result, Err(AssetError::Upload(_))));
    }
}
