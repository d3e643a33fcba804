//! Asset download and re-upload pipeline
//!
//! Assets found on a page are handed to the pipeline as one batch per page.
//! Each batch runs as a background task; the downloads inside it share a
//! worker semaphore that is separate from the page fetch limits, so slow
//! assets never hold up page crawling.

use crate::crawler::parser::AssetRef;
use crate::stats::StatsAggregator;
use crate::storage::{AssetStore, PersistenceSink};
use futures::StreamExt;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Errors that can occur while moving one asset
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset storage is disabled")]
    Disabled,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("asset exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("download timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Limits for the asset worker pool
#[derive(Debug, Clone, Copy)]
pub struct AssetLimits {
    pub workers: usize,
    pub download_timeout: Duration,
    pub max_bytes: u64,
}

/// Downloads page assets and re-uploads them to an `AssetStore`
pub struct AssetPipeline {
    client: Client,
    store: Arc<dyn AssetStore>,
    sink: Arc<dyn PersistenceSink>,
    stats: Arc<StatsAggregator>,
    domain: String,
    workers: Arc<Semaphore>,
    limits: AssetLimits,
    batches: Mutex<JoinSet<()>>,
}

impl AssetPipeline {
    pub fn new(
        client: Client,
        store: Arc<dyn AssetStore>,
        sink: Arc<dyn PersistenceSink>,
        stats: Arc<StatsAggregator>,
        limits: AssetLimits,
    ) -> Self {
        Self {
            client,
            store,
            sink,
            domain: stats.domain().to_string(),
            stats,
            workers: Arc::new(Semaphore::new(limits.workers.max(1))),
            limits,
            batches: Mutex::new(JoinSet::new()),
        }
    }

    fn take_batches(&self) -> JoinSet<()> {
        let mut batches = self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *batches)
    }

    /// Number of page batches still being processed
    pub fn pending(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Queues the assets of one page
    ///
    /// The batch is persisted under `page_id` once every asset in it has been
    /// attempted. With no `page_id` the uploads still happen but nothing is
    /// recorded.
    pub fn submit(self: &Arc<Self>, page_id: Option<i64>, assets: Vec<AssetRef>) {
        if assets.is_empty() {
            return;
        }

        let pipeline = Arc::clone(self);
        let mut batches = self
            .batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        batches.spawn(async move { pipeline.process_batch(page_id, assets).await });
    }

    async fn process_batch(&self, page_id: Option<i64>, assets: Vec<AssetRef>) {
        let processed =
            futures::future::join_all(assets.into_iter().map(|asset| self.upload(asset))).await;

        let Some(page_id) = page_id else {
            return;
        };
        if let Err(e) = self.sink.insert_asset_batch(page_id, &processed) {
            tracing::warn!("Failed to store assets for page {}: {}", page_id, e);
        }
    }

    /// Re-uploads one asset
    ///
    /// Returns the asset with `uploaded_url` and `size` filled in, or
    /// unchanged if it could not be moved.
    pub async fn upload(&self, asset: AssetRef) -> AssetRef {
        if !self.store.is_enabled() {
            return asset;
        }

        let _permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return asset,
        };

        match self.transfer(&asset).await {
            Ok((url, size)) => {
                self.stats.on_asset_uploaded();
                AssetRef {
                    uploaded_url: Some(url),
                    size: Some(size),
                    ..asset
                }
            }
            Err(e) => {
                tracing::debug!("Asset {} not uploaded: {}", asset.source_url, e);
                asset
            }
        }
    }

    async fn transfer(&self, asset: &AssetRef) -> Result<(String, u64), AssetError> {
        let bytes = tokio::time::timeout(
            self.limits.download_timeout,
            self.download(&asset.source_url),
        )
        .await
        .map_err(|_| AssetError::Timeout)??;

        let folder = format!("crawler/{}/{}", self.domain, asset.kind.as_str());
        let uploaded = self
            .store
            .upload(bytes, asset.kind.resource_kind(), &folder)
            .await?;
        Ok((uploaded.url, uploaded.size))
    }

    /// Downloads an asset body, stopping as soon as it exceeds the size cap
    async fn download(&self, url: &Url) -> Result<Vec<u8>, AssetError> {
        let limit = self.limits.max_bytes;
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(AssetError::Status(status));
        }
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(AssetError::TooLarge { limit });
        }

        let mut buffer = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buffer.len() as u64 + chunk.len() as u64 > limit {
                return Err(AssetError::TooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    /// Waits for every queued batch, including batches queued while draining
    pub async fn drain(&self) {
        loop {
            let mut batches = self.take_batches();
            if batches.is_empty() {
                return;
            }
            while let Some(joined) = batches.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!("Asset batch panicked: {}", e);
                    }
                }
            }
        }
    }

    /// Aborts every queued batch and waits until they are gone
    pub async fn abort(&self) {
        let mut batches = self.take_batches();
        let count = batches.len();
        batches.shutdown().await;
        if count > 0 {
            tracing::debug!("Aborted {} asset batch(es) for {}", count, self.domain);
        }
    }
}
