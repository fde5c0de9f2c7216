use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::classify::classify;
use crate::transport::{ReqwestTransport, Transport};
use crate::{BlobConfig, BlobError, BlobResult, UrlBlob};

/// Factory for [`UrlBlob`] handles and owner of the transport they share.
///
/// The HTTP transport is built on first use, not at construction, so creating
/// a manager and resolving handles never touches the network. Handles keep the
/// transport alive while they exist; [`UrlBlobManager::close`] releases the
/// manager's pooled connections early.
///
/// ```rust,no_run
/// use urlblob::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> BlobResult<()> {
/// let manager = UrlBlobManager::new();
/// let blob = manager.from_url("https://bucket.s3.eu-west-1.amazonaws.com/report.csv?X-Amz-Signature=..", None)?;
///
/// let meta = blob.stat().await?;
/// println!("{} bytes", meta.size().unwrap_or(0));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UrlBlobManager {
    transport: Arc<TransportSlot>,
}

impl UrlBlobManager {
    /// Manager with default configuration
    pub fn new() -> Self {
        Self::with_config(BlobConfig::default())
    }

    pub fn with_config(config: BlobConfig) -> Self {
        Self {
            transport: Arc::new(TransportSlot::new(config, None)),
        }
    }

    /// Configuration from `URLBLOB_*` environment variables
    pub fn from_env() -> BlobResult<Self> {
        Ok(Self::with_config(BlobConfig::from_env()?))
    }

    /// Use a caller-supplied transport instead of building one
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Arc::new(TransportSlot::new(BlobConfig::default(), Some(transport))),
        }
    }

    pub fn config(&self) -> &BlobConfig {
        &self.transport.config
    }

    /// Resolve a URL to a handle.
    ///
    /// `hint` is an explicit provider token (`s3`, `aws`, `gcp`, `azure`, ...);
    /// without one the provider is detected from the host. No request is made.
    pub fn from_url(&self, url: &str, hint: Option<&str>) -> BlobResult<UrlBlob> {
        let parsed = Url::parse(url).map_err(|e| BlobError::invalid_url(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BlobError::invalid_url(
                url,
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        let provider = classify(url, hint)?;
        debug!("Resolved {} URL for host {}", provider, parsed.host_str().unwrap_or(""));
        Ok(UrlBlob::new(url, provider, self.transport.clone()))
    }

    /// Release the shared transport.
    ///
    /// Requests already in flight finish on their own connections. A later
    /// request through any handle from this manager builds a fresh transport.
    pub fn close(&self) {
        if self.transport.release() {
            debug!("Released shared transport");
        }
    }
}

impl Default for UrlBlobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UrlBlobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlBlobManager")
            .field("config", &self.transport.config)
            .field("active", &self.transport.is_active())
            .finish()
    }
}

/// Lazily constructed transport shared by a manager and its handles
pub(crate) struct TransportSlot {
    config: BlobConfig,
    provided: Option<Arc<dyn Transport>>,
    active: Mutex<Option<Arc<dyn Transport>>>,
}

impl TransportSlot {
    pub(crate) fn new(config: BlobConfig, provided: Option<Arc<dyn Transport>>) -> Self {
        Self {
            config,
            provided,
            active: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// The transport, building it on first use
    pub(crate) fn acquire(&self) -> BlobResult<Arc<dyn Transport>> {
        let mut active = self.active.lock();
        if let Some(transport) = active.as_ref() {
            return Ok(transport.clone());
        }

        let transport: Arc<dyn Transport> = match &self.provided {
            Some(provided) => provided.clone(),
            None => {
                debug!("Building HTTP transport");
                Arc::new(ReqwestTransport::new(&self.config)?)
            }
        };
        *active = Some(transport.clone());
        Ok(transport)
    }

    /// Drop the cached transport; true if there was one
    pub(crate) fn release(&self) -> bool {
        self.active.lock().take().is_some()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }
}
