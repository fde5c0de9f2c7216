use async_trait::async_trait;
use futures_util::TryStreamExt;
use tracing::debug;

use super::{BlobRequest, BlobResponse, Transport};
use crate::{BlobConfig, BlobError, BlobResult};

/// Production transport over a pooled `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from configuration
    pub fn new(config: &BlobConfig) -> BlobResult<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(config.user_agent.clone());

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if config.http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }

        let client = builder.build().map_err(BlobError::transport)?;
        debug!("Built HTTP client (user agent {})", config.user_agent);
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn issue(&self, request: BlobRequest) -> BlobResult<BlobResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(reqwest::Body::wrap_stream(body));
        }

        let response = builder.send().await.map_err(BlobError::transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(BlobResponse::new(status, headers, Box::pin(body)))
    }
}
