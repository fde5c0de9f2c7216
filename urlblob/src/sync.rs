//! Blocking surface over the async manager and handles.
//!
//! Each call drives the async implementation to completion on a runtime owned
//! by the manager, so semantics are identical apart from blocking. Do not call
//! these from inside an async runtime; `block_on` panics there.

use std::sync::Arc;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::runtime::{Builder, Runtime};

use crate::transport::Transport;
use crate::{
    BlobConfig, BlobContent, BlobError, BlobMetadata, BlobResult, ByteRange, UrlBlob,
    UrlBlobManager,
};

/// Blocking counterpart of [`UrlBlobManager`]
#[derive(Clone)]
pub struct SyncUrlBlobManager {
    runtime: Arc<Runtime>,
    inner: UrlBlobManager,
}

impl SyncUrlBlobManager {
    pub fn new() -> BlobResult<Self> {
        Self::wrap(UrlBlobManager::new())
    }

    pub fn with_config(config: BlobConfig) -> BlobResult<Self> {
        Self::wrap(UrlBlobManager::with_config(config))
    }

    pub fn from_env() -> BlobResult<Self> {
        Self::wrap(UrlBlobManager::from_env()?)
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> BlobResult<Self> {
        Self::wrap(UrlBlobManager::with_transport(transport))
    }

    fn wrap(inner: UrlBlobManager) -> BlobResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            inner,
        })
    }

    pub fn from_url(&self, url: &str, hint: Option<&str>) -> BlobResult<SyncUrlBlob> {
        Ok(SyncUrlBlob {
            runtime: self.runtime.clone(),
            inner: self.inner.from_url(url, hint)?,
        })
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

/// Blocking counterpart of [`UrlBlob`]
#[derive(Clone)]
pub struct SyncUrlBlob {
    runtime: Arc<Runtime>,
    inner: UrlBlob,
}

impl SyncUrlBlob {
    pub fn url(&self) -> &str {
        self.inner.url()
    }

    pub fn provider(&self) -> crate::Provider {
        self.inner.provider()
    }

    pub fn stat(&self) -> BlobResult<BlobMetadata> {
        self.runtime.block_on(self.inner.stat())
    }

    pub fn get(&self, range: Option<ByteRange>) -> BlobResult<Bytes> {
        self.runtime.block_on(self.inner.get(range))
    }

    pub fn get_lines(&self, range: Option<ByteRange>) -> BlobResult<Vec<String>> {
        self.runtime.block_on(self.inner.get_lines(range))
    }

    pub fn grow_to_valid_string(&self, range: Option<ByteRange>) -> BlobResult<String> {
        self.runtime.block_on(self.inner.grow_to_valid_string(range))
    }

    pub fn shrink_to_valid_string(&self, range: Option<ByteRange>) -> BlobResult<String> {
        self.runtime.block_on(self.inner.shrink_to_valid_string(range))
    }

    /// Body chunks; each `next()` blocks for one chunk
    pub fn stream(&self, range: Option<ByteRange>) -> BlobResult<BlockingIter<BlobResult<Bytes>>> {
        let body = self.runtime.block_on(self.inner.stream(range))?;
        let body = body.map(|chunk| chunk.map_err(BlobError::from));
        Ok(BlockingIter::new(self.runtime.clone(), body))
    }

    /// Text lines; each `next()` blocks until a line is complete
    pub fn stream_lines(&self, range: Option<ByteRange>) -> BlobResult<BlockingIter<BlobResult<String>>> {
        let lines = self.runtime.block_on(self.inner.stream_lines(range))?;
        Ok(BlockingIter::new(self.runtime.clone(), lines))
    }

    pub fn put<C>(&self, content: C, content_type: Option<&str>) -> BlobResult<()>
    where
        C: Into<BlobContent>,
    {
        self.runtime.block_on(self.inner.put(content, content_type))
    }

    /// Upload chunks from an iterator as they are produced
    pub fn put_chunks<I>(&self, chunks: I, content_type: Option<&str>) -> BlobResult<()>
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        let body = futures_util::stream::iter(
            chunks.into_iter().map(Ok::<_, std::io::Error>),
        );
        self.put(BlobContent::Stream(Box::pin(body)), content_type)
    }

    pub fn put_lines<I, S>(&self, lines: I, content_type: Option<&str>) -> BlobResult<()>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<String>,
    {
        self.runtime.block_on(self.inner.put_lines(lines, content_type))
    }
}

impl std::fmt::Debug for SyncUrlBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

/// Iterator that pulls from an async stream one item per `next()`.
///
/// Dropping it drops the stream, releasing its connection.
pub struct BlockingIter<T> {
    runtime: Arc<Runtime>,
    stream: std::pin::Pin<Box<dyn Stream<Item = T> + Send>>,
}

impl<T> BlockingIter<T> {
    fn new<S>(runtime: Arc<Runtime>, stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            runtime,
            stream: Box::pin(stream),
        }
    }
}

impl<T> Iterator for BlockingIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.runtime.block_on(self.stream.next())
    }
}
