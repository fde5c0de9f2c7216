//! # urlblob: one client for presigned object-storage URLs
//!
//! `urlblob` reads metadata from, downloads (fully or by byte range), streams and
//! uploads content addressed by a *presigned URL*, whichever provider issued it.
//! S3, Google Cloud Storage and Azure Blob Storage disagree on range header
//! names, size headers and upload headers; the provider adapters hide that.
//!
//! ## Key Features
//!
//! - **Provider detection**: S3 (and S3-compatible hosts), GCS and Azure are recognized from the URL's host, with an explicit override
//! - **Ranged reads**: inclusive byte ranges, open-ended ranges and suffixes
//! - **Streaming-first**: bodies are consumed chunk by chunk, and text streams are reassembled into whole lines regardless of chunk boundaries
//! - **Works on GET-signed URLs**: `stat` uses a one-byte ranged GET rather than a HEAD
//! - **Async and blocking**: the [`sync`] module wraps the async API call for call
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use urlblob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let manager = UrlBlobManager::new();
//! let blob = manager.from_url("https://acct.blob.core.windows.net/logs/app.log?sv=2022-11-02&sig=..", None)?;
//!
//! // Upload
//! blob.put("Hello, world!", Some("text/plain")).await?;
//!
//! // Metadata
//! let meta = blob.stat().await?;
//! assert_eq!(meta.content_type(), Some("text/plain"));
//!
//! // First five bytes (inclusive range)
//! let head = blob.get(Some(ByteRange::new(0, 4)?)).await?;
//! assert_eq!(&head[..], b"Hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  UrlBlobManager  │  ← resolves URLs, owns the transport
//! ├──────────────────┤
//! │     UrlBlob      │  ← stat / get / stream / put
//! ├──────────────────┤
//! │ ProviderAdapter  │  ← per-provider requests and parsing
//! ├──────────────────┤
//! │    Transport     │  ← reqwest, or in-memory for tests
//! └──────────────────┘
//! ```

pub mod adapter;
mod blob;
pub mod classify;
mod config;
mod error;
pub mod lines;
mod manager;
mod metadata;
pub mod sync;
pub mod transport;
mod types;

pub use blob::UrlBlob;
pub use classify::{classify, detect};
pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use lines::LineReconstructor;
pub use manager::UrlBlobManager;
pub use metadata::{parse_content_range_total, parse_http_date, BlobMetadata};
pub use sync::{SyncUrlBlob, SyncUrlBlobManager};
pub use transport::{BlobRequest, BlobResponse, MemoryTransport, ReqwestTransport, Transport};
pub use types::{BlobContent, ByteRange, ByteStream, LineStream, Provider};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobConfig, BlobContent, BlobError, BlobMetadata, BlobResult, ByteRange, ByteStream,
        Provider, UrlBlob, UrlBlobManager,
    };
}
