use super::ProviderAdapter;
use crate::Provider;

/// Google Cloud Storage XML API
#[derive(Debug, Clone, Copy, Default)]
pub struct GcsAdapter;

impl ProviderAdapter for GcsAdapter {
    fn provider(&self) -> Provider {
        Provider::Gcs
    }

    /// Decompressive transcoding drops `Content-Length`; the stored size is still sent.
    fn size_headers(&self) -> &'static [&'static str] {
        &["content-length", "x-goog-stored-content-length"]
    }
}
