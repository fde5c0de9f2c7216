use super::{classify_status, ProviderAdapter};
use crate::{BlobError, Provider};

/// Any other HTTP server: plain range/PUT semantics, no header translation
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

impl ProviderAdapter for GenericAdapter {
    fn provider(&self) -> Provider {
        Provider::Generic
    }

    /// No error document format to rely on; keep the body as diagnostic text.
    fn parse_error(&self, status: u16, body: &[u8]) -> BlobError {
        let text = String::from_utf8_lossy(body).into_owned();
        classify_status(Provider::Generic, status, None, None, text)
    }
}
