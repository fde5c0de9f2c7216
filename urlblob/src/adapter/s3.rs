use super::ProviderAdapter;
use crate::Provider;

/// Amazon S3 and S3-compatible stores (Hetzner, MinIO behind an AWS-style host).
///
/// Standard `Range` syntax and `Content-Length`; errors are XML documents with
/// `Code` and `Message`, which the trait defaults already read.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Adapter;

impl ProviderAdapter for S3Adapter {
    fn provider(&self) -> Provider {
        Provider::S3
    }
}
