//! Provider classification for presigned URLs.
//!
//! Classification looks only at the URL's host. An explicit hint always wins
//! over host detection, and anything unrecognized falls back to
//! [`Provider::Generic`], which speaks plain HTTP range/PUT semantics.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::{BlobResult, Provider};

static S3_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(^|\.)s3[.-]([a-z0-9-]+\.)*amazonaws\.com(\.cn)?$",
        r"|(^|\.)s3\.amazonaws\.com$",
        // Hetzner object storage speaks the S3 dialect
        r"|\.your-objectstorage\.com$",
    ))
    .expect("valid S3 host pattern")
});

static GCS_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\.)storage\.googleapis\.com$|(^|\.)storage\.cloud\.google\.com$")
        .expect("valid GCS host pattern")
});

static AZURE_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.blob\.core\.(windows\.net|chinacloudapi\.cn|usgovcloudapi\.net)$")
        .expect("valid Azure host pattern")
});

/// Resolve the provider for `url`, honoring an explicit hint token when given.
///
/// Fails with [`crate::BlobError::InvalidHint`] if the hint is not one of the
/// known tokens or aliases.
pub fn classify(url: &str, hint: Option<&str>) -> BlobResult<Provider> {
    match hint {
        Some(hint) => hint.parse(),
        None => Ok(detect(url)),
    }
}

/// Detect the provider from the URL's host alone
pub fn detect(url: &str) -> Provider {
    let host = match host_of(url) {
        Some(host) => host,
        None => return Provider::Generic,
    };

    if S3_HOSTS.is_match(&host) {
        Provider::S3
    } else if GCS_HOSTS.is_match(&host) {
        Provider::Gcs
    } else if AZURE_HOSTS.is_match(&host) {
        Provider::Azure
    } else {
        Provider::Generic
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlobError;

    const S3_URL: &str = "https://my-bucket.s3.eu-west-1.amazonaws.com/data/file.txt?X-Amz-Signature=abc";

    #[test]
    fn test_detects_s3_hosts() {
        for url in [
            S3_URL,
            "https://s3.amazonaws.com/my-bucket/key",
            "https://s3.us-east-2.amazonaws.com/my-bucket/key",
            "https://my-bucket.s3.amazonaws.com/key",
            "https://my-bucket.s3-us-west-2.amazonaws.com/key",
            "https://bucket.fsn1.your-objectstorage.com/key",
        ] {
            assert_eq!(detect(url), Provider::S3, "{}", url);
        }
    }

    #[test]
    fn test_detects_gcs_and_azure_hosts() {
        assert_eq!(
            detect("https://storage.googleapis.com/bucket/object?X-Goog-Signature=1"),
            Provider::Gcs
        );
        assert_eq!(detect("https://bucket.storage.googleapis.com/object"), Provider::Gcs);
        assert_eq!(detect("https://storage.cloud.google.com/bucket/object"), Provider::Gcs);
        assert_eq!(
            detect("https://account.blob.core.windows.net/container/blob?sv=2022-11-02&sig=x"),
            Provider::Azure
        );
    }

    #[test]
    fn test_unknown_hosts_are_generic() {
        assert_eq!(detect("https://example.com/file"), Provider::Generic);
        assert_eq!(detect("http://127.0.0.1:9000/bucket/key"), Provider::Generic);
        assert_eq!(detect("not a url"), Provider::Generic);
        // Provider names in the path or query do not count
        assert_eq!(
            detect("https://example.com/s3.amazonaws.com?next=blob.core.windows.net"),
            Provider::Generic
        );
    }

    #[test]
    fn test_hint_aliases_resolve_identically() {
        let a = classify(S3_URL, Some("aws_s3")).unwrap();
        let b = classify(S3_URL, Some("s3")).unwrap();
        let c = classify(S3_URL, Some("aws")).unwrap();
        assert_eq!(a, Provider::S3);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_hint_overrides_detection() {
        assert_eq!(classify(S3_URL, Some("azure")).unwrap(), Provider::Azure);
        assert_eq!(classify(S3_URL, Some("generic")).unwrap(), Provider::Generic);
        assert_eq!(classify("https://example.com/x", Some("google")).unwrap(), Provider::Gcs);
    }

    #[test]
    fn test_invalid_hint() {
        let err = classify(S3_URL, Some("dropbox")).unwrap_err();
        assert!(matches!(err, BlobError::InvalidHint { .. }));
    }

    #[test]
    fn test_classification_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(classify(S3_URL, None).unwrap(), Provider::S3);
        }
    }
}
