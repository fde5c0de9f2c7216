use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobResult};

/// Provider-independent view of a blob's metadata.
///
/// Every field is optional: providers omit headers (a chunked response carries
/// no length, a proxy strips `Last-Modified`) and a malformed header value is
/// reported as absent rather than failing the call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
}

impl BlobMetadata {
    pub fn new(
        size: Option<u64>,
        content_type: Option<String>,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            size,
            content_type,
            last_modified,
        }
    }

    /// Object size in bytes
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn size_or_err(&self) -> BlobResult<u64> {
        self.size.ok_or_else(|| BlobError::missing_metadata("size"))
    }

    pub fn content_type_or_err(&self) -> BlobResult<&str> {
        self.content_type()
            .ok_or_else(|| BlobError::missing_metadata("content_type"))
    }

    pub fn last_modified_or_err(&self) -> BlobResult<DateTime<Utc>> {
        self.last_modified
            .ok_or_else(|| BlobError::missing_metadata("last_modified"))
    }

    /// True when the provider told us nothing at all
    pub fn is_empty(&self) -> bool {
        self.size.is_none() && self.content_type.is_none() && self.last_modified.is_none()
    }
}

// obsolete forms HTTP/1.1 recipients still accept (RFC 850, asctime)
const OBSOLETE_HTTP_DATES: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`); malformed values are absent.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    OBSOLETE_HTTP_DATES
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parse the total from a `Content-Range` value (`bytes 0-0/1234` or `bytes */1234`).
///
/// An unknown total (`bytes 0-9/*`) is absent.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
