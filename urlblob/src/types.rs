use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::ops::{Range, RangeFrom, RangeInclusive};
use std::pin::Pin;
use std::str::FromStr;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Stream of decoded text lines
pub type LineStream = Pin<Box<dyn Stream<Item = BlobResult<String>> + Send>>;

/// Object-storage provider family behind a presigned URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    S3,
    #[serde(rename = "gcp")]
    Gcs,
    Azure,
    Generic,
}

impl Provider {
    /// All variants, in classification order
    pub const ALL: [Provider; 4] = [Provider::S3, Provider::Gcs, Provider::Azure, Provider::Generic];

    /// Canonical hint token for this provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::Gcs => "gcp",
            Provider::Azure => "azure",
            Provider::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "aws" | "aws_s3" => Ok(Provider::S3),
            "gcp" | "gcs" | "google" => Ok(Provider::Gcs),
            "azure" | "az" | "windows" => Ok(Provider::Azure),
            "generic" => Ok(Provider::Generic),
            _ => Err(BlobError::invalid_hint(s)),
        }
    }
}

/// Inclusive byte range for partial content requests.
///
/// Three shapes are representable:
/// - `start` and `end`: bytes `start..=end`
/// - `start` only: from `start` to the end of the object
/// - `end` only: the last `end` bytes (suffix length)
///
/// Exclusive spans (`a..b`) must go through [`ByteRange::from_exclusive`] or the
/// `TryFrom<Range<u64>>` impl, which subtract one from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: Option<u64>,
    end: Option<u64>,
}

impl ByteRange {
    /// Bytes `0..=0`
    pub const FIRST_BYTE: ByteRange = ByteRange {
        start: Some(0),
        end: Some(0),
    };

    /// Absolute range, both ends inclusive
    pub fn new(start: u64, end: u64) -> BlobResult<Self> {
        if start > end {
            return Err(BlobError::invalid_range(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    /// From `start` to the end of the object
    pub fn from_start(start: u64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// The last `length` bytes of the object
    pub fn suffix(length: u64) -> BlobResult<Self> {
        if length == 0 {
            return Err(BlobError::invalid_range("suffix length must be positive"));
        }
        Ok(Self {
            start: None,
            end: Some(length),
        })
    }

    /// Build from optional inclusive bounds, as the `--start/--end` options supply them.
    ///
    /// Returns `Ok(None)` when both bounds are absent. An end without a start means
    /// bytes `0..=end`, not a suffix.
    pub fn from_bounds(start: Option<u64>, end: Option<u64>) -> BlobResult<Option<Self>> {
        match (start, end) {
            (None, None) => Ok(None),
            (Some(start), None) => Ok(Some(Self::from_start(start))),
            (start, Some(end)) => Self::new(start.unwrap_or(0), end).map(Some),
        }
    }

    /// Translate an end-exclusive span into the inclusive form
    pub fn from_exclusive(range: Range<u64>) -> BlobResult<Self> {
        if range.end <= range.start {
            return Err(BlobError::invalid_range(format!(
                "empty span {}..{}",
                range.start, range.end
            )));
        }
        Self::new(range.start, range.end - 1)
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn is_suffix(&self) -> bool {
        self.start.is_none()
    }

    /// Value of an HTTP `Range` (or `x-ms-range`) header, e.g. `bytes=0-1023`
    pub fn header_value(&self) -> String {
        match (self.start, self.end) {
            (Some(start), Some(end)) => format!("bytes={}-{}", start, end),
            (Some(start), None) => format!("bytes={}-", start),
            (None, Some(length)) => format!("bytes=-{}", length),
            // Unreachable through the constructors
            (None, None) => "bytes=0-".to_string(),
        }
    }

    /// Number of bytes this range selects in an object of `total_size` bytes
    pub fn length(&self, total_size: u64) -> u64 {
        self.resolve(total_size)
            .map_or(0, |(first, last)| last - first + 1)
    }

    /// Absolute `(first, last)` offsets within an object of `total_size` bytes,
    /// or `None` if the range is unsatisfiable.
    pub fn resolve(&self, total_size: u64) -> Option<(u64, u64)> {
        if total_size == 0 {
            return None;
        }
        let last_byte = total_size - 1;
        match (self.start, self.end) {
            (Some(start), end) => {
                if start > last_byte {
                    return None;
                }
                Some((start, end.map_or(last_byte, |e| e.min(last_byte))))
            }
            (None, Some(length)) => Some((total_size.saturating_sub(length), last_byte)),
            (None, None) => Some((0, last_byte)),
        }
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, "{}-{}", start, end),
            (Some(start), None) => write!(f, "{}-", start),
            (None, Some(length)) => write!(f, "-{}", length),
            (None, None) => f.write_str("-"),
        }
    }
}

/// CLI range syntax: `START-END`, `START-`, `-N` (last N bytes) or bare `START`.
/// Every bound is inclusive.
impl FromStr for ByteRange {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| BlobError::invalid_range(format!("invalid range format: {}", s)))
        };

        match s.split_once('-') {
            None => Ok(Self::from_start(parse(s)?)),
            Some(("", "")) => Err(BlobError::invalid_range(format!("invalid range format: {}", s))),
            Some(("", length)) => Self::suffix(parse(length)?),
            Some((start, "")) => Ok(Self::from_start(parse(start)?)),
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
        }
    }
}

impl TryFrom<Range<u64>> for ByteRange {
    type Error = BlobError;

    fn try_from(range: Range<u64>) -> Result<Self, Self::Error> {
        Self::from_exclusive(range)
    }
}

impl TryFrom<RangeInclusive<u64>> for ByteRange {
    type Error = BlobError;

    fn try_from(range: RangeInclusive<u64>) -> Result<Self, Self::Error> {
        Self::new(*range.start(), *range.end())
    }
}

impl From<RangeFrom<u64>> for ByteRange {
    fn from(range: RangeFrom<u64>) -> Self {
        Self::from_start(range.start)
    }
}

/// Body of an upload: a buffer already in memory, or a lazy sequence of chunks
pub enum BlobContent {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl BlobContent {
    /// Known length, when the content is buffered
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            BlobContent::Bytes(bytes) => Some(bytes.len() as u64),
            BlobContent::Stream(_) => None,
        }
    }

    /// Convert into a chunk stream for the transport
    pub fn into_stream(self) -> ByteStream {
        match self {
            BlobContent::Bytes(bytes) => {
                Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(bytes) }))
            }
            BlobContent::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for BlobContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            BlobContent::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for BlobContent {
    fn from(bytes: Bytes) -> Self {
        BlobContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlobContent {
    fn from(bytes: Vec<u8>) -> Self {
        BlobContent::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for BlobContent {
    fn from(bytes: &'static [u8]) -> Self {
        BlobContent::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for BlobContent {
    fn from(text: String) -> Self {
        BlobContent::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for BlobContent {
    fn from(text: &'static str) -> Self {
        BlobContent::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<ByteStream> for BlobContent {
    fn from(stream: ByteStream) -> Self {
        BlobContent::Stream(stream)
    }
}
