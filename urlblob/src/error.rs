use thiserror::Error;

use crate::Provider;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid URL type: {hint}. Valid types: s3, gcp, azure, generic")]
    InvalidHint { hint: String },

    #[error("Invalid byte range: {message}")]
    InvalidRange { message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("{} (not found)", describe(.status, .code, .message, .body))]
    NotFound {
        provider: Provider,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        body: String,
    },

    #[error("{} (rejected by {provider})", describe(.status, .code, .message, .body))]
    RequestRejected {
        provider: Provider,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        body: String,
    },

    #[error("{} ({provider} server error)", describe(.status, .code, .message, .body))]
    ProviderError {
        provider: Provider,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        body: String,
    },

    #[error("Metadata field not present: {field}")]
    MissingMetadata { field: &'static str },

    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

fn describe(status: &u16, code: &Option<String>, message: &Option<String>, body: &str) -> String {
    match (code.as_deref(), message.as_deref()) {
        (Some(code), Some(message)) => format!("HTTP {}: {}: {}", status, code, message),
        (None, Some(message)) => format!("HTTP {}: {}", status, message),
        (Some(code), None) => format!("HTTP {}: {}", status, code),
        (None, None) if !body.trim().is_empty() => format!("HTTP {}: {}", status, body.trim()),
        (None, None) => format!("HTTP {}", status),
    }
}

impl BlobError {
    /// Create a transport error from any error type
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(error),
        }
    }

    /// Create an invalid provider hint error
    pub fn invalid_hint<S: Into<String>>(hint: S) -> Self {
        Self::InvalidHint { hint: hint.into() }
    }

    /// Create an invalid range error
    pub fn invalid_range<S: Into<String>>(message: S) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url<U: Into<String>, S: Into<String>>(url: U, message: S) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a missing metadata error
    pub fn missing_metadata(field: &'static str) -> Self {
        Self::MissingMetadata { field }
    }

    /// Classify a non-success HTTP status into the matching error kind.
    ///
    /// Returns `None` for statuses outside the 4xx/5xx families.
    pub fn from_status(
        provider: Provider,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        body: String,
    ) -> Option<Self> {
        match status {
            404 => Some(Self::NotFound { provider, status, code, message, body }),
            400..=499 => Some(Self::RequestRejected { provider, status, code, message, body }),
            500..=599 => Some(Self::ProviderError { provider, status, code, message, body }),
            _ => None,
        }
    }

    /// Only provider-side (5xx) failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderError { .. })
    }

    /// Local validation failures that the caller must fix before trying again
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHint { .. } | Self::InvalidRange { .. } | Self::InvalidUrl { .. }
        )
    }

    /// HTTP status reported by the provider, if the error came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { status, .. }
            | Self::RequestRejected { status, .. }
            | Self::ProviderError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider error code (e.g. `NoSuchKey`, `AuthenticationFailed`), when one was sent
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::NotFound { code, .. }
            | Self::RequestRejected { code, .. }
            | Self::ProviderError { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let not_found = BlobError::from_status(Provider::S3, 404, None, None, String::new()).unwrap();
        assert!(matches!(not_found, BlobError::NotFound { .. }));

        let forbidden = BlobError::from_status(Provider::S3, 403, None, None, String::new()).unwrap();
        assert!(matches!(forbidden, BlobError::RequestRejected { status: 403, .. }));
        assert!(!forbidden.is_retryable());

        let unavailable = BlobError::from_status(Provider::Gcs, 503, None, None, String::new()).unwrap();
        assert!(matches!(unavailable, BlobError::ProviderError { .. }));
        assert!(unavailable.is_retryable());

        assert!(BlobError::from_status(Provider::Generic, 206, None, None, String::new()).is_none());
    }

    #[test]
    fn test_display_prefers_code_and_message() {
        let err = BlobError::from_status(
            Provider::S3,
            403,
            Some("AccessDenied".to_string()),
            Some("Request has expired".to_string()),
            "<Error/>".to_string(),
        )
        .unwrap();
        assert_eq!(err.to_string(), "HTTP 403: AccessDenied: Request has expired (rejected by s3)");

        let raw = BlobError::from_status(Provider::Generic, 500, None, None, " boom \n".to_string()).unwrap();
        assert_eq!(raw.to_string(), "HTTP 500: boom (generic server error)");
    }

    #[test]
    fn test_usage_errors() {
        assert!(BlobError::invalid_hint("dropbox").is_usage_error());
        assert!(BlobError::invalid_range("start > end").is_usage_error());
        assert!(!BlobError::missing_metadata("size").is_usage_error());
    }
}
