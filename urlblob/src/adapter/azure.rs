use super::{classify_status, xml_element, ProviderAdapter};
use crate::{BlobError, Provider};

/// Azure Blob Storage with a SAS token.
///
/// Ranges travel in `x-ms-range`, which every service version honors for
/// partial content, and a PUT must say which kind of blob it creates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureAdapter;

impl ProviderAdapter for AzureAdapter {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    fn range_header(&self) -> &'static str {
        "x-ms-range"
    }

    fn put_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("x-ms-blob-type", "BlockBlob")]
    }

    fn parse_error(&self, status: u16, body: &[u8]) -> BlobError {
        let text = String::from_utf8_lossy(body).into_owned();
        let code = xml_element(&text, "Code");
        let message = match (
            xml_element(&text, "Message"),
            xml_element(&text, "AuthenticationErrorDetail"),
        ) {
            (Some(message), Some(detail)) => Some(format!("{} ({})", message, detail)),
            (message, detail) => message.or(detail),
        };
        classify_status(Provider::Azure, status, code, message, text)
    }
}
