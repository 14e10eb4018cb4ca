//! HTTP client for the external PDF rendering service.
//!
//! The service takes a tagged document as JSON and answers with the URL of
//! the stored PDF:
//!
//! ```text
//! POST {endpoint}
//! { "kind": "invoice", "document": { ...invoice fields... } }
//!
//! 200 OK
//! { "url": "https://files.example.com/INV-2026-00001.pdf" }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use encore_core::document::FinancialDocument;
use encore_finance::{PdfRenderer, RenderError};

#[derive(Debug, Deserialize)]
struct RenderResponse {
    url: String,
}

pub struct HttpPdfRenderer {
    client: Client,
    endpoint: String,
}

impl HttpPdfRenderer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpPdfRenderer {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// Server errors, throttling and request timeouts may clear on retry. Any
/// other rejection means the document itself is unacceptable.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl PdfRenderer for HttpPdfRenderer {
    async fn render(&self, document: &FinancialDocument) -> Result<String, RenderError> {
        debug!(document = %document.reference(), endpoint = %self.endpoint, "Sending render request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(document)
            .send()
            .await
            .map_err(|e| RenderError::transient(format!("render service unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("render service returned {}: {}", status, body);
            return Err(if is_retryable(status) {
                RenderError::transient(message)
            } else {
                RenderError::permanent(message)
            });
        }

        let parsed: RenderResponse = response
            .json()
            .await
            .map_err(|e| RenderError::permanent(format!("malformed render response: {}", e)))?;

        if parsed.url.trim().is_empty() {
            return Err(RenderError::permanent("render service returned an empty URL"));
        }
        Ok(parsed.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn test_response_shape() {
        let parsed: RenderResponse =
            serde_json::from_str(r#"{"url":"https://files.test/REC-2026-00001.pdf"}"#).unwrap();
        assert_eq!(parsed.url, "https://files.test/REC-2026-00001.pdf");
    }
}
