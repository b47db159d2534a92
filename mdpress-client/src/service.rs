//! Export service boundary
//!
//! Three endpoints, all `POST` with a JSON body:
//! - `/export {markdown, title}` returns PDF bytes
//! - `/render-html {markdown, title}` returns `{html}`
//! - `/fetch-url {url}` returns `{markdown}`
//!
//! Failures carry `{error}` with a non-2xx status.

use serde::{Deserialize, Serialize};

use mdpress_core::Document;

/// Body of `/export` and `/render-html`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRequest {
    pub markdown: String,
    pub title: String,
}

impl ExportRequest {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            markdown: doc.text.clone(),
            title: doc.export_title().to_string(),
        }
    }
}

/// Body of `/fetch-url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub url: String,
}

/// Error body returned by the service
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
}

/// Why a service call failed
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// No response: connection refused, DNS failure, timeout
    #[error("export service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success status
    #[error("export service returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, message: Option<String> },

    /// The response body could not be read or decoded
    #[error("invalid response from export service: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Message supplied by the service, if any
    pub fn service_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected {
                message: Some(message),
                ..
            } if !message.is_empty() => Some(message),
            _ => None,
        }
    }
}

/// The remote export service
pub trait ExportService {
    /// `POST /export`: PDF bytes
    fn export_pdf(&self, request: &ExportRequest) -> Result<Vec<u8>, ServiceError>;
    /// `POST /render-html`: a standalone HTML page
    fn render_html(&self, request: &ExportRequest) -> Result<String, ServiceError>;
    /// `POST /fetch-url`: Markdown text, empty when the service returned none
    fn fetch_url(&self, url: &str) -> Result<String, ServiceError>;
}

#[cfg(feature = "http")]
pub use http::HttpExportService;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use anyhow::Context;
    use log::{debug, info};
    use reqwest::blocking::{Client, Response};
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use super::*;
    use mdpress_core::config::ServiceConfig;

    #[derive(Debug, Deserialize)]
    struct HtmlBody {
        #[serde(default)]
        html: String,
    }

    #[derive(Debug, Deserialize)]
    struct MarkdownBody {
        #[serde(default)]
        markdown: Option<String>,
    }

    /// [`ExportService`] over HTTP with a blocking reqwest client
    #[derive(Debug, Clone)]
    pub struct HttpExportService {
        client: Client,
        base_url: String,
    }

    impl HttpExportService {
        pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?;
            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        }

        pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
            Self::new(&config.base_url, config.timeout())
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<Response, ServiceError> {
            let url = format!("{}{endpoint}", self.base_url);
            info!("service: POST {url}");
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .map_err(|e| ServiceError::Unreachable(e.to_string()))?;

            let status = response.status();
            debug!("service: {endpoint} answered {status}");
            if status.is_success() {
                return Ok(response);
            }

            // The error body is optional; anything unreadable counts as absent
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .unwrap_or_default()
                .error;
            Err(ServiceError::Rejected {
                status: status.as_u16(),
                message,
            })
        }

        fn post_json<B: Serialize, T: DeserializeOwned>(
            &self,
            endpoint: &str,
            body: &B,
        ) -> Result<T, ServiceError> {
            let text = self
                .post(endpoint, body)?
                .text()
                .map_err(|e| ServiceError::Decode(e.to_string()))?;
            serde_json::from_str(&text).map_err(|e| ServiceError::Decode(e.to_string()))
        }
    }

    impl ExportService for HttpExportService {
        fn export_pdf(&self, request: &ExportRequest) -> Result<Vec<u8>, ServiceError> {
            let bytes = self
                .post("/export", request)?
                .bytes()
                .map_err(|e| ServiceError::Decode(e.to_string()))?;
            Ok(bytes.to_vec())
        }

        fn render_html(&self, request: &ExportRequest) -> Result<String, ServiceError> {
            let body: HtmlBody = self.post_json("/render-html", request)?;
            Ok(body.html)
        }

        fn fetch_url(&self, url: &str) -> Result<String, ServiceError> {
            let request = FetchRequest {
                url: url.to_string(),
            };
            let body: MarkdownBody = self.post_json("/fetch-url", &request)?;
            Ok(body.markdown.unwrap_or_default())
        }
    }
}
