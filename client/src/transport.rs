//! HTTP transport backed by `reqwest`.

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use mirror_engine::{Method, SyncRequest, SyncResponse, Transport, TransportError};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

/// Sends engine requests over HTTP.
///
/// Request URLs may be absolute or relative; relative URLs (including the
/// `next`/`prev` links a server returns) are resolved against the base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Build a transport with the configured base URL and timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request URL against the base URL.
    pub fn resolve(&self, url: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(url)
            .map_err(|e| TransportError::new(0, format!("invalid request url '{url}': {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn sync(&self, request: SyncRequest) -> std::result::Result<SyncResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        tracing::debug!(method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(http_method(request.method), url.clone())
            .header(CONTENT_TYPE, request.content_type.as_str())
            .header(ACCEPT, accept_for(&request.data_type));

        if let Some(body) = &request.body {
            if request.method.has_body() {
                let bytes = serde_json::to_vec(body)
                    .map_err(|e| TransportError::new(0, format!("failed to encode body: {e}")))?;
                builder = builder.body(bytes);
            }
        }

        let response = builder.send().await.map_err(from_reqwest)?;
        let status = response.status();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(from_reqwest)?;

        tracing::debug!(status = status.as_u16(), %url, bytes = text.len(), "received response");

        if !status.is_success() {
            return Err(TransportError::new(status.as_u16(), text));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else if request.data_type.eq_ignore_ascii_case("json") {
            serde_json::from_str(&text).map_err(|e| {
                TransportError::new(status.as_u16(), format!("invalid JSON body: {e}"))
            })?
        } else {
            Value::String(text)
        };

        Ok(SyncResponse { body, headers })
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Post => reqwest::Method::POST,
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn accept_for(data_type: &str) -> &'static str {
    match data_type.to_ascii_lowercase().as_str() {
        "json" => "application/json",
        "text" => "text/plain",
        "html" => "text/html",
        "xml" => "application/xml",
        _ => "*/*",
    }
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    let status = err.status().map_or(0, |s| s.as_u16());
    TransportError::new(status, err.to_string())
}
