//! The pluggable transport seam.
//!
//! Models and collections never talk to the network themselves. They assemble
//! a [`SyncRequest`] and hand it to a [`Transport`], which resolves to either a
//! parsed [`SyncResponse`] or a [`TransportError`]. The engine performs no
//! retries; retry policy belongs to the transport.

use crate::error::TransportError;
use crate::{lock, Method};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_DATA_TYPE: &str = "json";

/// A fully assembled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub url: String,
    pub method: Method,
    pub content_type: String,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A successful response: parsed body plus response headers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncResponse {
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

impl SyncResponse {
    /// A response with the given JSON body and no headers.
    pub fn json(body: Value) -> Self {
        Self {
            body,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup; the first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends requests on behalf of models and collections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, TransportError>;
}

/// Per-call overrides of the request a model or collection would build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pub url: Option<String>,
    /// HTTP method or CRUD action name, resolved with [`Method::resolve`].
    pub verb: Option<String>,
    pub content_type: Option<String>,
    pub data_type: Option<String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = Some(verb.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Build the request, with these overrides applied over the defaults.
    pub(crate) fn assemble(
        &self,
        url: String,
        verb: &str,
        body: Option<Value>,
    ) -> crate::Result<SyncRequest> {
        let method = Method::resolve(self.verb.as_deref().unwrap_or(verb))?;
        Ok(SyncRequest {
            url: self.url.clone().unwrap_or(url),
            method,
            content_type: self
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            data_type: self
                .data_type
                .clone()
                .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string()),
            body,
        })
    }
}

/// In-memory transport that answers from a queue of scripted responses and
/// records every request it receives.
///
/// Useful for tests and for running models offline against canned data. When
/// the queue is empty, requests fail with status 503.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: Mutex<VecDeque<Result<SyncResponse, TransportError>>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push_response(&self, response: SyncResponse) {
        lock::lock(&self.responses).push_back(Ok(response));
    }

    /// Queue a JSON body with no headers.
    pub fn push_json(&self, body: Value) {
        self.push_response(SyncResponse::json(body));
    }

    /// Queue a failure.
    pub fn push_error(&self, status: u16, message: impl Into<String>) {
        lock::lock(&self.responses).push_back(Err(TransportError::new(status, message)));
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<SyncRequest> {
        lock::lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock::lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<SyncRequest> {
        lock::lock(&self.requests).last().cloned()
    }

    /// Number of scripted responses not yet consumed.
    pub fn pending(&self) -> usize {
        lock::lock(&self.responses).len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        lock::lock(&self.requests).push(request);
        lock::lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new(503, "no response queued")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_ignores_case() {
        let response = SyncResponse::json(json!({})).with_header("Link", "<a>; rel=\"next\"");
        assert_eq!(response.header("link"), Some("<a>; rel=\"next\""));
        assert_eq!(response.header("LINK"), Some("<a>; rel=\"next\""));
        assert_eq!(response.header("X-Total"), None);
    }

    #[test]
    fn assemble_applies_overrides() {
        let params = RequestParams::new().verb("post").content_type("text/plain");
        let request = params
            .assemble("/items".into(), "read", Some(json!({"a": 1})))
            .unwrap();

        assert_eq!(request.url, "/items");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.content_type, "text/plain");
        assert_eq!(request.data_type, "json");
        assert_eq!(request.body, Some(json!({"a": 1})));
    }

    #[test]
    fn assemble_rejects_unknown_verb() {
        let params = RequestParams::new().verb("upsert");
        let err = params.assemble("/items".into(), "read", None).unwrap_err();
        assert_eq!(err, crate::Error::UnknownVerb("upsert".into()));
    }

    #[tokio::test]
    async fn memory_transport_replays_in_order() {
        let transport = MemoryTransport::new();
        transport.push_json(json!({"n": 1}));
        transport.push_error(500, "boom");

        let request = RequestParams::new()
            .assemble("/a".into(), "read", None)
            .unwrap();

        let first = transport.sync(request.clone()).await.unwrap();
        assert_eq!(first.body, json!({"n": 1}));

        let second = transport.sync(request.clone()).await.unwrap_err();
        assert_eq!(second, TransportError::new(500, "boom"));

        let third = transport.sync(request).await.unwrap_err();
        assert_eq!(third.status, 503);

        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.pending(), 0);
    }
}
