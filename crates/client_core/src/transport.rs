//! Remote collaborator of a list view: collection fetches and row actions.

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, Method, RequestBuilder};
use serde_json::Value;
use shared::{domain::Row, protocol::ServerErrorBody};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub method: HttpMethod,
    pub path: String,
    /// Row key appended as one percent-encoded path segment.
    pub segment: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[async_trait]
pub trait ListTransport: Send + Sync {
    async fn fetch_collection(&self, request: &CollectionRequest) -> Result<Vec<Row>, FetchError>;
    async fn invoke(&self, request: &ActionRequest) -> Result<Value, FetchError>;
}

/// reqwest-backed transport bound to one API base URL.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: Url, http: Client) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `path` to the base URL, keeping any path prefix the base has.
    /// `segment` is pushed as a single encoded segment, so `/`, `?` and `#`
    /// in a row key stay part of the key.
    pub fn endpoint_url(
        &self,
        path: &str,
        segment: Option<&str>,
        query: &[(String, String)],
    ) -> Result<Url, FetchError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|err| FetchError::InvalidRequest(format!("{path}: {err}")))?;
        if let Some(segment) = segment {
            url.path_segments_mut()
                .map_err(|()| FetchError::InvalidRequest(format!("{path}: not a hierarchical url")))?
                .pop_if_empty()
                .push(segment);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, FetchError> {
        let response = builder.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        if !status.is_success() {
            // The status is the error; an unreadable body only loses the text.
            let message = match response.bytes().await {
                Ok(body) => serde_json::from_slice::<ServerErrorBody>(&body)
                    .ok()
                    .and_then(|parsed| parsed.reason().map(str::to_string)),
                Err(err) => {
                    debug!(%status, error = %err, "http: error body unreadable");
                    None
                }
            };
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|err| FetchError::InvalidPayload(err.to_string()))
    }
}

#[async_trait]
impl ListTransport for HttpTransport {
    async fn fetch_collection(&self, request: &CollectionRequest) -> Result<Vec<Row>, FetchError> {
        let url = self.endpoint_url(&request.path, None, &request.query)?;
        debug!(%url, "http: fetching collection");
        let body = self.send(self.http.get(url)).await?;
        rows_from_value(body)
    }

    async fn invoke(&self, request: &ActionRequest) -> Result<Value, FetchError> {
        let url =
            self.endpoint_url(&request.path, request.segment.as_deref(), &request.query)?;
        debug!(%url, method = ?request.method, "http: invoking action");
        let mut builder = self.http.request(request.method.into(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        self.send(builder).await
    }
}

/// A null body is an empty collection; anything but an array of objects is
/// rejected.
pub fn rows_from_value(body: Value) -> Result<Vec<Row>, FetchError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(fields) => Ok(Row::from_fields(fields)),
                other => Err(FetchError::InvalidPayload(format!(
                    "element {index} is not an object: {other}"
                ))),
            })
            .collect(),
        other => Err(FetchError::InvalidPayload(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
