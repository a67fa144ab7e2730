//! HTTP dispatch: one fully materialized request in, one raw snapshot out.
//!
//! Status policy is accept-all. Any completed exchange, 4xx and 5xx
//! included, is a success here; only connection-level problems are errors.
//! The body is returned as received and never parsed.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use j5_core::config::HttpConfig;
use j5_core::{HeaderValue, Method, ResponseSnapshot};

use crate::error::{TransportError, TransportErrorKind};

/// A request with every template resolved and the body ready to send.
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: PreparedBody,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transfer-ready body.
#[derive(Debug)]
pub enum PreparedBody {
    Empty,
    /// Structured payload, serialised as `application/json`.
    Json(serde_json::Value),
    /// Sent byte-for-byte.
    Text(String),
    /// Form-encoded fields (`application/x-www-form-urlencoded`).
    Form(BTreeMap<String, String>),
    /// Multipart parts in declaration order. The encoder owns the
    /// `Content-Type` boundary header.
    Multipart(Vec<MultipartPart>),
}

#[derive(Debug)]
pub enum MultipartPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        file: tokio::fs::File,
    },
}

impl MultipartPart {
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Extension point for the wire layer.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: PreparedRequest) -> Result<ResponseSnapshot, TransportError>;
}

/// reqwest-backed dispatcher.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(TransportError::from)?;
        Ok(Self { client })
    }

    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(&HttpConfig::from_env())
    }

    fn build(&self, request: PreparedRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(to_reqwest_method(request.method), &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match request.body {
            PreparedBody::Empty => builder,
            PreparedBody::Json(value) => builder.json(&value),
            PreparedBody::Text(text) => builder.body(text),
            PreparedBody::Form(fields) => builder.form(&fields),
            PreparedBody::Multipart(parts) => builder.multipart(multipart_form(parts)),
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn multipart_form(parts: Vec<MultipartPart>) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            MultipartPart::Text { name, value } => form.text(name, value),
            MultipartPart::File { name, path, file } => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                let body = reqwest::Body::from(file);
                form.part(name, reqwest::multipart::Part::stream(body).file_name(file_name))
            }
        };
    }
    form
}

fn collect_headers(map: &reqwest::header::HeaderMap) -> BTreeMap<String, HeaderValue> {
    let mut out: BTreeMap<String, HeaderValue> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match out.get_mut(name.as_str()) {
            Some(existing) => existing.push(value),
            None => {
                out.insert(name.as_str().to_string(), HeaderValue::One(value));
            }
        }
    }
    out
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: PreparedRequest) -> Result<ResponseSnapshot, TransportError> {
        let method = request.method;
        let url = request.url.clone();
        tracing::debug!(%method, %url, "Dispatching request");

        let started = Instant::now();
        let response = self.build(request).send().await?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let bytes = response.bytes().await.map_err(|e| {
            let err = TransportError::from(e);
            TransportError::new(TransportErrorKind::Body, err.message)
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(%method, %url, status = status.as_u16(), elapsed_ms, "Response received");
        Ok(ResponseSnapshot {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            elapsed_ms,
        })
    }
}
