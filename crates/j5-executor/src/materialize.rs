//! Variable resolution and body materialization (pipeline steps 3 and 4).
//!
//! All kind-specific body handling lives here. The two absorbed failure
//! modes, malformed JSON and unreadable form-data files, are explicit enum
//! branches that are logged rather than swallowed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use j5_core::resolver::{resolve, resolve_map};
use j5_core::{BodyDescriptor, EnvMap, FormField, FormFields, FormValue, Method, RequestDescriptor, UrlEncodedContent};

use crate::dispatch::{MultipartPart, PreparedBody, PreparedRequest};

const CONTENT_TYPE: &str = "Content-Type";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Request after step 3: url, headers, query and text bodies resolved.
/// Form-data fields are resolved during materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: BodyDescriptor,
}

pub fn resolve_request(request: &RequestDescriptor, vars: &EnvMap) -> ResolvedRequest {
    let body = match &request.body {
        BodyDescriptor::Json(content) => BodyDescriptor::Json(resolve(content, vars)),
        BodyDescriptor::Raw(content) => BodyDescriptor::Raw(resolve(content, vars)),
        BodyDescriptor::UrlEncoded(UrlEncodedContent::Text(content)) => {
            BodyDescriptor::UrlEncoded(UrlEncodedContent::Text(resolve(content, vars)))
        }
        BodyDescriptor::UrlEncoded(UrlEncodedContent::Fields(fields)) => {
            BodyDescriptor::UrlEncoded(UrlEncodedContent::Fields(resolve_map(fields, vars)))
        }
        other => other.clone(),
    };
    ResolvedRequest {
        method: request.method,
        url: resolve(&request.url, vars),
        headers: resolve_map(&request.headers, vars),
        query: resolve_map(&request.params, vars),
        body,
    }
}

/// Outcome of interpreting a resolved `json` body.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBody {
    Parsed(serde_json::Value),
    /// Content was not valid JSON; sent as the resolved string.
    Fallback(String),
}

pub fn materialize_json(content: String) -> JsonBody {
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => JsonBody::Parsed(value),
        Err(e) => {
            tracing::warn!(error = %e, "JSON body is not valid JSON; sending it as raw text");
            JsonBody::Fallback(content)
        }
    }
}

/// Outcome of one form-data field.
#[derive(Debug)]
pub enum FormFieldOutcome {
    Included(MultipartPart),
    Omitted { name: String, reason: String },
}

pub async fn materialize_form_field(field: &FormField, vars: &EnvMap) -> FormFieldOutcome {
    match &field.value {
        FormValue::Text(value) => FormFieldOutcome::Included(MultipartPart::Text {
            name: field.name.clone(),
            value: resolve(value, vars),
        }),
        FormValue::File { path } => {
            let resolved = resolve(path, vars);
            if resolved.trim().is_empty() {
                return FormFieldOutcome::Omitted {
                    name: field.name.clone(),
                    reason: "no file path".to_string(),
                };
            }
            match open_regular_file(&resolved).await {
                Ok(file) => FormFieldOutcome::Included(MultipartPart::File {
                    name: field.name.clone(),
                    path: PathBuf::from(resolved),
                    file,
                }),
                Err(reason) => FormFieldOutcome::Omitted {
                    name: field.name.clone(),
                    reason: format!("{}: {}", resolved, reason),
                },
            }
        }
    }
}

async fn open_regular_file(path: &str) -> Result<tokio::fs::File, String> {
    let file = tokio::fs::File::open(path).await.map_err(|e| e.to_string())?;
    let meta = file.metadata().await.map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Err("not a regular file".to_string());
    }
    Ok(file)
}

async fn materialize_form(fields: &FormFields, vars: &EnvMap) -> Vec<MultipartPart> {
    let mut parts = Vec::with_capacity(fields.0.len());
    for field in fields.iter() {
        match materialize_form_field(field, vars).await {
            FormFieldOutcome::Included(part) => parts.push(part),
            FormFieldOutcome::Omitted { name, reason } => {
                tracing::warn!(field = %name, %reason, "Omitting unreadable form-data file field");
            }
        }
    }
    parts
}

fn remove_header(headers: &mut BTreeMap<String, String>, name: &str) -> Option<String> {
    let key = headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .cloned()?;
    headers.remove(&key)
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Step 4: turn the resolved body into a transfer-ready one.
pub async fn materialize(resolved: ResolvedRequest, vars: &EnvMap) -> PreparedRequest {
    let ResolvedRequest {
        method,
        url,
        mut headers,
        query,
        body,
    } = resolved;

    let body = match body {
        BodyDescriptor::None => PreparedBody::Empty,
        BodyDescriptor::Json(content) => match materialize_json(content) {
            JsonBody::Parsed(value) => PreparedBody::Json(value),
            JsonBody::Fallback(text) => PreparedBody::Text(text),
        },
        BodyDescriptor::Raw(content) => PreparedBody::Text(content),
        BodyDescriptor::UrlEncoded(UrlEncodedContent::Text(content)) => {
            if !has_header(&headers, CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE.to_string(), FORM_URLENCODED.to_string());
            }
            PreparedBody::Text(content)
        }
        BodyDescriptor::UrlEncoded(UrlEncodedContent::Fields(fields)) => {
            remove_header(&mut headers, CONTENT_TYPE);
            PreparedBody::Form(fields)
        }
        BodyDescriptor::FormData(fields) => {
            // The multipart encoder supplies its own boundary header.
            if let Some(previous) = remove_header(&mut headers, CONTENT_TYPE) {
                tracing::debug!(%previous, "Dropping caller Content-Type for multipart body");
            }
            PreparedBody::Multipart(materialize_form(&fields, vars).await)
        }
    };

    PreparedRequest {
        method,
        url,
        headers,
        query,
        body,
    }
}
