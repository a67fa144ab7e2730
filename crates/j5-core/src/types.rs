//! Request, response and result shapes shared across the pipeline.
//!
//! JSON field names follow the on-disk request files (camelCase, `type` as
//! the body discriminator).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Flat variable map. Keys are unique; ordering carries no meaning.
pub type EnvMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored request as authored by the user. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub method: Method,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: BodyDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_response_script: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Request body: the kind decides how `content` is interpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum BodyDescriptor {
    #[default]
    None,
    Json(#[serde(deserialize_with = "text_content")] String),
    FormData(FormFields),
    UrlEncoded(UrlEncodedContent),
    Raw(#[serde(deserialize_with = "text_content")] String),
}

impl BodyDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Json(_) => "json",
            Self::FormData(_) => "form-data",
            Self::UrlEncoded(_) => "url-encoded",
            Self::Raw(_) => "raw",
        }
    }
}

/// Accept either a string or any JSON value (re-serialised) as text content.
fn text_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Multipart fields in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct FormFields(pub Vec<FormField>);

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File { path: String },
}

impl FormFields {
    pub fn iter(&self) -> impl Iterator<Item = &FormField> {
        self.0.iter()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.0.push(FormField {
            name: name.to_string(),
            value: FormValue::Text(value.to_string()),
        });
        self
    }

    pub fn file(mut self, name: &str, path: &str) -> Self {
        self.0.push(FormField {
            name: name.to_string(),
            value: FormValue::File {
                path: path.to_string(),
            },
        });
        self
    }
}

impl From<Map<String, Value>> for FormFields {
    fn from(map: Map<String, Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Object(ref obj)
                        if obj.get("type").and_then(Value::as_str) == Some("file") =>
                    {
                        FormValue::File {
                            path: obj
                                .get("path")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        }
                    }
                    Value::String(s) => FormValue::Text(s),
                    Value::Null => FormValue::Text(String::new()),
                    other => FormValue::Text(other.to_string()),
                };
                FormField { name, value }
            })
            .collect();
        Self(fields)
    }
}

impl From<FormFields> for Map<String, Value> {
    fn from(fields: FormFields) -> Self {
        fields
            .0
            .into_iter()
            .map(|f| {
                let v = match f.value {
                    FormValue::Text(s) => Value::String(s),
                    FormValue::File { path } => {
                        serde_json::json!({ "type": "file", "path": path })
                    }
                };
                (f.name, v)
            })
            .collect()
    }
}

/// `application/x-www-form-urlencoded` content: a pre-encoded string or fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlEncodedContent {
    Text(String),
    Fields(BTreeMap<String, String>),
}

/// Header value as received; repeated headers keep every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

impl HeaderValue {
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(s) => Some(s),
            Self::Many(v) => v.first().map(String::as_str),
        }
    }

    pub fn push(&mut self, value: String) {
        match self {
            Self::One(existing) => {
                *self = Self::Many(vec![std::mem::take(existing), value]);
            }
            Self::Many(v) => v.push(value),
        }
    }
}

/// Raw snapshot of one completed HTTP exchange (any status code).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, HeaderValue>,
    /// Body text exactly as received; never parsed here.
    pub body: String,
    pub elapsed_ms: u64,
}

impl ResponseSnapshot {
    /// Case-insensitive header lookup returning the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
    }
}

/// Input and output of one sandbox invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptContext {
    pub environment: EnvMap,
    /// Absent for pre-request scripts.
    pub response: Option<ResponseSnapshot>,
}

impl ScriptContext {
    pub fn new(environment: EnvMap) -> Self {
        Self {
            environment,
            response: None,
        }
    }

    pub fn with_response(environment: EnvMap, response: ResponseSnapshot) -> Self {
        Self {
            environment,
            response: Some(response),
        }
    }
}

/// Outcome of one pipeline call. Exactly one of `response` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub environment: EnvMap,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(response: ResponseSnapshot, environment: EnvMap, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            environment,
            elapsed_ms,
        }
    }

    pub fn failed(error: impl Into<String>, environment: EnvMap, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            environment,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_descriptor_from_json() {
        let raw = json!({
            "id": "r1",
            "name": "Create user",
            "method": "POST",
            "url": "{{base}}/users",
            "headers": { "Content-Type": "application/json" },
            "params": {},
            "body": { "type": "json", "content": "{\"name\":\"{{user}}\"}" },
            "postResponseScript": "pm.environment.set('id', pm.response.json().id)"
        });
        let req: RequestDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body, BodyDescriptor::Json("{\"name\":\"{{user}}\"}".into()));
        assert!(req.pre_request_script.is_none());
        assert!(req.post_response_script.is_some());
    }

    #[test]
    fn test_missing_body_is_none() {
        let req: RequestDescriptor =
            serde_json::from_value(json!({ "method": "GET", "url": "http://x" })).unwrap();
        assert_eq!(req.body, BodyDescriptor::None);
        assert_eq!(req.body.kind(), "none");
    }

    #[test]
    fn test_json_body_object_content_is_stringified() {
        let body: BodyDescriptor =
            serde_json::from_value(json!({ "type": "json", "content": { "a": 1 } })).unwrap();
        assert_eq!(body, BodyDescriptor::Json("{\"a\":1}".into()));
    }

    #[test]
    fn test_form_fields_keep_declaration_order() {
        let body: BodyDescriptor = serde_json::from_value(json!({
            "type": "form-data",
            "content": {
                "zeta": "last-alpha",
                "upload": { "type": "file", "path": "/tmp/a.bin" },
                "alpha": 3
            }
        }))
        .unwrap();
        let BodyDescriptor::FormData(fields) = body else {
            panic!("expected form-data");
        };
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["zeta", "upload", "alpha"]);
        assert_eq!(
            fields.0[1].value,
            FormValue::File {
                path: "/tmp/a.bin".into()
            }
        );
        assert_eq!(fields.0[2].value, FormValue::Text("3".into()));
    }

    #[test]
    fn test_execution_result_serialization_omits_absent_fields() {
        let r = ExecutionResult::failed("boom", EnvMap::new(), 12);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "boom");
        assert_eq!(v["elapsedMs"], 12);
        assert!(v.get("response").is_none());
    }

    #[test]
    fn test_header_value_push_and_lookup() {
        let mut headers = BTreeMap::new();
        let mut v = HeaderValue::One("a=1".into());
        v.push("b=2".into());
        headers.insert("set-cookie".to_string(), v);
        let snap = ResponseSnapshot {
            status: 200,
            status_text: "OK".into(),
            headers,
            body: String::new(),
            elapsed_ms: 0,
        };
        assert_eq!(snap.header("Set-Cookie"), Some("a=1"));
        assert_eq!(
            snap.headers["set-cookie"],
            HeaderValue::Many(vec!["a=1".into(), "b=2".into()])
        );
    }
}
