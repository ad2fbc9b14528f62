//! Event envelope construction (spec §4.4.2, wire shape §6.3)
//!
//! Builds a request-proxy-style document from the inbound request, route
//! match, and authenticated subject. Grounded on the teacher's
//! `router/mod.rs` request-to-domain-struct conversions, generalised from a
//! handful of named fields to the full proxy envelope.

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct Identity {
    #[serde(rename = "sourceIp")]
    pub source_ip: String,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Authorizer {
    pub claims: HashMap<String, String>,
    /// The conventional subject claim, duplicated at the top level of the
    /// `authorizer` block under its own alias (spec §4.4.2).
    #[serde(rename = "principalId")]
    pub principal_id: String,
}

#[derive(Debug, Serialize)]
pub struct RequestContext {
    pub identity: Identity,
    pub authorizer: Authorizer,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub stage: String,
    pub protocol: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    pub resource: String,
    pub path: String,
    #[serde(rename = "httpMethod")]
    pub http_method: String,
    pub headers: HashMap<String, String>,
    #[serde(rename = "multiValueHeaders")]
    pub multi_value_headers: HashMap<String, Vec<String>>,
    #[serde(rename = "queryStringParameters")]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(rename = "multiValueQueryStringParameters")]
    pub multi_value_query_string_parameters: HashMap<String, Vec<String>>,
    #[serde(rename = "pathParameters")]
    pub path_parameters: HashMap<String, String>,
    #[serde(rename = "requestContext")]
    pub request_context: RequestContext,
    pub body: Option<String>,
    #[serde(rename = "isBase64Encoded")]
    pub is_base64_encoded: bool,
}

pub struct EventInput<'a> {
    pub method: &'a Method,
    pub raw_path: &'a str,
    pub matched_pattern: &'a str,
    pub headers: &'a HeaderMap,
    pub query: &'a str,
    pub path_parameters: HashMap<String, String>,
    pub body: &'a [u8],
    pub source_ip: String,
    pub subject: String,
    pub stage: String,
    pub protocol: String,
}

/// Body is base64 when `Content-Encoding` suggests compression or UTF-8
/// decode fails (spec §4.4.2); `isBase64Encoded` records which.
pub fn build_event(input: EventInput<'_>) -> EventEnvelope {
    let (headers, multi_value_headers) = flatten_headers(input.headers);
    let (query_string_parameters, multi_value_query_string_parameters) = parse_query(input.query);

    let is_compressed = input
        .headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.is_empty() && !v.eq_ignore_ascii_case("identity"))
        .unwrap_or(false);

    let (body, is_base64_encoded) = if input.body.is_empty() {
        (None, false)
    } else if is_compressed {
        (Some(base64::engine::general_purpose::STANDARD.encode(input.body)), true)
    } else {
        match std::str::from_utf8(input.body) {
            Ok(s) => (Some(s.to_string()), false),
            Err(_) => (
                Some(base64::engine::general_purpose::STANDARD.encode(input.body)),
                true,
            ),
        }
    };

    let mut claims = HashMap::new();
    claims.insert("sub".to_string(), input.subject.clone());

    EventEnvelope {
        resource: input.matched_pattern.to_string(),
        path: input.raw_path.to_string(),
        http_method: input.method.as_str().to_string(),
        headers,
        multi_value_headers,
        query_string_parameters,
        multi_value_query_string_parameters,
        path_parameters: input.path_parameters,
        request_context: RequestContext {
            identity: Identity {
                source_ip: input.source_ip,
                user_agent: input
                    .headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string()),
            },
            authorizer: Authorizer {
                claims,
                principal_id: input.subject,
            },
            request_id: Uuid::new_v4().to_string(),
            stage: input.stage,
            protocol: input.protocol,
            path: input.raw_path.to_string(),
        },
        body,
        is_base64_encoded,
    }
}

fn flatten_headers(headers: &HeaderMap) -> (HashMap<String, String>, HashMap<String, Vec<String>>) {
    let mut single = HashMap::new();
    let mut multi: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in headers.iter() {
        let Ok(value) = value.to_str() else { continue };
        let key = name.as_str().to_string();
        single.insert(key.clone(), value.to_string());
        multi.entry(key).or_default().push(value.to_string());
    }

    (single, multi)
}

fn parse_query(query: &str) -> (HashMap<String, String>, HashMap<String, Vec<String>>) {
    let mut single = HashMap::new();
    let mut multi: HashMap<String, Vec<String>> = HashMap::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        };
        single.insert(key.clone(), value.clone());
        multi.entry(key).or_default().push(value);
    }

    (single, multi)
}

/// Minimal `application/x-www-form-urlencoded` decoder: `+` becomes a
/// space, `%XX` is hex-decoded, everything else passes through.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The Gateway's outcome after unwrapping a container's proxy response, or
/// a detected error document (spec §6.3).
#[derive(Debug)]
pub enum ContainerOutcome {
    Proxy {
        status: u16,
        headers: HashMap<String, String>,
        body: Option<Vec<u8>>,
    },
    ErrorDocument {
        error_type: String,
        error_message: String,
    },
}

/// Parse a container's raw JSON response body. A 200 whose body is
/// `{"errorType","errorMessage"}` is a logical failure even though the
/// transport succeeded (spec §4.4.4).
pub fn interpret_container_response(raw: &Value) -> ContainerOutcome {
    if let (Some(error_type), Some(error_message)) = (
        raw.get("errorType").and_then(Value::as_str),
        raw.get("errorMessage").and_then(Value::as_str),
    ) {
        return ContainerOutcome::ErrorDocument {
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
        };
    }

    let status = raw
        .get("statusCode")
        .and_then(Value::as_u64)
        .unwrap_or(200) as u16;

    let headers = raw
        .get("headers")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let is_base64 = raw
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let body = match raw.get("body") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if is_base64 {
                base64::engine::general_purpose::STANDARD.decode(s).ok()
            } else {
                // If `body` looks like a JSON string, re-parse it purely to
                // decide whether to log a warning; either way the original
                // string passes through unchanged (surface-preserving, per
                // the source's behaviour).
                let trimmed = s.trim_start();
                if (trimmed.starts_with('{') || trimmed.starts_with('[')) && serde_json::from_str::<Value>(s).is_err() {
                    tracing::warn!("proxy response body looked like JSON but failed to parse; returning as-is");
                }
                Some(s.as_bytes().to_vec())
            }
        }
        Some(other) => Some(other.to_string().into_bytes()),
    };

    ContainerOutcome::Proxy { status, headers, body }
}
