//! JSON payloads returned to clients.
//!
//! Each payload is built fresh for one request and serialized once.
//! Field order in the output follows declaration order.

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};

/// Value of the `server` field and the `Server` response header
pub const SERVER_NAME: &str = "friscy-test-server/1.0";

/// Maximum number of body characters echoed back
pub const BODY_PREVIEW_CHARS: usize = 1000;

const GET_MESSAGE: &str = "Hello from friscy test server!";
const POST_MESSAGE: &str = "POST received";

#[derive(Debug, Serialize)]
pub struct GetPayload {
    status: &'static str,
    message: &'static str,
    path: String,
    headers: Map<String, Value>,
    timestamp: String,
    server: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PostPayload {
    status: &'static str,
    message: &'static str,
    path: String,
    body_length: usize,
    body: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    status: &'static str,
    message: String,
}

/// Response document for one request.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Get(GetPayload),
    Post(PostPayload),
    Error(ErrorPayload),
}

impl ResponsePayload {
    /// Render as two-space indented JSON. GET and error documents end with
    /// a newline, POST documents do not.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        if !matches!(self, ResponsePayload::Post(_)) {
            json.push('\n');
        }
        Ok(json)
    }
}

/// Build the document for a GET request.
///
/// Every distinct spelling of a header name gets its own key, in the
/// client's casing. Each key maps to the first value sent under that name,
/// compared case-insensitively.
pub fn handle_get(path: &str, headers: &[(String, String)]) -> ResponsePayload {
    let mut echoed = Map::new();
    for (name, _) in headers {
        if echoed.contains_key(name) {
            continue;
        }
        let first = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        echoed.insert(name.clone(), Value::String(first));
    }

    ResponsePayload::Get(GetPayload {
        status: "success",
        message: GET_MESSAGE,
        path: path.to_string(),
        headers: echoed,
        timestamp: timestamp(&Local::now()),
        server: SERVER_NAME,
    })
}

/// Build the document for a POST request.
///
/// `content_length` is the declared length and is reported as-is even when
/// fewer bytes arrived.
pub fn handle_post(path: &str, body: &[u8], content_length: usize) -> ResponsePayload {
    let text = String::from_utf8_lossy(body);

    ResponsePayload::Post(PostPayload {
        status: "success",
        message: POST_MESSAGE,
        path: path.to_string(),
        body_length: content_length,
        body: truncate_chars(&text, BODY_PREVIEW_CHARS).to_string(),
        timestamp: timestamp(&Local::now()),
    })
}

/// Build an error document.
pub fn error(message: impl Into<String>) -> ResponsePayload {
    ResponsePayload::Error(ErrorPayload {
        status: "error",
        message: message.into(),
    })
}

/// Local time without offset, microsecond precision.
fn timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
