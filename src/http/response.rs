//! HTTP/1.1 response serialization.
//!
//! Every response is a complete JSON document with an explicit
//! Content-Length, followed by connection close.

use bytes::BytesMut;
use chrono::{DateTime, Utc};

use crate::payload::SERVER_NAME;

/// Status code with its reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: &'static str,
}

impl Status {
    pub const OK: Status = Status::new(200, "OK");
    pub const BAD_REQUEST: Status = Status::new(400, "Bad Request");
    pub const PAYLOAD_TOO_LARGE: Status = Status::new(413, "Payload Too Large");
    pub const HEADER_FIELDS_TOO_LARGE: Status =
        Status::new(431, "Request Header Fields Too Large");
    pub const NOT_IMPLEMENTED: Status = Status::new(501, "Not Implemented");
    pub const VERSION_NOT_SUPPORTED: Status = Status::new(505, "HTTP Version Not Supported");

    const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

/// A JSON response ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: String,
}

impl Response {
    pub fn json(status: Status, body: String) -> Self {
        Self { status, body }
    }

    /// Serialize status line, headers and body.
    pub fn encode(&self) -> BytesMut {
        self.encode_at(Utc::now())
    }

    fn encode_at(&self, now: DateTime<Utc>) -> BytesMut {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Server: {}\r\n\
             Date: {}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.status.code,
            self.status.reason,
            SERVER_NAME,
            http_date(now),
            self.body.len(),
        );

        let mut out = BytesMut::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
