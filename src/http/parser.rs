//! HTTP/1.x request-head parsing on top of `httparse`.
//!
//! Incremental: `parse` is called on the accumulated read buffer and
//! reports `Incomplete` until the blank line ending the head has arrived.
//! Header values are decoded as ISO-8859-1 so any octet sequence survives
//! into the echoed JSON. `Content-Length` is left to the caller.

use super::response::Status;

/// Maximum size of the request line plus headers
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of header fields
pub const MAX_HEADERS: usize = 100;

/// Request method. Only GET and POST are served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    /// Method tokens are case-sensitive.
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

/// Parsed request line and header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Request target exactly as sent, query string included.
    pub target: String,
    pub version: String,
    /// Header fields in arrival order, names in the client's casing.
    pub headers: Vec<(String, String)>,
    /// The request line, used for the access log.
    pub request_line: String,
}

impl RequestHead {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length. Missing or unparseable values count as zero.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Request head parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Syntax error reported by `httparse`.
    Invalid(httparse::Error),
    UnsupportedVersion(String),
    HeadTooLarge,
    TooManyHeaders,
}

impl ParseError {
    /// Status code sent back for this error.
    pub fn status(&self) -> Status {
        match self {
            ParseError::Invalid(_) => Status::BAD_REQUEST,
            ParseError::UnsupportedVersion(_) => Status::VERSION_NOT_SUPPORTED,
            ParseError::HeadTooLarge | ParseError::TooManyHeaders => {
                Status::HEADER_FIELDS_TOO_LARGE
            }
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Invalid(e) => write!(f, "Bad request ({e})"),
            ParseError::UnsupportedVersion(version) => {
                write!(f, "Invalid HTTP version ({version})")
            }
            ParseError::HeadTooLarge => {
                write!(f, "Request head exceeds {MAX_HEAD_SIZE} bytes")
            }
            ParseError::TooManyHeaders => write!(f, "Too many headers (limit {MAX_HEADERS})"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<httparse::Error> for ParseError {
    fn from(e: httparse::Error) -> Self {
        match e {
            httparse::Error::TooManyHeaders => ParseError::TooManyHeaders,
            other => ParseError::Invalid(other),
        }
    }
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Parsed head and the number of bytes it occupied.
    Complete(RequestHead, usize),
    /// The blank line ending the head has not arrived yet.
    Incomplete,
    Error(ParseError),
}

/// Parse a request head from the start of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let head_len = match request.parse(input) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) if input.len() > MAX_HEAD_SIZE => {
            return ParseResult::Error(ParseError::HeadTooLarge)
        }
        Ok(httparse::Status::Partial) => return ParseResult::Incomplete,
        Err(httparse::Error::Version) => return ParseResult::Error(version_error(input)),
        Err(e) => return ParseResult::Error(e.into()),
    };
    if head_len > MAX_HEAD_SIZE {
        return ParseResult::Error(ParseError::HeadTooLarge);
    }

    // A complete parse always fills these in.
    let (Some(method), Some(target), Some(minor)) =
        (request.method, request.path, request.version)
    else {
        return ParseResult::Incomplete;
    };

    let version = format!("HTTP/1.{minor}");
    let headers = request
        .headers
        .iter()
        .map(|h| (h.name.to_string(), latin1(h.value).trim().to_string()))
        .collect();

    let head = RequestHead {
        method: Method::from_token(method),
        target: target.to_string(),
        request_line: format!("{method} {target} {version}"),
        version,
        headers,
    };
    ParseResult::Complete(head, head_len)
}

/// `httparse` only knows HTTP/1.x. A well-formed `HTTP/<major>.<minor>`
/// with another major version is unsupported rather than malformed.
fn version_error(input: &[u8]) -> ParseError {
    let line = input
        .split(|&b| b == b'\n')
        .find(|line| line.iter().any(|&b| b != b'\r'))
        .unwrap_or_default();
    let line = String::from_utf8_lossy(line);

    let token = line.split_ascii_whitespace().nth(2).unwrap_or_default();
    let well_formed = token
        .strip_prefix("HTTP/")
        .and_then(|v| v.split_once('.'))
        .and_then(|(major, minor)| {
            minor.parse::<u32>().ok()?;
            major.parse::<u32>().ok()
        })
        .is_some();

    if well_formed {
        ParseError::UnsupportedVersion(token.to_string())
    } else {
        ParseError::Invalid(httparse::Error::Version)
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(input: &[u8]) -> (RequestHead, usize) {
        match parse(input) {
            ParseResult::Complete(head, consumed) => (head, consumed),
            other => panic!("unexpected: {:?}", other),
        }
    }

    fn error(input: &[u8]) -> ParseError {
        match parse(input) {
            ParseResult::Error(e) => e,
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_get() {
        let input = b"GET /test?x=1 HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";
        let (head, consumed) = complete(input);
        assert_eq!(consumed, input.len());
        assert_eq!(head.method, Method::Get);
        assert_eq!(head.target, "/test?x=1");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.request_line, "GET /test?x=1 HTTP/1.1");
        assert_eq!(
            head.headers,
            vec![
                ("Host".to_string(), "localhost".to_string()),
                ("Accept".to_string(), "*/*".to_string()),
            ]
        );
    }

    #[test]
    fn test_header_name_case_kept() {
        let (head, _) = complete(b"GET / HTTP/1.1\r\nx-lower: a\r\nX-MiXeD: b\r\n\r\n");
        assert_eq!(head.headers[0].0, "x-lower");
        assert_eq!(head.headers[1].0, "X-MiXeD");
        assert_eq!(head.header("x-mixed"), Some("b"));
    }

    #[test]
    fn test_body_bytes_not_consumed() {
        let input = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (head, consumed) = complete(input);
        assert_eq!(head.method, Method::Post);
        assert_eq!(head.content_length(), 5);
        assert_eq!(&input[consumed..], b"hello");
    }

    #[test]
    fn test_bare_lf_lines() {
        let (head, _) = complete(b"GET / HTTP/1.0\nX-Test: yes\n\n");
        assert_eq!(head.version, "HTTP/1.0");
        assert_eq!(head.header("x-test"), Some("yes"));
    }

    #[test]
    fn test_leading_empty_lines_skipped() {
        let input = b"\r\n\r\nGET / HTTP/1.1\r\n\r\n";
        let (head, consumed) = complete(input);
        assert_eq!(head.target, "/");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_incomplete() {
        assert!(matches!(parse(b""), ParseResult::Incomplete));
        assert!(matches!(parse(b"GET / HTTP/1.1\r\n"), ParseResult::Incomplete));
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost: a\r\n"),
            ParseResult::Incomplete
        ));
    }

    #[test]
    fn test_other_methods() {
        let (head, _) = complete(b"PUT /x HTTP/1.1\r\n\r\n");
        assert_eq!(head.method, Method::Other("PUT".to_string()));

        let (head, _) = complete(b"get /x HTTP/1.1\r\n\r\n");
        assert_eq!(head.method, Method::Other("get".to_string()));
    }

    #[test]
    fn test_content_length_lenient() {
        let (head, _) = complete(b"POST / HTTP/1.1\r\n\r\n");
        assert_eq!(head.content_length(), 0);

        let (head, _) = complete(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert_eq!(head.content_length(), 0);

        let (head, _) = complete(b"POST / HTTP/1.1\r\nContent-Length: -4\r\n\r\n");
        assert_eq!(head.content_length(), 0);

        let (head, _) = complete(b"POST / HTTP/1.1\r\ncontent-length:  12 \r\n\r\n");
        assert_eq!(head.content_length(), 12);
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let (head, _) = complete(b"GET / HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\n\r\n");
        assert_eq!(head.header("X-A"), Some("1"));
        assert_eq!(head.headers.len(), 2);
    }

    #[test]
    fn test_non_ascii_header_value() {
        let (head, _) = complete(b"GET / HTTP/1.1\r\nX-Name: caf\xe9\r\n\r\n");
        assert_eq!(head.header("X-Name"), Some("caf\u{e9}"));
    }

    #[test]
    fn test_invalid_request_line() {
        let e = error(b"GARBAGE\r\n\r\n");
        assert!(matches!(e, ParseError::Invalid(_)));
        assert_eq!(e.status(), Status::BAD_REQUEST);

        assert_eq!(
            error(b"GET / FTP/1.0\r\n\r\n"),
            ParseError::Invalid(httparse::Error::Version)
        );
        assert_eq!(
            error(b"GET / HTTP/x\r\n\r\n"),
            ParseError::Invalid(httparse::Error::Version)
        );
    }

    #[test]
    fn test_unsupported_version() {
        let e = error(b"GET / HTTP/2.0\r\n\r\n");
        assert_eq!(e, ParseError::UnsupportedVersion("HTTP/2.0".to_string()));
        assert_eq!(e.status(), Status::VERSION_NOT_SUPPORTED);
    }

    #[test]
    fn test_invalid_header() {
        let e = error(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n");
        assert!(matches!(e, ParseError::Invalid(_)));
        assert_eq!(e.status(), Status::BAD_REQUEST);

        assert!(matches!(
            error(b"GET / HTTP/1.1\r\nX-Long: one\r\n  two\r\n\r\n"),
            ParseError::Invalid(_)
        ));
    }

    #[test]
    fn test_head_too_large() {
        let mut input = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_HEAD_SIZE));
        assert_eq!(error(&input), ParseError::HeadTooLarge);
        assert_eq!(ParseError::HeadTooLarge.status(), Status::HEADER_FIELDS_TOO_LARGE);

        input.extend_from_slice(b"\r\n\r\n");
        assert_eq!(error(&input), ParseError::HeadTooLarge);
    }

    #[test]
    fn test_too_many_headers() {
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            input.extend_from_slice(format!("X-{i}: v\r\n").as_bytes());
        }
        input.extend_from_slice(b"\r\n");
        assert_eq!(error(&input), ParseError::TooManyHeaders);
    }
}
