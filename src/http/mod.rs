//! Minimal HTTP/1.1 wire handling.
//!
//! One request per connection:
//!
//! ```text
//! Request:  <METHOD> <target> HTTP/1.x\r\n<headers>\r\n\r\n<body of Content-Length bytes>
//! Response: HTTP/1.1 <code> <reason>\r\n<headers>\r\n\r\n<JSON document>
//! ```
//!
//! The connection is closed after the response.

pub mod parser;
pub mod response;

pub use parser::{parse, Method, ParseResult, RequestHead};
pub use response::{Response, Status};
