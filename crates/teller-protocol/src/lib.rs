//! Teller wire protocol.
//!
//! Frames are single lines of UTF-8 text with `|`-separated fields. The first
//! field of a request is the operation keyword; the first field of a response
//! is its status. This crate is pure types and codec: no I/O, no async.

mod error;
mod request;
mod response;

pub use error::ProtocolError;
pub use request::{decode, encode_request, Request, RequestKind};
pub use response::{decode_response, encode, Response, Status};

/// Field separator inside a frame.
pub const DELIMITER: char = '|';

/// Longest frame accepted from a channel, in bytes.
pub const MAX_FRAME_LEN: usize = 1024;
