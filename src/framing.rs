//! Request/response framing and the blocking socket that carries it.
//!
//! The protocol is a little-endian binary request/response scheme. Requests
//! carry a 23-byte header (client id, version, operation code, payload size)
//! and responses a 7-byte header (version, status code, payload size). The
//! framing layer owns the headers and the typed payload codecs; sequencing
//! lives in [`client`](crate::client).

mod codes;
mod request;
mod response;
mod socket;

pub use codes::{RequestCode, ResponseCode};
pub use request::{Request, RequestFrame, PROTOCOL_VERSION};
pub use response::{Response, ResponseHeader};
pub use socket::{FrameSocket, DEFAULT_MAX_PAYLOAD_LENGTH};

use crate::wire::WireError;
use thiserror::Error;

/// Fixed width of the NUL-padded name and file-name fields.
pub const NAME_LEN: usize = 255;
/// Width of the client identifier assigned at registration.
pub const CLIENT_ID_LEN: usize = 16;
/// Width of the DER-encoded public key field.
pub const PUBLIC_KEY_LEN: usize = 160;
/// Request header: client id, version, code, payload size.
pub const REQUEST_HDR_LEN: usize = CLIENT_ID_LEN + 1 + 2 + 4;
/// Response header: version, code, payload size.
pub const RESPONSE_HDR_LEN: usize = 1 + 2 + 4;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Cannot resolve server endpoint {0:?}")]
    BadEndpoint(String),
    #[error("Bad response header size {0:#x}, expected 7")]
    BadHeaderSize(usize),
    #[error("Response {0} has payload size {1:#x}, expected {2:#x}")]
    BadPayloadSize(ResponseCode, usize, usize),
    #[error("Response announces {0:#x} bytes payload, limit is {1:#x}")]
    PayloadTooLarge(usize, usize),
    #[error("Unknown response code {0}")]
    UnknownCode(u16),
    #[error("Malformed frame: {0}")]
    Malformed(#[from] WireError),
    #[error("{0}")]
    ClosedByPeer(String),
    #[error("Framing IO error")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
