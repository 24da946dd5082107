use crate::framing::codes::RequestCode;
use crate::framing::{CLIENT_ID_LEN, NAME_LEN, PUBLIC_KEY_LEN, REQUEST_HDR_LEN};
use crate::wire;
use bytes::Bytes;

/// Protocol version stamped into every request header.
pub const PROTOCOL_VERSION: u8 = 3;

/// One request payload per operation the client can perform.
///
/// Names are logical (un-padded) strings; the encoder widens them to the
/// fixed 255-byte NUL-padded wire form.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Request {
    Register {
        name: String,
    },
    SendPublicKey {
        name: String,
        public_key: [u8; PUBLIC_KEY_LEN],
    },
    Login {
        name: String,
    },
    SendFile {
        orig_file_size: u32,
        packet_number: u16,
        total_packets: u16,
        file_name: String,
        content: Bytes,
    },
    CrcOk {
        name: String,
    },
    CrcRetry {
        name: String,
    },
    CrcAbort {
        name: String,
    },
}

impl Request {
    pub fn code(&self) -> RequestCode {
        match self {
            Request::Register { .. } => RequestCode::Register,
            Request::SendPublicKey { .. } => RequestCode::SendPublicKey,
            Request::Login { .. } => RequestCode::Login,
            Request::SendFile { .. } => RequestCode::SendFile,
            Request::CrcOk { .. } => RequestCode::CrcOk,
            Request::CrcRetry { .. } => RequestCode::CrcRetry,
            Request::CrcAbort { .. } => RequestCode::CrcAbort,
        }
    }

    pub(crate) fn to_payload(&self) -> Vec<u8> {
        match self {
            Request::Register { name }
            | Request::Login { name }
            | Request::CrcOk { name }
            | Request::CrcRetry { name }
            | Request::CrcAbort { name } => wire::pad_or_truncate(name.as_bytes(), NAME_LEN),
            Request::SendPublicKey { name, public_key } => {
                let mut payload = wire::pad_or_truncate(name.as_bytes(), NAME_LEN);
                payload.extend_from_slice(public_key);
                payload
            }
            Request::SendFile {
                orig_file_size,
                packet_number,
                total_packets,
                file_name,
                content,
            } => {
                let mut payload = Vec::with_capacity(12 + NAME_LEN + content.len());
                payload.extend_from_slice(&wire::pack_u32(content.len() as u32));
                payload.extend_from_slice(&wire::pack_u32(*orig_file_size));
                payload.extend_from_slice(&wire::pack_u16(*packet_number));
                payload.extend_from_slice(&wire::pack_u16(*total_packets));
                payload.extend_from_slice(&wire::pad_or_truncate(file_name.as_bytes(), NAME_LEN));
                payload.extend_from_slice(content);
                payload
            }
        }
    }
}

/// A request bound to the sending client's identity, ready for the wire.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RequestFrame {
    pub client_id: [u8; CLIENT_ID_LEN],
    pub request: Request,
}

impl RequestFrame {
    /// Serializes the 23-byte header followed by the payload.
    ///
    /// `payload_size` is the true payload byte length. For SEND_FILE that is
    /// `12 + 255 + content_size`, which a strict server decoder requires.
    pub fn to_buf(&self) -> Vec<u8> {
        let payload = self.request.to_payload();
        let mut buf = Vec::with_capacity(REQUEST_HDR_LEN + payload.len());
        buf.extend_from_slice(&self.client_id);
        buf.extend_from_slice(&wire::pack_u8(PROTOCOL_VERSION));
        buf.extend_from_slice(&wire::pack_u16(self.request.code().into()));
        buf.extend_from_slice(&wire::pack_u32(payload.len() as u32));
        buf.extend_from_slice(&payload);
        buf
    }
}
