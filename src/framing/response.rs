use crate::framing::codes::ResponseCode;
use crate::framing::{FramingError, CLIENT_ID_LEN, NAME_LEN, RESPONSE_HDR_LEN};
use crate::wire;

/// FILE_OK payload: id, content size, 255-byte name, CRC. 279 bytes total.
const FILE_OK_LEN: usize = CLIENT_ID_LEN + 4 + NAME_LEN + 4;

/// The fixed 7-byte header preceding every response payload.
#[derive(Eq, PartialEq, Debug, Copy, Clone)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: ResponseCode,
    pub payload_size: u32,
}

impl ResponseHeader {
    pub fn from_buf(buf: &[u8]) -> Result<Self, FramingError> {
        if buf.len() != RESPONSE_HDR_LEN {
            return Err(FramingError::BadHeaderSize(buf.len()));
        }
        Ok(Self {
            version: wire::unpack_u8(buf, 0)?,
            code: wire::unpack_u16(buf, 1)?.into(),
            payload_size: wire::unpack_u32(buf, 3)?,
        })
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RESPONSE_HDR_LEN);
        buf.extend_from_slice(&wire::pack_u8(self.version));
        buf.extend_from_slice(&wire::pack_u16(self.code.into()));
        buf.extend_from_slice(&wire::pack_u32(self.payload_size));
        buf
    }
}

/// One decoded server response per status code.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Response {
    RegisterOk {
        client_id: [u8; CLIENT_ID_LEN],
    },
    RegisterFail,
    SessionKey {
        client_id: [u8; CLIENT_ID_LEN],
        wrapped_key: Vec<u8>,
    },
    FileOk {
        client_id: [u8; CLIENT_ID_LEN],
        content_size: u32,
        file_name: String,
        crc: u32,
    },
    MessageOk {
        client_id: [u8; CLIENT_ID_LEN],
    },
    LoginOk {
        client_id: [u8; CLIENT_ID_LEN],
        wrapped_key: Vec<u8>,
    },
    LoginFail {
        client_id: [u8; CLIENT_ID_LEN],
    },
    GeneralError,
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Response::RegisterOk { .. } => ResponseCode::RegisterOk,
            Response::RegisterFail => ResponseCode::RegisterFail,
            Response::SessionKey { .. } => ResponseCode::SessionKey,
            Response::FileOk { .. } => ResponseCode::FileOk,
            Response::MessageOk { .. } => ResponseCode::MessageOk,
            Response::LoginOk { .. } => ResponseCode::LoginOk,
            Response::LoginFail { .. } => ResponseCode::LoginFail,
            Response::GeneralError => ResponseCode::GeneralError,
        }
    }

    /// Decodes a payload that was read against `code`'s expected layout.
    ///
    /// Fixed-size variants reject any other payload length; the key-bearing
    /// variants accept whatever follows the client id as the wrapped key.
    pub fn decode(code: ResponseCode, payload: &[u8]) -> Result<Self, FramingError> {
        match code {
            ResponseCode::RegisterOk => Ok(Response::RegisterOk {
                client_id: read_client_id(code, payload, CLIENT_ID_LEN)?,
            }),
            ResponseCode::RegisterFail => {
                expect_len(code, payload, 0)?;
                Ok(Response::RegisterFail)
            }
            ResponseCode::SessionKey => {
                let client_id = read_key_prefix(code, payload)?;
                Ok(Response::SessionKey {
                    client_id,
                    wrapped_key: payload[CLIENT_ID_LEN..].to_vec(),
                })
            }
            ResponseCode::FileOk => {
                expect_len(code, payload, FILE_OK_LEN)?;
                let mut client_id = [0u8; CLIENT_ID_LEN];
                client_id.copy_from_slice(&payload[..CLIENT_ID_LEN]);
                let content_size = wire::unpack_u32(payload, CLIENT_ID_LEN)?;
                let name_field = &payload[20..20 + NAME_LEN];
                let file_name =
                    String::from_utf8_lossy(wire::strip_trailing_nul(name_field)).into_owned();
                let crc = wire::unpack_u32(payload, 20 + NAME_LEN)?;
                Ok(Response::FileOk {
                    client_id,
                    content_size,
                    file_name,
                    crc,
                })
            }
            ResponseCode::MessageOk => Ok(Response::MessageOk {
                client_id: read_client_id(code, payload, CLIENT_ID_LEN)?,
            }),
            ResponseCode::LoginOk => {
                let client_id = read_key_prefix(code, payload)?;
                Ok(Response::LoginOk {
                    client_id,
                    wrapped_key: payload[CLIENT_ID_LEN..].to_vec(),
                })
            }
            ResponseCode::LoginFail => Ok(Response::LoginFail {
                client_id: read_client_id(code, payload, CLIENT_ID_LEN)?,
            }),
            ResponseCode::GeneralError => {
                expect_len(code, payload, 0)?;
                Ok(Response::GeneralError)
            }
            ResponseCode::Other(x) => Err(FramingError::UnknownCode(x)),
        }
    }
}

fn expect_len(code: ResponseCode, payload: &[u8], want: usize) -> Result<(), FramingError> {
    if payload.len() != want {
        return Err(FramingError::BadPayloadSize(code, payload.len(), want));
    }
    Ok(())
}

fn read_client_id(
    code: ResponseCode,
    payload: &[u8],
    want: usize,
) -> Result<[u8; CLIENT_ID_LEN], FramingError> {
    expect_len(code, payload, want)?;
    let mut id = [0u8; CLIENT_ID_LEN];
    id.copy_from_slice(&payload[..CLIENT_ID_LEN]);
    Ok(id)
}

fn read_key_prefix(code: ResponseCode, payload: &[u8]) -> Result<[u8; CLIENT_ID_LEN], FramingError> {
    if payload.len() <= CLIENT_ID_LEN {
        return Err(FramingError::BadPayloadSize(
            code,
            payload.len(),
            CLIENT_ID_LEN + 1,
        ));
    }
    let mut id = [0u8; CLIENT_ID_LEN];
    id.copy_from_slice(&payload[..CLIENT_ID_LEN]);
    Ok(id)
}
