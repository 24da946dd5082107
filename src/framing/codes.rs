use strum_macros::{Display, EnumCount};

/// Operation code carried in a request header.
#[repr(u16)]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display, EnumCount)]
pub enum RequestCode {
    /// Register a new display name, server assigns a client id
    Register,
    /// Deliver the client's public key, server answers with a wrapped session key
    SendPublicKey,
    /// Resume a known identity, server answers with a freshly wrapped session key
    Login,
    /// One ciphertext chunk of the file being uploaded
    SendFile,
    /// Client-side CRC matched the server's
    CrcOk,
    /// CRC mismatched, the file is about to be re-sent
    CrcRetry,
    /// Third CRC mismatch, the client is giving up
    CrcAbort,
    /// Not part of the protocol; kept so the codec is total over u16
    Other(u16),
}

impl From<RequestCode> for u16 {
    fn from(code: RequestCode) -> Self {
        match code {
            RequestCode::Register => 825,
            RequestCode::SendPublicKey => 826,
            RequestCode::Login => 827,
            RequestCode::SendFile => 828,
            RequestCode::CrcOk => 900,
            RequestCode::CrcRetry => 901,
            RequestCode::CrcAbort => 902,
            RequestCode::Other(x) => x,
        }
    }
}

impl From<&RequestCode> for u16 {
    fn from(code: &RequestCode) -> Self {
        u16::from(*code)
    }
}

impl From<u16> for RequestCode {
    fn from(value: u16) -> Self {
        match value {
            x if x == Self::Register => Self::Register,
            x if x == Self::SendPublicKey => Self::SendPublicKey,
            x if x == Self::Login => Self::Login,
            x if x == Self::SendFile => Self::SendFile,
            x if x == Self::CrcOk => Self::CrcOk,
            x if x == Self::CrcRetry => Self::CrcRetry,
            x if x == Self::CrcAbort => Self::CrcAbort,
            x => Self::Other(x),
        }
    }
}

impl PartialEq<u16> for RequestCode {
    fn eq(&self, other: &u16) -> bool {
        u16::from(self) == *other
    }
}

impl PartialEq<RequestCode> for u16 {
    fn eq(&self, other: &RequestCode) -> bool {
        u16::from(other) == *self
    }
}

/// Status code carried in a response header.
#[repr(u16)]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Display, EnumCount)]
pub enum ResponseCode {
    /// Registration accepted, payload carries the assigned client id
    RegisterOk,
    /// Name already taken or otherwise rejected, empty payload
    RegisterFail,
    /// Session key wrapped under the client's public key
    SessionKey,
    /// Whole file received, payload carries the server-side CRC
    FileOk,
    /// Acknowledges a CRC_OK or CRC_ABORT notice
    MessageOk,
    /// Login accepted, payload carries a freshly wrapped session key
    LoginOk,
    /// Unknown identity, the client must register from scratch
    LoginFail,
    /// Transient server-side failure, the current stage may be retried
    GeneralError,
    /// Unassigned values, rejected by the decoder
    Other(u16),
}

impl From<ResponseCode> for u16 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::RegisterOk => 1600,
            ResponseCode::RegisterFail => 1601,
            ResponseCode::SessionKey => 1602,
            ResponseCode::FileOk => 1603,
            ResponseCode::MessageOk => 1604,
            ResponseCode::LoginOk => 1605,
            ResponseCode::LoginFail => 1606,
            ResponseCode::GeneralError => 1607,
            ResponseCode::Other(x) => x,
        }
    }
}

impl From<&ResponseCode> for u16 {
    fn from(code: &ResponseCode) -> Self {
        u16::from(*code)
    }
}

impl From<u16> for ResponseCode {
    fn from(value: u16) -> Self {
        match value {
            x if x == Self::RegisterOk => Self::RegisterOk,
            x if x == Self::RegisterFail => Self::RegisterFail,
            x if x == Self::SessionKey => Self::SessionKey,
            x if x == Self::FileOk => Self::FileOk,
            x if x == Self::MessageOk => Self::MessageOk,
            x if x == Self::LoginOk => Self::LoginOk,
            x if x == Self::LoginFail => Self::LoginFail,
            x if x == Self::GeneralError => Self::GeneralError,
            x => Self::Other(x),
        }
    }
}

impl PartialEq<u16> for ResponseCode {
    fn eq(&self, other: &u16) -> bool {
        u16::from(self) == *other
    }
}

impl PartialEq<ResponseCode> for u16 {
    fn eq(&self, other: &ResponseCode) -> bool {
        u16::from(other) == *self
    }
}
