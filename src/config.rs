//! The three working-directory files the client lives off:
//! `transfer.info` (what to send where), `me.info` (persisted identity,
//! whose presence selects the login branch), and `priv.key` (Base64 private
//! key, kept alongside the identity).

use crate::framing::CLIENT_ID_LEN;
use crate::wire;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

pub const TRANSFER_INFO: &str = "transfer.info";
pub const ME_INFO: &str = "me.info";
pub const PRIV_KEY: &str = "priv.key";

/// Input-validation cap on user-supplied display names. The wire field is
/// 255 bytes; the protocol policy stays stricter.
pub const MAX_NAME_LEN: usize = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Unreadable(&'static str, std::io::Error),
    #[error("Cannot write {0}: {1}")]
    Unwritable(&'static str, std::io::Error),
    #[error("transfer.info is missing the host:port line")]
    MissingEndpoint,
    #[error("Malformed host:port in transfer.info: {0:?}")]
    BadEndpoint(String),
    #[error("transfer.info is missing the display name line")]
    MissingName,
    #[error("Display name is {0} bytes, limit is {1}")]
    NameTooLong(usize, usize),
    #[error("transfer.info is missing the file path line")]
    MissingFilePath,
    #[error("File to transfer does not exist: {0:?}")]
    FileMissing(PathBuf),
    #[error("me.info is missing the display name line")]
    MissingIdentityName,
    #[error("me.info is missing the client id line")]
    MissingClientId,
    #[error("Client id in me.info must be 32 hex characters, got {0:?}")]
    BadClientId(String),
    #[error("No private key in me.info or priv.key")]
    MissingPrivateKey,
}

/// Parsed `transfer.info`: endpoint, display name, upload path.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransferInfo {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub file_path: PathBuf,
}

impl TransferInfo {
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(dir.join(TRANSFER_INFO))
            .map_err(|e| ConfigError::Unreadable(TRANSFER_INFO, e))?;
        let mut lines = raw.lines();

        let endpoint = wire::trim_ws(lines.next().ok_or(ConfigError::MissingEndpoint)?);
        let (host, port) = endpoint
            .split_once(':')
            .filter(|(h, _)| !h.is_empty())
            .and_then(|(h, p)| Some((h, p.parse::<u16>().ok()?)))
            .ok_or_else(|| ConfigError::BadEndpoint(endpoint.to_owned()))?;

        let name = wire::trim_ws(lines.next().ok_or(ConfigError::MissingName)?);
        if name.len() > MAX_NAME_LEN {
            return Err(ConfigError::NameTooLong(name.len(), MAX_NAME_LEN));
        }

        let path_line = wire::trim_ws(lines.next().ok_or(ConfigError::MissingFilePath)?);
        let file_path = PathBuf::from(path_line);
        if !file_path.exists() {
            return Err(ConfigError::FileMissing(file_path));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            name: name.to_owned(),
            file_path,
        })
    }
}

/// Identity persisted by a successful registration: display name, assigned
/// client id, and the Base64 private key.
pub struct StoredIdentity {
    pub name: String,
    pub client_id: [u8; CLIENT_ID_LEN],
    pub key_base64: Zeroizing<String>,
}

impl StoredIdentity {
    /// Loads `me.info` if present; `Ok(None)` selects the register branch.
    ///
    /// The private key comes from the third line of `me.info` when present,
    /// falling back to `priv.key`.
    pub fn load(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = dir.join(ME_INFO);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable(ME_INFO, e))?;
        let mut lines = raw.lines();

        let name = wire::trim_ws(lines.next().ok_or(ConfigError::MissingIdentityName)?);
        if name.is_empty() {
            return Err(ConfigError::MissingIdentityName);
        }

        let id_hex = wire::trim_ws(lines.next().ok_or(ConfigError::MissingClientId)?);
        let id_bytes = wire::hex_to_bytes(id_hex)
            .map_err(|_| ConfigError::BadClientId(id_hex.to_owned()))?;
        let client_id: [u8; CLIENT_ID_LEN] = id_bytes
            .try_into()
            .map_err(|_| ConfigError::BadClientId(id_hex.to_owned()))?;

        let key_base64 = match lines.next().map(wire::trim_ws).filter(|l| !l.is_empty()) {
            Some(line) => Zeroizing::new(line.to_owned()),
            None => load_private_key(dir)?,
        };

        Ok(Some(Self {
            name: name.to_owned(),
            client_id,
            key_base64,
        }))
    }

    /// Writes `me.info`: un-padded name, 32 lowercase hex chars of the
    /// client id, Base64 private key.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let contents = format!(
            "{}\n{}\n{}\n",
            self.name,
            hex::encode(self.client_id),
            self.key_base64.as_str(),
        );
        fs::write(dir.join(ME_INFO), contents).map_err(|e| ConfigError::Unwritable(ME_INFO, e))
    }
}

/// Writes `priv.key`, a single Base64 line.
pub fn save_private_key(dir: &Path, key_base64: &str) -> Result<(), ConfigError> {
    fs::write(dir.join(PRIV_KEY), key_base64).map_err(|e| ConfigError::Unwritable(PRIV_KEY, e))
}

fn load_private_key(dir: &Path) -> Result<Zeroizing<String>, ConfigError> {
    let raw = fs::read_to_string(dir.join(PRIV_KEY))
        .map_err(|_| ConfigError::MissingPrivateKey)?;
    let trimmed = wire::trim_ws(&raw);
    if trimmed.is_empty() {
        return Err(ConfigError::MissingPrivateKey);
    }
    Ok(Zeroizing::new(trimmed.to_owned()))
}
