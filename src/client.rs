//! The protocol driver: one synchronous session that identifies the client
//! (register or login), acquires the wrapped session key, uploads the
//! encrypted file in chunks, and reconciles the plaintext checksum with the
//! server.
//!
//! Every retryable stage is bounded at three attempts. Anything else is
//! fatal: the socket is closed and the error propagates to the entry point.

use crate::config::{self, ConfigError, StoredIdentity, TransferInfo};
use crate::crypto::keys::KeyPair;
use crate::crypto::{cipher, cksum, CryptoError};
use crate::framing::{
    FrameSocket, FramingError, Request, RequestFrame, Response, ResponseCode, CLIENT_ID_LEN,
};
use crate::wire;
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Ciphertext bytes per SEND_FILE packet.
pub const CHUNK_SIZE: usize = 1024;
/// Attempt bound shared by every retryable stage.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("Unexpected response {code} during {stage}")]
    UnexpectedResponse {
        stage: &'static str,
        code: ResponseCode,
    },
    #[error("{stage} failed 3 times, giving up")]
    RetriesExhausted { stage: &'static str },
    #[error("Server checksum mismatched 3 times, upload aborted")]
    ChecksumFailed,
    #[error("File too large to upload: {0} bytes")]
    FileTooLarge(u64),
}

/// Runs one complete transfer session against the server named in
/// `dir/transfer.info`.
///
/// The register branch is taken when `dir/me.info` is absent, the login
/// branch otherwise. `timeout` bounds every socket read and write; `None`
/// blocks indefinitely like the reference client.
pub fn run(dir: &Path, timeout: Option<Duration>) -> Result<(), ClientError> {
    let transfer = TransferInfo::load(dir)?;
    let identity = StoredIdentity::load(dir)?;

    info!("Connecting to {}:{}", transfer.host, transfer.port);
    let sock = FrameSocket::connect(&transfer.host, transfer.port, timeout)?;
    let mut session = Session::new(sock, transfer);

    let result = session.execute(dir, identity);
    session.sock.close();
    result
}

/// Mutable per-run state, owned by the driver and mutated only as the state
/// machine advances.
struct Session {
    sock: FrameSocket,
    name: String,
    client_id: [u8; CLIENT_ID_LEN],
    file_path: PathBuf,
}

impl Session {
    fn new(sock: FrameSocket, transfer: TransferInfo) -> Self {
        Self {
            sock,
            name: transfer.name,
            // Zero until REGISTER_OK assigns one
            client_id: [0u8; CLIENT_ID_LEN],
            file_path: transfer.file_path,
        }
    }

    fn execute(
        &mut self,
        dir: &Path,
        identity: Option<StoredIdentity>,
    ) -> Result<(), ClientError> {
        let session_key = match identity {
            Some(identity) => self.login(identity)?,
            None => {
                self.register()?;
                self.exchange_keys(dir)?
            }
        };
        self.upload(&session_key)
    }

    /// CONNECTED → IDENTIFIED via REGISTER. The assigned client id is kept
    /// in memory here; it is persisted together with the private key once
    /// the keypair exists.
    fn register(&mut self) -> Result<(), ClientError> {
        info!("Registering as {:?}", self.name);
        for attempt in 1..=MAX_ATTEMPTS {
            let frame = self.frame(Request::Register {
                name: self.name.clone(),
            });
            self.sock.send(&frame)?;
            match self.sock.recv()? {
                Response::RegisterOk { client_id } => {
                    info!("Registered, client id {}", hex::encode(client_id));
                    self.client_id = client_id;
                    return Ok(());
                }
                Response::RegisterFail => {
                    warn!("Registration rejected (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                Response::GeneralError => {
                    warn!("Server error during registration (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                other => return Err(unexpected("registration", &other)),
            }
        }
        Err(ClientError::RetriesExhausted {
            stage: "registration",
        })
    }

    /// IDENTIFIED → KEYED on the register branch: generate the keypair,
    /// persist it before it ever goes on the wire, deliver the public half,
    /// and unwrap the returned session key.
    fn exchange_keys(&mut self, dir: &Path) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        info!("Generating RSA keypair");
        let keys = KeyPair::generate()?;
        let key_base64 = keys.to_base64()?;
        config::save_private_key(dir, &key_base64)?;
        StoredIdentity {
            name: self.name.clone(),
            client_id: self.client_id,
            key_base64,
        }
        .save(dir)?;
        let public_key = keys.public_der()?;

        for attempt in 1..=MAX_ATTEMPTS {
            info!("Sending public key");
            let frame = self.frame(Request::SendPublicKey {
                name: self.name.clone(),
                public_key,
            });
            self.sock.send(&frame)?;
            match self.sock.recv()? {
                Response::SessionKey { wrapped_key, .. } => {
                    info!("Received wrapped session key ({} bytes)", wrapped_key.len());
                    return Ok(keys.unwrap_session_key(&wrapped_key)?);
                }
                Response::GeneralError => {
                    warn!("Server error during key exchange (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                other => return Err(unexpected("key exchange", &other)),
            }
        }
        Err(ClientError::RetriesExhausted {
            stage: "key exchange",
        })
    }

    /// CONNECTED → KEYED via LOGIN with a persisted identity. The name and
    /// id from `me.info` take precedence over `transfer.info`.
    fn login(&mut self, identity: StoredIdentity) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        self.name = identity.name;
        self.client_id = identity.client_id;
        let keys = KeyPair::from_base64(&identity.key_base64)?;

        info!("Logging in as {:?}", self.name);
        for attempt in 1..=MAX_ATTEMPTS {
            let frame = self.frame(Request::Login {
                name: self.name.clone(),
            });
            self.sock.send(&frame)?;
            match self.sock.recv()? {
                Response::LoginOk { wrapped_key, .. } => {
                    info!("Login accepted, session key refreshed");
                    return Ok(keys.unwrap_session_key(&wrapped_key)?);
                }
                Response::LoginFail { .. } => {
                    warn!("Login rejected (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                Response::GeneralError => {
                    warn!("Server error during login (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                other => return Err(unexpected("login", &other)),
            }
        }
        Err(ClientError::RetriesExhausted { stage: "login" })
    }

    /// KEYED → DONE: encrypt, chunk, transmit, reconcile the CRC. A
    /// mismatching (or error) verdict re-uploads after CRC_RETRY; the third
    /// failure sends CRC_ABORT and the session ends in `ChecksumFailed`.
    fn upload(&mut self, session_key: &[u8]) -> Result<(), ClientError> {
        let plaintext = fs::read(&self.file_path)?;
        let crc_local = cksum::memcrc(&plaintext);
        let ciphertext = Bytes::from(cipher::encrypt(session_key, &plaintext)?);
        let chunks = wire::split_chunks(&ciphertext, CHUNK_SIZE);
        if plaintext.len() as u64 > u64::from(u32::MAX) || chunks.len() > usize::from(u16::MAX) {
            return Err(ClientError::FileTooLarge(plaintext.len() as u64));
        }
        let total_packets = chunks.len() as u16;
        let file_name = self
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "Uploading {:?}: {} plaintext bytes, {} ciphertext bytes, {} packets",
            file_name,
            plaintext.len(),
            ciphertext.len(),
            total_packets,
        );

        for attempt in 1..=MAX_ATTEMPTS {
            for (index, chunk) in chunks.iter().enumerate() {
                let frame = self.frame(Request::SendFile {
                    orig_file_size: plaintext.len() as u32,
                    packet_number: index as u16 + 1,
                    total_packets,
                    file_name: file_name.clone(),
                    content: chunk.clone(),
                });
                self.sock.send(&frame)?;
            }

            let verdict = match self.sock.recv()? {
                Response::FileOk { crc, .. } => Some(crc),
                // A server-side failure burns an attempt like a mismatch
                Response::GeneralError => None,
                other => return Err(unexpected("upload", &other)),
            };
            match verdict {
                Some(crc) if crc == crc_local => {
                    info!("Checksum confirmed ({crc:#010x})");
                    let frame = self.frame(Request::CrcOk {
                        name: self.name.clone(),
                    });
                    self.sock.send(&frame)?;
                    return self.await_message_ok("checksum confirmation");
                }
                Some(crc) => warn!(
                    "Checksum mismatch: ours {:#010x}, server {:#010x} (attempt {attempt}/{MAX_ATTEMPTS})",
                    crc_local, crc,
                ),
                None => warn!("Server error after upload (attempt {attempt}/{MAX_ATTEMPTS})"),
            }
            if attempt < MAX_ATTEMPTS {
                let frame = self.frame(Request::CrcRetry {
                    name: self.name.clone(),
                });
                self.sock.send(&frame)?;
            }
        }

        let frame = self.frame(Request::CrcAbort {
            name: self.name.clone(),
        });
        self.sock.send(&frame)?;
        match self.await_message_ok("upload abort") {
            // The upload failed either way; a missing final ACK doesn't
            // change the outcome
            Ok(()) | Err(ClientError::RetriesExhausted { .. }) => Err(ClientError::ChecksumFailed),
            Err(e) => Err(e),
        }
    }

    /// Waits for MESSAGE_OK after a CRC notice. GENERAL_ERROR burns one of
    /// three read attempts; the notice itself is not re-sent.
    fn await_message_ok(&mut self, stage: &'static str) -> Result<(), ClientError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.sock.recv()? {
                Response::MessageOk { .. } => {
                    info!("Server acknowledged {stage}");
                    return Ok(());
                }
                Response::GeneralError => {
                    warn!("Server error awaiting acknowledgement (attempt {attempt}/{MAX_ATTEMPTS})");
                }
                other => return Err(unexpected(stage, &other)),
            }
        }
        Err(ClientError::RetriesExhausted { stage })
    }

    fn frame(&self, request: Request) -> RequestFrame {
        RequestFrame {
            client_id: self.client_id,
            request,
        }
    }
}

fn unexpected(stage: &'static str, response: &Response) -> ClientError {
    ClientError::UnexpectedResponse {
        stage,
        code: response.code(),
    }
}

#[cfg(test)]
mod test {
    use super::{run, ClientError, CHUNK_SIZE};
    use crate::config::{StoredIdentity, ME_INFO, PRIV_KEY, TRANSFER_INFO};
    use crate::crypto::keys::{wrap_session_key, KeyPair};
    use crate::crypto::{cipher, cksum};
    use crate::framing::{ResponseCode, ResponseHeader, CLIENT_ID_LEN, NAME_LEN, REQUEST_HDR_LEN};
    use crate::wire;
    use anyhow::Result;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;
    use std::thread::JoinHandle;
    use std::time::Duration;

    const TEST_ID: [u8; CLIENT_ID_LEN] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10,
    ];
    const SESSION_KEY: [u8; 32] = [0x77; 32];
    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

    /// Binds a loopback listener and runs `script` against the one accepted
    /// connection on a background thread.
    fn serve<F>(script: F) -> (String, JoinHandle<Result<()>>)
    where
        F: FnOnce(&mut TcpStream) -> Result<()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            script(&mut stream)
        });
        (port, handle)
    }

    /// Working directory with transfer.info pointing at `port` and a payload
    /// file holding `contents`.
    fn setup_dir(port: &str, contents: &[u8]) -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        let payload = dir.path().join("payload.bin");
        std::fs::write(&payload, contents)?;
        std::fs::write(
            dir.path().join(TRANSFER_INFO),
            format!("127.0.0.1:{port}\nalice\n{}\n", payload.display()),
        )?;
        Ok(dir)
    }

    fn read_request(stream: &mut TcpStream) -> Result<(u16, Vec<u8>)> {
        let mut header = [0u8; REQUEST_HDR_LEN];
        stream.read_exact(&mut header)?;
        let code = wire::unpack_u16(&header, 17)?;
        let size = wire::unpack_u32(&header, 19)? as usize;
        let mut payload = vec![0u8; size];
        stream.read_exact(&mut payload)?;
        Ok((code, payload))
    }

    fn expect_request(stream: &mut TcpStream, want_code: u16) -> Result<Vec<u8>> {
        let (code, payload) = read_request(stream)?;
        anyhow::ensure!(code == want_code, "expected code {want_code}, got {code}");
        Ok(payload)
    }

    fn write_response(stream: &mut TcpStream, code: ResponseCode, payload: &[u8]) -> Result<()> {
        let mut buf = ResponseHeader {
            version: 3,
            code,
            payload_size: payload.len() as u32,
        }
        .to_buf();
        buf.extend_from_slice(payload);
        stream.write_all(&buf)?;
        Ok(())
    }

    fn session_key_payload(public_der: &[u8]) -> Result<Vec<u8>> {
        let mut payload = TEST_ID.to_vec();
        payload.extend_from_slice(&wrap_session_key(public_der, &SESSION_KEY)?);
        Ok(payload)
    }

    fn file_ok_payload(content_size: u32, file_name: &str, crc: u32) -> Vec<u8> {
        let mut payload = TEST_ID.to_vec();
        payload.extend_from_slice(&wire::pack_u32(content_size));
        payload.extend_from_slice(&wire::pad_or_truncate(file_name.as_bytes(), NAME_LEN));
        payload.extend_from_slice(&wire::pack_u32(crc));
        payload
    }

    /// Reads SEND_FILE packets until the last announced one, returning the
    /// reassembled ciphertext and the constant orig_file_size.
    fn read_upload(stream: &mut TcpStream) -> Result<(Vec<u8>, u32)> {
        let mut ciphertext = Vec::new();
        let mut orig_file_size = 0;
        loop {
            let payload = expect_request(stream, 828)?;
            let content_size = wire::unpack_u32(&payload, 0)? as usize;
            orig_file_size = wire::unpack_u32(&payload, 4)?;
            let packet_number = wire::unpack_u16(&payload, 8)?;
            let total_packets = wire::unpack_u16(&payload, 10)?;
            anyhow::ensure!(payload.len() == 12 + NAME_LEN + content_size);
            ciphertext.extend_from_slice(&payload[12 + NAME_LEN..]);
            if packet_number == total_packets {
                return Ok((ciphertext, orig_file_size));
            }
        }
    }

    /// Decrypts a received upload and acknowledges it with the server-side
    /// CRC, then completes the MESSAGE_OK handshake.
    fn accept_upload(stream: &mut TcpStream) -> Result<()> {
        let (ciphertext, _) = read_upload(stream)?;
        let plaintext = cipher::decrypt(&SESSION_KEY, &ciphertext)?;
        let crc = cksum::memcrc(&plaintext);
        write_response(
            stream,
            ResponseCode::FileOk,
            &file_ok_payload(ciphertext.len() as u32, "payload.bin", crc),
        )?;
        expect_request(stream, 900)?;
        write_response(stream, ResponseCode::MessageOk, &TEST_ID)?;
        Ok(())
    }

    fn assert_padded_name(payload: &[u8], name: &str) {
        assert_eq!(payload.len(), NAME_LEN);
        assert_eq!(wire::strip_trailing_nul(payload), name.as_bytes());
    }

    #[test_log::test]
    fn first_run_happy_path() -> Result<()> {
        let (port, server) = serve(|stream| {
            let payload = expect_request(stream, 825)?;
            assert_padded_name(&payload, "alice");
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;

            let payload = expect_request(stream, 826)?;
            anyhow::ensure!(payload.len() == NAME_LEN + 160);
            assert_padded_name(&payload[..NAME_LEN], "alice");
            let reply = session_key_payload(&payload[NAME_LEN..])?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;

            accept_upload(stream)
        });

        let dir = setup_dir(&port, b"hello")?;
        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;

        // Identity was persisted for the next run
        let me_info = std::fs::read_to_string(dir.path().join(ME_INFO))?;
        let mut lines = me_info.lines();
        assert_eq!(lines.next(), Some("alice"));
        assert_eq!(lines.next(), Some(hex::encode(TEST_ID).as_str()));
        let key_line = lines.next().expect("private key line");
        assert_eq!(std::fs::read_to_string(dir.path().join(PRIV_KEY))?, key_line);
        // The persisted key must parse back
        KeyPair::from_base64(key_line)?;
        Ok(())
    }

    #[test_log::test]
    fn large_file_is_chunked_with_a_short_tail() -> Result<()> {
        let (port, server) = serve(|stream| {
            let payload = expect_request(stream, 825)?;
            assert_padded_name(&payload, "alice");
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;
            let payload = expect_request(stream, 826)?;
            let reply = session_key_payload(&payload[NAME_LEN..])?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;

            // 2049 plaintext bytes pad to 2064 ciphertext bytes: 1024+1024+16
            let mut sizes = Vec::new();
            let mut ciphertext = Vec::new();
            loop {
                let payload = expect_request(stream, 828)?;
                let content_size = wire::unpack_u32(&payload, 0)? as usize;
                anyhow::ensure!(wire::unpack_u32(&payload, 4)? == 2049);
                anyhow::ensure!(wire::unpack_u16(&payload, 10)? == 3);
                sizes.push(content_size);
                ciphertext.extend_from_slice(&payload[12 + NAME_LEN..]);
                if wire::unpack_u16(&payload, 8)? == 3 {
                    break;
                }
            }
            anyhow::ensure!(sizes == vec![1024, 1024, 16]);

            let plaintext = cipher::decrypt(&SESSION_KEY, &ciphertext)?;
            anyhow::ensure!(plaintext == vec![0u8; 2049]);
            let crc = cksum::memcrc(&plaintext);
            write_response(
                stream,
                ResponseCode::FileOk,
                &file_ok_payload(ciphertext.len() as u32, "payload.bin", crc),
            )?;
            expect_request(stream, 900)?;
            write_response(stream, ResponseCode::MessageOk, &TEST_ID)?;
            Ok(())
        });

        let dir = setup_dir(&port, &vec![0u8; 2049])?;
        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn transient_register_failures_are_retried() -> Result<()> {
        let (port, server) = serve(|stream| {
            // Two rejections, then success: three REGISTER requests total
            for _ in 0..2 {
                expect_request(stream, 825)?;
                write_response(stream, ResponseCode::RegisterFail, &[])?;
            }
            expect_request(stream, 825)?;
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;

            let payload = expect_request(stream, 826)?;
            let reply = session_key_payload(&payload[NAME_LEN..])?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;
            accept_upload(stream)
        });

        let dir = setup_dir(&port, b"hello")?;
        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn three_register_failures_exhaust_the_stage() -> Result<()> {
        let (port, server) = serve(|stream| {
            for _ in 0..3 {
                expect_request(stream, 825)?;
                write_response(stream, ResponseCode::RegisterFail, &[])?;
            }
            Ok(())
        });

        let dir = setup_dir(&port, b"hello")?;
        match run(dir.path(), TIMEOUT) {
            Err(ClientError::RetriesExhausted { stage }) => assert_eq!(stage, "registration"),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn three_checksum_mismatches_abort_the_upload() -> Result<()> {
        let (port, server) = serve(|stream| {
            let payload = expect_request(stream, 825)?;
            assert_padded_name(&payload, "alice");
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;
            let payload = expect_request(stream, 826)?;
            let reply = session_key_payload(&payload[NAME_LEN..])?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;

            // Upload arrives three times, each answered with a wrong CRC
            for round in 0..3 {
                let (ciphertext, _) = read_upload(stream)?;
                let plaintext = cipher::decrypt(&SESSION_KEY, &ciphertext)?;
                let wrong_crc = cksum::memcrc(&plaintext) ^ 1;
                write_response(
                    stream,
                    ResponseCode::FileOk,
                    &file_ok_payload(ciphertext.len() as u32, "payload.bin", wrong_crc),
                )?;
                if round < 2 {
                    expect_request(stream, 901)?;
                }
            }
            expect_request(stream, 902)?;
            write_response(stream, ResponseCode::MessageOk, &TEST_ID)?;
            Ok(())
        });

        let dir = setup_dir(&port, b"hello")?;
        assert!(matches!(
            run(dir.path(), TIMEOUT),
            Err(ClientError::ChecksumFailed)
        ));
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn login_branch_reuses_the_persisted_identity() -> Result<()> {
        let keys = KeyPair::generate()?;
        let public_der = keys.public_der()?;

        let (port, server) = serve(move |stream| {
            // Read the header raw: a login must carry the stored client id,
            // not the zero id of an unregistered client
            let mut header = [0u8; REQUEST_HDR_LEN];
            stream.read_exact(&mut header)?;
            anyhow::ensure!(header[..16] == TEST_ID, "login must use the stored id");
            anyhow::ensure!(wire::unpack_u16(&header, 17)? == 827);
            let mut payload = vec![0u8; wire::unpack_u32(&header, 19)? as usize];
            stream.read_exact(&mut payload)?;
            assert_padded_name(&payload, "alice");

            let reply = session_key_payload(&public_der)?;
            write_response(stream, ResponseCode::LoginOk, &reply)?;
            accept_upload(stream)
        });

        let dir = setup_dir(&port, b"hello")?;
        StoredIdentity {
            name: "alice".into(),
            client_id: TEST_ID,
            key_base64: keys.to_base64()?,
        }
        .save(dir.path())?;

        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn out_of_state_response_is_fatal() -> Result<()> {
        let (port, server) = serve(|stream| {
            expect_request(stream, 825)?;
            // FILE_OK during registration is illegal in that state
            write_response(
                stream,
                ResponseCode::FileOk,
                &file_ok_payload(16, "payload.bin", 0),
            )?;
            Ok(())
        });

        let dir = setup_dir(&port, b"hello")?;
        match run(dir.path(), TIMEOUT) {
            Err(ClientError::UnexpectedResponse { stage, code }) => {
                assert_eq!(stage, "registration");
                assert_eq!(code, ResponseCode::FileOk);
            }
            other => panic!("expected UnexpectedResponse, got {other:?}"),
        }
        server.join().unwrap()?;
        Ok(())
    }

    #[test_log::test]
    fn empty_file_uploads_one_padding_block() -> Result<()> {
        let (port, server) = serve(|stream| {
            expect_request(stream, 825)?;
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;
            let payload = expect_request(stream, 826)?;
            let reply = session_key_payload(&payload[NAME_LEN..])?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;

            let payload = expect_request(stream, 828)?;
            // One packet of exactly one padding block
            anyhow::ensure!(wire::unpack_u32(&payload, 0)? == 16);
            anyhow::ensure!(wire::unpack_u32(&payload, 4)? == 0);
            anyhow::ensure!(wire::unpack_u16(&payload, 8)? == 1);
            anyhow::ensure!(wire::unpack_u16(&payload, 10)? == 1);
            let ciphertext = &payload[12 + NAME_LEN..];
            let plaintext = cipher::decrypt(&SESSION_KEY, ciphertext)?;
            anyhow::ensure!(plaintext.is_empty());

            write_response(
                stream,
                ResponseCode::FileOk,
                &file_ok_payload(16, "payload.bin", cksum::memcrc(&plaintext)),
            )?;
            expect_request(stream, 900)?;
            write_response(stream, ResponseCode::MessageOk, &TEST_ID)?;
            Ok(())
        });

        let dir = setup_dir(&port, b"")?;
        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;
        Ok(())
    }

    #[test]
    fn chunk_size_matches_the_protocol() {
        // The server reassembles on this boundary; it is not tunable
        assert_eq!(CHUNK_SIZE, 1024);
    }

    #[test_log::test]
    fn general_error_during_key_exchange_is_retried() -> Result<()> {
        let (port, server) = serve(|stream| {
            expect_request(stream, 825)?;
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;

            let payload = expect_request(stream, 826)?;
            let public_der = payload[NAME_LEN..].to_vec();
            write_response(stream, ResponseCode::GeneralError, &[])?;

            // The client re-sends the same public key
            let payload = expect_request(stream, 826)?;
            anyhow::ensure!(payload[NAME_LEN..] == public_der);
            let reply = session_key_payload(&public_der)?;
            write_response(stream, ResponseCode::SessionKey, &reply)?;
            accept_upload(stream)
        });

        let dir = setup_dir(&port, b"hello")?;
        run(dir.path(), TIMEOUT)?;
        server.join().unwrap()?;
        Ok(())
    }

    fn exists(dir: &Path, name: &str) -> bool {
        dir.join(name).exists()
    }

    #[test_log::test]
    fn identity_files_exist_before_the_public_key_is_sent() -> Result<()> {
        // If the process dies between key generation and key exchange, the
        // private key must already be on disk
        let (port, server) = serve(|stream| {
            expect_request(stream, 825)?;
            write_response(stream, ResponseCode::RegisterOk, &TEST_ID)?;
            expect_request(stream, 826)?;
            // Kill the session before replying
            Ok(())
        });

        let dir = setup_dir(&port, b"hello")?;
        assert!(run(dir.path(), TIMEOUT).is_err());
        server.join().unwrap()?;
        assert!(exists(dir.path(), ME_INFO));
        assert!(exists(dir.path(), PRIV_KEY));
        Ok(())
    }
}
