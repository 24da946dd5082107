use crate::framing::request::RequestFrame;
use crate::framing::response::{Response, ResponseHeader};
use crate::framing::{FramingError, RESPONSE_HDR_LEN};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::trace;

/// Upper bound on an announced response payload. Nothing the server sends is
/// larger than a FILE_OK, so anything past this is a corrupt frame.
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 8 * 1024 * 1024;

/// Blocking request/response socket carrying framed protocol messages.
///
/// The protocol is strictly client-driven: the client writes one or more
/// request frames, then reads exactly one response. There is no reconnect;
/// a failed socket fails the whole session.
pub struct FrameSocket {
    stream: TcpStream,
    max_payload_length: usize,
}

impl FrameSocket {
    /// Resolves `host:port` and opens the one TCP connection of the session.
    ///
    /// `timeout` bounds the connect and each read and write; `None` blocks
    /// indefinitely, matching the behavior of the reference client.
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, FramingError> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|_| FramingError::BadEndpoint(format!("{host}:{port}")))?
            .collect();
        let stream = match timeout {
            None => TcpStream::connect(&addrs[..])?,
            Some(limit) => {
                let mut attempt = Err(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "no addresses to connect to",
                ));
                for addr in &addrs {
                    attempt = TcpStream::connect_timeout(addr, limit);
                    if attempt.is_ok() {
                        break;
                    }
                }
                attempt?
            }
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        trace!("Connected to {}:{}", host, port);
        Ok(Self {
            stream,
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
        })
    }

    pub fn send(&mut self, frame: &RequestFrame) -> Result<(), FramingError> {
        let buf = frame.to_buf();
        trace!(
            "Sending code {} frame with {:#x} bytes: {}",
            frame.request.code(),
            buf.len(),
            hex::encode(&buf),
        );
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads the 7-byte header, then exactly the announced payload, and
    /// decodes it against the header's code.
    pub fn recv(&mut self) -> Result<Response, FramingError> {
        let mut header_buf = [0u8; RESPONSE_HDR_LEN];
        self.recv_exact(&mut header_buf)?;
        let header = ResponseHeader::from_buf(&header_buf)?;
        trace!(
            "Received header: version {:#x}, code {}, {:#x} bytes payload",
            header.version,
            header.code,
            header.payload_size,
        );

        let payload_size = header.payload_size as usize;
        if payload_size > self.max_payload_length {
            return Err(FramingError::PayloadTooLarge(
                payload_size,
                self.max_payload_length,
            ));
        }
        let mut payload = vec![0u8; payload_size];
        self.recv_exact(&mut payload)?;
        trace!("Received payload: {}", hex::encode(&payload));
        Response::decode(header.code, &payload)
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), FramingError> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FramingError::ClosedByPeer("server closed connection mid-frame".to_owned())
            } else {
                FramingError::Io { source: e }
            }
        })
    }

    /// Full close; the protocol never half-closes.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
