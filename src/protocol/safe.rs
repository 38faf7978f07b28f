use super::finish_at_eof;
use super::length::LengthProtocol;
use crate::SocketError;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Marker written in front of every safe frame
pub const SAFE_PROTOCOL_COOKIE: &[u8] = b"You are using SafeProtocol";

/// Length-prefixed framing guarded by a fixed cookie
///
/// ```text
/// +--------------------+------------------+-------------------+
/// | Cookie (26 bytes)  | Length (4 bytes) | Payload (N bytes) |
/// +--------------------+------------------+-------------------+
/// ```
///
/// The cookie catches peers speaking some other protocol on the first bytes
/// they send, and the length is capped, so a stray or hostile client cannot
/// make the server buffer an unbounded amount of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafeProtocol {
    length: LengthProtocol,
}

impl SafeProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.length = self.length.with_max_message_length(max);
        self
    }

    pub fn max_message_length(&self) -> usize {
        self.length.max_message_length()
    }
}

impl Decoder for SafeProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        let seen = src.len().min(SAFE_PROTOCOL_COOKIE.len());
        if src[..seen] != SAFE_PROTOCOL_COOKIE[..seen] {
            return Err(SocketError::ProtocolViolation(format!(
                "Safe protocol mismatch, unexpected header {:?}",
                String::from_utf8_lossy(&src[..seen])
            )));
        }
        self.length.decode_after(src, SAFE_PROTOCOL_COOKIE.len())
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        finish_at_eof(self, buf)
    }
}

impl Encoder<Bytes> for SafeProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), SocketError> {
        if item.len() > self.length.max_message_length() {
            return Err(SocketError::ProtocolViolation(format!(
                "Message length {} exceeds limit of {} bytes",
                item.len(),
                self.length.max_message_length()
            )));
        }
        dst.reserve(SAFE_PROTOCOL_COOKIE.len());
        dst.extend_from_slice(SAFE_PROTOCOL_COOKIE);
        self.length.encode_into(&item, dst)
    }
}
