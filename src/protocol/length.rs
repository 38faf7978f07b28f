use super::{finish_at_eof, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::SocketError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the big-endian length header
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Length-prefixed framing
///
/// ```text
/// +------------------+-------------------+
/// | Length (4 bytes) | Payload (N bytes) |
/// +------------------+-------------------+
/// ```
///
/// The header is a signed 32-bit big-endian integer. A negative length or one
/// over the configured maximum is rejected as soon as the header arrives,
/// before any payload is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthProtocol {
    max_message_length: usize,
}

impl Default for LengthProtocol {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl LengthProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the payload size; values above `i32::MAX` are clamped
    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max.min(i32::MAX as usize);
        self
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    fn check_length(&self, declared: i32) -> Result<usize, SocketError> {
        if declared < 0 {
            return Err(SocketError::ProtocolViolation(format!(
                "Negative message length {declared}"
            )));
        }
        let len = declared as usize;
        if len > self.max_message_length {
            return Err(SocketError::ProtocolViolation(format!(
                "Message length {len} exceeds limit of {} bytes",
                self.max_message_length
            )));
        }
        Ok(len)
    }

    /// Decode one frame whose header starts `prefix` bytes into `src`
    ///
    /// The prefix is consumed together with the frame.
    pub(crate) fn decode_after(
        &self,
        src: &mut BytesMut,
        prefix: usize,
    ) -> Result<Option<Bytes>, SocketError> {
        let header_end = prefix + LENGTH_HEADER_SIZE;
        if src.len() < header_end {
            return Ok(None);
        }

        let declared = i32::from_be_bytes([
            src[prefix],
            src[prefix + 1],
            src[prefix + 2],
            src[prefix + 3],
        ]);
        let len = self.check_length(declared)?;

        let frame_end = header_end + len;
        if src.len() < frame_end {
            src.reserve(frame_end - src.len());
            return Ok(None);
        }

        src.advance(header_end);
        Ok(Some(src.split_to(len).freeze()))
    }

    pub(crate) fn encode_into(&self, item: &[u8], dst: &mut BytesMut) -> Result<(), SocketError> {
        if item.len() > self.max_message_length {
            return Err(SocketError::ProtocolViolation(format!(
                "Message length {} exceeds limit of {} bytes",
                item.len(),
                self.max_message_length
            )));
        }
        dst.reserve(LENGTH_HEADER_SIZE + item.len());
        dst.put_i32(item.len() as i32);
        dst.extend_from_slice(item);
        Ok(())
    }
}

impl Decoder for LengthProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        self.decode_after(src, 0)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        finish_at_eof(self, buf)
    }
}

impl Encoder<Bytes> for LengthProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), SocketError> {
        self.encode_into(&item, dst)
    }
}
