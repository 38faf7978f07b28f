use super::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::SocketError;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One message per connection, terminated by the peer closing its side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofProtocol {
    max_message_length: usize,
}

impl Default for EofProtocol {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl EofProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    fn check(&self, buffered: usize) -> Result<(), SocketError> {
        if buffered > self.max_message_length {
            return Err(SocketError::ProtocolViolation(format!(
                "Message exceeds limit of {} bytes before end of stream",
                self.max_message_length
            )));
        }
        Ok(())
    }
}

impl Decoder for EofProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        self.check(src.len())?;
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        if buf.is_empty() {
            return Ok(None);
        }
        self.check(buf.len())?;
        Ok(Some(buf.split().freeze()))
    }
}

impl Encoder<Bytes> for EofProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), SocketError> {
        self.check(item.len())?;
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_released_only_at_eof() {
        let mut codec = EofProtocol::new();
        let mut buf = BytesMut::from(&b"whole message"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), &b"whole message"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_cap_enforced_while_buffering() {
        let mut codec = EofProtocol::new().with_max_message_length(4);
        let mut buf = BytesMut::from(&b"12345"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SocketError::ProtocolViolation(_))
        ));
    }
}
