use super::{finish_at_eof, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::{Result, SocketError};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Messages separated by a delimiter sequence
///
/// The delimiter is stripped on read and appended on write. A payload that
/// contains the delimiter cannot be written, since it would read back as two
/// messages.
///
/// Decoding remembers how far the buffered bytes have been searched, so each
/// byte is scanned once however the peer splits its writes. That offset is
/// per connection state; every `Framed` gets its own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedProtocol {
    delimiter: Bytes,
    max_message_length: usize,
    next_index: usize,
}

impl Default for DelimitedProtocol {
    fn default() -> Self {
        Self {
            delimiter: Bytes::from_static(b"\n"),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            next_index: 0,
        }
    }
}

impl DelimitedProtocol {
    /// Use `delimiter` between messages; it must not be empty
    pub fn new(delimiter: impl Into<Bytes>) -> Result<Self> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(SocketError::Config("Message delimiter must not be empty".into()));
        }
        Ok(Self {
            delimiter,
            ..Self::default()
        })
    }

    pub fn with_max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    fn find_delimiter(&self, haystack: &[u8], from: usize) -> Option<usize> {
        // A buffer shorter than the saved offset is not the one it was saved for
        let from = if from > haystack.len() { 0 } else { from };
        haystack[from..]
            .windows(self.delimiter.len())
            .position(|window| window == self.delimiter.as_ref())
            .map(|position| from + position)
    }
}

impl Decoder for DelimitedProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Bytes>, SocketError> {
        let found = self.find_delimiter(src, self.next_index);
        // Resume where a delimiter could still begin
        self.next_index = match found {
            Some(_) => 0,
            None => src.len().saturating_sub(self.delimiter.len() - 1),
        };

        match found {
            Some(end) if end > self.max_message_length => Err(SocketError::ProtocolViolation(
                format!(
                    "Message length {end} exceeds limit of {} bytes",
                    self.max_message_length
                ),
            )),
            Some(end) => {
                let message = src.split_to(end).freeze();
                src.advance(self.delimiter.len());
                Ok(Some(message))
            }
            // Any delimiter still to come would end past the limit
            None if src.len() >= self.max_message_length.saturating_add(self.delimiter.len()) => {
                Err(SocketError::ProtocolViolation(format!(
                    "No delimiter within {} bytes",
                    self.max_message_length
                )))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, SocketError> {
        let outcome = finish_at_eof(self, buf);
        self.next_index = 0;
        outcome
    }
}

impl Encoder<Bytes> for DelimitedProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> std::result::Result<(), SocketError> {
        if item.len() > self.max_message_length {
            return Err(SocketError::ProtocolViolation(format!(
                "Message length {} exceeds limit of {} bytes",
                item.len(),
                self.max_message_length
            )));
        }
        if self.find_delimiter(&item, 0).is_some() {
            return Err(SocketError::ProtocolViolation(
                "Message contains the frame delimiter".into(),
            ));
        }
        dst.reserve(item.len() + self.delimiter.len());
        dst.extend_from_slice(&item);
        dst.extend_from_slice(&self.delimiter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_delimiter_rejected() {
        assert!(matches!(
            DelimitedProtocol::new(Bytes::new()),
            Err(SocketError::Config(_))
        ));
    }

    #[test]
    fn test_multi_byte_delimiter() {
        let mut codec = DelimitedProtocol::new(&b"\r\n"[..]).unwrap();
        let mut buf = BytesMut::from(&b"one\r\ntwo\r"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"one"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"two"[..]);
    }

    #[test]
    fn test_runaway_line_is_violation() {
        let mut codec = DelimitedProtocol::default().with_max_message_length(4);
        let mut buf = BytesMut::from(&b"abcde"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SocketError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_message_at_limit_accepted() {
        let mut codec = DelimitedProtocol::default().with_max_message_length(4);
        let mut buf = BytesMut::from(&b"abcd\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"abcd"[..]);
    }

    #[test]
    fn test_encode_refuses_embedded_delimiter() {
        let mut codec = DelimitedProtocol::default();
        let mut dst = BytesMut::new();
        assert!(codec.encode(Bytes::from_static(b"a\nb"), &mut dst).is_err());
    }

    #[test]
    fn test_byte_by_byte_input() {
        let mut codec = DelimitedProtocol::new(&b"\r\n"[..]).unwrap();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in b"first\r\nsecond line\r\n\r\n" {
            buf.extend_from_slice(&[*byte]);
            while let Some(message) = codec.decode(&mut buf).unwrap() {
                decoded.push(message);
            }
        }
        assert_eq!(decoded, vec![&b"first"[..], &b"second line"[..], &b""[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_resumed_scan_covers_whole_buffer() {
        let mut codec = DelimitedProtocol::default();
        let mut buf = BytesMut::new();
        for _ in 0..1000 {
            buf.extend_from_slice(b"x");
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        assert_eq!(codec.next_index, 1000);

        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().len(), 1000);
        assert_eq!(codec.next_index, 0);
    }

    #[test]
    fn test_unbounded_limit_does_not_overflow() {
        let mut codec = DelimitedProtocol::default().with_max_message_length(usize::MAX);
        let mut buf = BytesMut::from(&b"no delimiter yet"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"no delimiter yet"[..]);
    }

    #[test]
    fn test_unterminated_tail_at_eof() {
        let mut codec = DelimitedProtocol::default();
        let mut buf = BytesMut::from(&b"dangling"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(SocketError::ProtocolViolation(_))
        ));
    }
}
