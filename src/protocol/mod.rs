//! Message framing over byte streams
//!
//! TCP delivers a stream of bytes, so a listener needs a rule for where one
//! message ends and the next begins. Each strategy here is a small value that
//! implements [`Decoder`] and [`Encoder`]; per-connection buffering lives in
//! the [`Framed`] wrapper, and every connection gets its own clone of the
//! configured [`TcpProtocol`]. The only decoder state is the delimited scan
//! offset, which never crosses connections.
//!
//! Every strategy that buffers a whole message enforces a maximum length. A
//! peer that announces or sends more than that gets a
//! [`SocketError::ProtocolViolation`] for its own connection; nothing is
//! allocated for the oversized payload.

pub mod delimited;
pub mod direct;
pub mod eof;
pub mod length;
pub mod safe;

pub use delimited::DelimitedProtocol;
pub use direct::DirectProtocol;
pub use eof::EofProtocol;
pub use length::LengthProtocol;
pub use safe::{SAFE_PROTOCOL_COOKIE, SafeProtocol};

use crate::SocketError;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Largest message buffered by default (1 MiB)
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1024 * 1024;

/// End-of-stream handling shared by the boundary-based strategies
///
/// A stream that stops exactly on a message boundary ends cleanly; leftover
/// bytes mean the peer went away mid-message.
pub(crate) fn finish_at_eof<D>(codec: &mut D, buf: &mut BytesMut) -> Result<Option<Bytes>, SocketError>
where
    D: Decoder<Item = Bytes, Error = SocketError>,
{
    match codec.decode(buf)? {
        Some(message) => Ok(Some(message)),
        None if buf.is_empty() => Ok(None),
        None => Err(SocketError::ProtocolViolation(format!(
            "Stream ended in the middle of a message ({} bytes unread)",
            buf.len()
        ))),
    }
}

/// The framing strategy used on accepted connections
///
/// # Examples
///
/// ```
/// use socksrv::protocol::{LengthProtocol, TcpProtocol};
///
/// assert_eq!(TcpProtocol::default().name(), "safe");
///
/// let protocol = TcpProtocol::Length(LengthProtocol::new().with_max_message_length(4096));
/// assert_eq!(protocol.max_message_length(), Some(4096));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpProtocol {
    Safe(SafeProtocol),
    Length(LengthProtocol),
    Direct(DirectProtocol),
    Eof(EofProtocol),
    Delimited(DelimitedProtocol),
}

impl Default for TcpProtocol {
    fn default() -> Self {
        TcpProtocol::Safe(SafeProtocol::default())
    }
}

impl TcpProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            TcpProtocol::Safe(_) => "safe",
            TcpProtocol::Length(_) => "length",
            TcpProtocol::Direct(_) => "direct",
            TcpProtocol::Eof(_) => "eof",
            TcpProtocol::Delimited(_) => "delimited",
        }
    }

    /// The size cap, for strategies that buffer whole messages
    pub fn max_message_length(&self) -> Option<usize> {
        match self {
            TcpProtocol::Safe(p) => Some(p.max_message_length()),
            TcpProtocol::Length(p) => Some(p.max_message_length()),
            TcpProtocol::Direct(_) => None,
            TcpProtocol::Eof(p) => Some(p.max_message_length()),
            TcpProtocol::Delimited(p) => Some(p.max_message_length()),
        }
    }

    /// Wrap a stream so it reads and writes whole messages
    pub fn framed<T>(&self, io: T) -> Framed<T, TcpProtocol>
    where
        T: AsyncRead + AsyncWrite,
    {
        Framed::new(io, self.clone())
    }
}

impl Decoder for TcpProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        match self {
            TcpProtocol::Safe(p) => p.decode(src),
            TcpProtocol::Length(p) => p.decode(src),
            TcpProtocol::Direct(p) => p.decode(src),
            TcpProtocol::Eof(p) => p.decode(src),
            TcpProtocol::Delimited(p) => p.decode(src),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        match self {
            TcpProtocol::Safe(p) => p.decode_eof(buf),
            TcpProtocol::Length(p) => p.decode_eof(buf),
            TcpProtocol::Direct(p) => p.decode_eof(buf),
            TcpProtocol::Eof(p) => p.decode_eof(buf),
            TcpProtocol::Delimited(p) => p.decode_eof(buf),
        }
    }
}

impl Encoder<Bytes> for TcpProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), SocketError> {
        match self {
            TcpProtocol::Safe(p) => p.encode(item, dst),
            TcpProtocol::Length(p) => p.encode(item, dst),
            TcpProtocol::Direct(p) => p.encode(item, dst),
            TcpProtocol::Eof(p) => p.encode(item, dst),
            TcpProtocol::Delimited(p) => p.encode(item, dst),
        }
    }
}
