use crate::SocketError;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound on a single direct read
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// No framing at all: every read yields whatever bytes have arrived
///
/// Message boundaries are whatever the network delivers, so this only suits
/// peers that do their own delimiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectProtocol {
    chunk_size: usize,
}

impl Default for DirectProtocol {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DirectProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Decoder for DirectProtocol {
    type Item = Bytes;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, SocketError> {
        if src.is_empty() {
            return Ok(None);
        }
        let take = src.len().min(self.chunk_size);
        Ok(Some(src.split_to(take).freeze()))
    }
}

impl Encoder<Bytes> for DirectProtocol {
    type Error = SocketError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), SocketError> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
