use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use proptest::prelude::*;
use socksrv::protocol::{
    DelimitedProtocol, LengthProtocol, SAFE_PROTOCOL_COOKIE, SafeProtocol,
};
use socksrv::{SocketError, TcpProtocol};
use tokio_util::codec::{Decoder, Encoder};

fn encode_all(protocol: &mut TcpProtocol, messages: &[Vec<u8>]) -> BytesMut {
    let mut wire = BytesMut::new();
    for message in messages {
        protocol
            .encode(Bytes::copy_from_slice(message), &mut wire)
            .expect("encode within cap");
    }
    wire
}

/// Feed `wire` to the decoder in pieces of `chunk` bytes
fn decode_in_chunks(
    protocol: &mut TcpProtocol,
    wire: &[u8],
    chunk: usize,
) -> Result<Vec<Bytes>, SocketError> {
    let mut buffer = BytesMut::new();
    let mut decoded = Vec::new();
    for piece in wire.chunks(chunk.max(1)) {
        buffer.extend_from_slice(piece);
        while let Some(message) = protocol.decode(&mut buffer)? {
            decoded.push(message);
        }
    }
    while let Some(message) = protocol.decode_eof(&mut buffer)? {
        decoded.push(message);
    }
    Ok(decoded)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: whatever the read boundaries, safe framing yields the messages written
    #[test]
    fn safe_framing_survives_arbitrary_splits(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
        chunk in 1usize..64,
    ) {
        let mut protocol = TcpProtocol::default();
        let wire = encode_all(&mut protocol, &messages);
        let decoded = decode_in_chunks(&mut protocol, &wire, chunk)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(decoded.len(), messages.len());
        for (got, want) in decoded.iter().zip(&messages) {
            prop_assert_eq!(&got[..], &want[..]);
        }
    }

    /// Property: delimited framing yields the messages written when they avoid the delimiter
    #[test]
    fn delimited_framing_survives_arbitrary_splits(
        messages in prop::collection::vec("[a-z ]{0,40}", 1..8),
        chunk in 1usize..16,
    ) {
        let mut protocol = TcpProtocol::Delimited(DelimitedProtocol::default());
        let raw: Vec<Vec<u8>> = messages.iter().map(|m| m.as_bytes().to_vec()).collect();
        let wire = encode_all(&mut protocol, &raw);
        let decoded = decode_in_chunks(&mut protocol, &wire, chunk)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(decoded.len(), raw.len());
        for (got, want) in decoded.iter().zip(&raw) {
            prop_assert_eq!(&got[..], &want[..]);
        }
    }

    /// Property: a declared length over the cap is rejected before any payload arrives
    #[test]
    fn oversized_declared_length_is_violation(
        cap in 1usize..4096,
        excess in 1i32..1_000_000,
    ) {
        let mut protocol = TcpProtocol::Safe(SafeProtocol::new().with_max_message_length(cap));
        let mut wire = BytesMut::new();
        wire.put_slice(SAFE_PROTOCOL_COOKIE);
        wire.put_i32(cap as i32 + excess);

        prop_assert!(matches!(
            protocol.decode(&mut wire),
            Err(SocketError::ProtocolViolation(_))
        ));
    }

    /// Property: negative declared lengths are always violations
    #[test]
    fn negative_length_is_violation(declared in i32::MIN..0) {
        let mut protocol = TcpProtocol::Length(LengthProtocol::new());
        let mut wire = BytesMut::new();
        wire.put_i32(declared);

        prop_assert!(matches!(
            protocol.decode(&mut wire),
            Err(SocketError::ProtocolViolation(_))
        ));
    }

    /// Property: truncating a length frame anywhere inside it is a violation at end of stream
    #[test]
    fn truncated_frame_is_violation(
        payload in prop::collection::vec(any::<u8>(), 1..256),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut protocol = TcpProtocol::Length(LengthProtocol::new());
        let wire = encode_all(&mut protocol, &[payload]);
        let keep = 1 + cut.index(wire.len() - 1);

        let result = decode_in_chunks(&mut protocol, &wire[..keep], keep);
        prop_assert!(matches!(result, Err(SocketError::ProtocolViolation(_))));
    }

    /// Property: framed streams deliver messages in order through an in-memory pipe
    #[test]
    fn framed_pipe_preserves_order(
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..6),
    ) {
        tokio_test::block_on(async {
            let (client, server) = tokio::io::duplex(64);
            let protocol = TcpProtocol::default();
            let mut writer = TcpProtocol::framed(&protocol, client);
            let mut reader = TcpProtocol::framed(&protocol, server);

            let expected = messages.clone();
            let send = async move {
                for message in messages {
                    writer.send(Bytes::from(message)).await?;
                }
                SinkExt::<Bytes>::close(&mut writer).await
            };
            let receive = async move {
                let mut got = Vec::new();
                while let Some(message) = reader.next().await {
                    got.push(message?.to_vec());
                }
                Ok::<_, SocketError>(got)
            };

            let (sent, received) = tokio::join!(send, receive);
            sent.map_err(|e| TestCaseError::fail(e.to_string()))?;
            let received = received.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(received, expected);
            Ok(())
        })?;
    }
}
