//! Integration tests for command framing over a socket pair
//!
//! Large payloads are split into continuation frames by the sender and must
//! come out of `recv` as one task, in send order.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use iorelay::protocol::codec::{encode_header, FrameCodec, STANDARD_BUFFER_SIZE};
use iorelay::protocol::commands::{cmd, msg};
use iorelay::protocol::Connection;

fn pattern(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_large_and_empty_payloads_reassembled_in_order() {
	let (mut a, mut b) = Connection::pair().unwrap();
	let big = pattern(STANDARD_BUFFER_SIZE * 5 + 17);
	let exact = pattern(STANDARD_BUFFER_SIZE);

	let expected = vec![
		(cmd::SPECIAL, big.clone()),
		(msg::DATA, Vec::new()),
		(cmd::STAT, exact.clone()),
		(msg::FINISHED, Vec::new()),
	];
	let to_send = expected.clone();
	let sender = tokio::spawn(async move {
		for (code, payload) in &to_send {
			a.send_command(*code, payload).await.unwrap();
		}
		a
	});

	for (code, payload) in expected {
		let task = b.recv().await.unwrap().unwrap();
		assert_eq!(task.cmd, code);
		assert_eq!(task.data.len(), payload.len());
		assert_eq!(task.data, payload);
	}
	drop(sender.await.unwrap());
	assert!(b.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_closed_peer_reads_as_end() {
	let (mut a, mut b) = Connection::pair().unwrap();
	a.close();
	assert!(!a.is_connected());
	assert!(b.recv().await.unwrap().is_none());
	assert!(a.send_command(cmd::STAT, b"x").await.is_err());
}

#[test]
fn test_header_split_across_reads() {
	let mut codec = FrameCodec;
	let header = encode_header(5, false, msg::DATA).unwrap();

	let mut buf = BytesMut::new();
	buf.extend_from_slice(&header[..4]);
	assert!(codec.decode(&mut buf).unwrap().is_none());
	buf.extend_from_slice(&header[4..]);
	buf.extend_from_slice(b"he");
	assert!(codec.decode(&mut buf).unwrap().is_none());
	buf.extend_from_slice(b"llo");

	let frame = codec.decode(&mut buf).unwrap().unwrap();
	assert_eq!(frame.cmd, msg::DATA);
	assert!(!frame.more);
	assert_eq!(frame.payload, b"hello");
	assert!(buf.is_empty());
}

#[tokio::test]
async fn test_continuation_with_other_command_is_violation() {
	use iorelay::protocol::codec::Frame;
	use futures::SinkExt;
	use tokio_util::codec::Framed;

	let (raw, other) = tokio::net::UnixStream::pair().unwrap();
	let mut framed = Framed::new(raw, FrameCodec);
	let mut conn = Connection::from_stream(other);

	let mut first = Frame::new(cmd::SPECIAL, b"abc".to_vec());
	first.more = true;
	framed.send(first).await.unwrap();
	framed.send(Frame::new(cmd::STAT, b"def".to_vec())).await.unwrap();

	assert!(conn.recv().await.is_err());
	assert!(!conn.is_connected());
}

// vim: ts=4
