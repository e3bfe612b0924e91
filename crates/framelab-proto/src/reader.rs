use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_message, Message, MAX_MESSAGE_SIZE};
use crate::error::{ProtoError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Partial reads are buffered internally; callers only see complete messages.
/// The buffer never grows beyond one maximum-size message plus one read
/// chunk.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_MESSAGE_SIZE + READ_CHUNK_SIZE),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(ProtoError::ConnectionClosed)` on EOF at a message
    /// boundary and `Err(ProtoError::ClosedMidMessage)` on EOF inside one.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf)? {
                return Ok(msg);
            }
            if self.fill()? == 0 {
                if self.buf.is_empty() {
                    return Err(ProtoError::ConnectionClosed);
                }
                return Err(ProtoError::ClosedMidMessage {
                    buffered: self.buf.len(),
                });
            }
        }
    }

    /// Read one chunk into the buffer, returning the number of new bytes.
    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtoError::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_message;

    #[test]
    fn read_single_message() {
        let mut wire = BytesMut::new();
        encode_message(1, b"hello", &mut wire).unwrap();

        let mut reader = MessageReader::new(Cursor::new(wire.to_vec()));
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.kind, 1);
        assert_eq!(msg.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_messages() {
        let mut wire = BytesMut::new();
        encode_message(1, b"one", &mut wire).unwrap();
        encode_message(0, b"two", &mut wire).unwrap();
        encode_message(3, b"three", &mut wire).unwrap();

        let mut reader = MessageReader::new(Cursor::new(wire.to_vec()));

        let m1 = reader.read_message().unwrap();
        let m2 = reader.read_message().unwrap();
        let m3 = reader.read_message().unwrap();

        assert_eq!((m1.kind, m1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((m2.kind, m2.payload.as_ref()), (0, b"two".as_ref()));
        assert_eq!((m3.kind, m3.payload.as_ref()), (3, b"three".as_ref()));
    }

    #[test]
    fn read_maximum_size_message() {
        let payload = vec![0xAB; crate::codec::MAX_PAYLOAD];
        let mut wire = BytesMut::new();
        encode_message(9, &payload, &mut wire).unwrap();

        let mut reader = MessageReader::new(Cursor::new(wire.to_vec()));
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.kind, 9);
        assert_eq!(msg.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_message(4, b"slow", &mut wire).unwrap();

        let mut reader = MessageReader::new(ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        });

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.kind, 4);
        assert_eq!(msg.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtoError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_message() {
        let mut wire = BytesMut::new();
        encode_message(2, b"only-part-of-it", &mut wire).unwrap();
        wire.truncate(9);

        let mut reader = MessageReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtoError::ClosedMidMessage { buffered: 9 }));
    }

    #[test]
    fn size_below_header_in_stream() {
        let mut reader = MessageReader::new(Cursor::new(vec![0x00, 0x02, 0x00, 0x01]));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, ProtoError::SizeBelowHeader { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_message(8, b"ok", &mut wire).unwrap();

        let mut reader = MessageReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire.to_vec()),
        });
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.kind, 8);
        assert_eq!(msg.payload.as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        writer.send(1, b"ping").unwrap();
        writer.send_text("hello operator\n").unwrap();

        let m1 = reader.read_message().unwrap();
        let m2 = reader.read_message().unwrap();
        assert_eq!((m1.kind, m1.payload.as_ref()), (1, b"ping".as_ref()));
        assert_eq!(
            (m2.kind, m2.payload.as_ref()),
            (0, b"hello operator\n".as_ref())
        );
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
