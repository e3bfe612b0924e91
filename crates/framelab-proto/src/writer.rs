use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_message, CONTROL, MAX_MESSAGE_SIZE};
use crate::error::{ProtoError, Result};

/// Writes complete messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_MESSAGE_SIZE),
        }
    }

    /// Encode and send a payload with the given message type.
    ///
    /// Header and payload go out as one contiguous buffer so a reader
    /// never observes a header without its payload from this writer.
    pub fn send(&mut self, kind: u16, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_message(kind, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(ProtoError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtoError::Io(err)),
            }
        }

        self.flush()
    }

    /// Send operator text on the control plane.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(CONTROL, text.as_bytes())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProtoError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_message, MAX_PAYLOAD};

    fn written(writer: MessageWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(1, b"hello").unwrap();

        let mut wire = written(writer);
        let msg = decode_message(&mut wire).unwrap().unwrap();
        assert_eq!(msg.kind, 1);
        assert_eq!(msg.payload.as_ref(), b"hello");
        assert!(wire.is_empty());
    }

    #[test]
    fn frames_and_text_interleave() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(2, b"abc").unwrap();
        writer.send_text("note").unwrap();

        let mut wire = written(writer);
        let m1 = decode_message(&mut wire).unwrap().unwrap();
        let m2 = decode_message(&mut wire).unwrap().unwrap();
        assert_eq!((m1.kind, m1.payload.as_ref()), (2, b"abc".as_ref()));
        assert_eq!((m2.kind, m2.payload.as_ref()), (CONTROL, b"note".as_ref()));
    }

    #[test]
    fn payload_too_large_rejected() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.send(1, &vec![0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, ProtoError::PayloadTooLarge { .. }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut writer = MessageWriter::new(TrickleWriter::default());
        writer.send(5, b"in small pieces").unwrap();

        let sink = writer.into_inner();
        assert!(sink.flushed);
        let mut wire = BytesMut::from(sink.data.as_slice());
        let msg = decode_message(&mut wire).unwrap().unwrap();
        assert_eq!(msg.payload.as_ref(), b"in small pieces");
    }

    #[test]
    fn interrupted_write_retries() {
        let mut writer = MessageWriter::new(InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        });
        writer.send(6, b"retry").unwrap();
        assert_eq!(writer.get_ref().data.len(), 4 + 5);
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send(1, b"x").unwrap_err();
        assert!(matches!(err, ProtoError::ConnectionClosed));
    }

    #[derive(Default)]
    struct TrickleWriter {
        data: Vec<u8>,
        flushed: bool,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
