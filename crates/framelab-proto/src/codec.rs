use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, Result};

/// Message header: size (2) + type (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest message a 16-bit size field can describe, header included.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Largest payload that fits into a single message.
pub const MAX_PAYLOAD: usize = MAX_MESSAGE_SIZE - HEADER_SIZE;

/// Message type of the control plane: the MAC roster first, operator text
/// afterwards. Every other type names an interface, counting from 1.
pub const CONTROL: u16 = 0;

/// Decoded message header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────────┐
/// │ Size (2B BE) │ Type (2B BE) │ Payload (Size - 4 bytes)│
/// └──────────────┴──────────────┴─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message size, header included.
    pub size: u16,
    /// `0` for control, otherwise the 1-based interface number.
    pub kind: u16,
}

impl MessageHeader {
    /// Header for a payload of `payload_len` bytes.
    pub fn for_payload(kind: u16, payload_len: usize) -> Result<Self> {
        if payload_len > MAX_PAYLOAD {
            return Err(ProtoError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            size: (HEADER_SIZE + payload_len) as u16,
            kind,
        })
    }

    /// Parse a header from the start of `src`, or `None` if fewer than
    /// [`HEADER_SIZE`] bytes are available.
    pub fn parse(src: &[u8]) -> Option<Self> {
        let raw = src.get(..HEADER_SIZE)?;
        Some(Self {
            size: u16::from_be_bytes([raw[0], raw[1]]),
            kind: u16::from_be_bytes([raw[2], raw[3]]),
        })
    }

    /// Serialize the header in network byte order.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let size = self.size.to_be_bytes();
        let kind = self.kind.to_be_bytes();
        [size[0], size[1], kind[0], kind[1]]
    }

    /// Reject sizes that cannot even hold the header.
    pub fn validate(self) -> Result<Self> {
        if (self.size as usize) < HEADER_SIZE {
            return Err(ProtoError::SizeBelowHeader {
                size: self.size,
                header: HEADER_SIZE,
            });
        }
        Ok(self)
    }

    /// Number of payload bytes following the header.
    pub fn payload_len(self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `0` for control, otherwise the 1-based interface number.
    pub kind: u16,
    /// The message payload.
    pub payload: Bytes,
}

/// Append `header || payload` to `dst`.
pub fn encode_message(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = MessageHeader::for_payload(kind, payload.len())?;
    dst.reserve(header.size as usize);
    dst.put_u16(header.size);
    dst.put_u16(header.kind);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` until the header and the full announced size are
/// buffered. On success, consumes exactly the message bytes.
pub fn decode_message(src: &mut BytesMut) -> Result<Option<Message>> {
    let Some(header) = MessageHeader::parse(&src[..]) else {
        return Ok(None); // Need more data
    };
    let header = header.validate()?;

    if src.len() < header.size as usize {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len()).freeze();

    Ok(Some(Message {
        kind: header.kind,
        payload,
    }))
}
