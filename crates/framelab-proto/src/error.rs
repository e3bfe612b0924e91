/// Errors that can occur while framing, decoding or dispatching messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// A decoded header announced a size smaller than the header itself.
    #[error("message size {size} is smaller than the {header}-byte header")]
    SizeBelowHeader { size: u16, header: usize },

    /// The payload does not fit into a single message.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A message referenced an interface that is not configured.
    #[error("message for interface {interface}, but only {count} interfaces are configured")]
    UnknownInterface { interface: u16, count: u16 },

    /// An I/O error occurred while reading or writing messages.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed at a message boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream was closed while a message was only partially received.
    #[error("connection closed with {buffered} bytes of an incomplete message buffered")]
    ClosedMidMessage { buffered: usize },
}

pub type Result<T> = std::result::Result<T, ProtoError>;
