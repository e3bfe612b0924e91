use framelab_proto::ProtoError;

/// Errors that end the multiplexer loop.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("no network links to multiplex")]
    NoLinks,

    #[error("{count} links configured, at most {max} fit into one roster")]
    TooManyLinks { count: usize, max: usize },

    /// A system call on one of the loop's descriptors failed.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: std::io::Error,
    },

    /// A descriptor accepted zero bytes.
    #[error("{context}: write accepted no data")]
    WriteZero { context: &'static str },

    /// The child closed its output inside a message.
    #[error("child closed its output with {buffered} bytes of an incomplete message buffered")]
    ChildClosedMidMessage { buffered: usize },

    /// The child announced a message smaller than its own header.
    #[error("child sent a message of size {size}, smaller than the header")]
    SizeBelowHeader { size: u16 },

    /// The child addressed a link that does not exist.
    #[error("child sent a frame for interface {interface}, but only {count} are configured")]
    UnknownInterface { interface: u16, count: u16 },

    /// A captured frame is larger than the link MTU allows.
    #[error("captured a {len}-byte frame on {name}, limit is {limit}")]
    FrameExceedsMtu {
        name: String,
        len: usize,
        limit: usize,
    },

    /// A link reported end-of-file.
    #[error("link {name} closed")]
    LinkClosed { name: String },

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
