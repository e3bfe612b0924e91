/// Errors that can occur while opening a network interface.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The interface name is empty or contains a NUL byte.
    #[error("invalid interface name {name:?}")]
    InvalidName { name: String },

    /// The interface name does not fit into `struct ifreq`.
    #[error("interface name too long ({len} bytes, max {max}): {name}")]
    NameTooLong { name: String, len: usize, max: usize },

    /// A socket call or ioctl failed while setting up the interface.
    #[error("failed to {op} on interface {name}: {source}")]
    Open {
        name: String,
        op: &'static str,
        source: std::io::Error,
    },

    /// The interface MTU cannot be bridged.
    #[error("interface {name} has MTU {mtu}, supported range is {min}-{max}")]
    MtuOutOfRange {
        name: String,
        mtu: usize,
        min: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, LinkError>;
