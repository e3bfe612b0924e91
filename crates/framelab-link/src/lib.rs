//! Raw link-layer access to network interfaces.
//!
//! This is the lowest layer of framelab. The multiplexer only sees the
//! [`Link`] trait; [`RawLink`] implements it on Linux with an `AF_PACKET`
//! socket bound to a single interface.

pub mod error;
pub mod link;

#[cfg(target_os = "linux")]
pub mod raw;

pub use error::{LinkError, Result};
pub use link::{check_mtu, Capture, Link, MAX_MTU, MIN_MTU};

#[cfg(target_os = "linux")]
pub use raw::RawLink;
