use std::io;
use std::os::fd::AsRawFd;

use framelab_proto::{MacAddress, VlanTag, ETHERNET_HEADER_SIZE, MAX_PAYLOAD, VLAN_TAG_SIZE};

use crate::error::{LinkError, Result};

/// Smallest MTU accepted for a bridged interface.
pub const MIN_MTU: usize = 68;

/// Largest MTU whose frames (plus a VLAN tag) still fit into one message.
pub const MAX_MTU: usize = MAX_PAYLOAD - ETHERNET_HEADER_SIZE - VLAN_TAG_SIZE;

/// Result of one receive on a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// A frame of `len` bytes was written to the start of the buffer.
    ///
    /// `vlan` carries the tag the kernel stripped from the frame, if any.
    Frame { len: usize, vlan: Option<VlanTag> },
    /// The socket delivered a frame seen on another interface.
    Foreign { ifindex: i32 },
}

/// A network interface the multiplexer can capture from and inject into.
///
/// The file descriptor must become readable when a frame is waiting and
/// writable when a frame can be sent.
pub trait Link: AsRawFd {
    /// Interface name as given by the operator.
    fn name(&self) -> &str;

    /// Hardware address of the interface.
    fn mac(&self) -> MacAddress;

    /// Configured MTU (payload bytes, not counting the Ethernet header).
    fn mtu(&self) -> usize;

    /// Receive one frame into `buf`.
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<Capture>;

    /// Send one complete frame, returning the number of bytes accepted.
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<usize>;
}

/// Reject MTUs that are unusable for bridging.
pub fn check_mtu(name: &str, mtu: usize) -> Result<usize> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(LinkError::MtuOutOfRange {
            name: name.to_string(),
            mtu,
            min: MIN_MTU,
            max: MAX_MTU,
        });
    }
    Ok(mtu)
}
