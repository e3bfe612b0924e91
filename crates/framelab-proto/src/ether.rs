//! Ethernet addressing and IEEE 802.1Q tag handling.

use std::fmt;

/// Number of bytes in a MAC address.
pub const MAC_ADDR_SIZE: usize = 6;

/// Destination MAC + source MAC + EtherType/TPID.
pub const ETHERNET_HEADER_SIZE: usize = 2 * MAC_ADDR_SIZE + 2;

/// Byte offset of an 802.1Q tag: right after the two MAC fields.
pub const VLAN_OFFSET: usize = 2 * MAC_ADDR_SIZE;

/// Size of an 802.1Q tag (TPID + TCI).
pub const VLAN_TAG_SIZE: usize = 4;

/// TPID marking an 802.1Q tagged frame.
pub const ETH_P_8021Q: u16 = 0x8100;

/// Mask selecting the VLAN id bits of a TCI.
pub const VLAN_ID_MASK: u16 = 0x0FFF;

/// A MAC address, compared byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; MAC_ADDR_SIZE]);

impl MacAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_ADDR_SIZE]);

    /// Read a MAC address from the first six bytes of `src`.
    pub fn from_slice(src: &[u8]) -> Option<Self> {
        let raw = src.get(..MAC_ADDR_SIZE)?;
        let mut mac = [0u8; MAC_ADDR_SIZE];
        mac.copy_from_slice(raw);
        Some(Self(mac))
    }

    /// True for multicast and broadcast addresses (group bit set).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// True for individual (unicast) addresses.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

/// An 802.1Q tag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    pub tpid: u16,
    pub tci: u16,
}

impl VlanTag {
    /// A standard 802.1Q tag with the given TCI.
    pub fn new(tci: u16) -> Self {
        Self {
            tpid: ETH_P_8021Q,
            tci,
        }
    }

    /// VLAN id carried in the low 12 bits of the TCI.
    pub fn vlan_id(&self) -> u16 {
        self.tci & VLAN_ID_MASK
    }

    pub fn to_bytes(self) -> [u8; VLAN_TAG_SIZE] {
        let tpid = self.tpid.to_be_bytes();
        let tci = self.tci.to_be_bytes();
        [tpid[0], tpid[1], tci[0], tci[1]]
    }
}

/// Destination MAC of `frame`, if it is long enough to carry one.
pub fn destination(frame: &[u8]) -> Option<MacAddress> {
    MacAddress::from_slice(frame)
}

/// Source MAC of `frame`, if it is long enough to carry one.
pub fn source(frame: &[u8]) -> Option<MacAddress> {
    MacAddress::from_slice(frame.get(MAC_ADDR_SIZE..)?)
}

/// The EtherType (or TPID for tagged frames) following the MAC pair.
pub fn ether_type(frame: &[u8]) -> Option<u16> {
    let raw = frame.get(VLAN_OFFSET..VLAN_OFFSET + 2)?;
    Some(u16::from_be_bytes([raw[0], raw[1]]))
}

/// The 802.1Q tag of `frame`, if it is tagged and long enough to hold one.
pub fn vlan_tag(frame: &[u8]) -> Option<VlanTag> {
    if ether_type(frame)? != ETH_P_8021Q {
        return None;
    }
    let raw = frame.get(VLAN_OFFSET..VLAN_OFFSET + VLAN_TAG_SIZE)?;
    Some(VlanTag {
        tpid: u16::from_be_bytes([raw[0], raw[1]]),
        tci: u16::from_be_bytes([raw[2], raw[3]]),
    })
}

/// Copy of `frame` with `tag` spliced in after the MAC pair.
///
/// Returns `None` if the frame is too short to contain both MAC fields.
pub fn insert_tag(frame: &[u8], tag: VlanTag) -> Option<Vec<u8>> {
    if frame.len() < VLAN_OFFSET {
        return None;
    }
    let mut out = Vec::with_capacity(frame.len() + VLAN_TAG_SIZE);
    out.extend_from_slice(&frame[..VLAN_OFFSET]);
    out.extend_from_slice(&tag.to_bytes());
    out.extend_from_slice(&frame[VLAN_OFFSET..]);
    Some(out)
}

/// Splice `tag` in place after the MAC pair of the first `len` bytes of `buf`.
///
/// `buf` must have room for `len + VLAN_TAG_SIZE` bytes. Returns the new
/// length, or `None` if the frame is too short or the buffer too small.
pub fn insert_tag_in_place(buf: &mut [u8], len: usize, tag: VlanTag) -> Option<usize> {
    let new_len = len.checked_add(VLAN_TAG_SIZE)?;
    if len < VLAN_OFFSET || new_len > buf.len() {
        return None;
    }
    buf.copy_within(VLAN_OFFSET..len, VLAN_OFFSET + VLAN_TAG_SIZE);
    buf[VLAN_OFFSET..VLAN_OFFSET + VLAN_TAG_SIZE].copy_from_slice(&tag.to_bytes());
    Some(new_len)
}

/// Copy of `frame` with the four tag bytes after the MAC pair removed.
///
/// Returns `None` if the frame is too short to contain a tag.
pub fn strip_tag(frame: &[u8]) -> Option<Vec<u8>> {
    if frame.len() < VLAN_OFFSET + VLAN_TAG_SIZE {
        return None;
    }
    let mut out = Vec::with_capacity(frame.len() - VLAN_TAG_SIZE);
    out.extend_from_slice(&frame[..VLAN_OFFSET]);
    out.extend_from_slice(&frame[VLAN_OFFSET + VLAN_TAG_SIZE..]);
    Some(out)
}
