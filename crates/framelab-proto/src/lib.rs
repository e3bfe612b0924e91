//! Length-prefixed message framing shared by every framelab tool.
//!
//! Every message on a stream is framed with:
//! - A 2-byte big-endian size, counting the header itself
//! - A 2-byte big-endian type: `0` for control, `N` for interface `N`
//!
//! The first control message on a stream carries the MAC roster of all
//! interfaces; later control messages are free-form operator text.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod ether;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, encode_message, Message, MessageHeader, CONTROL, HEADER_SIZE,
    MAX_MESSAGE_SIZE, MAX_PAYLOAD,
};
pub use dispatch::{Dispatcher, Handler, MAX_INTERFACES};
pub use error::{ProtoError, Result};
pub use ether::{
    MacAddress, VlanTag, ETHERNET_HEADER_SIZE, ETH_P_8021Q, MAC_ADDR_SIZE, VLAN_OFFSET, VLAN_TAG_SIZE,
};
pub use reader::MessageReader;
pub use writer::MessageWriter;
