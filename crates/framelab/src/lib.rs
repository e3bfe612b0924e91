//! Ethernet switching lab.
//!
//! framelab moves Ethernet frames between real network interfaces and
//! user-space forwarding programs over a small length-prefixed protocol.
//!
//! # Crate Structure
//!
//! - [`link`]: Raw link-layer access to network interfaces
//! - [`proto`]: Message framing, Ethernet helpers and dispatch
//! - [`switch`]: Learning switch, hub and interface specifications
//! - [`mux`]: Multiplexer between links, console and a child program

/// Re-export link types.
pub mod link {
    pub use framelab_link::*;
}

/// Re-export protocol types.
pub mod proto {
    pub use framelab_proto::*;
}

/// Re-export switch types.
pub mod switch {
    pub use framelab_switch::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use framelab_mux::*;
}
