//! Frame-forwarding tools that run behind the framelab multiplexer.
//!
//! - [`Switch`]: VLAN-aware learning switch with a FIFO MAC table
//! - [`Hub`]: repeats every frame to every other interface
//!
//! Both implement [`framelab_proto::Handler`] and are driven by a
//! [`framelab_proto::Dispatcher`] reading the multiplexer's output.

pub mod error;
pub mod hub;
pub mod ifspec;
pub mod switch;
pub mod table;

pub use error::SpecError;
pub use hub::Hub;
pub use ifspec::{
    checked_interface_count, parse_interface, parse_interfaces, InterfaceSpec, VlanMode, MAX_VLAN,
    MIN_VLAN,
};
pub use switch::{Rewrite, Switch, INSERTED_TAG_TCI};
pub use table::{Entry, Learned, LearningTable, TABLE_CAPACITY};
