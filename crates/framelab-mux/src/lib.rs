//! Bridges network links and an operator console to a child process.
//!
//! The child reads framed messages on its input and writes framed messages
//! on its output (see `framelab-proto`). The multiplexer:
//! - sends the MAC roster of all links as the first control message
//! - frames every captured link frame with the link's 1-based index
//! - turns each console line into a control message
//! - sends the child's frames out on the link they name
//! - prints the child's control messages to the console

pub mod error;
pub mod mux;

pub use error::{MuxError, Result};
pub use mux::{ChildIo, Multiplexer, MuxStats, Shutdown};
