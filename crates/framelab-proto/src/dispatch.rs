//! Turns one continuous message stream into typed callbacks.

use std::io::Read;

use tracing::{debug, trace};

use crate::codec::{Message, CONTROL, MAX_PAYLOAD};
use crate::error::{ProtoError, Result};
use crate::ether::{MacAddress, MAC_ADDR_SIZE};
use crate::reader::MessageReader;

/// Most interfaces a single roster message can describe.
pub const MAX_INTERFACES: usize = MAX_PAYLOAD / MAC_ADDR_SIZE;

/// Consumer of a dispatched message stream.
///
/// Implemented by every tool that sits behind the multiplexer (switch, hub)
/// and by test drivers.
pub trait Handler {
    /// Interface `interface` (1-based) has MAC address `mac`.
    fn on_roster_entry(&mut self, interface: u16, mac: MacAddress) -> Result<()>;

    /// Operator text, delivered verbatim without the header.
    fn on_control(&mut self, text: &[u8]) -> Result<()>;

    /// A frame received on `interface` (1-based).
    fn on_frame(&mut self, interface: u16, frame: &[u8]) -> Result<()>;
}

/// Decodes a stream into roster, control and frame callbacks.
pub struct Dispatcher<R> {
    reader: MessageReader<R>,
    interface_count: u16,
    roster_seen: bool,
}

impl<R: Read> Dispatcher<R> {
    /// Dispatch `stream` for a tool configured with `interface_count` interfaces.
    pub fn new(stream: R, interface_count: u16) -> Self {
        Self {
            reader: MessageReader::new(stream),
            interface_count,
            roster_seen: false,
        }
    }

    /// Run until end-of-stream.
    ///
    /// Returns `Ok(())` when the stream ends at a message boundary. Protocol
    /// violations, read errors and handler errors end the loop with `Err`.
    pub fn run<H: Handler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            let msg = match self.reader.read_message() {
                Ok(msg) => msg,
                Err(ProtoError::ConnectionClosed) => {
                    debug!("input stream closed");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            self.dispatch(msg, handler)?;
        }
    }

    /// Deliver one decoded message to `handler`.
    pub fn dispatch<H: Handler + ?Sized>(&mut self, msg: Message, handler: &mut H) -> Result<()> {
        if msg.kind == CONTROL {
            if self.roster_seen {
                trace!(len = msg.payload.len(), "control message");
                return handler.on_control(&msg.payload);
            }
            self.roster_seen = true;
            debug!(
                entries = msg.payload.len() / MAC_ADDR_SIZE,
                "received interface roster"
            );
            for (i, raw) in msg.payload.chunks_exact(MAC_ADDR_SIZE).enumerate() {
                let interface = self.check_interface(i + 1)?;
                if let Some(mac) = MacAddress::from_slice(raw) {
                    handler.on_roster_entry(interface, mac)?;
                }
            }
            return Ok(());
        }

        let interface = self.check_interface(msg.kind as usize)?;
        trace!(interface, len = msg.payload.len(), "frame");
        handler.on_frame(interface, &msg.payload)
    }

    fn check_interface(&self, interface: usize) -> Result<u16> {
        if interface > self.interface_count as usize {
            return Err(ProtoError::UnknownInterface {
                interface: u16::try_from(interface).unwrap_or(u16::MAX),
                count: self.interface_count,
            });
        }
        Ok(interface as u16)
    }
}
