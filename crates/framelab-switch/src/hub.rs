//! Repeater that relays every frame to every other interface.

use std::io::Write;

use framelab_proto::{Handler, MacAddress, MessageWriter, ProtoError, Result};
use tracing::{debug, info, trace};

use crate::error::SpecError;
use crate::ifspec::checked_interface_count;

/// Hub writing relayed frames to `W`.
pub struct Hub<W> {
    interface_count: u16,
    out: MessageWriter<W>,
}

impl<W: Write> Hub<W> {
    /// Fails when more interfaces are given than one roster can describe.
    pub fn new(interface_count: usize, out: W) -> std::result::Result<Self, SpecError> {
        Ok(Self {
            interface_count: checked_interface_count(interface_count)?,
            out: MessageWriter::new(out),
        })
    }

    pub fn interface_count(&self) -> u16 {
        self.interface_count
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Handler for Hub<W> {
    fn on_roster_entry(&mut self, interface: u16, mac: MacAddress) -> Result<()> {
        debug!(interface, %mac, "interface address");
        Ok(())
    }

    fn on_control(&mut self, text: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(text);
        let command = text.trim_end();
        info!(command, "received command");
        self.out
            .send_text(&format!("Received command '{command}' (ignored)\n"))
    }

    fn on_frame(&mut self, interface: u16, frame: &[u8]) -> Result<()> {
        if interface == 0 || interface > self.interface_count {
            return Err(ProtoError::UnknownInterface {
                interface,
                count: self.interface_count,
            });
        }
        if frame.is_empty() {
            return Ok(());
        }
        trace!(interface, len = frame.len(), "repeating frame");
        for egress in (1..=self.interface_count).filter(|&i| i != interface) {
            self.out.send(egress, frame)?;
        }
        Ok(())
    }
}
