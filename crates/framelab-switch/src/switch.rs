//! VLAN-aware learning switch.

use std::fmt::Write as _;
use std::io::Write;

use framelab_proto::ether::{self, VlanTag};
use framelab_proto::{
    Handler, MacAddress, MessageWriter, ProtoError, Result, ETHERNET_HEADER_SIZE, ETH_P_8021Q,
    VLAN_TAG_SIZE,
};
use tracing::{debug, trace, warn};

use crate::error::SpecError;
use crate::ifspec::{checked_interface_count, InterfaceSpec, VlanMode};
use crate::table::{Learned, LearningTable};

/// TCI written into every tag the switch inserts.
///
/// Always `0x0001`, whatever VLAN the frame was flooded on.
pub const INSERTED_TAG_TCI: u16 = 0x0001;

/// How a flooded frame is rewritten for one egress interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    Unchanged,
    InsertTag,
    StripTag,
}

/// A configured interface and what the roster told us about it.
#[derive(Debug, Clone)]
struct Port {
    spec: InterfaceSpec,
    mac: Option<MacAddress>,
}

/// Learning switch writing relayed frames to `W`.
pub struct Switch<W> {
    ports: Vec<Port>,
    interface_count: u16,
    table: Option<LearningTable>,
    out: MessageWriter<W>,
}

impl<W: Write> Switch<W> {
    /// Fails when more interfaces are given than one roster can describe.
    pub fn new(interfaces: Vec<InterfaceSpec>, out: W) -> std::result::Result<Self, SpecError> {
        let interface_count = checked_interface_count(interfaces.len())?;
        Ok(Self {
            ports: interfaces
                .into_iter()
                .map(|spec| Port { spec, mac: None })
                .collect(),
            interface_count,
            table: None,
            out: MessageWriter::new(out),
        })
    }

    pub fn interface_count(&self) -> u16 {
        self.interface_count
    }

    /// The learning table, once the first frame has created it.
    pub fn table(&self) -> Option<&LearningTable> {
        self.table.as_ref()
    }

    /// Switch one frame received on `ingress` (1-based).
    pub fn process_frame(&mut self, ingress: u16, frame: &[u8]) -> Result<()> {
        let ingress_slot = self.slot(ingress)?;
        let table = self.table.get_or_insert_with(LearningTable::new);

        if frame.len() < ETHERNET_HEADER_SIZE {
            trace!(ingress, len = frame.len(), "dropping runt frame");
            return Ok(());
        }
        let (Some(dst), Some(src)) = (ether::destination(frame), ether::source(frame)) else {
            return Ok(());
        };
        if src.is_multicast() {
            trace!(ingress, %src, "dropping frame with multicast source");
            return Ok(());
        }

        match table.learn(src, ingress) {
            Learned::Inserted { slot, evicted } => {
                debug!(%src, interface = ingress, slot, "learned address");
                if let Some(old) = evicted {
                    debug!(mac = %old.mac, interface = old.interface, "evicted address");
                }
            }
            Learned::Moved { from } => {
                debug!(%src, from, to = ingress, "address moved");
            }
            Learned::Unchanged => {}
        }

        if dst.is_unicast() {
            if let Some(egress) = table.lookup(dst) {
                trace!(%dst, ingress, egress, "forwarding to learned interface");
                return self.out.send(egress, frame);
            }
        }

        for (egress, rewrite) in self.flood_plan(ingress_slot, frame) {
            trace!(ingress, egress, ?rewrite, "flooding");
            match rewrite {
                Rewrite::Unchanged => self.out.send(egress, frame)?,
                Rewrite::InsertTag => {
                    if let Some(tagged) = ether::insert_tag(frame, VlanTag::new(INSERTED_TAG_TCI)) {
                        self.out.send(egress, &tagged)?;
                    }
                }
                Rewrite::StripTag => {
                    if let Some(untagged) = ether::strip_tag(frame) {
                        self.out.send(egress, &untagged)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Egress interfaces and rewrites for flooding `frame` from the port at
    /// `ingress_slot`. The ingress port is never included.
    pub fn flood_plan(&self, ingress_slot: usize, frame: &[u8]) -> Vec<(u16, Rewrite)> {
        let Some(ingress) = self.ports.get(ingress_slot) else {
            return Vec::new();
        };
        let others = self
            .ports
            .iter()
            .enumerate()
            .filter(move |(slot, _)| *slot != ingress_slot)
            .map(|(_, port)| port);

        if ether::ether_type(frame) == Some(ETH_P_8021Q) {
            if !matches!(ingress.spec.mode, VlanMode::Tagged(_)) {
                trace!(ingress = ingress.spec.index, "tagged frame on access interface");
                return Vec::new();
            }
            if frame.len() < ETHERNET_HEADER_SIZE + VLAN_TAG_SIZE {
                trace!(len = frame.len(), "dropping truncated tagged frame");
                return Vec::new();
            }
            let Some(tag) = ether::vlan_tag(frame) else {
                return Vec::new();
            };
            let vid = tag.vlan_id();
            return others
                .filter(|port| port.spec.mode.carries(vid))
                .map(|port| match port.spec.mode {
                    VlanMode::Tagged(_) => (port.spec.index, Rewrite::Unchanged),
                    VlanMode::Untagged(_) => (port.spec.index, Rewrite::StripTag),
                })
                .collect();
        }

        let VlanMode::Untagged(native) = ingress.spec.mode else {
            trace!(ingress = ingress.spec.index, "untagged frame on trunk interface");
            return Vec::new();
        };
        others
            .filter_map(|port| match &port.spec.mode {
                VlanMode::Untagged(vlan) if *vlan == native => {
                    Some((port.spec.index, Rewrite::Unchanged))
                }
                VlanMode::Tagged(vlans) if vlans.first() == Some(&native) => {
                    Some((port.spec.index, Rewrite::InsertTag))
                }
                _ => None,
            })
            .collect()
    }

    /// Handle one line of operator text.
    pub fn process_command(&mut self, text: &str) -> Result<()> {
        let command = text.trim();
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match verb.as_str() {
            "" => Ok(()),
            "mac" | "table" => {
                let report = self.table_report();
                self.out.send_text(&report)
            }
            "interfaces" => {
                let report = self.interfaces_report();
                self.out.send_text(&report)
            }
            _ => {
                warn!(command, "unsupported command (ignored)");
                Ok(())
            }
        }
    }

    /// One line per learned address, in table order.
    pub fn table_report(&self) -> String {
        let mut report = String::new();
        for entry in self.table.iter().flat_map(|table| table.entries()) {
            let name = self
                .ports
                .get(usize::from(entry.interface).wrapping_sub(1))
                .map_or("?", |port| port.spec.name.as_str());
            let _ = writeln!(report, "{} -> {} (#{})", entry.mac, name, entry.interface);
        }
        if report.is_empty() {
            report.push_str("learning table empty\n");
        }
        report
    }

    /// One line per configured interface.
    pub fn interfaces_report(&self) -> String {
        let mut report = String::new();
        for port in &self.ports {
            let mac = port
                .mac
                .map_or_else(|| "unknown".to_string(), |mac| mac.to_string());
            let _ = writeln!(
                report,
                "#{} {} {} {}",
                port.spec.index,
                port.spec.name,
                mac,
                describe_mode(&port.spec.mode)
            );
        }
        report
    }

    fn slot(&self, interface: u16) -> Result<usize> {
        let count = self.interface_count();
        if interface == 0 || interface > count {
            return Err(ProtoError::UnknownInterface { interface, count });
        }
        Ok(usize::from(interface) - 1)
    }
}

fn describe_mode(mode: &VlanMode) -> String {
    match mode {
        VlanMode::Untagged(vlan) => format!("untagged vlan {vlan}"),
        VlanMode::Tagged(vlans) => {
            let list: Vec<String> = vlans.iter().map(u16::to_string).collect();
            format!("tagged vlans {}", list.join(","))
        }
    }
}

impl<W: Write> Handler for Switch<W> {
    fn on_roster_entry(&mut self, interface: u16, mac: MacAddress) -> Result<()> {
        let slot = self.slot(interface)?;
        debug!(interface, name = %self.ports[slot].spec.name, %mac, "interface address");
        self.ports[slot].mac = Some(mac);
        Ok(())
    }

    fn on_control(&mut self, text: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(text);
        self.process_command(&text)
    }

    fn on_frame(&mut self, interface: u16, frame: &[u8]) -> Result<()> {
        self.process_frame(interface, frame)
    }
}
