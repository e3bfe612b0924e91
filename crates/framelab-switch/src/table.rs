//! Fixed-capacity MAC learning table with FIFO replacement.

use framelab_proto::MacAddress;

/// Number of MAC addresses the table remembers.
pub const TABLE_CAPACITY: usize = 8;

/// A learned MAC and the interface it was last seen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub mac: MacAddress,
    pub interface: u16,
}

/// Outcome of [`LearningTable::learn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    /// New MAC stored in `slot`, replacing `evicted` if the slot was in use.
    Inserted { slot: usize, evicted: Option<Entry> },
    /// Known MAC moved here from interface `from`.
    Moved { from: u16 },
    /// Known MAC on the same interface.
    Unchanged,
}

/// Ring of [`TABLE_CAPACITY`] slots.
///
/// New MACs go into the slot under the cursor, which then advances. Once
/// the ring is full the oldest insertion is overwritten regardless of how
/// recently it was used.
#[derive(Debug, Clone, Default)]
pub struct LearningTable {
    slots: [Option<Entry>; TABLE_CAPACITY],
    cursor: usize,
}

impl LearningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `mac` was seen as a source on `interface`.
    pub fn learn(&mut self, mac: MacAddress, interface: u16) -> Learned {
        if let Some(entry) = self.slots.iter_mut().flatten().find(|e| e.mac == mac) {
            if entry.interface == interface {
                return Learned::Unchanged;
            }
            let from = entry.interface;
            entry.interface = interface;
            return Learned::Moved { from };
        }

        let slot = self.cursor;
        let evicted = self.slots[slot].replace(Entry { mac, interface });
        self.cursor = (self.cursor + 1) % TABLE_CAPACITY;
        Learned::Inserted { slot, evicted }
    }

    /// Interface `mac` was last seen on.
    pub fn lookup(&self, mac: MacAddress) -> Option<u16> {
        self.entries()
            .find(|e| e.mac == mac)
            .map(|e| e.interface)
    }

    /// Valid entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
