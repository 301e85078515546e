//! Bounded per-client usage table.

use std::net::IpAddr;

use serde::Serialize;

/// Lifetime counters for one client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    pub ip: IpAddr,
    pub total: u64,
    pub blocked: u64,
}

impl ClientRecord {
    const fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            total: 0,
            blocked: 0,
        }
    }
}

/// Fixed number of client slots. An empty slot is one not in use.
///
/// When every slot is taken, a new address evicts the record with the
/// smallest lifetime total (the first such slot on ties).
#[derive(Debug, Clone)]
pub struct ClientTable {
    slots: Box<[Option<ClientRecord>]>,
}

impl ClientTable {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "client table capacity must be non-zero");
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, ip: IpAddr) -> Option<&ClientRecord> {
        self.slots.iter().flatten().find(|record| record.ip == ip)
    }

    /// Find the record for `ip`, creating it (and evicting if full) as needed.
    pub fn entry(&mut self, ip: IpAddr) -> &mut ClientRecord {
        let index = self.slot_for(ip);
        let slot = &mut self.slots[index];
        if let Some(evicted) = *slot
            && evicted.ip != ip
        {
            tracing::debug!(evicted = %evicted.ip, total = evicted.total, new = %ip, "client table full, evicting");
            *slot = None;
        }
        slot.get_or_insert(ClientRecord::new(ip))
    }

    fn slot_for(&self, ip: IpAddr) -> usize {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.is_some_and(|record| record.ip == ip))
        {
            return index;
        }
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            return index;
        }
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(index, slot)| (slot.map_or(0, |record| record.total), *index))
            .map_or(0, |(index, _)| index)
    }

    /// Records currently in use, in slot order.
    pub fn records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.slots.iter().flatten()
    }
}
