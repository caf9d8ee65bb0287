//! Ack-tracking tables: bounded collections of in-flight
//! PUBLISH/SUBSCRIBE/UNSUBSCRIBE requests, realized as an indexed slab with a
//! `live` flag rather than the original's linked list — a simpler shape for a
//! fixed-capacity table.

use std::time::{Duration, Instant};

use mqtt_core::{Error, PacketId};

use crate::subscription::TopicBinding;

/// One in-flight PUBLISH awaiting PUBACK/PUBREC.
#[derive(Debug, Clone)]
pub struct PubEntry {
    pub packet_id: PacketId,
    pub sent_at: Instant,
    pub serialized: Vec<u8>,
}

/// Whether a [`SubEntry`] is tracking a SUBSCRIBE or an UNSUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    Subscribe,
    Unsubscribe,
}

/// One in-flight SUBSCRIBE/UNSUBSCRIBE awaiting SUBACK/UNSUBACK.
#[derive(Debug, Clone)]
pub struct SubEntry {
    pub packet_id: PacketId,
    pub sent_at: Instant,
    pub kind: SubKind,
    /// The binding to install on success.
    pub binding: TopicBinding,
}

struct Slot<T> {
    entry: T,
    live: bool,
}

/// A fixed-capacity, indexed slab of in-flight publish entries.
pub struct PubInflightTable {
    slots: Vec<Slot<PubEntry>>,
    capacity: usize,
}

impl PubInflightTable {
    pub fn new(capacity: usize) -> Self {
        PubInflightTable {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a new live entry; fails if the table is at capacity
    /// (`REPUB_NUM_MAX`).
    pub fn push(&mut self, entry: PubEntry) -> Result<(), Error> {
        if self.slots.iter().filter(|s| s.live).count() >= self.capacity {
            return Err(Error::PushToListFull);
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| !s.live) {
            *slot = Slot { entry, live: true };
        } else {
            self.slots.push(Slot { entry, live: true });
        }
        Ok(())
    }

    /// Undoes a `push` when the send that followed it failed.
    pub fn remove(&mut self, packet_id: PacketId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.live && s.entry.packet_id == packet_id) {
            slot.live = false;
        }
    }

    /// Marks the entry acked by a PUBACK/PUBREC as invalid.
    pub fn mark_invalid_by_id(&mut self, packet_id: PacketId) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.live && s.entry.packet_id == packet_id) {
            slot.live = false;
            true
        } else {
            false
        }
    }

    /// Two-pass sweep: drop Invalid entries, then for every
    /// live entry older than `max_age` invoke `on_republish` with the table
    /// lock conceptually released (callers call this outside any guard they
    /// hold) and bump its `sent_at` so it is not immediately re-swept.
    pub fn sweep(&mut self, now: Instant, max_age: Duration, mut on_republish: impl FnMut(&PubEntry)) {
        self.slots.retain(|s| s.live);

        for slot in &mut self.slots {
            if now.saturating_duration_since(slot.entry.sent_at) >= max_age {
                on_republish(&slot.entry);
                slot.entry.sent_at = now;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fixed-capacity, indexed slab of in-flight subscribe/unsubscribe entries.
pub struct SubInflightTable {
    slots: Vec<Slot<SubEntry>>,
    capacity: usize,
}

impl SubInflightTable {
    pub fn new(capacity: usize) -> Self {
        SubInflightTable {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a new live entry; fails if the table is at capacity
    /// (`SUB_INFLIGHT_MAX`).
    pub fn push(&mut self, entry: SubEntry) -> Result<(), Error> {
        if self.slots.iter().filter(|s| s.live).count() >= self.capacity {
            return Err(Error::SubHandleFull);
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| !s.live) {
            *slot = Slot { entry, live: true };
        } else {
            self.slots.push(Slot { entry, live: true });
        }
        Ok(())
    }

    /// Undoes a `push` when the send that followed it failed.
    pub fn remove(&mut self, packet_id: PacketId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.live && s.entry.packet_id == packet_id) {
            slot.live = false;
        }
    }

    /// Marks the entry acked by a SUBACK/UNSUBACK invalid and returns a copy,
    /// so the caller can install/remove its [`TopicBinding`] with the table
    /// lock released.
    pub fn mark_invalid_by_id(&mut self, packet_id: PacketId) -> Option<SubEntry> {
        let slot = self.slots.iter_mut().find(|s| s.live && s.entry.packet_id == packet_id)?;
        slot.live = false;
        Some(slot.entry.clone())
    }

    /// Two-pass sweep: drop Invalid entries, then for every live entry older
    /// than `max_age` invoke `on_timeout` and remove it.
    pub fn sweep(&mut self, now: Instant, max_age: Duration, mut on_timeout: impl FnMut(&SubEntry)) {
        self.slots.retain(|s| s.live);

        self.slots.retain(|slot| {
            if now.saturating_duration_since(slot.entry.sent_at) >= max_age {
                on_timeout(&slot.entry);
                false
            } else {
                true
            }
        });
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
