//! Generational handle registry.
//!
//! Native objects never cross the C ABI as pointers. Each one lives in a slot
//! of a [`HandleRegistry`] and is addressed by a [`Handle`] made of the slot
//! index and the slot's generation at insertion time. Removing an entry bumps
//! the slot generation, so a handle kept by the caller after `free` can never
//! resolve to whatever object later reuses the slot.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::error::{BridgeError, Result};

/// Opaque reference to a registry entry, packed into a `u64` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Zero handle. Generation 0 is never issued, so this never resolves.
    pub const NULL: Handle = Handle {
        index: 0,
        generation: 0,
    };

    pub fn from_raw(raw: u64) -> Self {
        Handle {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn is_null(self) -> bool {
        self.generation == 0
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Thread-safe arena mapping [`Handle`]s to shared native objects.
pub struct HandleRegistry<T> {
    name: &'static str,
    capacity: usize,
    slots: RwLock<Slots<T>>,
}

impl<T> HandleRegistry<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        HandleRegistry {
            name,
            capacity,
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Stores `value` and returns a fresh handle for it.
    pub fn insert(&self, value: T) -> Result<Handle> {
        let mut slots = self.slots.write();
        if slots.live >= self.capacity {
            return Err(BridgeError::native(format!(
                "Running out of {} handles ({} live)",
                self.name, slots.live
            )));
        }

        let value = Arc::new(value);
        let handle = if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = Some(value);
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(slots.entries.len()).map_err(|_| {
                BridgeError::native(format!("{} handle index space exhausted", self.name))
            })?;
            slots.entries.push(Slot {
                generation: 1,
                value: Some(value),
            });
            Handle {
                index,
                generation: 1,
            }
        };
        slots.live += 1;
        debug!(
            "[Registry:{}] Inserted handle {:#018x} ({} live)",
            self.name,
            handle.to_raw(),
            slots.live
        );
        Ok(handle)
    }

    /// Resolves `handle` to its object. Fails for zero, stale or unknown handles.
    pub fn get(&self, handle: Handle) -> Result<Arc<T>> {
        if handle.is_null() {
            return Err(BridgeError::InvalidHandle(handle));
        }
        let slots = self.slots.read();
        slots
            .entries
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.clone())
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    /// Removes the entry and invalidates `handle` for every thread.
    ///
    /// Work already holding the returned `Arc` finishes against the old object.
    pub fn remove(&self, handle: Handle) -> Result<Arc<T>> {
        if handle.is_null() {
            return Err(BridgeError::InvalidHandle(handle));
        }
        let mut slots = self.slots.write();
        let slot = slots
            .entries
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
            .ok_or(BridgeError::InvalidHandle(handle))?;

        let value = slot.value.take().ok_or(BridgeError::InvalidHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        let retired = slot.generation == 0;
        if retired {
            // A wrapped generation could alias handle 0; keep the slot out of circulation.
            warn!(
                "[Registry:{}] Slot {} exhausted its generations and is retired",
                self.name, handle.index
            );
        } else {
            slots.free.push(handle.index);
        }
        slots.live -= 1;
        debug!(
            "[Registry:{}] Removed handle {:#018x} ({} live)",
            self.name,
            handle.to_raw(),
            slots.live
        );
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
