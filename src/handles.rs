//! Generation-checked table behind writer handles.
//!
//! Freed entries are reused, but each reuse bumps the entry's generation, so
//! a handle kept after `close` no longer resolves. Handles cross the call
//! boundary as plain integers offset by a per-process base; the base only
//! stops callers from treating handles as small sequential numbers and
//! protects nothing.

use tracing::debug;

use crate::error::{Result, UsageError};

/// Live entries are limited to what fits in the low 16 bits of a handle.
pub const MAX_ENTRIES: usize = 0x1_0000;

const GENERATION_MASK: u32 = 0x7fff;

/// A decoded handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct HandleTable<T> {
    base: u32,
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
}

impl<T> HandleTable<T> {
    pub fn new(base: u32) -> Self {
        Self {
            base: base & 0xffff,
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Result<Handle> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.entries.len() >= MAX_ENTRIES {
                    return Err(UsageError::HandlesExhausted.into());
                }
                self.entries.push(Entry {
                    generation: 0,
                    value: None,
                });
                (self.entries.len() - 1) as u32
            }
        };
        let entry = &mut self.entries[index as usize];
        entry.value = Some(value);
        let handle = Handle {
            index,
            generation: entry.generation,
        };
        debug!(index, generation = handle.generation, "Allocated handle");
        Ok(handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = (entry.generation + 1) & GENERATION_MASK;
        self.free.push(handle.index);
        Some(value)
    }

    /// Remove every live value.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if let Some(value) = entry.value.take() {
                entry.generation = (entry.generation + 1) & GENERATION_MASK;
                self.free.push(index as u32);
                values.push(value);
            }
        }
        values
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer form handed to callers.
    pub fn encode(&self, handle: Handle) -> i32 {
        let low = (handle.index + self.base) & 0xffff;
        ((handle.generation << 16) | low) as i32
    }

    /// Inverse of [`HandleTable::encode`]. Any integer decodes; whether it
    /// names a live entry is decided by [`HandleTable::get_mut`].
    pub fn decode(&self, raw: i32) -> Result<Handle> {
        if raw < 0 {
            return Err(UsageError::BadHandle(raw).into());
        }
        let raw = raw as u32;
        Ok(Handle {
            index: (raw & 0xffff).wrapping_sub(self.base) & 0xffff,
            generation: (raw >> 16) & GENERATION_MASK,
        })
    }
}
