//! Generation-checked arena of audio buffers
//!
//! Buffers are addressed by `BufferHandle` (slot index + generation). A slot's
//! generation is bumped when its buffer is removed, so stale handles resolve
//! to nothing instead of aliasing a newer buffer. `live` keeps insertion order
//! for the mixer walk.

use super::buffer::AudioBuffer;

/// Stable handle to a buffer owned by an `AudioEngine`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    buffer: Option<AudioBuffer>,
}

#[derive(Default)]
pub(crate) struct BufferArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: Vec<u32>,
}

impl BufferArena {
    pub(crate) fn insert(&mut self, buffer: AudioBuffer) -> BufferHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.buffer = Some(buffer);
        self.live.push(index);
        BufferHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Unlink and return the buffer; the caller drops it outside the lock
    pub(crate) fn remove(&mut self, handle: BufferHandle) -> Option<AudioBuffer> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let buffer = slot.buffer.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live.retain(|&i| i != handle.index);
        Some(buffer)
    }

    pub(crate) fn get(&self, handle: BufferHandle) -> Option<&AudioBuffer> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.buffer.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: BufferHandle) -> Option<&mut AudioBuffer> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.buffer.as_mut()
    }

    pub(crate) fn contains(&self, handle: BufferHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live buffers
    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    /// Visit live buffers in insertion order
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut AudioBuffer)) {
        for &index in &self.live {
            if let Some(buffer) = self.slots[index as usize].buffer.as_mut() {
                f(buffer);
            }
        }
    }

    /// Take every buffer out, leaving the arena empty
    pub(crate) fn drain(&mut self) -> Vec<AudioBuffer> {
        let mut drained = Vec::with_capacity(self.live.len());
        for index in std::mem::take(&mut self.live) {
            let slot = &mut self.slots[index as usize];
            if let Some(buffer) = slot.buffer.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                drained.push(buffer);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::SampleFormat;
    use crate::engine::buffer::{AudioBuffer, BufferUsage};

    fn buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::new(SampleFormat::F32, 2, 44100, frames, BufferUsage::Static, 2, 44100)
            .unwrap()
    }

    #[test]
    fn test_insert_get_remove() {
        let mut arena = BufferArena::default();
        let a = arena.insert(buffer(10));
        let b = arena.insert(buffer(20));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).unwrap().size_in_frames(), 10);
        assert_eq!(arena.get(b).unwrap().size_in_frames(), 20);

        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut arena = BufferArena::default();
        let old = arena.insert(buffer(10));
        arena.remove(old);
        let new = arena.insert(buffer(30));

        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new).unwrap().size_in_frames(), 30);
    }

    #[test]
    fn test_for_each_visits_insertion_order() {
        let mut arena = BufferArena::default();
        let a = arena.insert(buffer(1));
        arena.insert(buffer(2));
        arena.insert(buffer(3));
        arena.remove(a);
        arena.insert(buffer(4));

        let mut sizes = Vec::new();
        arena.for_each_mut(|b| sizes.push(b.size_in_frames()));
        assert_eq!(sizes, vec![2, 3, 4]);
    }

    #[test]
    fn test_drain_invalidates_handles() {
        let mut arena = BufferArena::default();
        let a = arena.insert(buffer(5));
        assert_eq!(arena.drain().len(), 1);
        assert!(!arena.contains(a));
        assert_eq!(arena.len(), 0);
    }
}
