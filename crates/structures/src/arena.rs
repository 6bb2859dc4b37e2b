use std::cell::{RefCell, RefMut};

use bytemuck::Pod;

/// Every allocation is rounded up to this boundary, and the backing store
/// is aligned to it, so typed pushes of anything up to 8-byte alignment
/// are always in bounds and aligned.
pub const ARENA_ALIGN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The arena does not have enough room left to satisfy the push.
    OutOfArena,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScratchError {
    /// Every scratch arena is named in the conflict set.
    NoScratchAvailable,
}

/// A fixed-size bump allocator.
///
/// The cursor only ever advances (in 8-byte steps) until [`Arena::clear`]
/// or [`Arena::rewind`] move it back wholesale. There is no per-allocation
/// free.
#[derive(Debug)]
pub struct Arena {
    // u64 storage keeps the base pointer 8-aligned for typed pushes.
    storage: Box<[u64]>,
    cursor: usize,
}

impl Arena {
    #[must_use]
    pub fn with_capacity(size: usize) -> Self {
        let words = (size + ARENA_ALIGN - 1) / ARENA_ALIGN;
        Self {
            storage: vec![0u64; words].into_boxed_slice(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len() * ARENA_ALIGN
    }

    /// The current cursor, usable as a rewind mark.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.cursor
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
    }

    /// Moves the cursor back to `mark`. Does nothing if the cursor has
    /// already retreated below it.
    pub fn rewind(&mut self, mark: usize) {
        if self.cursor >= mark {
            self.cursor = mark;
        }
    }

    /// Allocates `size` bytes, advancing the cursor by `size` rounded up
    /// to 8. The returned slice is exactly `size` long and is not zeroed.
    pub fn push(&mut self, size: usize) -> Result<&mut [u8], ArenaError> {
        if size == 0 {
            return Ok(&mut []);
        }

        let aligned = (size + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1);

        if self.cursor + aligned > self.capacity() {
            return Err(ArenaError::OutOfArena);
        }

        let start = self.cursor;
        self.cursor += aligned;

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.storage);
        Ok(&mut bytes[start..start + size])
    }

    /// As [`Arena::push`], with the returned memory zeroed.
    pub fn push_zero(&mut self, size: usize) -> Result<&mut [u8], ArenaError> {
        let bytes = self.push(size)?;
        bytes.fill(0);
        Ok(bytes)
    }

    /// Allocates a zeroed array of `len` values of `T`.
    ///
    /// ## Panics
    ///
    /// Panics if `T` requires more than 8-byte alignment.
    pub fn push_array<T: Pod>(&mut self, len: usize) -> Result<&mut [T], ArenaError> {
        assert!(std::mem::align_of::<T>() <= ARENA_ALIGN);

        let bytes = self.push_zero(len * std::mem::size_of::<T>())?;
        Ok(bytemuck::cast_slice_mut(bytes))
    }
}

/// Identifies one of the scratch arenas in a [`ScratchPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchId(usize);

/// A small fixed set of arenas for transient allocations.
///
/// A callee that needs temporary memory leases a scratch arena without the
/// caller having to pass one in. The conflict set guarantees the callee
/// never gets an arena its caller is already building into.
pub struct ScratchPool {
    slots: [RefCell<Arena>; 2],
}

impl ScratchPool {
    #[must_use]
    pub fn new(arena_size: usize) -> Self {
        Self {
            slots: [
                RefCell::new(Arena::with_capacity(arena_size)),
                RefCell::new(Arena::with_capacity(arena_size)),
            ],
        }
    }

    /// Leases a scratch arena that is not in `conflicts`, recording its
    /// cursor. The lease restores the cursor when dropped.
    pub fn lease(&self, conflicts: &[ScratchId]) -> Result<ScratchLease<'_>, ScratchError> {
        for (i, slot) in self.slots.iter().enumerate() {
            let id = ScratchId(i);

            if conflicts.contains(&id) {
                continue;
            }

            let mark = slot.borrow().mark();
            return Ok(ScratchLease { slot, id, mark });
        }

        Err(ScratchError::NoScratchAvailable)
    }
}

#[derive(Debug)]
pub struct ScratchLease<'a> {
    slot: &'a RefCell<Arena>,
    id: ScratchId,
    mark: usize,
}

impl ScratchLease<'_> {
    /// The identity of the leased arena, for passing down as a conflict.
    #[must_use]
    pub fn id(&self) -> ScratchId {
        self.id
    }

    pub fn arena(&self) -> RefMut<'_, Arena> {
        self.slot.borrow_mut()
    }
}

impl Drop for ScratchLease<'_> {
    fn drop(&mut self) {
        // Restore the cursor unless something already moved it below the
        // mark (e.g. a clear while the lease was open).
        self.slot.borrow_mut().rewind(self.mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_round_trip() {
        let mut arena = Arena::with_capacity(64);

        let bytes = arena.push(13).unwrap();
        assert_eq!(bytes.len(), 13);
        bytes.copy_from_slice(b"hello, arena!");

        assert_eq!(arena.mark(), 16, "cursor advances by the aligned size");

        // The next push must not overlap the first.
        let next = arena.push(8).unwrap();
        next.fill(0xAB);
        assert_eq!(arena.mark(), 24);
    }

    #[test]
    fn push_zero_size() {
        let mut arena = Arena::with_capacity(8);
        assert_eq!(arena.push(0).unwrap().len(), 0);
        assert_eq!(arena.mark(), 0);
    }

    #[test]
    fn push_out_of_arena() {
        let mut arena = Arena::with_capacity(24);

        arena.push(9).unwrap();
        assert_eq!(arena.push(1).unwrap().len(), 1);
        assert_eq!(arena.push(1), Err(ArenaError::OutOfArena));

        arena.clear();
        assert_eq!(arena.push(24).unwrap().len(), 24);
    }

    #[test]
    fn push_zero_clears_reused_memory() {
        let mut arena = Arena::with_capacity(32);

        arena.push(32).unwrap().fill(0xFF);
        arena.clear();

        let bytes = arena.push_zero(32).unwrap();
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn push_typed_array() {
        let mut arena = Arena::with_capacity(64);

        let values: &mut [u32] = arena.push_array(5).unwrap();
        assert_eq!(values.len(), 5);
        values.copy_from_slice(&[1, 2, 3, 4, 5]);

        assert_eq!(arena.mark(), 24);
    }

    #[test]
    fn scratch_avoids_conflicts() {
        let pool = ScratchPool::new(256);

        let a = pool.lease(&[]).unwrap();
        let b = pool.lease(&[a.id()]).unwrap();
        assert_ne!(a.id(), b.id());

        assert_eq!(
            pool.lease(&[a.id(), b.id()]).unwrap_err(),
            ScratchError::NoScratchAvailable
        );
    }

    #[test]
    fn scratch_restores_cursor_on_release() {
        let pool = ScratchPool::new(256);

        let outer = pool.lease(&[]).unwrap();
        outer.arena().push(24).unwrap();
        let mark = outer.arena().mark();

        {
            let inner = pool.lease(&[]).unwrap();
            assert_eq!(inner.id(), outer.id());
            inner.arena().push(64).unwrap();
        }

        assert_eq!(outer.arena().mark(), mark);
    }

    #[test]
    fn scratch_release_keeps_retreated_cursor() {
        let pool = ScratchPool::new(256);

        {
            let lease = pool.lease(&[]).unwrap();
            lease.arena().push(64).unwrap();
            let inner = pool.lease(&[]).unwrap();
            inner.arena().clear();
        }

        // The inner release saw a cursor below its mark and left it alone.
        let lease = pool.lease(&[]).unwrap();
        assert_eq!(lease.arena().mark(), 0);
    }
}
