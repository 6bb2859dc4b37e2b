use std::{marker::PhantomData, num::NonZeroU64};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot in the pool is live.
    Exhausted,
}

/// Nonzero handle to an item in a [`Pool`]. The generation component makes
/// the handle unique for the lifetime of the pool: once the slot is freed,
/// every copy of the handle goes stale.
pub struct Handle<T>(NonZeroU64, PhantomData<T>);

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .finish()
    }
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        debug_assert!(generation != 0);

        let value = u64::from(generation) << 32 | u64::from(index);
        Self(NonZeroU64::new(value).unwrap(), PhantomData)
    }

    /// The untyped value of the handle, for storage in opaque ids. Always
    /// nonzero.
    #[must_use]
    pub fn to_raw(self) -> u64 {
        self.0.get()
    }

    /// Recovers a handle from [`Handle::to_raw`]. Returns `None` for zero,
    /// which no live handle ever encodes to.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(Self(NonZeroU64::new(raw)?, PhantomData))
    }

    fn index(self) -> u32 {
        self.0.get() as u32
    }

    fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

struct Slot<T> {
    // Kept outside the value so freeing the slot can bump it.
    generation: u32,
    value: Option<T>,
}

/// A fixed-capacity object pool addressed by generational handles.
///
/// Freshly constructed pools have every slot at generation 1. Removing an
/// item bumps its slot's generation by exactly one, invalidating all
/// outstanding handles to it.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

impl<T> Pool<T> {
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            slots.push(Slot {
                generation: 1,
                value: None,
            });
        }

        Self {
            slots,
            // Reversed so the lowest index is handed out first.
            free_list: (0..capacity).rev().collect(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[must_use]
    pub fn free_count(&self) -> u32 {
        self.free_list.len() as u32
    }

    #[must_use]
    pub fn live_count(&self) -> u32 {
        self.capacity() - self.free_count()
    }

    /// Places `value` into a free slot and returns a handle to it.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, PoolError> {
        let index = self.free_list.pop().ok_or(PoolError::Exhausted)?;

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);

        Ok(Handle::new(index, slot.generation))
    }

    /// Returns `Some(&T)` if the handle is live and `None` otherwise.
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation == handle.generation() {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Returns `Some(&mut T)` if the handle is live and `None` otherwise.
    #[must_use]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation == handle.generation() {
            slot.value.as_mut()
        } else {
            None
        }
    }

    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Removes the value identified by `handle`, invalidating it and every
    /// copy of it. Returns `None` if the handle was already stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }

        let value = slot.value.take()?;

        // A saturated slot is retired rather than wrapping back to a
        // generation old handles might still carry.
        if slot.generation < u32::MAX {
            slot.generation += 1;
            self.free_list.push(handle.index());
        }

        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init() {
        let pool = Pool::<u32>::with_capacity(4);

        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn insert_get_remove_one() {
        let mut pool = Pool::<u32>::with_capacity(4);

        let handle = pool.insert(42).unwrap();
        assert_eq!(pool.get(handle), Some(&42));
        assert_eq!(pool.get_mut(handle), Some(&mut 42));
        assert_eq!(pool.live_count(), 1);

        assert_eq!(pool.remove(handle), Some(42));
        assert!(!pool.contains(handle));
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn generation_bumps_by_one_on_free() {
        let mut pool = Pool::<u32>::with_capacity(1);

        let a = pool.insert(1).unwrap();
        let a_raw = a.to_raw();
        pool.remove(a).unwrap();

        let b = pool.insert(2).unwrap();
        assert!(!pool.contains(a));
        assert!(pool.contains(b));

        // Same slot, generation exactly one higher.
        assert_eq!(a_raw as u32, b.to_raw() as u32);
        assert_eq!((a_raw >> 32) + 1, b.to_raw() >> 32);
    }

    #[test]
    fn exhausted() {
        let mut pool = Pool::<u32>::with_capacity(2);

        let a = pool.insert(1).unwrap();
        let _b = pool.insert(2).unwrap();
        assert_eq!(pool.insert(3), Err(PoolError::Exhausted));

        pool.remove(a).unwrap();
        assert!(pool.insert(4).is_ok());
    }

    #[test]
    fn remove_twice() {
        let mut pool = Pool::<u32>::with_capacity(2);

        let handle = pool.insert(42).unwrap();
        assert_eq!(pool.remove(handle), Some(42));
        assert_eq!(pool.remove(handle), None);

        let _ = pool.insert(43).unwrap();
        assert_eq!(pool.remove(handle), None);
    }

    #[test]
    fn outstanding_handles_are_unique() {
        let mut pool = Pool::<u32>::with_capacity(8);

        let mut handles = Vec::new();
        for i in 0..8 {
            handles.push(pool.insert(i).unwrap());
        }

        for (i, a) in handles.iter().enumerate() {
            for b in &handles[i + 1..] {
                assert_ne!(a, b);
            }
        }

        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(pool.get(*handle), Some(&(i as u32)));
        }

        assert_eq!(pool.live_count() + pool.free_count(), pool.capacity());
    }

    #[test]
    fn raw_round_trip() {
        let mut pool = Pool::<u32>::with_capacity(2);

        let handle = pool.insert(7).unwrap();
        let raw = handle.to_raw();

        let recovered = Handle::from_raw(raw).unwrap();
        assert_eq!(pool.get(recovered), Some(&7));

        assert_eq!(Handle::<u32>::from_raw(0), None);
    }
}
