//! Allocation structures shared across the renderer.
//!
//! Everything in here is plain host memory bookkeeping: a bump [`Arena`]
//! with scratch leasing, and a fixed-capacity generational [`Pool`]. GPU
//! resources are referred to by pool handles everywhere else, never by
//! pointer.

pub mod arena;
pub mod pool;

pub use arena::{Arena, ArenaError, ScratchError, ScratchId, ScratchLease, ScratchPool};
pub use pool::{Handle, Pool, PoolError};
