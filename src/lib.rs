//! A fixed-capacity memory pool allocator.
//!
//! A [`Pool`] acquires one contiguous backing block from the platform when it
//! is created and never goes back for more: every allocation is carved out of
//! that block, and the block is released in one piece when the pool is
//! dropped. This trades the flexibility of a general-purpose heap for
//! deterministic, low-overhead behavior.
//!
//! Each live allocation is preceded by a small metadata node; the nodes form
//! a doubly linked chain in ascending address order, and the space the chain
//! does not cover is implicitly free:
//!
//! ```text
//! +--------+------+---------+--------+------+---------+---------+
//! | header | node | payload |  gap   | node | payload |   gap   |
//! +--------+------+---------+--------+------+---------+---------+
//! ```
//!
//! Allocation picks the first (lowest-address) gap that fits; freeing
//! splices the node out of the chain, which merges the vacated range into
//! the surrounding gap without any explicit bookkeeping.
//!
//! ```
//! use poolalloc::Pool;
//!
//! let mut pool = Pool::new(4096)?;
//!
//! let message = pool.alloc(16)?;
//! pool.payload_mut(message).unwrap()[..5].copy_from_slice(b"hello");
//! assert_eq!(&pool.payload(message).unwrap()[..5], b"hello");
//!
//! let stats = pool.stats();
//! assert_eq!(stats.num_allocations, 1);
//!
//! pool.free(message)?;
//! # Ok::<(), poolalloc::PoolError>(())
//! ```
//!
//! A pool is strictly single-owner: all mutation goes through `&mut self`
//! and there is no internal synchronization. Wrap it in a lock if it must
//! be shared.

mod config;
mod error;
mod node;
mod platform;
mod pool;
mod snapshot;
mod stats;
mod utils;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use node::MIN_ALIGNMENT;
pub use pool::{
    ALLOCATION_OVERHEAD, Allocation, MAX_POOL_SIZE, MIN_POOL_SIZE, POOL_OVERHEAD, Pool,
};
pub use snapshot::{Segment, SegmentKind, Segments};
pub use stats::PoolStats;
