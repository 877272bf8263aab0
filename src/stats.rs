//! Pool statistics.

/// Point-in-time view of a pool's counters, as returned by
/// [`crate::Pool::stats`]. Plain data, detached from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total bytes of the backing block, pool header included.
    pub total_size: usize,
    /// Bytes committed to live allocations, node headers included.
    pub used_memory: usize,
    /// Count of live allocations.
    pub num_allocations: usize,
    /// High-water mark of `used_memory` over the pool's lifetime.
    pub peak_used: usize,
    /// Allocations performed over the pool's lifetime.
    pub total_allocs: u32,
    /// Frees performed over the pool's lifetime.
    pub total_frees: u32,
}

impl PoolStats {
    /// Bytes not committed to any allocation. Possibly spread over several
    /// gaps rather than one contiguous run.
    #[must_use]
    pub fn free_memory(&self) -> usize {
        self.total_size - self.used_memory
    }
}
