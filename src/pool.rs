use std::{
    fmt,
    num::NonZeroU32,
    ptr::{self, NonNull},
    slice,
};

use log::{debug, trace, warn};

use crate::{
    config::PoolConfig,
    error::{PoolError, PoolResult},
    node::{DATA_OFFSET, IN_USE_BYTE, Link, MIN_ALIGNMENT, NODE_HEADER_SIZE, Node, PoolHeader},
    platform::{request_memory, return_memory},
    snapshot::Segments,
    stats::PoolStats,
    utils::align_up,
};

/// Metadata bytes consumed by every allocation, on top of its aligned
/// payload.
pub const ALLOCATION_OVERHEAD: usize = NODE_HEADER_SIZE;

/// Bytes reserved at the start of the backing block for the pool's own
/// header.
pub const POOL_OVERHEAD: usize = DATA_OFFSET;

/// Smallest backing block that can ever satisfy an allocation: the pool
/// header, one node header and one alignment unit of payload.
pub const MIN_POOL_SIZE: usize = POOL_OVERHEAD + ALLOCATION_OVERHEAD + MIN_ALIGNMENT;

/// Chain links are 32-bit offsets, which caps the backing block.
pub const MAX_POOL_SIZE: usize = u32::MAX as usize;

/// A fixed-capacity memory pool.
///
/// The pool owns one contiguous backing block, acquired from the platform
/// when the pool is created and released in one piece when it is dropped.
/// Allocations are carved out of the block by a first-fit scan over the
/// gaps between live nodes; freeing splices the node out of the chain and
/// the vacated range simply becomes gap space again. Nothing else is ever
/// requested from the platform.
///
/// A pool has a single logical owner: every mutation goes through
/// `&mut self`, and there is no internal synchronization.
pub struct Pool {
    base: NonNull<u8>,
    config: PoolConfig,
}

/// Stable identity of one live allocation: the payload's byte offset from
/// the pool base, wrapped so it can only be produced by [`Pool::alloc`].
///
/// The handle is plain data. It stays valid until the allocation is freed;
/// after that every use is rejected ([`Pool::free`] with an error,
/// [`Pool::payload`] with `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    offset: u32,
}

impl Allocation {
    /// Byte offset of the payload from the pool base. Useful for diagnostics
    /// and for asserting placement in tests; not needed to access the
    /// payload.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }
}

impl Pool {
    /// Creates a pool with the default configuration. See
    /// [`Pool::with_config`].
    pub fn new(size: usize) -> PoolResult<Self> {
        Self::with_config(size, PoolConfig::default())
    }

    /// Creates a pool backed by exactly `size` bytes.
    ///
    /// The block is acquired from the platform in a single call, the header
    /// is written at its start and the data region is filled with the
    /// configured pattern. Fails with [`PoolError::TooSmall`] when no
    /// allocation could ever fit, [`PoolError::TooLarge`] when `size`
    /// exceeds the offset width, and [`PoolError::BackingFailed`] when the
    /// platform refuses the block.
    pub fn with_config(size: usize, config: PoolConfig) -> PoolResult<Self> {
        if size < MIN_POOL_SIZE {
            return Err(PoolError::TooSmall { size, min: MIN_POOL_SIZE });
        }
        if size > MAX_POOL_SIZE {
            return Err(PoolError::TooLarge { size, max: MAX_POOL_SIZE });
        }

        let base = unsafe { request_memory(size) }.ok_or(PoolError::BackingFailed { size })?;

        unsafe {
            base.as_ptr().cast::<PoolHeader>().write(PoolHeader {
                first: None,
                upper_limit: size as u32,
                total_size: size as u32,
                used_memory: 0,
                num_allocations: 0,
                peak_used: 0,
                total_allocs: 0,
                total_frees: 0,
            });

            if let Some(pattern) = config.fill_pattern {
                ptr::write_bytes(base.as_ptr().add(DATA_OFFSET), pattern, size - DATA_OFFSET);
            }
        }

        trace!("created pool of {size} bytes ({} data bytes)", size - DATA_OFFSET);

        Ok(Self { base, config })
    }

    /// Allocates `size` bytes from the pool.
    ///
    /// The request is rounded up to the alignment unit; a zero-byte request
    /// still yields a real, minimal allocation of one unit, so the returned
    /// handle is always addressable and always counts as live.
    ///
    /// The placement is the first (lowest-offset) gap large enough for the
    /// node header plus the aligned payload: the run before the first node,
    /// then the runs between consecutive nodes, then the tail up to the end
    /// of the block. Fails with [`PoolError::InsufficientSpace`] when the
    /// total free space cannot cover the request, and with
    /// [`PoolError::Fragmented`] when it could but no single gap does.
    pub fn alloc(&mut self, size: usize) -> PoolResult<Allocation> {
        let header = self.header();
        let available = (header.total_size - header.used_memory) as usize;

        if size > available {
            debug!("allocation of {size} bytes refused: {available} bytes free");
            return Err(PoolError::InsufficientSpace { requested: size, available });
        }

        let aligned = align_up(size.max(1), MIN_ALIGNMENT);
        let needed = aligned + NODE_HEADER_SIZE;

        if needed > available {
            debug!("allocation of {aligned} bytes refused: {available} bytes free");
            return Err(PoolError::InsufficientSpace { requested: aligned, available });
        }

        let upper = header.upper_limit;
        let mut cursor = DATA_OFFSET as u32;
        let mut prev: Link = None;
        let mut next: Link = header.first;
        let mut largest_gap = 0usize;

        loop {
            let gap_end = next.map_or(upper, NonZeroU32::get);
            let gap = (gap_end - cursor) as usize;

            if gap >= needed {
                return Ok(self.place(cursor, aligned as u32, prev, next));
            }
            largest_gap = largest_gap.max(gap);

            match next {
                None => break,
                Some(at) => {
                    let node = unsafe { self.node(at) };
                    cursor = at.get() + (NODE_HEADER_SIZE as u32) + node.size;
                    prev = next;
                    next = node.next;
                }
            }
        }

        debug!("allocation of {aligned} bytes refused: largest gap holds {largest_gap} bytes");
        Err(PoolError::Fragmented { requested: aligned, largest_gap })
    }

    /// Frees a live allocation.
    ///
    /// The node is spliced out of the chain in O(1) and the counters are
    /// adjusted; the vacated range is not tracked any further and merges
    /// into whichever gap now spans it. A handle that does not identify a
    /// live allocation (double free, or one that never came from this pool)
    /// is reported as [`PoolError::InvalidFree`] and leaves the pool
    /// untouched.
    pub fn free(&mut self, allocation: Allocation) -> PoolResult<()> {
        let node_at = self
            .live_node_at(allocation)
            .ok_or(PoolError::InvalidFree { offset: allocation.offset() })?;

        let (size, prev, next) = {
            let node = unsafe { &mut *self.node_ptr(node_at) };
            node.in_use = false;
            (node.size, node.prev, node.next)
        };

        unsafe {
            match prev {
                Some(p) => (*self.node_ptr(p.get())).next = next,
                None => self.header_mut().first = next,
            }
            if let Some(n) = next {
                (*self.node_ptr(n.get())).prev = prev;
            }
        }

        let header = self.header_mut();
        header.used_memory -= size + NODE_HEADER_SIZE as u32;
        header.num_allocations -= 1;
        header.total_frees += 1;

        if let Some(pattern) = self.config.free_pattern {
            unsafe {
                ptr::write_bytes(
                    self.base.as_ptr().add(node_at as usize),
                    pattern,
                    NODE_HEADER_SIZE + size as usize,
                );
            }
        }

        trace!("freed {size} bytes at offset {}", allocation.offset);
        Ok(())
    }

    /// The payload bytes of a live allocation, or `None` for a stale handle.
    /// The slice spans the full aligned size, which may exceed what was
    /// requested.
    #[must_use]
    pub fn payload(&self, allocation: Allocation) -> Option<&[u8]> {
        let node_at = self.live_node_at(allocation)?;
        let size = unsafe { (*self.node_ptr(node_at)).size } as usize;

        unsafe {
            Some(slice::from_raw_parts(
                self.base.as_ptr().add(allocation.offset()),
                size,
            ))
        }
    }

    /// Mutable counterpart of [`Pool::payload`].
    #[must_use]
    pub fn payload_mut(&mut self, allocation: Allocation) -> Option<&mut [u8]> {
        let node_at = self.live_node_at(allocation)?;
        let size = unsafe { (*self.node_ptr(node_at)).size } as usize;

        unsafe {
            Some(slice::from_raw_parts_mut(
                self.base.as_ptr().add(allocation.offset()),
                size,
            ))
        }
    }

    /// Current counters. Pure read, no side effects.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let header = self.header();

        PoolStats {
            total_size: header.total_size as usize,
            used_memory: header.used_memory as usize,
            num_allocations: header.num_allocations as usize,
            peak_used: header.peak_used as usize,
            total_allocs: header.total_allocs,
            total_frees: header.total_frees,
        }
    }

    /// An ordered walk of the data region as alternating used and gap
    /// segments. Covers everything from the end of the pool header to the
    /// end of the block, with no overlaps and no omissions. Calling it again
    /// restarts from the beginning.
    #[must_use]
    pub fn snapshot(&self) -> Segments<'_> {
        Segments::new(self)
    }

    /// Commits a placement the gap scan decided on: writes the node record
    /// at `at` and splices it between `prev` and `next`.
    fn place(&mut self, at: u32, size: u32, prev: Link, next: Link) -> Allocation {
        // `at` is at or past the data region start, never zero.
        let link = NonZeroU32::new(at);

        unsafe {
            self.node_ptr(at).write(Node { size, in_use: true, prev, next });

            match prev {
                Some(p) => (*self.node_ptr(p.get())).next = link,
                None => self.header_mut().first = link,
            }
            if let Some(n) = next {
                (*self.node_ptr(n.get())).prev = link;
            }
        }

        let header = self.header_mut();
        header.used_memory += size + NODE_HEADER_SIZE as u32;
        header.num_allocations += 1;
        header.total_allocs += 1;
        header.peak_used = header.peak_used.max(header.used_memory);

        let payload = at + NODE_HEADER_SIZE as u32;
        trace!("allocated {size} bytes at offset {payload}");

        Allocation { offset: payload }
    }

    /// Resolves an allocation handle to its node offset, or `None` if the
    /// handle does not identify a live node.
    ///
    /// The check is O(1): bounds and alignment of the offset, then the
    /// node's `in_use` flag. The flag is read as a raw byte because the
    /// offset may point into a gap whose contents are arbitrary (the fill
    /// pattern, or bytes of a former payload); no `&Node` is formed before
    /// the flag confirms a live record.
    fn live_node_at(&self, allocation: Allocation) -> Option<u32> {
        let payload = allocation.offset();
        let upper = self.header().upper_limit as usize;

        if payload < DATA_OFFSET + NODE_HEADER_SIZE
            || payload > upper
            || payload % MIN_ALIGNMENT != 0
        {
            return None;
        }
        let node_at = (payload - NODE_HEADER_SIZE) as u32;

        let flag = unsafe { self.base.as_ptr().add(node_at as usize + IN_USE_BYTE).read() };
        if flag != 1 {
            return None;
        }

        let node = unsafe { &*self.node_ptr(node_at) };
        let end = node_at as usize + NODE_HEADER_SIZE + node.size as usize;
        if end > upper {
            return None;
        }

        Some(node_at)
    }

    pub(crate) fn header(&self) -> &PoolHeader {
        unsafe { &*self.base.as_ptr().cast::<PoolHeader>() }
    }

    fn header_mut(&mut self) -> &mut PoolHeader {
        unsafe { &mut *self.base.as_ptr().cast::<PoolHeader>() }
    }

    fn node_ptr(&self, at: u32) -> *mut Node {
        unsafe { self.base.as_ptr().add(at as usize).cast::<Node>() }
    }

    /// Shared view of the node at `at`.
    ///
    /// **SAFETY**: `at` must be the offset of a node currently linked into
    /// the chain.
    pub(crate) unsafe fn node(&self, at: NonZeroU32) -> &Node {
        unsafe { &*self.node_ptr(at.get()) }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let header = self.header();
        let live = header.num_allocations;
        let len = header.total_size as usize;

        if live > 0 {
            warn!("destroying pool with {live} live allocations");
        }

        unsafe { return_memory(self.base.as_ptr(), len) };
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();

        f.debug_struct("Pool")
            .field("total_size", &header.total_size)
            .field("used_memory", &header.used_memory)
            .field("num_allocations", &header.num_allocations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Segment, SegmentKind};

    fn gap(len: usize) -> Segment {
        Segment { kind: SegmentKind::Gap, len }
    }

    fn used(len: usize) -> Segment {
        Segment { kind: SegmentKind::Used, len }
    }

    #[test]
    fn rejects_pool_below_minimum() {
        assert_eq!(
            Pool::new(4).unwrap_err(),
            PoolError::TooSmall { size: 4, min: MIN_POOL_SIZE }
        );
    }

    #[test]
    fn smallest_viable_pool_serves_one_allocation() {
        let mut pool = Pool::new(MIN_POOL_SIZE).unwrap();

        let a = pool.alloc(1).unwrap();
        assert_eq!(pool.stats().num_allocations, 1);

        pool.free(a).unwrap();
        assert_eq!(pool.stats().num_allocations, 0);
    }

    #[test]
    fn zero_size_requests_become_minimal_allocations() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(0).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.num_allocations, 1);
        assert_eq!(stats.used_memory, MIN_ALIGNMENT + ALLOCATION_OVERHEAD);
        assert_eq!(pool.payload(a).unwrap().len(), MIN_ALIGNMENT);
    }

    #[test]
    fn accounting_tracks_every_live_node() {
        let mut pool = Pool::new(512).unwrap();

        let a = pool.alloc(10).unwrap();
        let b = pool.alloc(30).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.used_memory, 16 + 32 + 2 * ALLOCATION_OVERHEAD);
        assert_eq!(stats.num_allocations, 2);

        pool.free(b).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.used_memory, 16 + ALLOCATION_OVERHEAD);
        assert_eq!(stats.num_allocations, 1);

        pool.free(a).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.used_memory, 0);
        assert_eq!(stats.num_allocations, 0);
        assert_eq!(stats.peak_used, 16 + 32 + 2 * ALLOCATION_OVERHEAD);
        assert_eq!(stats.total_allocs, 2);
        assert_eq!(stats.total_frees, 2);
    }

    #[test]
    fn first_fit_prefers_the_lowest_gap() {
        let mut pool = Pool::new(512).unwrap();

        let a = pool.alloc(24).unwrap();
        let _b = pool.alloc(24).unwrap();

        // Two candidate gaps: a's former range and the tail. The lower one
        // wins.
        pool.free(a).unwrap();
        let c = pool.alloc(8).unwrap();
        assert_eq!(c.offset(), a.offset());
    }

    #[test]
    fn freed_range_is_reused_for_a_matching_request() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(32).unwrap();
        let _b = pool.alloc(32).unwrap();

        pool.free(a).unwrap();
        let c = pool.alloc(32).unwrap();
        assert_eq!(c.offset(), a.offset());
    }

    #[test]
    fn sufficient_total_space_but_no_single_gap_fails() {
        // Lay out [a][b][tail gap] so that freeing `a` leaves two gaps of
        // one node-plus-24-bytes each; a 48-byte payload needs more than
        // either gap alone although their sum would cover it.
        let size = POOL_OVERHEAD + 3 * (ALLOCATION_OVERHEAD + 24);
        let mut pool = Pool::new(size).unwrap();

        let a = pool.alloc(24).unwrap();
        let _b = pool.alloc(24).unwrap();
        pool.free(a).unwrap();

        let err = pool.alloc(48).unwrap_err();
        assert_eq!(
            err,
            PoolError::Fragmented { requested: 48, largest_gap: ALLOCATION_OVERHEAD + 24 }
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn oversized_request_reports_available_space() {
        let mut pool = Pool::new(150).unwrap();

        assert_eq!(
            pool.alloc(1000).unwrap_err(),
            PoolError::InsufficientSpace { requested: 1000, available: 150 }
        );
    }

    #[test]
    fn double_free_is_detected() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(16).unwrap();
        pool.free(a).unwrap();

        let err = pool.free(a).unwrap_err();
        assert_eq!(err, PoolError::InvalidFree { offset: a.offset() });
        assert!(!err.is_recoverable());

        // The failed free did not disturb the counters.
        assert_eq!(pool.stats().num_allocations, 0);
        assert_eq!(pool.stats().total_frees, 1);
    }

    #[test]
    fn stale_handles_cannot_reach_payloads() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(16).unwrap();
        pool.free(a).unwrap();

        assert!(pool.payload(a).is_none());
        assert!(pool.payload_mut(a).is_none());
    }

    #[test]
    fn payloads_round_trip() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(11).unwrap();
        pool.payload_mut(a).unwrap()[..11].copy_from_slice(b"Hello World");
        assert_eq!(&pool.payload(a).unwrap()[..11], b"Hello World");
    }

    #[test]
    fn fresh_payloads_carry_the_fill_pattern() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(8).unwrap();
        assert_eq!(pool.payload(a).unwrap(), &[0xCC; 8]);
    }

    #[test]
    fn free_pattern_wipes_the_vacated_range() {
        let mut pool = Pool::with_config(256, PoolConfig::debug()).unwrap();

        let a = pool.alloc(8).unwrap();
        pool.payload_mut(a).unwrap().fill(0xAB);
        pool.free(a).unwrap();

        // The next allocation reuses the wiped range.
        let b = pool.alloc(8).unwrap();
        assert_eq!(b.offset(), a.offset());
        assert_eq!(pool.payload(b).unwrap(), &[0xDD; 8]);
    }

    #[test]
    fn snapshot_tiles_the_data_region() {
        let mut pool = Pool::new(256).unwrap();

        let a = pool.alloc(24).unwrap();
        let _b = pool.alloc(24).unwrap();
        pool.free(a).unwrap();

        let segments: Vec<_> = pool.snapshot().collect();
        assert_eq!(
            segments,
            [
                gap(ALLOCATION_OVERHEAD + 24),
                used(ALLOCATION_OVERHEAD + 24),
                gap(256 - POOL_OVERHEAD - 2 * (ALLOCATION_OVERHEAD + 24)),
            ]
        );
    }

    #[test]
    fn empty_pool_snapshot_is_one_gap() {
        let pool = Pool::new(150).unwrap();

        let segments: Vec<_> = pool.snapshot().collect();
        assert_eq!(segments, [gap(150 - POOL_OVERHEAD)]);
    }
}
