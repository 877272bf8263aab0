//! Structured view of a pool's layout.
//!
//! The walk is read-only and covers the data region exactly once: every byte
//! between the end of the pool header and the end of the block belongs to
//! precisely one segment. Rendering (textual or otherwise) is left to
//! consumers; see `demos/visualize.rs` for one.

use crate::node::{DATA_OFFSET, Link, NODE_HEADER_SIZE};
use crate::pool::Pool;

/// What a segment of the pool holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Unallocated space, available to future allocations.
    Gap,
    /// A live node together with its payload.
    Used,
}

/// One contiguous run of the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Length in bytes. For used segments this includes the node header.
    pub len: usize,
}

/// Iterator over a pool's segments in ascending offset order, returned by
/// [`Pool::snapshot`].
pub struct Segments<'a> {
    pool: &'a Pool,
    cursor: u32,
    next: Link,
    upper: u32,
}

impl<'a> Segments<'a> {
    pub(crate) fn new(pool: &'a Pool) -> Self {
        let header = pool.header();

        Self {
            pool,
            cursor: DATA_OFFSET as u32,
            next: header.first,
            upper: header.upper_limit,
        }
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.cursor >= self.upper {
            return None;
        }

        match self.next {
            // Space before the next node.
            Some(at) if at.get() > self.cursor => {
                let len = (at.get() - self.cursor) as usize;
                self.cursor = at.get();

                Some(Segment { kind: SegmentKind::Gap, len })
            }

            // The node itself, header and payload as one segment.
            Some(at) => {
                let node = unsafe { self.pool.node(at) };
                let len = NODE_HEADER_SIZE + node.size as usize;
                self.cursor = at.get() + len as u32;
                self.next = node.next;

                Some(Segment { kind: SegmentKind::Used, len })
            }

            // Tail space after the last node.
            None => {
                let len = (self.upper - self.cursor) as usize;
                self.cursor = self.upper;

                Some(Segment { kind: SegmentKind::Gap, len })
            }
        }
    }
}
