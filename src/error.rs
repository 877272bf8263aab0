use thiserror::Error;

/// Everything that can go wrong when creating or using a pool.
///
/// All capacity conditions are ordinary results the caller may branch on and
/// retry after freeing memory or shrinking the request. [`InvalidFree`] is
/// the exception: it reports a caller defect (double free or a handle that
/// never came from this pool), and the embedding program decides whether to
/// abort or propagate.
///
/// [`InvalidFree`]: PoolError::InvalidFree
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool of {size} bytes is below the {min} byte minimum")]
    TooSmall { size: usize, min: usize },

    #[error("pool of {size} bytes exceeds the {max} byte maximum")]
    TooLarge { size: usize, max: usize },

    #[error("backing acquisition of {size} bytes was refused by the platform")]
    BackingFailed { size: usize },

    #[error("{requested} bytes requested but only {available} bytes are free")]
    InsufficientSpace { requested: usize, available: usize },

    #[error("{requested} bytes requested but the largest gap holds {largest_gap} bytes")]
    Fragmented { requested: usize, largest_gap: usize },

    #[error("offset {offset} does not identify a live allocation")]
    InvalidFree { offset: usize },
}

impl PoolError {
    /// Whether retrying can help. Capacity conditions clear up once memory
    /// is freed or the request shrinks; an invalid free never does.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidFree { .. })
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
