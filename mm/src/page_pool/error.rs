//! Error type for the page-pool subsystem.
//!
//! Mirrors `crate::error::MmError`'s shape: a plain enum, a `Display` impl,
//! and a `Result` alias. Kept separate from `MmError` because the variant
//! sets do not overlap — paging errors are about address-space state, these
//! are about pool bookkeeping and the allocator adapter underneath it.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePoolError {
    /// Every allocation path was exhausted after order fallback to 0.
    OutOfMemory,
    /// DMA map was refused; the run must be freed immediately, not pooled.
    MappingFailed,
    /// A fatal signal was observed during `populate`.
    Interrupted,
    /// A run was handed to a Bucket whose (order, caching) it does not match.
    OrderMismatch { expected: u32, found: u32 },
    /// A run handle was released twice.
    DoubleFree,
    /// A pool or registry handle was null/uninitialized.
    NullPool,
    /// A caching class was requested that the target has no Bucket for.
    InvalidCachingClass,
}

impl fmt::Display for PagePoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "page pool: out of memory after order fallback"),
            Self::MappingFailed => write!(f, "page pool: DMA mapping failed"),
            Self::Interrupted => write!(f, "page pool: populate interrupted by fatal signal"),
            Self::OrderMismatch { expected, found } => {
                write!(
                    f,
                    "page pool: order mismatch, bucket expects {}, run has {}",
                    expected, found
                )
            }
            Self::DoubleFree => write!(f, "page pool: double free of run handle"),
            Self::NullPool => write!(f, "page pool: null pool handle"),
            Self::InvalidCachingClass => write!(f, "page pool: no bucket for this caching class"),
        }
    }
}

pub type PagePoolResult<T = ()> = Result<T, PagePoolError>;
