//! Index types for graph nodes.
//!
//! Nodes are addressed by a type-safe [`NodeId`] wrapper. The wrapper is
//! generic over the underlying integer type so that small graphs can use
//! `u16` handles and very large terrains can use `u64`.

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Trait for types that can be used as node indices.
///
/// This trait is implemented for `u16`, `u32`, and `u64`.
pub trait VuIndex:
    Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + Debug + Send + Sync + 'static
{
    /// The maximum valid index value.
    const MAX: Self;

    /// A sentinel value representing an invalid/null index.
    const INVALID: Self;

    /// Convert from usize to this index type.
    ///
    /// # Panics
    /// Panics in debug builds if the value is too large for this index type.
    fn from_usize(v: usize) -> Self;

    /// Convert to usize.
    fn to_usize(self) -> usize;

    /// Number of distinct valid indices.
    fn capacity() -> usize {
        Self::MAX.to_usize().saturating_add(1)
    }

    /// Check if this is a valid (non-sentinel) index.
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl VuIndex for u16 {
    const MAX: Self = u16::MAX - 1;
    const INVALID: Self = u16::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u16", v);
        v as u16
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl VuIndex for u32 {
    const MAX: Self = u32::MAX - 1;
    const INVALID: Self = u32::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u32", v);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl VuIndex for u64 {
    const MAX: Self = u64::MAX - 1;
    const INVALID: Self = u64::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as u64
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// A type-safe node handle.
///
/// A handle stays valid until the edge it belongs to is deleted; the slot may
/// then be recycled by a later [`create_node`](super::VuGraph::create_node).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct NodeId<I: VuIndex = u32>(I);

impl<I: VuIndex> NodeId<I> {
    /// Create a new index from a raw value.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(I::from_usize(index))
    }

    /// Create an invalid/null index.
    #[inline]
    pub fn invalid() -> Self {
        Self(I::INVALID)
    }

    /// Get the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0.to_usize()
    }

    /// Get the raw value of the underlying type.
    #[inline]
    pub fn raw(self) -> I {
        self.0
    }

    /// Check if this is a valid (non-null) index.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0.is_valid()
    }
}

impl<I: VuIndex> Debug for NodeId<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "N({})", self.index())
        } else {
            write!(f, "N(INVALID)")
        }
    }
}

impl<I: VuIndex> Default for NodeId<I> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<I: VuIndex> From<usize> for NodeId<I> {
    fn from(v: usize) -> Self {
        Self::new(v)
    }
}
