//! Mask bits and the mask pool.
//!
//! Every node carries a 32-bit mask field. The low [`RESERVED_BITS`] bits are
//! fixed, named masks that survive across operations (exterior, boundary,
//! void, ...). The remaining bits form a pool that algorithms grab for a
//! single pass and return when done.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Number of low bits reserved for named masks.
pub const RESERVED_BITS: u32 = 8;

/// A set of mask bits.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct VuMask(u32);

impl VuMask {
    /// No bits.
    pub const NONE: VuMask = VuMask(0);
    /// Node lies on the exterior side of its edge.
    pub const EXTERIOR: VuMask = VuMask(1 << 0);
    /// Edge is on a boundary (either side).
    pub const BOUNDARY: VuMask = VuMask(1 << 1);
    /// Edge came from caller input.
    pub const PRIMARY: VuMask = VuMask(1 << 2);
    /// Edge was added by triangulation or flipping.
    pub const RULE: VuMask = VuMask(1 << 3);
    /// Node lies in a null (degenerate, one- or two-edge) face.
    pub const NULL_FACE: VuMask = VuMask(1 << 4);
    /// Node lies inside a void region.
    pub const VOID: VuMask = VuMask(1 << 5);
    /// Edge crossing is inconsistent with polygon parity.
    pub const PARITY: VuMask = VuMask(1 << 6);
    /// Vertex must not move during smoothing.
    pub const BARRIER: VuMask = VuMask(1 << 7);

    /// Build a mask from raw bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no bit is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is also set in `self`.
    #[inline]
    pub const fn intersects(self, other: VuMask) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: VuMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VuMask {
    type Output = VuMask;

    fn bitor(self, rhs: VuMask) -> VuMask {
        VuMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for VuMask {
    fn bitor_assign(&mut self, rhs: VuMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for VuMask {
    type Output = VuMask;

    fn bitand(self, rhs: VuMask) -> VuMask {
        VuMask(self.0 & rhs.0)
    }
}

impl Not for VuMask {
    type Output = VuMask;

    fn not(self) -> VuMask {
        VuMask(!self.0)
    }
}

impl fmt::Debug for VuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VuMask({:#010x})", self.0)
    }
}

/// Allocator for the non-reserved mask bits.
#[derive(Debug, Clone)]
pub(crate) struct MaskPool {
    free: u32,
}

impl MaskPool {
    const POOL_BITS: u32 = !((1u32 << RESERVED_BITS) - 1);

    pub(crate) fn new() -> Self {
        Self {
            free: Self::POOL_BITS,
        }
    }

    /// Take the lowest free bit.
    pub(crate) fn grab(&mut self) -> Option<VuMask> {
        if self.free == 0 {
            return None;
        }
        let bit = self.free & self.free.wrapping_neg();
        self.free &= !bit;
        Some(VuMask(bit))
    }

    /// Give a bit back to the pool.
    ///
    /// # Panics
    /// Panics if the mask is reserved, empty, multi-bit, or already free.
    pub(crate) fn release(&mut self, mask: VuMask) {
        assert!(
            mask.0.count_ones() == 1 && mask.0 & Self::POOL_BITS != 0,
            "{:?} is not a pool mask",
            mask
        );
        assert!(self.free & mask.0 == 0, "{:?} returned twice", mask);
        self.free |= mask.0;
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.count_ones() as usize
    }

    pub(crate) fn capacity() -> usize {
        Self::POOL_BITS.count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_masks_are_disjoint() {
        let all = [
            VuMask::EXTERIOR,
            VuMask::BOUNDARY,
            VuMask::PRIMARY,
            VuMask::RULE,
            VuMask::NULL_FACE,
            VuMask::VOID,
            VuMask::PARITY,
            VuMask::BARRIER,
        ];
        let mut acc = VuMask::NONE;
        for m in all {
            assert!(!acc.intersects(m));
            acc |= m;
        }
        assert_eq!(acc.bits(), (1 << RESERVED_BITS) - 1);
    }

    #[test]
    fn test_pool_grab_until_exhausted() {
        let mut pool = MaskPool::new();
        let mut grabbed = Vec::new();
        while let Some(m) = pool.grab() {
            assert!(m.bits() >= 1 << RESERVED_BITS);
            grabbed.push(m);
        }
        assert_eq!(grabbed.len(), MaskPool::capacity());
        assert_eq!(pool.free_count(), 0);

        for m in grabbed {
            pool.release(m);
        }
        assert_eq!(pool.free_count(), MaskPool::capacity());
    }

    #[test]
    #[should_panic(expected = "returned twice")]
    fn test_double_release_panics() {
        let mut pool = MaskPool::new();
        let m = pool.grab().unwrap();
        pool.release(m);
        pool.release(m);
    }

    #[test]
    #[should_panic(expected = "not a pool mask")]
    fn test_release_reserved_panics() {
        let mut pool = MaskPool::new();
        pool.release(VuMask::EXTERIOR);
    }
}
