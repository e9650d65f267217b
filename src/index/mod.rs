//! Bit-sliced indexes
//!
//! A bit-sliced index stores an integer column as a handful of compressed
//! bitmaps ("planes"). Plane layout, in order:
//!
//! | plane            | present in        | meaning                          |
//! |------------------|-------------------|----------------------------------|
//! | exists           | both variants     | row holds a live value           |
//! | sign             | [`SignedBsi`]     | stored value is negative         |
//! | magnitude[0..w]  | both variants     | bit i of the absolute magnitude  |
//!
//! Equality and range predicates are answered with a digit-by-digit walk over
//! the magnitude planes, most significant bit first, so the cost is bounded by
//! the bit width and the result cardinality rather than the row count.
//!
//! Arithmetic is sign-magnitude, not two's complement: the signed variant
//! splits every range predicate into a sign decision plus an unsigned
//! magnitude comparison handled by the shared core in this module.
//!
//! Instances are plain values. `&self` methods only read planes and allocate
//! fresh result bitmaps, so a stable instance can be shared between readers.
//! Writers must be serialized by the caller; [`Clone`] is a deep copy meant for
//! copy-on-write publication (see [`crate::relation`]).

use std::fmt;

use crate::types::{Bitmap, CmpOp, RowId, Value, ValueKind};
use crate::{Error, Result};

mod codec;
mod signed;
mod unsigned;

pub use signed::SignedBsi;
pub use unsigned::UnsignedBsi;

/// Widest magnitude an index can hold.
pub const MAX_BIT_WIDTH: u8 = 64;

const EXISTS_PLANE: usize = 0;
const SIGN_PLANE: usize = 1;

/// Operations shared by the signed and unsigned indexes.
///
/// The typed methods take the variant's native integer. The `*_value` and
/// [`compare`](BitSlicedIndex::compare) entry points accept a tagged [`Value`]
/// and fail with [`Error::TypeMismatch`] when its kind does not match.
pub trait BitSlicedIndex: Clone + fmt::Debug + Send + Sync {
    /// Native integer type stored by the index.
    type Native: Copy + Into<Value> + TryFrom<Value, Error = Error>;

    /// Kind of values the index accepts.
    const KIND: ValueKind;

    /// Number of magnitude planes.
    fn bit_width(&self) -> u8;

    /// Assign `value` to `row`, overwriting any previous value.
    ///
    /// Magnitudes wider than [`bit_width`](Self::bit_width) are truncated to
    /// the low bits.
    fn set(&mut self, row: RowId, value: Self::Native) -> Result<()>;

    /// Value held by `row`, or `None` if the row was never set or is deleted.
    fn get(&self, row: RowId) -> Result<Option<Self::Native>>;

    /// Logically delete `row`. Only the exists plane is cleared.
    fn del(&mut self, row: RowId) -> Result<()>;

    /// Copy of the exists plane.
    fn map(&self) -> Bitmap;

    fn eq(&self, value: Self::Native) -> Result<Bitmap>;
    fn ne(&self, value: Self::Native) -> Result<Bitmap>;
    fn lt(&self, value: Self::Native) -> Result<Bitmap>;
    fn le(&self, value: Self::Native) -> Result<Bitmap>;
    fn gt(&self, value: Self::Native) -> Result<Bitmap>;
    fn ge(&self, value: Self::Native) -> Result<Bitmap>;

    /// Serialize every plane into the flat persisted layout.
    fn show(&self) -> Result<Vec<u8>>;

    /// Replace the whole index with the contents of `buf`.
    ///
    /// On error the index is left untouched.
    fn read(&mut self, buf: &[u8]) -> Result<()>;

    /// Clear sign and magnitude bits of every row outside the exists plane.
    ///
    /// Returns the number of deleted rows whose stale bits were released.
    fn vacuum(&mut self) -> u64;

    fn kind(&self) -> ValueKind {
        Self::KIND
    }

    /// False for an index built with width 0 and never read.
    fn is_initialized(&self) -> bool {
        self.bit_width() > 0
    }

    /// Number of live rows.
    fn cardinality(&self) -> u64 {
        self.map().len()
    }

    /// Cardinality of every plane in layout order.
    fn plane_cardinalities(&self) -> Vec<u64>;

    fn set_value(&mut self, row: RowId, value: Value) -> Result<()> {
        let native = Self::Native::try_from(value)?;
        self.set(row, native)
    }

    fn get_value(&self, row: RowId) -> Result<Option<Value>> {
        Ok(self.get(row)?.map(Into::into))
    }

    /// Evaluate `op value` against every live row.
    fn compare(&self, op: CmpOp, value: Value) -> Result<Bitmap> {
        let value = Self::Native::try_from(value)?;
        match op {
            CmpOp::Eq => self.eq(value),
            CmpOp::Ne => self.ne(value),
            CmpOp::Lt => self.lt(value),
            CmpOp::Le => self.le(value),
            CmpOp::Gt => self.gt(value),
            CmpOp::Ge => self.ge(value),
        }
    }
}

/// Plane set shared by both variants.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slices {
    bit_width: u8,
    signed: bool,
    planes: Vec<Bitmap>,
}

impl Slices {
    pub(crate) fn new(bit_width: u8, signed: bool) -> Result<Self> {
        if bit_width > MAX_BIT_WIDTH {
            return Err(Error::InvalidBitWidth(bit_width));
        }
        let planes = vec![Bitmap::new(); plane_count(bit_width, signed)];
        Ok(Self {
            bit_width,
            signed,
            planes,
        })
    }

    /// Build from decoded planes. The caller guarantees the plane count.
    pub(crate) fn from_planes(bit_width: u8, signed: bool, planes: Vec<Bitmap>) -> Self {
        debug_assert_eq!(planes.len(), plane_count(bit_width, signed));
        Self {
            bit_width,
            signed,
            planes,
        }
    }

    pub(crate) fn bit_width(&self) -> u8 {
        self.bit_width
    }

    pub(crate) fn is_signed(&self) -> bool {
        self.signed
    }

    pub(crate) fn planes(&self) -> &[Bitmap] {
        &self.planes
    }

    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if self.bit_width == 0 {
            return Err(Error::Uninitialized);
        }
        Ok(())
    }

    pub(crate) fn exists(&self) -> &Bitmap {
        &self.planes[EXISTS_PLANE]
    }

    fn magnitude_offset(&self) -> usize {
        if self.signed {
            SIGN_PLANE + 1
        } else {
            EXISTS_PLANE + 1
        }
    }

    fn bit(&self, i: u8) -> &Bitmap {
        &self.planes[self.magnitude_offset() + i as usize]
    }

    fn max_magnitude(&self) -> u64 {
        if self.bit_width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_width) - 1
        }
    }

    /// Live rows holding a non-negative value.
    pub(crate) fn non_negative(&self) -> Bitmap {
        if self.signed {
            self.exists() - &self.planes[SIGN_PLANE]
        } else {
            self.exists().clone()
        }
    }

    /// Live rows holding a negative value. Always empty when unsigned.
    pub(crate) fn negative(&self) -> Bitmap {
        if self.signed {
            self.exists() & &self.planes[SIGN_PLANE]
        } else {
            Bitmap::new()
        }
    }

    pub(crate) fn set(&mut self, row: RowId, magnitude: u64, negative: bool) {
        let magnitude = magnitude & self.max_magnitude();
        let offset = self.magnitude_offset();
        for i in 0..self.bit_width as usize {
            let plane = &mut self.planes[offset + i];
            if (magnitude >> i) & 1 == 1 {
                plane.insert(row);
            } else {
                plane.remove(row);
            }
        }
        if self.signed {
            // a magnitude truncated to zero is stored as plain zero
            let sign = &mut self.planes[SIGN_PLANE];
            if negative && magnitude != 0 {
                sign.insert(row);
            } else {
                sign.remove(row);
            }
        }
        self.planes[EXISTS_PLANE].insert(row);
    }

    /// Magnitude and sign flag of a live row.
    pub(crate) fn get(&self, row: RowId) -> Option<(u64, bool)> {
        if !self.exists().contains(row) {
            return None;
        }
        let magnitude = (0..self.bit_width)
            .filter(|&i| self.bit(i).contains(row))
            .fold(0u64, |acc, i| acc | (1u64 << i));
        let negative = self.signed && self.planes[SIGN_PLANE].contains(row);
        Some((magnitude, negative))
    }

    pub(crate) fn del(&mut self, row: RowId) -> bool {
        self.planes[EXISTS_PLANE].remove(row)
    }

    pub(crate) fn vacuum(&mut self) -> u64 {
        let (exists, rest) = self.planes.split_at_mut(EXISTS_PLANE + 1);
        let exists = &exists[EXISTS_PLANE];
        let mut stale = Bitmap::new();
        for plane in rest.iter_mut() {
            stale |= &*plane - exists;
            *plane &= exists;
        }
        stale.len()
    }

    /// Rows of `candidates` whose magnitude equals `magnitude`.
    pub(crate) fn equal_to(&self, magnitude: u64, mut candidates: Bitmap) -> Bitmap {
        if magnitude > self.max_magnitude() {
            return Bitmap::new();
        }
        for i in (0..self.bit_width).rev() {
            if candidates.is_empty() {
                break;
            }
            if (magnitude >> i) & 1 == 1 {
                candidates &= self.bit(i);
            } else {
                candidates -= self.bit(i);
            }
        }
        candidates
    }

    /// Rows of `candidates` whose magnitude is below (or, if `inclusive`,
    /// equal to) `magnitude`.
    ///
    /// `committed` holds rows already proven strictly smaller at a higher bit
    /// and is always a subset of `candidates`. After the last bit the rows
    /// left in `candidates` but not in `committed` are exactly the equal ones.
    pub(crate) fn less_than(
        &self,
        magnitude: u64,
        mut candidates: Bitmap,
        inclusive: bool,
    ) -> Bitmap {
        if magnitude > self.max_magnitude() {
            return candidates;
        }
        let mut committed = Bitmap::new();
        for i in (0..self.bit_width).rev() {
            let plane = self.bit(i);
            if (magnitude >> i) & 1 == 1 {
                committed |= &candidates - plane;
            } else if committed.is_empty() {
                // leading zeros: nothing to protect yet
                candidates -= plane;
            } else {
                candidates -= plane - &committed;
            }
            if candidates.is_empty() {
                return candidates;
            }
        }
        if inclusive {
            candidates
        } else {
            committed
        }
    }

    /// Mirror image of [`less_than`](Self::less_than).
    pub(crate) fn greater_than(
        &self,
        magnitude: u64,
        mut candidates: Bitmap,
        inclusive: bool,
    ) -> Bitmap {
        if magnitude > self.max_magnitude() {
            return Bitmap::new();
        }
        let mut committed = Bitmap::new();
        for i in (0..self.bit_width).rev() {
            let plane = self.bit(i);
            if (magnitude >> i) & 1 == 0 {
                committed |= &candidates & plane;
            } else if committed.is_empty() {
                candidates &= plane;
            } else {
                let smaller = &(&candidates - plane) - &committed;
                candidates -= smaller;
            }
            if candidates.is_empty() {
                return candidates;
            }
        }
        if inclusive {
            candidates
        } else {
            committed
        }
    }
}

pub(crate) fn plane_count(bit_width: u8, signed: bool) -> usize {
    bit_width as usize + if signed { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned_slices(width: u8, values: &[u64]) -> Slices {
        let mut slices = Slices::new(width, false).unwrap();
        for (row, &v) in values.iter().enumerate() {
            slices.set(row as RowId, v, false);
        }
        slices
    }

    fn rows(bitmap: &Bitmap) -> Vec<u32> {
        bitmap.iter().collect()
    }

    #[test]
    fn test_plane_layout() {
        assert_eq!(Slices::new(8, true).unwrap().planes().len(), 10);
        assert_eq!(Slices::new(8, false).unwrap().planes().len(), 9);
        assert_eq!(Slices::new(0, true).unwrap().planes().len(), 2);
        assert!(matches!(
            Slices::new(65, false),
            Err(Error::InvalidBitWidth(65))
        ));
    }

    #[test]
    fn test_magnitude_core_exhaustive_small_width() {
        // every 4-bit value on its own row, probes cover the whole domain
        let values: Vec<u64> = (0..16).collect();
        let slices = unsigned_slices(4, &values);
        for probe in 0..16u64 {
            let all = slices.exists().clone();
            let expect = |f: &dyn Fn(u64) -> bool| -> Vec<u32> {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| f(v))
                    .map(|(r, _)| r as u32)
                    .collect()
            };
            assert_eq!(
                rows(&slices.less_than(probe, all.clone(), false)),
                expect(&|v| v < probe)
            );
            assert_eq!(
                rows(&slices.less_than(probe, all.clone(), true)),
                expect(&|v| v <= probe)
            );
            assert_eq!(
                rows(&slices.greater_than(probe, all.clone(), false)),
                expect(&|v| v > probe)
            );
            assert_eq!(
                rows(&slices.greater_than(probe, all.clone(), true)),
                expect(&|v| v >= probe)
            );
            assert_eq!(rows(&slices.equal_to(probe, all)), expect(&|v| v == probe));
        }
    }

    #[test]
    fn test_candidates_restrict_results() {
        let slices = unsigned_slices(8, &[1, 2, 3, 4, 5]);
        let candidates: Bitmap = [1u32, 3].into_iter().collect();
        assert_eq!(rows(&slices.less_than(10, candidates.clone(), false)), vec![1, 3]);
        assert_eq!(rows(&slices.greater_than(2, candidates, true)), vec![1, 3]);
    }

    #[test]
    fn test_out_of_range_probe() {
        let slices = unsigned_slices(4, &[3, 15]);
        let all = slices.exists().clone();
        assert_eq!(rows(&slices.less_than(16, all.clone(), false)), vec![0, 1]);
        assert!(slices.greater_than(16, all.clone(), true).is_empty());
        assert!(slices.equal_to(16, all).is_empty());
    }

    #[test]
    fn test_set_truncates_to_width() {
        let mut slices = Slices::new(4, false).unwrap();
        slices.set(0, 0x1f, false);
        assert_eq!(slices.get(0), Some((0xf, false)));
    }

    #[test]
    fn test_vacuum_clears_stale_bits() {
        let mut slices = Slices::new(8, true).unwrap();
        slices.set(0, 5, true);
        slices.set(1, 6, false);
        slices.set(2, 0, false);
        slices.del(0);
        slices.del(2);

        // row 2 never had any bit set beyond exists
        assert_eq!(slices.vacuum(), 1);
        assert!(slices.planes()[1..].iter().all(|p| !p.contains(0)));
        assert_eq!(slices.get(1), Some((6, false)));
    }
}
