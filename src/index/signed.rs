//! Bit-sliced index over signed integers

use super::{codec, BitSlicedIndex, Slices};
use crate::types::{Bitmap, RowId, ValueKind};
use crate::Result;

/// Bit-sliced index over `i64` values.
///
/// Holds `bit_width + 2` planes: exists, sign, then the magnitude planes.
/// Range predicates split on the sign of the probe. For a non-negative probe
/// every negative row is already smaller and the remaining rows are compared
/// by magnitude. For a negative probe every non-negative row is already larger
/// and negative rows are compared by magnitude with the roles reversed, since
/// a larger magnitude means a smaller value.
#[derive(Debug, Clone)]
pub struct SignedBsi {
    slices: Slices,
}

impl SignedBsi {
    /// Create an empty index with `bit_width` magnitude planes.
    ///
    /// A width of 0 yields an uninitialized index that only becomes usable
    /// after [`read`](BitSlicedIndex::read).
    pub fn new(bit_width: u8) -> Result<Self> {
        Ok(Self {
            slices: Slices::new(bit_width, true)?,
        })
    }

    fn below(&self, value: i64, inclusive: bool) -> Result<Bitmap> {
        self.slices.ensure_initialized()?;
        let magnitude = value.unsigned_abs();
        if value >= 0 {
            let mut rows =
                self.slices
                    .less_than(magnitude, self.slices.non_negative(), inclusive);
            rows |= self.slices.negative();
            Ok(rows)
        } else {
            Ok(self
                .slices
                .greater_than(magnitude, self.slices.negative(), inclusive))
        }
    }

    fn above(&self, value: i64, inclusive: bool) -> Result<Bitmap> {
        self.slices.ensure_initialized()?;
        let magnitude = value.unsigned_abs();
        if value >= 0 {
            Ok(self
                .slices
                .greater_than(magnitude, self.slices.non_negative(), inclusive))
        } else {
            let mut rows = self
                .slices
                .less_than(magnitude, self.slices.negative(), inclusive);
            rows |= self.slices.non_negative();
            Ok(rows)
        }
    }
}

impl BitSlicedIndex for SignedBsi {
    type Native = i64;

    const KIND: ValueKind = ValueKind::Signed;

    fn bit_width(&self) -> u8 {
        self.slices.bit_width()
    }

    fn set(&mut self, row: RowId, value: i64) -> Result<()> {
        self.slices.ensure_initialized()?;
        self.slices.set(row, value.unsigned_abs(), value < 0);
        Ok(())
    }

    fn get(&self, row: RowId) -> Result<Option<i64>> {
        self.slices.ensure_initialized()?;
        Ok(self.slices.get(row).map(|(magnitude, negative)| {
            // i64::MIN has magnitude 2^63, which wraps back onto itself
            let value = magnitude as i64;
            if negative {
                value.wrapping_neg()
            } else {
                value
            }
        }))
    }

    fn del(&mut self, row: RowId) -> Result<()> {
        self.slices.del(row);
        Ok(())
    }

    fn map(&self) -> Bitmap {
        self.slices.exists().clone()
    }

    fn eq(&self, value: i64) -> Result<Bitmap> {
        self.slices.ensure_initialized()?;
        let candidates = if value < 0 {
            self.slices.negative()
        } else {
            self.slices.non_negative()
        };
        Ok(self.slices.equal_to(value.unsigned_abs(), candidates))
    }

    fn ne(&self, value: i64) -> Result<Bitmap> {
        let equal = self.eq(value)?;
        Ok(self.slices.exists() - &equal)
    }

    fn lt(&self, value: i64) -> Result<Bitmap> {
        self.below(value, false)
    }

    fn le(&self, value: i64) -> Result<Bitmap> {
        self.below(value, true)
    }

    fn gt(&self, value: i64) -> Result<Bitmap> {
        self.above(value, false)
    }

    fn ge(&self, value: i64) -> Result<Bitmap> {
        self.above(value, true)
    }

    fn show(&self) -> Result<Vec<u8>> {
        codec::encode(&self.slices)
    }

    fn read(&mut self, buf: &[u8]) -> Result<()> {
        self.slices = codec::decode(buf, self.slices.is_signed())?;
        Ok(())
    }

    fn vacuum(&mut self) -> u64 {
        self.slices.vacuum()
    }

    fn plane_cardinalities(&self) -> Vec<u64> {
        self.slices.planes().iter().map(Bitmap::len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CmpOp, Value};
    use crate::Error;

    const VALUES: [i64; 15] = [
        10, 3, -7, 9, 0, 1, 9, -8, 2, -1, 12, -35435, 6545654, 2332, 2,
    ];

    fn scenario() -> SignedBsi {
        let mut bsi = SignedBsi::new(64).unwrap();
        for (row, &v) in VALUES.iter().enumerate() {
            bsi.set(row as RowId, v).unwrap();
        }
        bsi
    }

    fn rows(bitmap: Bitmap) -> Vec<u32> {
        bitmap.into_iter().collect()
    }

    #[test]
    fn test_scenario_comparisons() {
        let bsi = scenario();

        assert_eq!(rows(bsi.eq(3).unwrap()), vec![1]);
        assert_eq!(rows(bsi.lt(-1).unwrap()), vec![2, 7, 11]);
        assert_eq!(rows(bsi.le(-1).unwrap()), vec![2, 7, 9, 11]);
        assert_eq!(
            rows(bsi.gt(-1).unwrap()),
            vec![0, 1, 3, 4, 5, 6, 8, 10, 12, 13, 14]
        );
        assert_eq!(
            rows(bsi.ge(-1).unwrap()),
            vec![0, 1, 3, 4, 5, 6, 8, 9, 10, 12, 13, 14]
        );
    }

    #[test]
    fn test_get_round_trips_values() {
        let bsi = scenario();
        for (row, &v) in VALUES.iter().enumerate() {
            assert_eq!(bsi.get(row as RowId).unwrap(), Some(v));
        }
        assert_eq!(bsi.get(99).unwrap(), None);
    }

    #[test]
    fn test_negative_rows() {
        let bsi = scenario();
        let expected: Vec<u32> = VALUES
            .iter()
            .enumerate()
            .filter(|(_, &v)| v < 0)
            .map(|(r, _)| r as u32)
            .collect();
        assert_eq!(rows(bsi.lt(0).unwrap()), expected);
        assert_eq!(rows(bsi.eq(-35435).unwrap()), vec![11]);
        assert!(bsi.eq(35435).unwrap().is_empty());
    }

    #[test]
    fn test_overwrite_flips_sign() {
        let mut bsi = SignedBsi::new(32).unwrap();
        bsi.set(5, -12).unwrap();
        bsi.set(5, 12).unwrap();
        assert_eq!(bsi.get(5).unwrap(), Some(12));
        assert!(bsi.lt(0).unwrap().is_empty());
        bsi.set(5, -3).unwrap();
        assert_eq!(bsi.get(5).unwrap(), Some(-3));
        assert_eq!(bsi.cardinality(), 1);
    }

    #[test]
    fn test_delete_is_logical() {
        let mut bsi = scenario();
        let before = bsi.slices.clone();
        bsi.del(11).unwrap();

        assert_eq!(bsi.get(11).unwrap(), None);
        assert!(!bsi.map().contains(11));
        assert!(!bsi.lt(0).unwrap().contains(11));
        assert!(!bsi.ne(0).unwrap().contains(11));
        // only the exists plane changed
        assert_eq!(&bsi.slices.planes()[1..], &before.planes()[1..]);
    }

    #[test]
    fn test_extremes_at_full_width() {
        let mut bsi = SignedBsi::new(64).unwrap();
        bsi.set(0, i64::MIN).unwrap();
        bsi.set(1, i64::MAX).unwrap();
        bsi.set(2, 0).unwrap();
        bsi.set(3, -1).unwrap();

        assert_eq!(bsi.get(0).unwrap(), Some(i64::MIN));
        assert_eq!(bsi.get(1).unwrap(), Some(i64::MAX));
        assert_eq!(rows(bsi.lt(i64::MIN + 1).unwrap()), vec![0]);
        assert_eq!(rows(bsi.ge(i64::MAX).unwrap()), vec![1]);
        assert_eq!(rows(bsi.lt(0).unwrap()), vec![0, 3]);
        assert_eq!(rows(bsi.eq(i64::MIN).unwrap()), vec![0]);
    }

    #[test]
    fn test_narrow_width_out_of_range_probe() {
        let mut bsi = SignedBsi::new(8).unwrap();
        bsi.set(0, 255).unwrap();
        bsi.set(1, -255).unwrap();
        bsi.set(2, 17).unwrap();

        assert_eq!(rows(bsi.lt(1000).unwrap()), vec![0, 1, 2]);
        assert_eq!(rows(bsi.gt(-1000).unwrap()), vec![0, 1, 2]);
        assert!(bsi.gt(1000).unwrap().is_empty());
        assert!(bsi.lt(-1000).unwrap().is_empty());
        assert!(bsi.eq(1000).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_to_zero_is_not_negative() {
        let mut bsi = SignedBsi::new(8).unwrap();
        bsi.set(0, -256).unwrap();
        bsi.set(1, i64::MIN).unwrap();
        bsi.set(2, -257).unwrap();

        assert_eq!(bsi.get(0).unwrap(), Some(0));
        assert_eq!(bsi.get(1).unwrap(), Some(0));
        assert_eq!(bsi.get(2).unwrap(), Some(-1));
        assert_eq!(rows(bsi.lt(0).unwrap()), vec![2]);
        assert_eq!(rows(bsi.eq(0).unwrap()), vec![0, 1]);
        assert_eq!(rows(bsi.ge(0).unwrap()), vec![0, 1]);
        assert_eq!(rows(bsi.gt(-1).unwrap()), vec![0, 1]);
        assert!(!bsi.slices.negative().contains(0));
        assert!(!bsi.slices.negative().contains(1));
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let mut bsi = scenario();
        bsi.del(4).unwrap();
        let bytes = bsi.show().unwrap();

        let mut restored = SignedBsi::new(0).unwrap();
        restored.read(&bytes).unwrap();
        assert_eq!(restored.bit_width(), 64);
        for row in 0..VALUES.len() as RowId {
            assert_eq!(restored.get(row).unwrap(), bsi.get(row).unwrap());
        }
        for probe in [-35436, -8, -1, 0, 1, 9, 10, 6545654] {
            assert_eq!(restored.lt(probe).unwrap(), bsi.lt(probe).unwrap());
            assert_eq!(restored.ge(probe).unwrap(), bsi.ge(probe).unwrap());
            assert_eq!(restored.ne(probe).unwrap(), bsi.ne(probe).unwrap());
        }
    }

    #[test]
    fn test_failed_read_leaves_index_untouched() {
        let mut bsi = scenario();
        let err = bsi.read(&[64, 0, 0]).unwrap_err();
        assert!(err.is_decode());
        assert_eq!(bsi.get(0).unwrap(), Some(10));
    }

    #[test]
    fn test_uninitialized_guards() {
        let mut bsi = SignedBsi::new(0).unwrap();
        assert!(!bsi.is_initialized());
        assert!(matches!(bsi.set(0, 1), Err(Error::Uninitialized)));
        assert!(matches!(bsi.get(0), Err(Error::Uninitialized)));
        assert!(matches!(bsi.lt(0), Err(Error::Uninitialized)));
        assert!(matches!(bsi.ne(0), Err(Error::Uninitialized)));
        assert!(bsi.map().is_empty());
    }

    #[test]
    fn test_dynamic_values_are_kind_checked() {
        let mut bsi = scenario();
        bsi.set_value(20, Value::Signed(-4)).unwrap();
        assert_eq!(bsi.get_value(20).unwrap(), Some(Value::Signed(-4)));

        let err = bsi.set_value(21, Value::Unsigned(4)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(bsi.get(21).unwrap(), None);

        let err = bsi.compare(CmpOp::Lt, Value::Unsigned(4)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(
            bsi.compare(CmpOp::Eq, Value::Signed(3)).unwrap(),
            bsi.eq(3).unwrap()
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let bsi = scenario();
        let mut copy = bsi.clone();
        copy.set(0, -10).unwrap();
        copy.del(1).unwrap();
        assert_eq!(bsi.get(0).unwrap(), Some(10));
        assert_eq!(bsi.get(1).unwrap(), Some(3));
        assert_eq!(copy.get(0).unwrap(), Some(-10));
    }
}
