//! Bit-sliced index over unsigned integers

use super::{codec, BitSlicedIndex, Slices};
use crate::types::{Bitmap, RowId, ValueKind};
use crate::Result;

/// Bit-sliced index over `u64` values: an exists plane plus `bit_width`
/// magnitude planes.
#[derive(Debug, Clone)]
pub struct UnsignedBsi {
    slices: Slices,
}

impl UnsignedBsi {
    pub fn new(bit_width: u8) -> Result<Self> {
        Ok(Self {
            slices: Slices::new(bit_width, false)?,
        })
    }

    fn live(&self) -> Result<Bitmap> {
        self.slices.ensure_initialized()?;
        Ok(self.slices.exists().clone())
    }
}

impl BitSlicedIndex for UnsignedBsi {
    type Native = u64;

    const KIND: ValueKind = ValueKind::Unsigned;

    fn bit_width(&self) -> u8 {
        self.slices.bit_width()
    }

    fn set(&mut self, row: RowId, value: u64) -> Result<()> {
        self.slices.ensure_initialized()?;
        self.slices.set(row, value, false);
        Ok(())
    }

    fn get(&self, row: RowId) -> Result<Option<u64>> {
        self.slices.ensure_initialized()?;
        Ok(self.slices.get(row).map(|(magnitude, _)| magnitude))
    }

    fn del(&mut self, row: RowId) -> Result<()> {
        self.slices.del(row);
        Ok(())
    }

    fn map(&self) -> Bitmap {
        self.slices.exists().clone()
    }

    fn eq(&self, value: u64) -> Result<Bitmap> {
        Ok(self.slices.equal_to(value, self.live()?))
    }

    fn ne(&self, value: u64) -> Result<Bitmap> {
        let equal = self.eq(value)?;
        Ok(self.slices.exists() - &equal)
    }

    fn lt(&self, value: u64) -> Result<Bitmap> {
        Ok(self.slices.less_than(value, self.live()?, false))
    }

    fn le(&self, value: u64) -> Result<Bitmap> {
        Ok(self.slices.less_than(value, self.live()?, true))
    }

    fn gt(&self, value: u64) -> Result<Bitmap> {
        Ok(self.slices.greater_than(value, self.live()?, false))
    }

    fn ge(&self, value: u64) -> Result<Bitmap> {
        Ok(self.slices.greater_than(value, self.live()?, true))
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
