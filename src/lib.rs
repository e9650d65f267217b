//! bsi - bit-sliced integer indexes over compressed bitmaps
//!
//! A bit-sliced index answers equality and range predicates over an integer
//! column without scanning rows:
//! - Signed (`i64`) and unsigned (`u64`) variants, 1 to 64 bit magnitudes
//! - Roaring bitmaps for every plane and every result set
//! - A flat, portable byte layout for persistence
//! - Per-table column relations with copy-on-write publication

pub mod config;
pub mod error;
pub mod index;
pub mod relation;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use index::{BitSlicedIndex, SignedBsi, UnsignedBsi};
pub use types::{Bitmap, CmpOp, Predicate, RowId, Value, ValueKind};
