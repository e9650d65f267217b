//! Indexed columns of a table
//!
//! An [`IndexRelation`] owns one bit-sliced index per indexed column, keyed by
//! row sequence number, and persists each index under
//! `"<table>.<column>.I"` (signed) or `"<table>.<column>.U"` (unsigned).
//!
//! Writes are copy-on-write: a per-column writer lock serializes mutations,
//! each writer clones the published index, mutates the clone and swaps it in.
//! Readers grab the current snapshot and evaluate predicates without holding
//! any lock, so queries never wait on ingestion.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::index::{BitSlicedIndex, SignedBsi, UnsignedBsi, MAX_BIT_WIDTH};
use crate::storage::StorageBackend;
use crate::types::{Bitmap, CmpOp, Predicate, RowId, Value, ValueKind};
use crate::{Error, Result};

/// Bit-sliced index of either kind
#[derive(Debug, Clone)]
pub enum ColumnIndex {
    Signed(SignedBsi),
    Unsigned(UnsignedBsi),
}

impl ColumnIndex {
    pub fn new(kind: ValueKind, bit_width: u8) -> Result<Self> {
        match kind {
            ValueKind::Signed => Ok(ColumnIndex::Signed(SignedBsi::new(bit_width)?)),
            ValueKind::Unsigned => Ok(ColumnIndex::Unsigned(UnsignedBsi::new(bit_width)?)),
        }
    }

    /// Decode a serialized index of the given kind.
    pub fn from_bytes(kind: ValueKind, buf: &[u8]) -> Result<Self> {
        let mut index = Self::new(kind, 0)?;
        match &mut index {
            ColumnIndex::Signed(bsi) => bsi.read(buf)?,
            ColumnIndex::Unsigned(bsi) => bsi.read(buf)?,
        }
        Ok(index)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnIndex::Signed(_) => ValueKind::Signed,
            ColumnIndex::Unsigned(_) => ValueKind::Unsigned,
        }
    }

    pub fn bit_width(&self) -> u8 {
        match self {
            ColumnIndex::Signed(bsi) => bsi.bit_width(),
            ColumnIndex::Unsigned(bsi) => bsi.bit_width(),
        }
    }

    pub fn set(&mut self, row: RowId, value: Value) -> Result<()> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.set_value(row, value),
            ColumnIndex::Unsigned(bsi) => bsi.set_value(row, value),
        }
    }

    pub fn get(&self, row: RowId) -> Result<Option<Value>> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.get_value(row),
            ColumnIndex::Unsigned(bsi) => bsi.get_value(row),
        }
    }

    pub fn del(&mut self, row: RowId) -> Result<()> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.del(row),
            ColumnIndex::Unsigned(bsi) => bsi.del(row),
        }
    }

    pub fn contains(&self, row: RowId) -> bool {
        matches!(self.get(row), Ok(Some(_)))
    }

    pub fn map(&self) -> Bitmap {
        match self {
            ColumnIndex::Signed(bsi) => bsi.map(),
            ColumnIndex::Unsigned(bsi) => bsi.map(),
        }
    }

    pub fn cardinality(&self) -> u64 {
        match self {
            ColumnIndex::Signed(bsi) => bsi.cardinality(),
            ColumnIndex::Unsigned(bsi) => bsi.cardinality(),
        }
    }

    pub fn plane_cardinalities(&self) -> Vec<u64> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.plane_cardinalities(),
            ColumnIndex::Unsigned(bsi) => bsi.plane_cardinalities(),
        }
    }

    pub fn compare(&self, op: CmpOp, value: Value) -> Result<Bitmap> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.compare(op, value),
            ColumnIndex::Unsigned(bsi) => bsi.compare(op, value),
        }
    }

    pub fn vacuum(&mut self) -> u64 {
        match self {
            ColumnIndex::Signed(bsi) => bsi.vacuum(),
            ColumnIndex::Unsigned(bsi) => bsi.vacuum(),
        }
    }

    pub fn show(&self) -> Result<Vec<u8>> {
        match self {
            ColumnIndex::Signed(bsi) => bsi.show(),
            ColumnIndex::Unsigned(bsi) => bsi.show(),
        }
    }
}

/// One indexed column: a writer lock plus the published snapshot
struct Column {
    kind: ValueKind,
    writer: Mutex<()>,
    published: RwLock<Arc<ColumnIndex>>,
}

impl Column {
    fn new(index: ColumnIndex) -> Self {
        Self {
            kind: index.kind(),
            writer: Mutex::new(()),
            published: RwLock::new(Arc::new(index)),
        }
    }

    fn snapshot(&self) -> Arc<ColumnIndex> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, index: ColumnIndex) {
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
    }

    /// Clone the published index, apply `mutate`, publish the result.
    ///
    /// Nothing is published if `mutate` fails.
    async fn update<T>(&self, mutate: impl FnOnce(&mut ColumnIndex) -> Result<T>) -> Result<T> {
        let _guard = self.writer.lock().await;
        let mut next = ColumnIndex::clone(&self.snapshot());
        let out = mutate(&mut next)?;
        self.publish(next);
        Ok(out)
    }
}

/// Indexed columns of one table
pub struct IndexRelation {
    table: String,
    storage: Arc<dyn StorageBackend>,
    columns: DashMap<String, Arc<Column>>,
}

impl IndexRelation {
    /// Create an empty relation. `table` must be non-empty and free of `.`,
    /// which separates the parts of a storage key.
    pub fn new(table: impl Into<String>, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let table = table.into();
        if table.trim().is_empty() || table.contains('.') {
            return Err(Error::InvalidTableName(table));
        }
        Ok(Self {
            table,
            storage,
            columns: DashMap::new(),
        })
    }

    /// Create a relation and load every column persisted for `table`.
    pub async fn open(table: impl Into<String>, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let relation = Self::new(table, storage)?;
        let prefix = format!("{}.", relation.table);

        for key in relation.storage.list(&prefix).await? {
            let Some(kind) = ValueKind::from_key(&key) else {
                tracing::warn!(%key, "Skipping key without an index kind suffix");
                continue;
            };
            let column = match key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.rsplit_once('.'))
            {
                Some((column, _)) if !column.is_empty() => column,
                _ => continue,
            };
            // keys are listed in order, so `.I` wins over a stray `.U` twin
            if let Some(existing) = relation.columns.get(column).map(|c| c.kind) {
                tracing::warn!(
                    %key,
                    column,
                    kept = %existing,
                    "Skipping second index kind stored for column"
                );
                continue;
            }
            relation.open_column(column, kind).await?;
        }

        tracing::info!(
            table = %relation.table,
            columns = relation.columns.len(),
            "Opened index relation"
        );
        Ok(relation)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Storage key of a column index.
    pub fn key(&self, column: &str, kind: ValueKind) -> String {
        format!("{}.{}.{}", self.table, column, kind.key_suffix())
    }

    /// Indexed columns and their kinds, sorted by name.
    pub fn columns(&self) -> Vec<(String, ValueKind)> {
        let mut columns: Vec<_> = self
            .columns
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().kind))
            .collect();
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        columns
    }

    /// Add an empty in-memory index for `name`.
    pub fn create_column(&self, name: &str, kind: ValueKind, bit_width: u8) -> Result<()> {
        if bit_width == 0 || bit_width > MAX_BIT_WIDTH {
            return Err(Error::InvalidBitWidth(bit_width));
        }
        let index = ColumnIndex::new(kind, bit_width)?;
        self.insert_column(name, index)?;

        tracing::info!(table = %self.table, column = %name, %kind, bit_width, "Created column index");
        Ok(())
    }

    /// Load the persisted index for `name`.
    pub async fn open_column(&self, name: &str, kind: ValueKind) -> Result<()> {
        let key = self.key(name, kind);
        let data = self.storage.get(&key).await.map_err(|e| match e {
            Error::NotFound(_) => Error::ColumnNotFound(name.to_string()),
            other => other,
        })?;
        let index = ColumnIndex::from_bytes(kind, &data).map_err(|e| {
            tracing::warn!(%key, error = %e, "Failed to decode column index");
            e
        })?;
        let rows = index.cardinality();
        self.insert_column(name, index)?;

        tracing::info!(%key, rows, bytes = data.len(), "Loaded column index");
        Ok(())
    }

    fn insert_column(&self, name: &str, index: ColumnIndex) -> Result<()> {
        match self.columns.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Error::ColumnExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Column::new(index)));
                Ok(())
            }
        }
    }

    fn column(&self, name: &str) -> Result<Arc<Column>> {
        self.columns
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Current published index of a column.
    pub fn snapshot(&self, column: &str) -> Result<Arc<ColumnIndex>> {
        Ok(self.column(column)?.snapshot())
    }

    pub async fn set(&self, column: &str, row: RowId, value: Value) -> Result<()> {
        self.set_batch(column, &[(row, value)]).await
    }

    /// Assign many rows with a single clone-and-publish.
    ///
    /// The batch is all-or-nothing: a kind mismatch anywhere publishes nothing.
    pub async fn set_batch(&self, column: &str, rows: &[(RowId, Value)]) -> Result<()> {
        let handle = self.column(column)?;
        let result = handle
            .update(|index| {
                for &(row, value) in rows {
                    index.set(row, value)?;
                }
                Ok(())
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(table = %self.table, %column, error = %e, "Rejected batch");
        } else {
            tracing::debug!(table = %self.table, %column, rows = rows.len(), "Applied batch");
        }
        result
    }

    /// Delete `row` from every column that holds it.
    pub async fn delete_row(&self, row: RowId) -> Result<()> {
        let handles: Vec<_> = self
            .columns
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handle in handles {
            if !handle.snapshot().contains(row) {
                continue;
            }
            handle.update(|index| index.del(row)).await?;
        }
        Ok(())
    }

    pub fn get(&self, column: &str, row: RowId) -> Result<Option<Value>> {
        self.snapshot(column)?.get(row)
    }

    pub fn compare(&self, column: &str, op: CmpOp, value: Value) -> Result<Bitmap> {
        self.snapshot(column)?.compare(op, value)
    }

    /// Rows satisfying every predicate.
    ///
    /// With no predicates, returns the rows live in every column.
    pub fn query(&self, predicates: &[Predicate]) -> Result<Bitmap> {
        if predicates.is_empty() {
            let mut snapshots = self.columns.iter().map(|entry| entry.value().snapshot());
            let Some(first) = snapshots.next() else {
                return Ok(Bitmap::new());
            };
            let mut rows = first.map();
            for snapshot in snapshots {
                rows &= snapshot.map();
            }
            return Ok(rows);
        }

        let mut result: Option<Bitmap> = None;
        for predicate in predicates {
            let rows = self
                .compare(&predicate.column, predicate.op, predicate.value)
                .map_err(|e| {
                    tracing::warn!(
                        table = %self.table,
                        column = %predicate.column,
                        error = %e,
                        "Predicate rejected"
                    );
                    e
                })?;
            let merged = match result {
                Some(acc) => acc & rows,
                None => rows,
            };
            if merged.is_empty() {
                tracing::debug!(table = %self.table, "Query short-circuited on empty result");
                return Ok(merged);
            }
            result = Some(merged);
        }

        let rows = result.unwrap_or_default();
        tracing::debug!(
            table = %self.table,
            predicates = predicates.len(),
            hits = rows.len(),
            "Evaluated query"
        );
        Ok(rows)
    }

    /// Release stale bits of deleted rows in a column.
    pub async fn vacuum(&self, column: &str) -> Result<u64> {
        let released = self
            .column(column)?
            .update(|index| Ok(index.vacuum()))
            .await?;

        tracing::info!(table = %self.table, %column, released, "Vacuumed column index");
        Ok(released)
    }

    /// Persist the published index of a column.
    pub async fn flush(&self, column: &str) -> Result<()> {
        let handle = self.column(column)?;
        let snapshot = handle.snapshot();
        let data = snapshot.show()?;
        let key = self.key(column, handle.kind);
        let bytes = data.len();
        self.storage.put(&key, Bytes::from(data)).await?;

        tracing::info!(%key, rows = snapshot.cardinality(), bytes, "Flushed column index");
        Ok(())
    }

    pub async fn flush_all(&self) -> Result<()> {
        for (column, _) in self.columns() {
            self.flush(&column).await?;
        }
        Ok(())
    }

    /// Remove a column from memory and storage.
    pub async fn drop_column(&self, name: &str) -> Result<()> {
        let (_, handle) = self
            .columns
            .remove(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        let key = self.key(name, handle.kind);
        self.storage.delete(&key).await?;

        tracing::info!(%key, "Dropped column index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn relation() -> IndexRelation {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let relation = IndexRelation::new("faces", storage).unwrap();
        relation
            .create_column("age", ValueKind::Signed, 16)
            .unwrap();
        relation
            .create_column("height", ValueKind::Unsigned, 16)
            .unwrap();
        relation
    }

    #[tokio::test]
    async fn test_create_and_query() {
        let relation = relation();
        relation
            .set_batch(
                "age",
                &[(0, 34i64.into()), (1, 17i64.into()), (2, 52i64.into())],
            )
            .await
            .unwrap();
        relation
            .set_batch(
                "height",
                &[(0, 180u64.into()), (1, 165u64.into()), (2, 171u64.into())],
            )
            .await
            .unwrap();

        let rows = relation
            .query(&[
                Predicate::new("age", CmpOp::Ge, 18i64),
                Predicate::new("height", CmpOp::Lt, 175u64),
            ])
            .unwrap();
        assert_eq!(rows.iter().collect::<Vec<_>>(), vec![2]);

        let all = relation.query(&[]).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_columns() {
        let relation = relation();
        assert!(matches!(
            relation.create_column("age", ValueKind::Unsigned, 8),
            Err(Error::ColumnExists(_))
        ));
        assert!(matches!(
            relation.create_column("zero", ValueKind::Unsigned, 0),
            Err(Error::InvalidBitWidth(0))
        ));
        assert!(matches!(
            relation.get("weight", 0),
            Err(Error::ColumnNotFound(_))
        ));
        assert!(matches!(
            relation.open_column("weight", ValueKind::Signed).await,
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mismatched_batch_publishes_nothing() {
        let relation = relation();
        let err = relation
            .set_batch("age", &[(0, Value::Signed(3)), (1, Value::Unsigned(4))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(relation.get("age", 0).unwrap(), None);
    }

    #[tokio::test]
    async fn test_snapshot_isolated_from_writes() {
        let relation = relation();
        relation.set("age", 0, Value::Signed(40)).await.unwrap();

        let before = relation.snapshot("age").unwrap();
        relation.set("age", 0, Value::Signed(-40)).await.unwrap();
        relation.set("age", 1, Value::Signed(1)).await.unwrap();

        assert_eq!(before.get(0).unwrap(), Some(Value::Signed(40)));
        assert_eq!(before.cardinality(), 1);
        assert_eq!(relation.get("age", 0).unwrap(), Some(Value::Signed(-40)));
    }

    #[tokio::test]
    async fn test_delete_row_and_vacuum() {
        let relation = relation();
        relation.set("age", 3, Value::Signed(-9)).await.unwrap();
        relation.set("height", 3, Value::Unsigned(170)).await.unwrap();
        relation.set("height", 4, Value::Unsigned(150)).await.unwrap();

        relation.delete_row(3).await.unwrap();
        assert_eq!(relation.get("age", 3).unwrap(), None);
        assert_eq!(relation.get("height", 3).unwrap(), None);
        assert_eq!(relation.get("height", 4).unwrap(), Some(Value::Unsigned(150)));

        assert_eq!(relation.vacuum("age").await.unwrap(), 1);
        assert_eq!(relation.vacuum("height").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_open_and_drop() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let relation = IndexRelation::new("faces", storage.clone()).unwrap();
        relation.create_column("age", ValueKind::Signed, 8).unwrap();
        relation.set("age", 7, Value::Signed(-100)).await.unwrap();
        relation.flush_all().await.unwrap();

        assert!(storage.exists("faces.age.I").await.unwrap());

        let reopened = IndexRelation::open("faces", storage.clone()).await.unwrap();
        assert_eq!(reopened.columns(), vec![("age".to_string(), ValueKind::Signed)]);
        assert_eq!(reopened.get("age", 7).unwrap(), Some(Value::Signed(-100)));
        assert_eq!(reopened.snapshot("age").unwrap().bit_width(), 8);

        reopened.drop_column("age").await.unwrap();
        assert!(!storage.exists("faces.age.I").await.unwrap());
        assert!(reopened.columns().is_empty());
    }

    #[test]
    fn test_rejects_invalid_table_names() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        for table in ["", "  ", "faces.v2"] {
            assert!(matches!(
                IndexRelation::new(table, storage.clone()),
                Err(Error::InvalidTableName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_open_keeps_one_kind_per_column() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let signed = ColumnIndex::new(ValueKind::Signed, 8).unwrap().show().unwrap();
        let unsigned = ColumnIndex::new(ValueKind::Unsigned, 8).unwrap().show().unwrap();
        storage.put("faces.age.I", Bytes::from(signed)).await.unwrap();
        storage.put("faces.age.U", Bytes::from(unsigned.clone())).await.unwrap();
        storage.put("facesv2.age.U", Bytes::from(unsigned)).await.unwrap();

        let relation = IndexRelation::open("faces", storage).await.unwrap();
        assert_eq!(relation.columns(), vec![("age".to_string(), ValueKind::Signed)]);
    }
}
