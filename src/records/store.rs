//! The surface shared by all record store variants.

use std::path::Path;

use super::errors::RecordsResult;

/// A gap-free sequence of fixed-size records backed by one file.
///
/// Callers hand records in and out as byte slices whose length equals
/// [`record_size`](RecordStore::record_size); a mismatched slice fails with
/// `REC_INVALID_RECORD_SIZE`. Exclusive access is enforced by the `&mut self`
/// receivers; a caller that needs sharing wraps the store in its own lock.
pub trait RecordStore {
    /// Number of records in the store: records on file plus records
    /// buffered in memory.
    fn size(&self) -> RecordsResult<u64>;

    /// Copies the record at `index` into `out`.
    ///
    /// Fails with `REC_OUT_OF_BOUNDS` unless `index < size()`.
    fn get(&mut self, index: u64, out: &mut [u8]) -> RecordsResult<()>;

    /// Writes `record` at `index`.
    ///
    /// `index == size()` behaves as [`add`](RecordStore::add). An all-zero
    /// record delegates to [`clean`](RecordStore::clean), so the store never
    /// ends with a zero record. Fails with `REC_OUT_OF_BOUNDS` unless
    /// `index <= size()`.
    fn put(&mut self, index: u64, record: &[u8]) -> RecordsResult<()>;

    /// Appends `record` at the current logical end and returns its index.
    ///
    /// Fails with `REC_INVALID_APPEND` if `record` is all zero: an erased
    /// record at the tail would be indistinguishable from no record.
    fn add(&mut self, record: &[u8]) -> RecordsResult<u64>;

    /// Erases the record at `index`.
    ///
    /// At an interior index the record is overwritten with zeros in place.
    /// At the last index this shrinks the store instead, cascading over any
    /// trailing erased records. At `index == size()` there is nothing to
    /// erase and the call is a no-op. Fails with `REC_OUT_OF_BOUNDS` if
    /// `index > size()`.
    fn clean(&mut self, index: u64) -> RecordsResult<()>;

    /// Removes the last record, copying its former content into `out`,
    /// then keeps shrinking while the new last record is all zero.
    ///
    /// Fails with `REC_OUT_OF_BOUNDS` on an empty store.
    fn clean_last_into(&mut self, out: &mut [u8]) -> RecordsResult<()>;

    /// Removes the last record and returns its former content.
    fn clean_last(&mut self) -> RecordsResult<Vec<u8>> {
        let mut out = vec![0u8; self.record_size()];
        self.clean_last_into(&mut out)?;
        Ok(out)
    }

    /// Removes the last record without reading it back, then keeps
    /// shrinking while the new last record is all zero.
    fn discard_last(&mut self) -> RecordsResult<()>;

    /// Persists any buffered records. Idempotent.
    fn flush(&mut self) -> RecordsResult<()>;

    /// Flushes and releases the file handle. Idempotent; subsequent
    /// operations fail with `REC_STORE_CLOSED`.
    fn close(&mut self) -> RecordsResult<()>;

    /// Drops every record, truncating the file to zero length.
    fn clear(&mut self) -> RecordsResult<()>;

    /// Path of the backing table file.
    fn file_path(&self) -> &Path;

    /// Fixed record length in bytes.
    fn record_size(&self) -> usize;
}
