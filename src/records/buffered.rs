//! The write-buffer layer: appends coalesce in memory and land on disk as
//! one contiguous write.

use std::path::Path;

use crate::observability::{log_event_with_fields, Event};

use super::errors::{RecordsError, RecordsResult};
use super::file::RecordFile;
use super::store::RecordStore;
use super::{is_zero, StoreOptions};

/// A record store that buffers newly appended records.
///
/// The buffer always mirrors the tail of the logical store: records that
/// have never been on file. On-file records are read and written through
/// directly. Once the buffer holds its capacity of records, the next append
/// flushes it as a single write at the end of the file.
pub struct BufferedRecords {
    file: RecordFile,
    buffer: Vec<u8>,
    buffered: usize,
}

impl BufferedRecords {
    /// Opens the table file at `path` with default options, creating it if
    /// absent.
    pub fn open(path: &Path, record_size: usize) -> RecordsResult<Self> {
        Self::open_with(path, record_size, StoreOptions::default())
    }

    /// Opens with an explicit write-buffer budget and metrics sink.
    pub fn open_with(
        path: &Path,
        record_size: usize,
        options: StoreOptions,
    ) -> RecordsResult<Self> {
        let capacity = StoreOptions::capacity_records(options.write_buffer_bytes, record_size);
        let file = RecordFile::open_with(path, record_size, options)?;
        Ok(Self {
            file,
            buffer: vec![0u8; capacity * record_size],
            buffered: 0,
        })
    }

    fn capacity(&self) -> usize {
        self.buffer.len() / self.record_size()
    }

    /// Slot of `index` inside the buffered tail, if it is there.
    fn in_buffer(&self, index: u64, file_records: u64) -> Option<usize> {
        if index >= file_records && index < file_records + self.buffered as u64 {
            Some((index - file_records) as usize)
        } else {
            None
        }
    }

    fn slot(&self, slot: usize) -> std::ops::Range<usize> {
        let rs = self.record_size();
        slot * rs..(slot + 1) * rs
    }

    /// Writes every buffered record at the end of the file and empties the
    /// buffer. Idempotent.
    fn flush_buffer(&mut self) -> RecordsResult<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let bytes = self.buffered * self.record_size();
        self.file.append_raw(&self.buffer[..bytes])?;
        if let Some(metrics) = self.file.metrics() {
            metrics.increment_buffer_flushes();
        }
        log_event_with_fields(
            Event::BufferFlushed,
            &[
                ("file", &self.file.file_path().display().to_string()),
                ("records", &self.buffered.to_string()),
            ],
        );
        self.buffered = 0;
        Ok(())
    }

    /// Places a record in the next buffer slot, flushing first when full.
    fn buffer_append(&mut self, record: &[u8]) -> RecordsResult<()> {
        if self.buffered >= self.capacity() {
            self.flush_buffer()?;
        }
        let range = self.slot(self.buffered);
        self.buffer[range].copy_from_slice(record);
        self.buffered += 1;
        self.file.count_buffered_append();
        Ok(())
    }

    /// Whether the record at `index` is all zero, wherever it lives.
    fn is_clean_at(&mut self, index: u64) -> RecordsResult<bool> {
        let file_records = self.file.file_records()?;
        if let Some(slot) = self.in_buffer(index, file_records) {
            return Ok(is_zero(&self.buffer[self.slot(slot)]));
        }
        self.file.is_clean_on_file(index)
    }

    /// Removes the last record without cascading, optionally copying its
    /// former content into `out`.
    fn remove_last(&mut self, out: Option<&mut [u8]>) -> RecordsResult<()> {
        let file_records = self.file.file_records()?;
        if self.buffered > 0 {
            let range = self.slot(self.buffered - 1);
            if let Some(out) = out {
                out.copy_from_slice(&self.buffer[range]);
            }
            self.buffered -= 1;
            return Ok(());
        }
        if file_records == 0 {
            return Err(RecordsError::out_of_bounds("clean_last", 0, 0));
        }
        if let Some(out) = out {
            self.file.read_record(file_records - 1, out)?;
        }
        self.file.truncate_records(file_records - 1)
    }

    fn trim_trailing_clean(&mut self) -> RecordsResult<()> {
        loop {
            let size = self.size()?;
            if size == 0 || !self.is_clean_at(size - 1)? {
                return Ok(());
            }
            self.remove_last(None)?;
        }
    }

    fn check_record_buf(&self, len: usize) -> RecordsResult<()> {
        if len != self.record_size() {
            return Err(RecordsError::buffer_mismatch(len, self.record_size()));
        }
        Ok(())
    }
}

impl RecordStore for BufferedRecords {
    fn size(&self) -> RecordsResult<u64> {
        Ok(self.file.file_records()? + self.buffered as u64)
    }

    fn get(&mut self, index: u64, out: &mut [u8]) -> RecordsResult<()> {
        self.file.ensure_open("get")?;
        self.check_record_buf(out.len())?;
        let file_records = self.file.file_records()?;
        let size = file_records + self.buffered as u64;
        if index >= size {
            return Err(RecordsError::out_of_bounds("get", index, size));
        }
        if let Some(slot) = self.in_buffer(index, file_records) {
            out.copy_from_slice(&self.buffer[self.slot(slot)]);
            return Ok(());
        }
        self.file.read_record(index, out)
    }

    fn put(&mut self, index: u64, record: &[u8]) -> RecordsResult<()> {
        self.file.ensure_open("put")?;
        self.check_record_buf(record.len())?;
        let file_records = self.file.file_records()?;
        let size = file_records + self.buffered as u64;
        if index > size {
            return Err(RecordsError::out_of_bounds("put", index, size));
        }
        if is_zero(record) {
            return self.clean(index);
        }
        if let Some(slot) = self.in_buffer(index, file_records) {
            let range = self.slot(slot);
            self.buffer[range].copy_from_slice(record);
            return Ok(());
        }
        if index == size {
            return self.buffer_append(record);
        }
        self.file.write_record(index, record)
    }

    fn add(&mut self, record: &[u8]) -> RecordsResult<u64> {
        self.file.ensure_open("add")?;
        self.check_record_buf(record.len())?;
        if is_zero(record) {
            return Err(RecordsError::invalid_append());
        }
        let index = self.size()?;
        self.buffer_append(record)?;
        Ok(index)
    }

    fn clean(&mut self, index: u64) -> RecordsResult<()> {
        self.file.ensure_open("clean")?;
        let file_records = self.file.file_records()?;
        let size = file_records + self.buffered as u64;
        if index > size {
            return Err(RecordsError::out_of_bounds("clean", index, size));
        }
        if index == size {
            // Nothing exists at the append position yet.
            return Ok(());
        }
        if index == size - 1 {
            return self.discard_last();
        }
        if let Some(slot) = self.in_buffer(index, file_records) {
            let range = self.slot(slot);
            self.buffer[range].fill(0);
            return Ok(());
        }
        let zero = vec![0u8; self.record_size()];
        self.file.write_record(index, &zero)
    }

    fn clean_last_into(&mut self, out: &mut [u8]) -> RecordsResult<()> {
        self.file.ensure_open("clean_last")?;
        self.check_record_buf(out.len())?;
        self.remove_last(Some(out))?;
        self.trim_trailing_clean()
    }

    fn discard_last(&mut self) -> RecordsResult<()> {
        self.file.ensure_open("clean_last")?;
        self.remove_last(None)?;
        self.trim_trailing_clean()
    }

    fn flush(&mut self) -> RecordsResult<()> {
        self.file.ensure_open("flush")?;
        self.flush_buffer()
    }

    fn close(&mut self) -> RecordsResult<()> {
        if !self.file.is_open() {
            return Ok(());
        }
        self.flush_buffer()?;
        self.file.close()
    }

    fn clear(&mut self) -> RecordsResult<()> {
        self.file.clear()?;
        self.buffered = 0;
        Ok(())
    }

    fn file_path(&self) -> &Path {
        self.file.file_path()
    }

    fn record_size(&self) -> usize {
        self.file.record_size()
    }
}

impl Drop for BufferedRecords {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::RecordsErrorCode;
    use super::*;
    use tempfile::TempDir;

    /// A four-record buffer keeps flush boundaries easy to cross.
    fn small_options() -> StoreOptions {
        StoreOptions {
            write_buffer_bytes: 32,
            read_cache_bytes: 32,
            metrics: None,
        }
    }

    fn open_store(dir: &TempDir, name: &str) -> BufferedRecords {
        BufferedRecords::open_with(&dir.path().join(name), 8, small_options()).unwrap()
    }

    fn rec(tag: u8) -> [u8; 8] {
        [tag; 8]
    }

    #[test]
    fn buffered_records_are_visible_before_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();

        store.add(&rec(1)).unwrap();
        store.add(&rec(2)).unwrap();
        assert_eq!(store.size().unwrap(), 2);
        // Nothing has reached the file yet.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        let mut out = [0u8; 8];
        store.get(1, &mut out).unwrap();
        assert_eq!(out, rec(2));
    }

    #[test]
    fn full_buffer_flushes_in_one_piece() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();

        for i in 0..5 {
            store.add(&rec(i + 1)).unwrap();
        }
        // Capacity is 4: the fifth add forced a flush of the first four.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
        assert_eq!(store.size().unwrap(), 5);

        let mut out = [0u8; 8];
        for i in 0..5 {
            store.get(i, &mut out).unwrap();
            assert_eq!(out, rec(i as u8 + 1));
        }
    }

    #[test]
    fn put_reaches_buffer_and_file_alike() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");

        for i in 0..6 {
            store.add(&rec(i + 1)).unwrap();
        }
        // Index 1 is on file, index 5 still buffered.
        store.put(1, &rec(0x11)).unwrap();
        store.put(5, &rec(0x55)).unwrap();

        let mut out = [0u8; 8];
        store.get(1, &mut out).unwrap();
        assert_eq!(out, rec(0x11));
        store.get(5, &mut out).unwrap();
        assert_eq!(out, rec(0x55));
    }

    #[test]
    fn explicit_flush_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();

        store.add(&rec(1)).unwrap();
        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        assert_eq!(store.size().unwrap(), 1);
    }

    #[test]
    fn clean_last_in_buffer_needs_no_file_io() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();

        store.add(&rec(1)).unwrap();
        store.add(&rec(2)).unwrap();
        assert_eq!(store.clean_last().unwrap(), rec(2));
        assert_eq!(store.size().unwrap(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn shrink_cascades_across_the_flush_boundary() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");

        store.add(&rec(1)).unwrap();
        for i in 1..6 {
            store.add(&rec(i + 1)).unwrap();
        }
        // Erase everything behind record 0, tail first via interior cleans,
        // then remove the last record: the cascade must run through both
        // the buffered and the on-file region.
        for i in 1..5 {
            store.clean(i).unwrap();
        }
        store.discard_last().unwrap();
        assert_eq!(store.size().unwrap(), 1);

        let mut out = [0u8; 8];
        store.get(0, &mut out).unwrap();
        assert_eq!(out, rec(1));
    }

    #[test]
    fn close_flushes_pending_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        {
            let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();
            store.add(&rec(1)).unwrap();
            store.add(&rec(2)).unwrap();
            store.close().unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);

        let mut store = BufferedRecords::open(&path, 8).unwrap();
        assert_eq!(store.size().unwrap(), 2);
        let mut out = [0u8; 8];
        store.get(0, &mut out).unwrap();
        assert_eq!(out, rec(1));
    }

    #[test]
    fn drop_flushes_as_a_safety_net() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        {
            let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();
            store.add(&rec(7)).unwrap();
            // No explicit close.
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn operations_fail_after_close() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");
        store.add(&rec(1)).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        let err = store.add(&rec(2)).unwrap_err();
        assert_eq!(err.code(), RecordsErrorCode::RecStoreClosed);
    }

    #[test]
    fn zero_budget_still_opens_with_one_slot() {
        let dir = TempDir::new().unwrap();
        let options = StoreOptions {
            write_buffer_bytes: 0,
            read_cache_bytes: 0,
            metrics: None,
        };
        let mut store =
            BufferedRecords::open_with(&dir.path().join("t.rec"), 8, options).unwrap();
        store.add(&rec(1)).unwrap();
        store.add(&rec(2)).unwrap();
        assert_eq!(store.size().unwrap(), 2);
    }

    #[test]
    fn clear_resets_buffer_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = BufferedRecords::open_with(&path, 8, small_options()).unwrap();
        for i in 0..6 {
            store.add(&rec(i + 1)).unwrap();
        }
        store.clear().unwrap();
        assert_eq!(store.size().unwrap(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
