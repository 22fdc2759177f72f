//! The full layer: a sliding read-cache window over the on-file region,
//! combined with the write buffer.

use std::path::Path;

use crate::observability::{log_event_with_fields, Event};

use super::errors::{RecordsError, RecordsResult};
use super::file::RecordFile;
use super::store::RecordStore;
use super::{is_zero, StoreOptions};

/// A record store with a read cache and a write buffer.
///
/// The cache mirrors a contiguous range of on-file records and slides to
/// wherever reads land; the buffer mirrors the unflushed tail exactly as in
/// [`BufferedRecords`](super::BufferedRecords). The two regions never
/// overlap: a refill computes its window against the on-file length only,
/// so buffered records are never loaded into the cache.
#[derive(Debug)]
pub struct CachedRecords {
    file: RecordFile,
    cache: Vec<u8>,
    cache_start: u64,
    cache_count: usize,
    buffer: Vec<u8>,
    buffered: usize,
}

impl CachedRecords {
    /// Opens the table file at `path` with default options, creating it if
    /// absent.
    pub fn open(path: &Path, record_size: usize) -> RecordsResult<Self> {
        Self::open_with(path, record_size, StoreOptions::default())
    }

    /// Opens with explicit cache/buffer budgets and metrics sink.
    pub fn open_with(
        path: &Path,
        record_size: usize,
        options: StoreOptions,
    ) -> RecordsResult<Self> {
        let cache_capacity =
            StoreOptions::capacity_records(options.read_cache_bytes, record_size);
        let buffer_capacity =
            StoreOptions::capacity_records(options.write_buffer_bytes, record_size);
        let file = RecordFile::open_with(path, record_size, options)?;
        let mut store = Self {
            file,
            cache: vec![0u8; cache_capacity * record_size],
            cache_start: 0,
            cache_count: 0,
            buffer: vec![0u8; buffer_capacity * record_size],
            buffered: 0,
        };
        // Warm the window at the front of the file.
        store.fill_cache(0)?;
        Ok(store)
    }

    fn cache_capacity(&self) -> usize {
        self.cache.len() / self.record_size()
    }

    fn buffer_capacity(&self) -> usize {
        self.buffer.len() / self.record_size()
    }

    /// Slot of `index` inside the cache window, if it is there.
    fn in_cache(&self, index: u64) -> Option<usize> {
        if index >= self.cache_start && index < self.cache_start + self.cache_count as u64 {
            Some((index - self.cache_start) as usize)
        } else {
            None
        }
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

    /// Repositions the window so it covers `index` and returns the slot of
    /// `index` inside it.
    ///
    /// The start is clamped so the window neither runs past the on-file end
    /// nor below zero; near the end of the file the window may hold fewer
    /// records than its capacity.
    fn fill_cache(&mut self, index: u64) -> RecordsResult<usize> {
        let file_records = self.file.file_records()?;
        let capacity = self.cache_capacity() as u64;

        let mut start = index;
        if start + capacity > file_records {
            start = file_records.saturating_sub(capacity);
        }
        let count = capacity.min(file_records - start) as usize;

        self.cache_start = start;
        self.cache_count = count;
        if count > 0 {
            let bytes = count * self.record_size();
            self.file.read_span(start, &mut self.cache[..bytes])?;
            if let Some(metrics) = self.file.metrics() {
                metrics.increment_cache_refills();
            }
            log_event_with_fields(
                Event::CacheRefilled,
                &[
                    ("file", &self.file.file_path().display().to_string()),
                    ("start", &start.to_string()),
                    ("records", &count.to_string()),
                ],
            );
        }
        Ok((index - start) as usize)
    }

    /// Writes every buffered record at the end of the file and empties the
    /// buffer. The window stays valid: it mirrors a prefix region the flush
    /// does not touch.
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

    fn buffer_append(&mut self, record: &[u8]) -> RecordsResult<()> {
        if self.buffered >= self.buffer_capacity() {
            self.flush_buffer()?;
        }
        let range = self.slot(self.buffered);
        self.buffer[range].copy_from_slice(record);
        self.buffered += 1;
        self.file.count_buffered_append();
        Ok(())
    }

    /// Whether the record at `index` is all zero, consulting cache, buffer,
    /// or file (refilling the window for an uncached on-file index).
    fn is_clean_at(&mut self, index: u64) -> RecordsResult<bool> {
        let file_records = self.file.file_records()?;
        if let Some(slot) = self.in_buffer(index, file_records) {
            return Ok(is_zero(&self.buffer[self.slot(slot)]));
        }
        let slot = match self.in_cache(index) {
            Some(slot) => slot,
            None => self.fill_cache(index)?,
        };
        Ok(is_zero(&self.cache[self.slot(slot)]))
    }

    /// Removes the last record without cascading, optionally copying its
    /// former content into `out`. A removed on-file record also leaves the
    /// window, keeping the cache consistent after the shrink.
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
        let last = file_records - 1;
        if let Some(out) = out {
            let slot = match self.in_cache(last) {
                Some(slot) => slot,
                None => self.fill_cache(last)?,
            };
            out.copy_from_slice(&self.cache[self.slot(slot)]);
        }
        if self.in_cache(last).is_some() {
            // The window never extends past the file end, so the removed
            // record can only be its final entry.
            self.cache_count -= 1;
        }
        self.file.truncate_records(last)
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

impl RecordStore for CachedRecords {
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
        if let Some(slot) = self.in_cache(index) {
            out.copy_from_slice(&self.cache[self.slot(slot)]);
            return Ok(());
        }
        if let Some(slot) = self.in_buffer(index, file_records) {
            out.copy_from_slice(&self.buffer[self.slot(slot)]);
            return Ok(());
        }
        // Outside both mirrors: shift the window onto the index.
        let slot = self.fill_cache(index)?;
        out.copy_from_slice(&self.cache[self.slot(slot)]);
        Ok(())
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
        if let Some(slot) = self.in_cache(index) {
            // Write through: the window must keep mirroring the file.
            let range = self.slot(slot);
            self.cache[range].copy_from_slice(record);
            return self.file.write_record(index, record);
        }
        if let Some(slot) = self.in_buffer(index, file_records) {
            let range = self.slot(slot);
            self.buffer[range].copy_from_slice(record);
            return Ok(());
        }
        if index == size {
            return self.buffer_append(record);
        }
        // On file but outside the window: write directly. The next refill
        // re-reads the region from the file, so no invalidation is needed.
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
        if let Some(slot) = self.in_cache(index) {
            let range = self.slot(slot);
            self.cache[range].fill(0);
            let zero = vec![0u8; self.record_size()];
            return self.file.write_record(index, &zero);
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
        self.cache_start = 0;
        self.cache_count = 0;
        Ok(())
    }

    fn file_path(&self) -> &Path {
        self.file.file_path()
    }

    fn record_size(&self) -> usize {
        self.file.record_size()
    }
}

impl Drop for CachedRecords {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::RecordsErrorCode;
    use super::*;
    use tempfile::TempDir;

    /// Four records of cache window, four of write buffer.
    fn small_options() -> StoreOptions {
        StoreOptions {
            write_buffer_bytes: 32,
            read_cache_bytes: 32,
            metrics: None,
        }
    }

    fn open_store(dir: &TempDir, name: &str) -> CachedRecords {
        CachedRecords::open_with(&dir.path().join(name), 8, small_options()).unwrap()
    }

    fn rec(tag: u8) -> [u8; 8] {
        [tag; 8]
    }

    /// Fills the store with `n` distinct records and flushes them to file.
    fn filled(dir: &TempDir, name: &str, n: u8) -> CachedRecords {
        let mut store = open_store(dir, name);
        for i in 0..n {
            store.add(&rec(i + 1)).unwrap();
        }
        store.flush().unwrap();
        store
    }

    #[test]
    fn open_on_empty_file_has_empty_window() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");
        assert_eq!(store.size().unwrap(), 0);

        let mut out = [0u8; 8];
        let err = store.get(0, &mut out).unwrap_err();
        assert_eq!(err.code(), RecordsErrorCode::RecOutOfBounds);
    }

    #[test]
    fn reads_far_apart_slide_the_window() {
        let dir = TempDir::new().unwrap();
        let mut store = filled(&dir, "t.rec", 12);

        let mut out = [0u8; 8];
        store.get(0, &mut out).unwrap();
        assert_eq!(out, rec(1));
        store.get(11, &mut out).unwrap();
        assert_eq!(out, rec(12));
        store.get(5, &mut out).unwrap();
        assert_eq!(out, rec(6));
        // Back to the front after two shifts.
        store.get(1, &mut out).unwrap();
        assert_eq!(out, rec(2));
    }

    #[test]
    fn buffered_tail_is_read_from_memory_not_cache() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");
        for i in 0..6 {
            store.add(&rec(i + 1)).unwrap();
        }
        // Records 4 and 5 sit in the buffer; the window only ever mirrors
        // the four on file.
        let mut out = [0u8; 8];
        store.get(5, &mut out).unwrap();
        assert_eq!(out, rec(6));
        store.get(4, &mut out).unwrap();
        assert_eq!(out, rec(5));
        store.get(0, &mut out).unwrap();
        assert_eq!(out, rec(1));
    }

    #[test]
    fn put_on_cached_record_writes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = CachedRecords::open_with(&path, 8, small_options()).unwrap();
        for i in 0..4 {
            store.add(&rec(i + 1)).unwrap();
        }
        store.flush().unwrap();

        let mut out = [0u8; 8];
        store.get(2, &mut out).unwrap();
        store.put(2, &rec(0x22)).unwrap();

        // Cached copy updated.
        store.get(2, &mut out).unwrap();
        assert_eq!(out, rec(0x22));
        // And the file as well.
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[16..24], &rec(0x22));
    }

    #[test]
    fn put_outside_window_is_seen_after_refill() {
        let dir = TempDir::new().unwrap();
        let mut store = filled(&dir, "t.rec", 12);

        let mut out = [0u8; 8];
        // Pull the window to the front, then write far behind it.
        store.get(0, &mut out).unwrap();
        store.put(10, &rec(0xAA)).unwrap();
        store.get(10, &mut out).unwrap();
        assert_eq!(out, rec(0xAA));
    }

    #[test]
    fn clean_last_shrinks_through_the_cached_window() {
        let dir = TempDir::new().unwrap();
        let mut store = filled(&dir, "t.rec", 5);

        // Window over the tail.
        let mut out = [0u8; 8];
        store.get(4, &mut out).unwrap();

        assert_eq!(store.clean_last().unwrap(), rec(5));
        assert_eq!(store.clean_last().unwrap(), rec(4));
        assert_eq!(store.size().unwrap(), 3);

        store.get(2, &mut out).unwrap();
        assert_eq!(out, rec(3));
    }

    #[test]
    fn clean_last_drains_buffer_then_file() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");
        for i in 0..6 {
            store.add(&rec(i + 1)).unwrap();
        }
        // 5 and 6 buffered, 1..4 on file.
        assert_eq!(store.clean_last().unwrap(), rec(6));
        assert_eq!(store.clean_last().unwrap(), rec(5));
        assert_eq!(store.clean_last().unwrap(), rec(4));
        assert_eq!(store.size().unwrap(), 3);
    }

    #[test]
    fn interior_clean_erases_in_cache_and_on_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        let mut store = CachedRecords::open_with(&path, 8, small_options()).unwrap();
        for i in 0..4 {
            store.add(&rec(i + 1)).unwrap();
        }
        store.flush().unwrap();

        let mut out = [0u8; 8];
        store.get(1, &mut out).unwrap();
        store.clean(1).unwrap();

        store.get(1, &mut out).unwrap();
        assert_eq!(out, [0u8; 8]);
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[8..16], &[0u8; 8]);
        assert_eq!(store.size().unwrap(), 4);
    }

    #[test]
    fn shrink_cascade_reaches_zero() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, "t.rec");
        store.add(&rec(1)).unwrap();
        store.add(&rec(2)).unwrap();
        store.add(&rec(3)).unwrap();
        store.clean(1).unwrap();
        store.clean(2).unwrap();
        assert_eq!(store.size().unwrap(), 1);

        assert_eq!(store.clean_last().unwrap(), rec(1));
        assert_eq!(store.size().unwrap(), 0);
    }

    #[test]
    fn close_flushes_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        {
            let mut store = CachedRecords::open_with(&path, 8, small_options()).unwrap();
            store.add(&rec(1)).unwrap();
            store.close().unwrap();
            store.close().unwrap();

            let err = store.add(&rec(2)).unwrap_err();
            assert_eq!(err.code(), RecordsErrorCode::RecStoreClosed);
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn reopen_warms_window_from_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.rec");
        {
            let mut store = CachedRecords::open_with(&path, 8, small_options()).unwrap();
            for i in 0..3 {
                store.add(&rec(i + 1)).unwrap();
            }
            store.close().unwrap();
        }
        let mut store = CachedRecords::open_with(&path, 8, small_options()).unwrap();
        assert_eq!(store.size().unwrap(), 3);
        let mut out = [0u8; 8];
        store.get(1, &mut out).unwrap();
        assert_eq!(out, rec(2));
    }
}
