//! recfile - fixed-length-record flat-file storage
//!
//! A table file is a raw file of fixed-size records with no header or
//! footer; record `i` lives at byte offset `i * record_size`. Three store
//! variants trade syscalls for memory:
//!
//! - [`records::RecordFile`]: direct positional I/O, no caching.
//! - [`records::BufferedRecords`]: appends coalesce in a bounded buffer and
//!   land on disk as one contiguous write.
//! - [`records::CachedRecords`]: adds a sliding read-cache window over the
//!   on-file region.
//!
//! All variants share the [`records::RecordStore`] trait. Higher-level
//! index and metadata structures choose the record size and interpret the
//! bytes; this crate moves them.

pub mod cli;
pub mod observability;
pub mod records;
