//! Minnow - the storage core of a disk-oriented RDBMS, in Rust
//!
//! This crate provides the storage engine of an instructional relational
//! database: pages live on disk, a fixed-size buffer pool caches them in
//! memory, and a disk-backed extendible hash index is built on top.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Disk I/O and page layouts
//!   - `DiskManager`: Reads and writes pages to/from disk
//!   - `DiskScheduler`: FIFO disk request queue with a background worker
//!   - `HashHeaderPage`/`HashDirectoryPage`/`HashBucketPage`: On-disk
//!     layouts of the extendible hash index's three page levels
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `Frame`: Per-frame metadata and page bytes
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards that pin
//!     a page for their lifetime, the latter two holding its latch
//!
//! - **Index** (`index`): The disk-backed extendible hash index
//!   - `ExtendibleHashIndex`: header -> directory -> bucket traversal with
//!     dynamic bucket split/merge
//!   - `KeyHasher`: pluggable 64-bit key hash
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use minnow::buffer::BufferPoolManager;
//! use minnow::index::{DefaultKeyHasher, ExtendibleHashIndex};
//! use minnow::storage::disk::DiskManager;
//! use minnow::{PageId, RecordId, SlotId};
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! // Build a hash index: header depth 2, directory depth 9, buckets of 64
//! let index =
//!     ExtendibleHashIndex::new(bpm, Box::new(DefaultKeyHasher), 2, 9, 64).unwrap();
//!
//! let rid = RecordId::new(PageId::new(7), SlotId::new(3));
//! assert!(index.insert(42, rid).unwrap());
//! assert_eq!(index.get_value(42).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{MinnowError, PageId, RecordId, Result, SlotId};
