use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::{
    MinnowError, PageId, RecordId, Result, HASH_BUCKET_CAPACITY, HASH_DIRECTORY_MAX_DEPTH,
    HASH_HEADER_MAX_DEPTH, INVALID_PAGE_ID,
};
use crate::storage::page::{
    HashBucketPage, HashBucketPageRef, HashDirectoryPage, HashDirectoryPageRef, HashHeaderPage,
    HashHeaderPageRef,
};

use super::KeyHasher;

/// Outcome of one attempt at the split path.
enum SplitOutcome {
    /// The insert finished (successfully or refused) without a retry
    Done(bool),
    /// The directory changed; re-traverse from the header
    Retry,
}

/// Disk-backed extendible hash index mapping `u32` keys to [`RecordId`]s.
///
/// Three page levels: the header routes the high hash bits to a directory,
/// the directory routes the low bits to a bucket, the bucket stores the
/// entries. Buckets split (growing the directory up to its maximum depth)
/// when full and merge with their split image when empty.
///
/// All page access goes through buffer-pool guards, acquired top-down
/// (header, then directory, then bucket) and held briefly. Structural
/// changes re-fetch write guards and re-validate, accepting a retry when a
/// concurrent writer got there first.
pub struct ExtendibleHashIndex {
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    hasher: Box<dyn KeyHasher>,
    directory_max_depth: u32,
    bucket_max_size: u32,
}

impl ExtendibleHashIndex {
    /// Creates a new index: header, one directory (header slot 0), and one
    /// bucket (directory slot 0) are all allocated and initialised before
    /// this returns.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        hasher: Box<dyn KeyHasher>,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        if header_max_depth > HASH_HEADER_MAX_DEPTH {
            return Err(MinnowError::InvalidHashTableConfig(format!(
                "header max depth {} exceeds {}",
                header_max_depth, HASH_HEADER_MAX_DEPTH
            )));
        }
        if directory_max_depth > HASH_DIRECTORY_MAX_DEPTH {
            return Err(MinnowError::InvalidHashTableConfig(format!(
                "directory max depth {} exceeds {}",
                directory_max_depth, HASH_DIRECTORY_MAX_DEPTH
            )));
        }
        if bucket_max_size == 0 || bucket_max_size as usize > HASH_BUCKET_CAPACITY {
            return Err(MinnowError::InvalidHashTableConfig(format!(
                "bucket max size {} not in 1..={}",
                bucket_max_size, HASH_BUCKET_CAPACITY
            )));
        }

        let index = Self {
            header_page_id: INVALID_PAGE_ID,
            bpm,
            hasher,
            directory_max_depth,
            bucket_max_size,
        };

        let bucket_page_id = index.allocate_bucket_page()?;

        let directory_page_id = {
            let guard = index
                .bpm
                .new_page_guarded()?
                .ok_or(MinnowError::BufferPoolFull)?;
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            let mut directory = HashDirectoryPage::new(guard.data_mut());
            directory.init(directory_max_depth);
            directory.set_bucket_page_id(0, Some(bucket_page_id));
            page_id
        };

        let header_page_id = {
            let guard = index
                .bpm
                .new_page_guarded()?
                .ok_or(MinnowError::BufferPoolFull)?;
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            let mut header = HashHeaderPage::new(guard.data_mut());
            header.init(header_max_depth);
            header.set_directory_page_id(0, Some(directory_page_id));
            page_id
        };

        Ok(Self {
            header_page_id,
            ..index
        })
    }

    /// Reopens an index whose pages already exist on disk.
    pub fn open(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        hasher: Box<dyn KeyHasher>,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Self {
        Self {
            header_page_id,
            bpm,
            hasher,
            directory_max_depth,
            bucket_max_size,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn hash(&self, key: u32) -> u32 {
        self.hasher.hash_key(key) as u32
    }

    /// Looks up the value stored under `key`.
    pub fn get_value(&self, key: u32) -> Result<Option<RecordId>> {
        let hash = self.hash(key);

        let Some(directory_page_id) = self.lookup_directory(hash)? else {
            return Ok(None);
        };

        let bucket_page_id = {
            let Some(guard) = self.bpm.checked_read_page(directory_page_id)? else {
                return Ok(None);
            };
            let directory = HashDirectoryPageRef::new(guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            directory.bucket_page_id(bucket_idx)
        };
        let Some(bucket_page_id) = bucket_page_id else {
            return Ok(None);
        };

        let Some(guard) = self.bpm.checked_read_page(bucket_page_id)? else {
            return Ok(None);
        };
        let bucket = HashBucketPageRef::new(guard.data());
        Ok(bucket.lookup(key))
    }

    /// Inserts the pair, splitting buckets (and growing the directory) as
    /// needed. Returns false on a duplicate key or when capacity is
    /// exhausted; a refused insert leaves the table unchanged.
    pub fn insert(&self, key: u32, value: RecordId) -> Result<bool> {
        let hash = self.hash(key);

        loop {
            let Some(directory_page_id) = self.lookup_directory(hash)? else {
                if !self.create_directory(hash)? {
                    return Ok(false);
                }
                continue;
            };

            // Fast path: the directory read guard is held across the bucket
            // write so the slot cannot be remapped underneath us
            let full_bucket = {
                let Some(dir_guard) = self.bpm.checked_read_page(directory_page_id)? else {
                    return Ok(false);
                };
                let directory = HashDirectoryPageRef::new(dir_guard.data());
                let bucket_idx = directory.hash_to_bucket_index(hash);
                let Some(bucket_page_id) = directory.bucket_page_id(bucket_idx) else {
                    drop(dir_guard);
                    if !self.create_missing_bucket(directory_page_id, hash)? {
                        return Ok(false);
                    }
                    continue;
                };

                let Some(mut guard) = self.bpm.checked_write_page(bucket_page_id)? else {
                    return Ok(false);
                };
                let mut bucket = HashBucketPage::new(guard.data_mut());
                if bucket.lookup(key).is_some() {
                    return Ok(false);
                }
                if !bucket.is_full() {
                    return Ok(bucket.insert(key, value));
                }
                bucket_page_id
            };

            // Slow path: split under a directory write guard, re-validating
            // everything the guard upgrade may have missed
            match self.split_bucket(directory_page_id, full_bucket, hash, key, value)? {
                SplitOutcome::Done(result) => return Ok(result),
                SplitOutcome::Retry => continue,
            }
        }
    }

    /// Removes `key`. An emptied bucket merges with its split image and the
    /// directory shrinks while every local depth is below the global depth.
    pub fn remove(&self, key: u32) -> Result<bool> {
        let hash = self.hash(key);

        let Some(directory_page_id) = self.lookup_directory(hash)? else {
            return Ok(false);
        };

        let became_empty = {
            let Some(dir_guard) = self.bpm.checked_read_page(directory_page_id)? else {
                return Ok(false);
            };
            let directory = HashDirectoryPageRef::new(dir_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            let Some(bucket_page_id) = directory.bucket_page_id(bucket_idx) else {
                return Ok(false);
            };

            let Some(mut guard) = self.bpm.checked_write_page(bucket_page_id)? else {
                return Ok(false);
            };
            let mut bucket = HashBucketPage::new(guard.data_mut());
            if !bucket.remove(key) {
                return Ok(false);
            }
            bucket.is_empty()
        };

        if became_empty {
            self.try_merge(directory_page_id, hash)?;
        }
        Ok(true)
    }

    /// Reads the header and resolves the directory page for `hash`.
    fn lookup_directory(&self, hash: u32) -> Result<Option<PageId>> {
        let Some(guard) = self.bpm.checked_read_page(self.header_page_id)? else {
            return Ok(None);
        };
        let header = HashHeaderPageRef::new(guard.data());
        let directory_idx = header.hash_to_directory_index(hash);
        Ok(header.directory_page_id(directory_idx))
    }

    /// Allocates and initialises an empty bucket page.
    fn allocate_bucket_page(&self) -> Result<PageId> {
        let guard = self
            .bpm
            .new_page_guarded()?
            .ok_or(MinnowError::BufferPoolFull)?;
        let page_id = guard.page_id();
        let mut guard = guard.upgrade_write();
        HashBucketPage::new(guard.data_mut()).init(self.bucket_max_size);
        Ok(page_id)
    }

    /// Creates the directory (and its first bucket) for a header slot that
    /// is still unassigned. Returns false when the pool is exhausted.
    fn create_directory(&self, hash: u32) -> Result<bool> {
        let Some(mut guard) = self.bpm.checked_write_page(self.header_page_id)? else {
            return Ok(false);
        };
        let mut header = HashHeaderPage::new(guard.data_mut());
        let directory_idx = header.hash_to_directory_index(hash);
        if header.directory_page_id(directory_idx).is_some() {
            // A concurrent insert created it; retry with the existing one
            return Ok(true);
        }

        let bucket_page_id = match self.allocate_bucket_page() {
            Ok(page_id) => page_id,
            Err(MinnowError::BufferPoolFull) => return Ok(false),
            Err(e) => return Err(e),
        };

        let directory_page_id = {
            let Some(dir_guard) = self.bpm.new_page_guarded()? else {
                let _ = self.bpm.delete_page(bucket_page_id);
                return Ok(false);
            };
            let page_id = dir_guard.page_id();
            let mut dir_guard = dir_guard.upgrade_write();
            let mut directory = HashDirectoryPage::new(dir_guard.data_mut());
            directory.init(self.directory_max_depth);
            directory.set_bucket_page_id(0, Some(bucket_page_id));
            page_id
        };

        header.set_directory_page_id(directory_idx, Some(directory_page_id));
        debug!(
            "created directory {} for header slot {}",
            directory_page_id, directory_idx
        );
        Ok(true)
    }

    /// Re-points an unassigned directory slot at a fresh bucket. Only
    /// reachable through defensive handling of an invalid slot; normal
    /// splits and merges never leave a live slot unassigned.
    fn create_missing_bucket(&self, directory_page_id: PageId, hash: u32) -> Result<bool> {
        let Some(mut guard) = self.bpm.checked_write_page(directory_page_id)? else {
            return Ok(false);
        };
        let mut directory = HashDirectoryPage::new(guard.data_mut());
        let bucket_idx = directory.hash_to_bucket_index(hash);
        if directory.bucket_page_id(bucket_idx).is_some() {
            return Ok(true);
        }

        let bucket_page_id = match self.allocate_bucket_page() {
            Ok(page_id) => page_id,
            Err(MinnowError::BufferPoolFull) => return Ok(false),
            Err(e) => return Err(e),
        };
        let global_depth = directory.global_depth();
        directory.set_bucket_page_id(bucket_idx, Some(bucket_page_id));
        directory.set_local_depth(bucket_idx, global_depth as u8);
        Ok(true)
    }

    /// Splits the bucket `hash` currently maps to. Called after the fast
    /// path saw it full; everything is re-validated under the directory
    /// write guard because the table may have changed in between.
    fn split_bucket(
        &self,
        directory_page_id: PageId,
        observed_bucket: PageId,
        hash: u32,
        key: u32,
        value: RecordId,
    ) -> Result<SplitOutcome> {
        let Some(mut dir_guard) = self.bpm.checked_write_page(directory_page_id)? else {
            return Ok(SplitOutcome::Done(false));
        };
        let mut directory = HashDirectoryPage::new(dir_guard.data_mut());

        let bucket_idx = directory.hash_to_bucket_index(hash);
        let Some(bucket_page_id) = directory.bucket_page_id(bucket_idx) else {
            return Ok(SplitOutcome::Retry);
        };
        if bucket_page_id != observed_bucket {
            // Someone already split this bucket
            return Ok(SplitOutcome::Retry);
        }

        let Some(mut bucket_guard) = self.bpm.checked_write_page(bucket_page_id)? else {
            return Ok(SplitOutcome::Done(false));
        };
        let mut bucket = HashBucketPage::new(bucket_guard.data_mut());

        if bucket.lookup(key).is_some() {
            return Ok(SplitOutcome::Done(false));
        }
        if !bucket.is_full() {
            return Ok(SplitOutcome::Done(bucket.insert(key, value)));
        }

        let local_depth = directory.local_depth(bucket_idx);
        let global_depth = directory.global_depth();
        if local_depth == global_depth && global_depth == self.directory_max_depth {
            // Cannot grow any further; refuse with the table untouched
            return Ok(SplitOutcome::Done(false));
        }

        // Allocate the split image before touching the directory so that a
        // full pool cannot leave a half-done split behind
        let Some(new_guard) = self.bpm.new_page_guarded()? else {
            return Ok(SplitOutcome::Done(false));
        };
        let new_page_id = new_guard.page_id();
        let mut new_guard = new_guard.upgrade_write();
        let mut new_bucket = HashBucketPage::new(new_guard.data_mut());
        new_bucket.init(self.bucket_max_size);

        if local_depth == global_depth {
            directory.incr_global_depth();
            debug!("directory grew to global depth {}", directory.global_depth());
        }

        // The bit that now distinguishes the two halves of the bucket's
        // equivalence class
        let distinguishing_bit = 1u32 << local_depth;
        let new_local_depth = (local_depth + 1) as u8;

        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == Some(bucket_page_id) {
                directory.set_local_depth(i, new_local_depth);
                if (i as u32) & distinguishing_bit != 0 {
                    directory.set_bucket_page_id(i, Some(new_page_id));
                }
            }
        }

        // Entries whose hash has the distinguishing bit set migrate
        for (entry_key, entry_value) in bucket.take_entries() {
            if self.hash(entry_key) & distinguishing_bit != 0 {
                new_bucket.insert(entry_key, entry_value);
            } else {
                bucket.insert(entry_key, entry_value);
            }
        }

        debug!(
            "split bucket {} at local depth {} into {}",
            bucket_page_id, local_depth, new_page_id
        );
        Ok(SplitOutcome::Retry)
    }

    /// Merges an emptied bucket into its split image, then shrinks the
    /// directory as far as the local depths allow. Re-validates under the
    /// directory write guard; if the bucket has been refilled or remapped
    /// in the meantime, does nothing.
    fn try_merge(&self, directory_page_id: PageId, hash: u32) -> Result<()> {
        let Some(mut dir_guard) = self.bpm.checked_write_page(directory_page_id)? else {
            return Ok(());
        };
        let mut directory = HashDirectoryPage::new(dir_guard.data_mut());

        let bucket_idx = directory.hash_to_bucket_index(hash);
        let Some(bucket_page_id) = directory.bucket_page_id(bucket_idx) else {
            return Ok(());
        };

        let still_empty = {
            let Some(guard) = self.bpm.checked_read_page(bucket_page_id)? else {
                return Ok(());
            };
            HashBucketPageRef::new(guard.data()).is_empty()
        };
        if !still_empty {
            return Ok(());
        }

        let local_depth = directory.local_depth(bucket_idx);
        if local_depth == 0 {
            // The lone bucket of a depth-0 directory stays allocated
            return Ok(());
        }

        let split_idx = directory.split_image_index(bucket_idx);
        if directory.local_depth(split_idx) != local_depth {
            return Ok(());
        }
        let Some(sibling_page_id) = directory.bucket_page_id(split_idx) else {
            return Ok(());
        };
        if sibling_page_id == bucket_page_id {
            return Ok(());
        }

        // Redirect the emptied class to the sibling; the merged class drops
        // one level of depth
        let new_local_depth = (local_depth - 1) as u8;
        for i in 0..directory.size() {
            let slot = directory.bucket_page_id(i);
            if slot == Some(bucket_page_id) {
                directory.set_bucket_page_id(i, Some(sibling_page_id));
                directory.set_local_depth(i, new_local_depth);
            } else if slot == Some(sibling_page_id) {
                directory.set_local_depth(i, new_local_depth);
            }
        }
        debug!(
            "merged empty bucket {} into {}",
            bucket_page_id, sibling_page_id
        );

        // Free exactly once; a reader that resolved the slot before the
        // rewrite may still hold a pin, in which case the page id is
        // unreachable but stays allocated
        if !self.bpm.delete_page(bucket_page_id)? {
            warn!(
                "merged-away bucket {} still pinned; leaving it allocated",
                bucket_page_id
            );
        }

        while directory.can_shrink() {
            directory.decr_global_depth();
            debug!(
                "directory shrunk to global depth {}",
                directory.global_depth()
            );
        }

        Ok(())
    }
}
