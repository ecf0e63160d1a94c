use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{FrameId, MinnowError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{AccessType, Frame, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard};

/// State guarded by the pool mutex. The page table and free list are
/// disjoint views of frame state: a frame is either free, resident-pinned,
/// or resident-evictable (tracked by the replacer).
struct PoolInner {
    /// Maps resident page IDs to their frame
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: LinkedList<FrameId>,
}

/// BufferPoolManager mediates between the disk and in-memory clients. It
/// owns a fixed array of frames, fetches pages into them on demand, and
/// evicts the LRU-K victim when no frame is free.
///
/// One coarse mutex serialises every public operation, including the
/// synchronous disk I/O an operation may trigger. The embedded replacer's
/// own mutex is only ever taken while the pool mutex is held. Page latches
/// (taken by read/write guards) are acquired after the pool mutex has been
/// released, never under it.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The frame array; page bytes and metadata live here
    frames: Vec<Arc<Frame>>,
    /// Page table and free list, behind the pool mutex
    inner: Mutex<PoolInner>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Disk scheduler for all I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(replacer_k, pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and installs it in a frame, zeroed and pinned
    /// at 1. The caller owns the pin and must `unpin_page` (or use
    /// `new_page_guarded`, which wraps the pin in a guard).
    pub fn new_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Err(MinnowError::BufferPoolFull);
        };
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        self.replacer.record_access(frame_id, AccessType::Unknown)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok(page_id)
    }

    /// Decrements a page's pin count, OR-ing in the dirty flag. Returns
    /// false if the page is not resident or already unpinned. When the pin
    /// count reaches zero the frame becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            // Always succeeds: the frame is in range and has history
            let _ = self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes a resident page back to disk and clears its dirty bit.
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(MinnowError::InvalidPageId(page_id));
        }

        let inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk. A page that
    /// is not resident is deallocated directly. Returns false if the page
    /// is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(MinnowError::InvalidPageId(page_id));
        }

        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
            return Ok(true);
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;
        frame.reset();
        inner.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Fetches a page and wraps the pin in a basic guard (no latch).
    /// `Ok(None)` means no frame could be produced.
    pub fn checked_page(&self, page_id: PageId) -> Result<Option<PageGuard<'_>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(MinnowError::InvalidPageId(page_id));
        }

        Ok(self.fetch_frame(page_id)?.map(|frame_id| {
            PageGuard::new(self, page_id, Arc::clone(&self.frames[frame_id.as_usize()]))
        }))
    }

    /// Fetches a page for shared access: pin plus the page's read latch.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        Ok(self.checked_page(page_id)?.map(PageGuard::upgrade_read))
    }

    /// Fetches a page for exclusive access: pin plus the page's write latch.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self.checked_page(page_id)?.map(PageGuard::upgrade_write))
    }

    /// Allocates a fresh page and returns it wrapped in a basic guard that
    /// owns the single pin. `Ok(None)` means the pool is full.
    pub fn new_page_guarded(&self) -> Result<Option<PageGuard<'_>>> {
        let page_id = match self.new_page() {
            Ok(page_id) => page_id,
            Err(MinnowError::BufferPoolFull) => return Ok(None),
            Err(e) => return Err(e),
        };

        let frame_id = *self
            .inner
            .lock()
            .page_table
            .get(&page_id)
            .expect("freshly created page is resident");

        Ok(Some(PageGuard::adopt_pin(
            self,
            page_id,
            Arc::clone(&self.frames[frame_id.as_usize()]),
        )))
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id`, reading the page from disk if it
    /// is not resident. `Ok(None)` means no frame is free and nothing is
    /// evictable.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id, AccessType::Unknown)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id, AccessType::Unknown)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok(Some(frame_id))
    }

    /// Produces an empty frame: from the free list if possible, otherwise
    /// by evicting the replacer's victim (writing it back first when
    /// dirty). `Ok(None)` means the pool is exhausted.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty {} from {}", old_page_id, frame_id);
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(Some(frame_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, 2, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_manager_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
    }

    #[test]
    fn test_buffer_pool_manager_new_page_is_pinned() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap();
        assert_eq!(page_id, PageId::new(0));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert_eq!(bpm.free_frame_count(), 9);

        assert!(bpm.unpin_page(page_id, false));
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert!(!bpm.unpin_page(page_id, false));
    }

    #[test]
    fn test_buffer_pool_manager_read_write() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let mut guard = bpm.checked_write_page(page_id).unwrap().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
        }

        assert_eq!(bpm.get_pin_count(page_id), Some(0));

        {
            let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
            assert_eq!(guard.data()[0], 42);
            assert_eq!(guard.data()[100], 255);
        }
    }

    #[test]
    fn test_buffer_pool_manager_flush() {
        let (bpm, temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let mut guard = bpm.checked_write_page(page_id).unwrap().unwrap();
            guard.data_mut()[0] = 42;
        }

        bpm.flush_page(page_id).unwrap();
        drop(bpm);

        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm2 = BufferPoolManager::new(10, 2, dm);

        let guard = bpm2.checked_read_page(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[test]
    fn test_buffer_pool_manager_eviction() {
        let (bpm, _temp) = create_bpm(3);

        let page_ids: Vec<_> = (0..3)
            .map(|i| {
                let pid = bpm.new_page().unwrap();
                {
                    let mut guard = bpm.checked_write_page(pid).unwrap().unwrap();
                    guard.data_mut()[0] = i as u8;
                }
                bpm.unpin_page(pid, false);
                pid
            })
            .collect();

        assert_eq!(bpm.free_frame_count(), 0);

        // A fourth page forces an eviction
        let new_pid = bpm.new_page().unwrap();
        assert_eq!(new_pid, PageId::new(3));
        bpm.unpin_page(new_pid, false);

        // The evicted pages still read back correctly from disk
        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.checked_read_page(pid).unwrap().unwrap();
            assert_eq!(guard.data()[0], i as u8);
        }
    }

    #[test]
    fn test_buffer_pool_manager_pool_exhausted() {
        let (bpm, _temp) = create_bpm(2);

        let p1 = bpm.new_page().unwrap();
        let p2 = bpm.new_page().unwrap();

        // Both pages stay pinned, so a third page has nowhere to go
        assert!(matches!(bpm.new_page(), Err(MinnowError::BufferPoolFull)));
        assert!(bpm.checked_page(PageId::new(99)).unwrap().is_none());

        bpm.unpin_page(p1, false);
        bpm.unpin_page(p2, false);
        assert!(bpm.new_page().is_ok());
    }

    #[test]
    fn test_buffer_pool_manager_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap();

        // Cannot delete while pinned
        assert!(!bpm.delete_page(page_id).unwrap());

        bpm.unpin_page(page_id, false);
        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 10);

        // Deleting a non-resident page deallocates and reports success
        assert!(bpm.delete_page(PageId::new(42)).unwrap());
    }

    #[test]
    fn test_buffer_pool_manager_new_page_guarded() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let guard = bpm.new_page_guarded().unwrap().unwrap();
            let pid = guard.page_id();
            assert_eq!(bpm.get_pin_count(pid), Some(1));
            pid
        };

        // The guard owned the only pin
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
    }

    #[test]
    fn test_buffer_pool_manager_guard_upgrade() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let guard = bpm.checked_page(page_id).unwrap().unwrap();
            assert_eq!(bpm.get_pin_count(page_id), Some(1));
            let mut write = guard.upgrade_write();
            write.data_mut()[7] = 9;
            // Still exactly one pin through the upgrade
            assert_eq!(bpm.get_pin_count(page_id), Some(1));
        }

        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
        assert_eq!(guard.data()[7], 9);
    }
}
