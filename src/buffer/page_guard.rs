use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::{BufferPoolManager, Frame};

type FrameData = Box<[u8; PAGE_SIZE]>;

/// Basic RAII guard: holds a pin on a resident page and releases it on
/// drop. Takes no latch; upgrade into a [`ReadPageGuard`] or
/// [`WritePageGuard`] for access to the bytes.
///
/// Guards hold a non-owning back-reference to the pool; the pool outlives
/// every guard by construction.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    frame: Arc<Frame>,
    /// Set when an upgrade consumed this guard's pin
    defused: bool,
}

impl<'a> PageGuard<'a> {
    /// Wraps a pin just taken by `fetch_frame`.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: Arc<Frame>) -> Self {
        Self {
            bpm,
            page_id,
            frame,
            defused: false,
        }
    }

    /// Wraps a pin the caller already owns (used by `new_page_guarded`).
    pub(crate) fn adopt_pin(bpm: &'a BufferPoolManager, page_id: PageId, frame: Arc<Frame>) -> Self {
        Self::new(bpm, page_id, frame)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Acquires the page's shared latch and converts into a read guard.
    /// The pin carries over; no unpin happens here.
    pub fn upgrade_read(mut self) -> ReadPageGuard<'a> {
        let frame = Arc::clone(&self.frame);
        // Safety: the latch guard borrows the RwLock inside the Arc'd
        // frame, which the returned guard keeps alive
        let latch: RwLockReadGuard<'static, FrameData> =
            unsafe { std::mem::transmute(frame.data.read()) };

        self.defused = true;
        ReadPageGuard {
            bpm: self.bpm,
            page_id: self.page_id,
            latch: Some(latch),
            _frame: frame,
        }
    }

    /// Acquires the page's exclusive latch and converts into a write guard.
    pub fn upgrade_write(mut self) -> WritePageGuard<'a> {
        let frame = Arc::clone(&self.frame);
        // Safety: as in upgrade_read
        let latch: RwLockWriteGuard<'static, FrameData> =
            unsafe { std::mem::transmute(frame.data.write()) };

        self.defused = true;
        WritePageGuard {
            bpm: self.bpm,
            page_id: self.page_id,
            is_dirty: false,
            latch: Some(latch),
            _frame: frame,
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if !self.defused {
            self.bpm.unpin_page(self.page_id, false);
        }
    }
}

/// RAII guard for shared access to a page: a pin plus the page's read
/// latch. Unpins (clean) on drop.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    /// Latch on the page bytes; released before the unpin in Drop
    latch: Option<RwLockReadGuard<'static, FrameData>>,
    /// Keeps the latched frame alive
    _frame: Arc<Frame>,
}

impl ReadPageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing latch and pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Release the latch first so unpin never runs while holding it
        self.latch.take();
        self.bpm.unpin_page(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a page: a pin plus the page's write
/// latch. Unpins on drop, reporting the page dirty iff `data_mut` was
/// called.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    is_dirty: bool,
    latch: Option<RwLockWriteGuard<'static, FrameData>>,
    _frame: Arc<Frame>,
}

impl WritePageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    /// Mutable view of the page bytes; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.latch.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing latch and pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.latch.take();
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}
