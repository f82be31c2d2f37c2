use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::PageData;
use super::pool_manager::BufferPoolManager;
use super::replacer::AccessType;
use crate::disk::PageId;

/// Scoped pin on a buffer pool page.
///
/// Holding the guard keeps the page's frame non-evictable; dropping it (or
/// calling [`release`](Self::release)) unpins exactly once, reporting
/// whether the page was written through this guard. Data access latches the
/// frame only for the duration of the borrow; use [`ReadPageGuard`] or
/// [`WritePageGuard`] when the latch should live as long as the guard.
pub struct PageGuard {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    data: Arc<RwLock<PageData>>,
    dirty: bool,
    released: bool,
}

impl PageGuard {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        page_id: PageId,
        data: Arc<RwLock<PageData>>,
    ) -> Self {
        Self {
            bpm,
            page_id,
            data,
            dirty: false,
            released: false,
        }
    }

    /// Id of the pinned page
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read the page bytes under the frame's shared latch
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Write the page bytes under the frame's exclusive latch. Marks the
    /// guard dirty, so the unpin on drop reports the modification.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, PageData> {
        self.dirty = true;
        self.data.write()
    }

    /// Unpin now instead of at drop. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.bpm
                .unpin_page(self.page_id, self.dirty, AccessType::Unknown);
        }
    }

    pub(crate) fn data_arc(&self) -> &Arc<RwLock<PageData>> {
        &self.data
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pin plus the frame's shared latch, held until drop.
///
/// The latch is always released before the pin, so the pool never sees a
/// latched but unpinned frame.
pub struct ReadPageGuard {
    latch: Option<ArcRwLockReadGuard<RawRwLock, PageData>>,
    guard: PageGuard,
}

impl ReadPageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        let latch = guard.data_arc().read_arc();
        Self {
            latch: Some(latch),
            guard,
        }
    }

    /// Id of the pinned page
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// The page bytes; empty once the guard has been released
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }

    /// Release the latch and the pin now. Safe to call more than once.
    pub fn release(&mut self) {
        self.latch = None;
        self.guard.release();
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pin plus the frame's exclusive latch, held until drop.
pub struct WritePageGuard {
    latch: Option<ArcRwLockWriteGuard<RawRwLock, PageData>>,
    guard: PageGuard,
}

impl WritePageGuard {
    pub(crate) fn new(guard: PageGuard) -> Self {
        let latch = guard.data_arc().write_arc();
        Self {
            latch: Some(latch),
            guard,
        }
    }

    /// Id of the pinned page
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// The page bytes; empty once the guard has been released
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => &[],
        }
    }

    /// Mutable page bytes. Marks the guard dirty, so the unpin on drop
    /// reports the modification.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.latch {
            Some(latch) => {
                self.guard.mark_dirty();
                &mut latch[..]
            }
            None => Default::default(),
        }
    }

    /// Release the latch and the pin now. Safe to call more than once.
    pub fn release(&mut self) {
        self.latch = None;
        self.guard.release();
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.release();
    }
}
