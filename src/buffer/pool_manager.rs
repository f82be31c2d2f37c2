use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::error::{BufferError, BufferResult};
use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::{AccessType, LruKReplacer};
use super::{FrameId, PageData};
use crate::disk::{DiskManager, INVALID_PAGE_ID, PAGE_SIZE, PageId};

/// One slot of the pool: a page-sized buffer plus residency metadata.
///
/// The metadata lives under the pool latch. The byte buffer has its own
/// reader-writer latch, which guards only the data and is taken by guards
/// after the pool latch has been released.
struct Frame {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    data: Arc<RwLock<PageData>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
            data: Arc::new(RwLock::new([0u8; PAGE_SIZE])),
        }
    }

    /// Back to the unassigned state. The bytes are left as they are; the
    /// caller zeroes or overwrites them before the frame is handed out.
    fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// Bookkeeping guarded by the pool latch.
struct PoolState {
    frames: Vec<Frame>,
    /// page id -> index of the frame holding it
    page_table: HashMap<PageId, FrameId>,
    /// Frames not assigned to any page; drained before the replacer is asked
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

impl PoolState {
    /// Free list first, then the replacer. An evicted frame has its dirty
    /// page written back and its mapping erased before it is handed out; the
    /// returned frame is always unassigned and clean.
    ///
    /// The victim is unpinned by construction, so latching its bytes here
    /// never waits on a guard.
    fn acquire_frame(
        &mut self,
        replacer: &mut LruKReplacer,
        disk: &mut dyn DiskManager,
    ) -> BufferResult<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = replacer.evict().ok_or(BufferError::NoFrameAvailable)?;
        let (old_page_id, dirty) = {
            let frame = &self.frames[frame_id];
            (frame.page_id, frame.is_dirty)
        };

        if dirty && old_page_id != INVALID_PAGE_ID {
            let data = Arc::clone(&self.frames[frame_id].data);
            let buf = data.read();
            if let Err(e) = disk.write_page(old_page_id, &buf[..]) {
                // Hand the frame back so the pool stays whole; the fresh
                // access stamp replaces the lost history.
                replacer.record_access(frame_id, AccessType::Unknown);
                replacer.set_evictable(frame_id, true);
                return Err(e.into());
            }
        }

        if old_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&old_page_id);
            trace!(page_id = old_page_id, frame_id, "evicted page from frame");
        }
        self.frames[frame_id].reset();
        Ok(frame_id)
    }

    /// Install the mapping and pin: bump the pin count, stamp the access,
    /// and mark the frame non-evictable.
    fn pin_frame(
        &mut self,
        replacer: &mut LruKReplacer,
        frame_id: FrameId,
        access_type: AccessType,
    ) {
        let page_id = self.frames[frame_id].page_id;
        self.page_table.insert(page_id, frame_id);
        self.frames[frame_id].pin_count += 1;
        replacer.record_access(frame_id, access_type);
        replacer.set_evictable(frame_id, false);
    }
}

/// A fixed-size page cache mediating between the disk store and in-memory
/// consumers.
///
/// A single pool latch serializes the bookkeeping (page table, free list,
/// frame metadata, page id allocation). The replacer and the disk store
/// have their own latches, taken in pool -> replacer -> disk order when
/// nested. Per-frame data latches are independent: guards take them once
/// the pool latch has been released, and the pool itself only latches a
/// frame's bytes under the pool latch when the frame is unpinned and the
/// latch therefore free. Flushing copies bytes with the pool latch
/// released, so a slow reader or writer stalls the flushing thread, never
/// the pool.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Mutex<PoolState>,
    replacer: Mutex<LruKReplacer>,
    disk: Mutex<Box<dyn DiskManager>>,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames over the given disk store, with
    /// LRU-K history depth `replacer_k`. Both knobs must be at least 1.
    pub fn new(pool_size: usize, disk: Box<dyn DiskManager>, replacer_k: usize) -> Self {
        assert!(pool_size >= 1, "buffer pool needs at least one frame");
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        Self {
            pool_size,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
                next_page_id: 0,
            }),
            replacer: Mutex::new(LruKReplacer::new(pool_size, replacer_k)),
            disk: Mutex::new(disk),
        }
    }

    /// Allocate a fresh page id on a zeroed frame and return it pinned.
    ///
    /// Fails with [`BufferError::NoFrameAvailable`] iff every frame is
    /// pinned.
    pub fn new_page(self: &Arc<Self>) -> BufferResult<PageGuard> {
        let mut state = self.state.lock();
        let mut replacer = self.replacer.lock();
        let mut disk = self.disk.lock();

        let frame_id = state.acquire_frame(&mut replacer, &mut **disk)?;
        let page_id = state.next_page_id;
        state.next_page_id += 1;

        let frame = &mut state.frames[frame_id];
        frame.data.write().fill(0);
        frame.page_id = page_id;
        let data = Arc::clone(&frame.data);
        state.pin_frame(&mut replacer, frame_id, AccessType::Unknown);

        debug!(page_id, frame_id, "allocated new page");
        Ok(PageGuard::new(Arc::clone(self), page_id, data))
    }

    /// Return a pinned guard on the given page, reading it from disk on a
    /// miss (evicting some unpinned frame if the free list is empty).
    pub fn fetch_page(
        self: &Arc<Self>,
        page_id: PageId,
        access_type: AccessType,
    ) -> BufferResult<PageGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferError::InvalidPageId(page_id));
        }
        let mut state = self.state.lock();
        let mut replacer = self.replacer.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let data = Arc::clone(&state.frames[frame_id].data);
            state.pin_frame(&mut replacer, frame_id, access_type);
            trace!(page_id, frame_id, "buffer pool hit");
            return Ok(PageGuard::new(Arc::clone(self), page_id, data));
        }

        debug!(page_id, "buffer pool miss, loading from disk");
        let mut disk = self.disk.lock();
        let frame_id = state.acquire_frame(&mut replacer, &mut **disk)?;
        let data = Arc::clone(&state.frames[frame_id].data);
        {
            let mut buf = data.write();
            if let Err(e) = disk.read_page(page_id, &mut buf[..]) {
                drop(buf);
                state.free_list.push_front(frame_id);
                return Err(e.into());
            }
        }
        state.frames[frame_id].page_id = page_id;
        state.pin_frame(&mut replacer, frame_id, access_type);
        Ok(PageGuard::new(Arc::clone(self), page_id, data))
    }

    /// Fetch with the frame's shared latch held for the guard's lifetime
    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> BufferResult<ReadPageGuard> {
        let guard = self.fetch_page(page_id, AccessType::Unknown)?;
        Ok(ReadPageGuard::new(guard))
    }

    /// Fetch with the frame's exclusive latch held for the guard's lifetime
    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> BufferResult<WritePageGuard> {
        let guard = self.fetch_page(page_id, AccessType::Unknown)?;
        Ok(WritePageGuard::new(guard))
    }

    /// Drop one pin on a resident page, overwriting its dirty flag with
    /// `is_dirty`. Callers that modified the page must pass true.
    ///
    /// Returns false when the page is not resident or not pinned. On the
    /// transition to zero pins the frame becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool, _access_type: AccessType) -> bool {
        let mut state = self.state.lock();
        let mut replacer = self.replacer.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }
        frame.is_dirty = is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            replacer.set_evictable(frame_id, true);
            trace!(page_id, frame_id, "frame became evictable");
        }
        true
    }

    /// Write a resident page back unconditionally and clear its dirty flag.
    ///
    /// Ok(false) when the id is invalid, beyond the allocation watermark, or
    /// not resident. The page is pinned while its bytes are copied out under
    /// the frame's shared latch with the pool latch released, so a held
    /// write guard stalls only this call; do not flush a page while holding
    /// a write guard on it from the same thread.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<bool> {
        let (frame_id, data) = {
            let mut state = self.state.lock();
            if page_id == INVALID_PAGE_ID || page_id >= state.next_page_id {
                return Ok(false);
            }
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            // Pin so the frame survives until the write lands. The dirty
            // flag is cleared up front: a write that slips in after the
            // copy below re-dirties the frame through its own unpin.
            state.frames[frame_id].pin_count += 1;
            state.frames[frame_id].is_dirty = false;
            self.replacer.lock().set_evictable(frame_id, false);
            (frame_id, Arc::clone(&state.frames[frame_id].data))
        };

        let image = {
            let buf = data.read();
            Box::new(*buf)
        };
        let result = self.disk.lock().write_page(page_id, &image[..]);

        let mut state = self.state.lock();
        let mut replacer = self.replacer.lock();
        let frame = &mut state.frames[frame_id];
        frame.pin_count -= 1;
        if result.is_err() {
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            replacer.set_evictable(frame_id, true);
        }
        result?;
        trace!(page_id, frame_id, "flushed page");
        Ok(true)
    }

    /// Write back every dirty resident page, then sync the disk store
    pub fn flush_all_pages(&self) -> BufferResult<()> {
        let dirty_pages: Vec<PageId> = {
            let state = self.state.lock();
            state
                .frames
                .iter()
                .filter(|frame| frame.page_id != INVALID_PAGE_ID && frame.is_dirty)
                .map(|frame| frame.page_id)
                .collect()
        };

        for page_id in dirty_pages {
            // A page evicted in the meantime was written back on eviction;
            // the flush sees it as non-resident and skips it.
            self.flush_page(page_id)?;
        }

        self.disk.lock().sync()?;
        debug!("flushed all dirty pages");
        Ok(())
    }

    /// Drop a page from the cache, returning its frame to the free list.
    ///
    /// True when the page was deleted or was not resident to begin with;
    /// false when it is still pinned. The in-memory bytes are discarded,
    /// dirty or not.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let mut replacer = self.replacer.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        if state.frames[frame_id].pin_count > 0 {
            return false;
        }
        state.page_table.remove(&page_id);
        replacer.remove(frame_id);
        let frame = &mut state.frames[frame_id];
        frame.data.write().fill(0);
        frame.reset();
        state.free_list.push_back(frame_id);
        debug!(page_id, frame_id, "deleted page");
        true
    }

    /// Number of frames in the pool
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether the page currently occupies a frame
    pub fn is_page_resident(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.frames[frame_id].pin_count)
    }

    /// Dirty flag of a resident page
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.frames[frame_id].is_dirty)
    }

    /// Number of frames whose in-memory bytes have diverged from disk
    pub fn dirty_page_count(&self) -> usize {
        self.state.lock().frames.iter().filter(|f| f.is_dirty).count()
    }

    /// Number of pages currently cached
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Frames currently unassigned to any page
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Frames eligible for eviction
    pub fn evictable_count(&self) -> usize {
        self.replacer.lock().size()
    }
}

impl Drop for BufferPoolManager {
    /// Best-effort write-back and store shutdown at teardown
    fn drop(&mut self) {
        let _ = self.flush_all_pages();
        let _ = self.disk.lock().shut_down();
    }
}
