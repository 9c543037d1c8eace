//! Buffer pool manager.
//!
//! The manager owns every frame, the page table, the free list, and the
//! replacer, and implements the page lifecycle: allocate, fetch, unpin,
//! flush, delete. One mutex serializes all bookkeeping; disk I/O for
//! page replacement happens under it, which keeps the simplest correct
//! ordering between write-back and frame reuse.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lode_common::types::{Lsn, PageId};
use parking_lot::Mutex;

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::{BufferFrame, FrameId};
use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::LruKReplacer;
use super::BufferPoolStats;
use crate::disk::DiskManager;

/// Bookkeeping guarded by the pool mutex.
struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page.
    free_list: VecDeque<FrameId>,
    /// Monotonic page-id allocator.
    next_page_id: u64,
}

/// The buffer pool manager.
///
/// All page access in the engine goes through this type: it caches disk
/// pages in a bounded set of frames, pins pages while they are in use,
/// tracks dirtiness, and picks replacement victims with LRU-K.
///
/// Pages are handed out as guards that release their pin on drop:
/// [`PageGuard`] for plain pinning, [`ReadPageGuard`] and
/// [`WritePageGuard`] when the page's data latch should be held for the
/// guard's lifetime.
///
/// Capacity exhaustion (every frame pinned) is not an error: allocation
/// and fetch return `Ok(None)` and the caller is expected to release
/// pins before retrying. Disk failures propagate as errors.
pub struct BufferPoolManager {
    /// The frame array, fixed at construction.
    frames: Box<[BufferFrame]>,
    /// Page table, free list, and page-id allocator.
    state: Mutex<PoolState>,
    /// Victim selection over unpinned frames.
    replacer: LruKReplacer,
    /// Durable page I/O.
    disk: Arc<dyn DiskManager>,
    /// Fetch counter for statistics.
    fetch_count: AtomicU64,
    /// Hit counter for statistics.
    hit_count: AtomicU64,
    /// Miss counter for statistics.
    miss_count: AtomicU64,
    /// Eviction counter for statistics.
    eviction_count: AtomicU64,
    /// Flush counter for statistics.
    flush_count: AtomicU64,
}

impl BufferPoolManager {
    /// Creates a buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames: Box<[BufferFrame]> = (0..config.num_frames)
            .map(|i| BufferFrame::new(FrameId::new(i)))
            .collect();

        // Initially every frame is free.
        let free_list: VecDeque<FrameId> = (0..config.num_frames).map(FrameId::new).collect();

        Ok(Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(config.num_frames),
                free_list,
                next_page_id: 0,
            }),
            replacer: LruKReplacer::new(config.num_frames, config.replacer_k),
            disk,
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        })
    }

    /// Allocates a fresh page and returns it pinned.
    ///
    /// The new page's contents are zeroed; no disk read happens. Returns
    /// `Ok(None)` when every frame is pinned.
    pub fn new_page(&self) -> BufferResult<Option<PageGuard<'_>>> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.index()];
        frame.write_data().fill(0);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.set_lsn(Lsn::INVALID);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false);
        drop(state);

        Ok(Some(PageGuard::new(self, frame)))
    }

    /// Allocates a fresh page and returns it behind a held write latch.
    pub fn new_page_write(&self) -> BufferResult<Option<WritePageGuard<'_>>> {
        Ok(self.new_page()?.map(WritePageGuard::new))
    }

    /// Fetches a page, reading it from disk on a miss.
    ///
    /// Returns `Ok(None)` when the page is not resident and every frame
    /// is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<Option<PageGuard<'_>>> {
        if !page_id.is_valid() {
            return Ok(None);
        }
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.set_evictable(frame_id, false);
            self.replacer.record_access(frame_id)?;
            drop(state);
            return Ok(Some(PageGuard::new(self, frame)));
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let frame = &self.frames[frame_id.index()];
        self.disk.read_page(page_id, frame.write_data().as_mut_slice())?;
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.set_lsn(Lsn::INVALID);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false);
        drop(state);

        Ok(Some(PageGuard::new(self, frame)))
    }

    /// Fetches a page behind a held read latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> BufferResult<Option<ReadPageGuard<'_>>> {
        Ok(self.fetch_page(page_id)?.map(ReadPageGuard::new))
    }

    /// Fetches a page behind a held write latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> BufferResult<Option<WritePageGuard<'_>>> {
        Ok(self.fetch_page(page_id)?.map(WritePageGuard::new))
    }

    /// Releases one pin on a page.
    ///
    /// `is_dirty` is cumulative: once any unpinner reports dirty the flag
    /// stays set until a flush or eviction write-back. Returns `false` if
    /// the page is not resident or its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes a resident page to disk and clears its dirty flag.
    ///
    /// The write happens whether or not the page is dirty; flushing a
    /// clean page is idempotent. Pinning and residency are unaffected.
    /// Returns `Ok(false)` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        // Reserve the frame with a pin so it stays resident while the
        // latch is acquired outside the pool mutex. Taking the latch
        // under the mutex could deadlock against a write guard whose
        // drop needs the mutex.
        let frame = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.set_evictable(frame_id, false);
            frame
        };

        let data = frame.read_data();
        let result = self.disk.write_page(page_id, data.as_slice());
        {
            // Still holding the read latch: no writer can slip a
            // modification between the disk write and the flag update.
            let _state = self.state.lock();
            if result.is_ok() {
                frame.set_dirty(false);
            }
            if frame.unpin() == 0 {
                self.replacer.set_evictable(frame.frame_id(), true);
            }
        }
        drop(data);

        result?;
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Flushes every resident page; order is unspecified.
    pub fn flush_all_pages(&self) -> BufferResult<()> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the pool and releases its id to the disk layer.
    ///
    /// Deleting a page that is not resident succeeds trivially. A pinned
    /// page cannot be deleted: returns `Ok(false)`. Nothing is flushed;
    /// durability of deleted pages is the caller's concern.
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<bool> {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;
        state.free_list.push_back(frame_id);
        frame.reset();
        self.disk.deallocate_page(page_id)?;

        tracing::debug!(%page_id, frame_id = frame_id.index(), "page deleted from pool");
        Ok(true)
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.index()].pin_count())
    }

    /// Returns a snapshot of pool statistics.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in self.frames.iter() {
            if frame.is_pinned() {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }

        BufferPoolStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            flushes: self.flush_count.load(Ordering::Relaxed),
            pinned_frames: pinned,
            dirty_frames: dirty,
            free_frames: self.state.lock().free_list.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Produces a frame with no pins and no page-table entry.
    ///
    /// The free list is consulted first; otherwise the replacer picks a
    /// victim, which is written back if dirty and unmapped. Returns
    /// `Ok(None)` when neither source can supply a frame.
    fn acquire_frame(&self, state: &mut PoolState) -> BufferResult<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.index()];

        if frame.is_dirty() {
            tracing::debug!(
                page_id = %frame.page_id(),
                frame_id = frame_id.index(),
                "writing back dirty page before frame reuse"
            );
            self.disk
                .write_page(frame.page_id(), frame.read_data().as_slice())?;
            frame.set_dirty(false);
        }
        state.page_table.remove(&frame.page_id());
        self.eviction_count.fetch_add(1, Ordering::Relaxed);

        Ok(Some(frame_id))
    }

    /// Unpins on behalf of a dropped guard.
    pub(crate) fn release_guard(&self, page_id: PageId, dirty: bool) {
        let released = self.unpin_page(page_id, dirty);
        debug_assert!(released, "guard released a pin it did not hold");
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferPoolManager")
            .field("num_frames", &self.frames.len())
            .field("resident_pages", &state.page_table.len())
            .field("free_frames", &state.free_list.len())
            .field("next_page_id", &state.next_page_id)
            .finish()
    }
}
