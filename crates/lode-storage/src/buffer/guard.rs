//! Page guards: scoped pin ownership with optional held latches.
//!
//! Every page handed out by the pool is wrapped in a guard that releases
//! its pin exactly once, on drop, propagating the dirtiness accumulated
//! while the guard was alive. The read/write variants additionally hold
//! the frame's data latch for their whole lifetime.
//!
//! Guards are move-only values borrowing the pool: moving one transfers
//! the pin, and dropping one early (`drop(guard)`) releases it. They can
//! cross threads inside scoped spawns since they borrow the pool rather
//! than own it.

use std::ops::{Deref, DerefMut};

use lode_common::types::{Lsn, PageId};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::{BufferFrame, FrameId};
use super::pool::BufferPoolManager;

/// A pinned page.
///
/// Holds one pin on a frame and accumulates a dirty flag; dropping the
/// guard unpins with that flag. Data access takes the frame's latch
/// transiently per call - use [`ReadPageGuard`]/[`WritePageGuard`] when
/// the latch should be held across accesses.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a BufferFrame,
    /// Dirtiness accumulated through this guard, propagated on drop.
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame: &'a BufferFrame) -> Self {
        Self {
            bpm,
            frame,
            dirty: false,
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    /// Returns the frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Returns a read-latched view of the page data.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Returns a write-latched view of the page data, marking the guard
    /// dirty.
    #[inline]
    pub fn data_mut(&mut self) -> impl DerefMut<Target = [u8]> + '_ {
        self.dirty = true;
        PageDataMut {
            guard: self.frame.write_data(),
        }
    }

    /// Marks the guard dirty without touching the data.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns the dirtiness accumulated so far.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn frame(&self) -> &'a BufferFrame {
        self.frame
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.release_guard(self.frame.page_id(), self.dirty);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id())
            .field("frame_id", &self.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Helper struct to provide `Deref` for page data.
struct PageDataRef<'a> {
    guard: RwLockReadGuard<'a, Vec<u8>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.guard.as_slice()
    }
}

/// Helper struct to provide `DerefMut` for page data.
struct PageDataMut<'a> {
    guard: RwLockWriteGuard<'a, Vec<u8>>,
}

impl Deref for PageDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.guard.as_slice()
    }
}

impl DerefMut for PageDataMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_mut_slice()
    }
}

/// A pinned page with its read latch held.
///
/// Readers in other threads may share the latch; writers wait until the
/// guard drops.
pub struct ReadPageGuard<'a> {
    // Field order is load-bearing: `guard` drops first, so the unpin
    // happens while the latch is still held and a concurrent evictor
    // observing pin_count == 0 can never see the latch released before
    // the unpin's bookkeeping is done.
    guard: PageGuard<'a>,
    latch: RwLockReadGuard<'a, Vec<u8>>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(guard: PageGuard<'a>) -> Self {
        let frame = guard.frame();
        Self {
            guard,
            latch: frame.read_data(),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.latch.as_slice()
    }

    /// Returns the LSN of the page's last modification.
    #[inline]
    pub fn page_lsn(&self) -> Lsn {
        self.guard.frame().lsn()
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl std::fmt::Debug for ReadPageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPageGuard")
            .field("page_id", &self.page_id())
            .field("frame_id", &self.frame_id())
            .finish()
    }
}

/// A pinned page with its write latch held.
///
/// Grants exclusive access to the page bytes for the guard's lifetime.
/// Mutable access marks the guard dirty.
pub struct WritePageGuard<'a> {
    // Same drop order contract as `ReadPageGuard`.
    guard: PageGuard<'a>,
    latch: RwLockWriteGuard<'a, Vec<u8>>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(guard: PageGuard<'a>) -> Self {
        let frame = guard.frame();
        Self {
            guard,
            latch: frame.write_data(),
        }
    }

    /// Returns the guarded page's ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.latch.as_slice()
    }

    /// Returns the page data mutably, marking the guard dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.dirty = true;
        self.latch.as_mut_slice()
    }

    /// Marks the guard dirty without touching the data.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.guard.mark_dirty();
    }

    /// Returns the dirtiness accumulated so far.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.guard.is_dirty()
    }

    /// Returns the LSN of the page's last modification.
    #[inline]
    pub fn page_lsn(&self) -> Lsn {
        self.guard.frame().lsn()
    }

    /// Records the LSN of the modification being made through this guard.
    #[inline]
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.guard.dirty = true;
        self.guard.frame().set_lsn(lsn);
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

impl std::fmt::Debug for WritePageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePageGuard")
            .field("page_id", &self.page_id())
            .field("frame_id", &self.frame_id())
            .field("dirty", &self.guard.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::{tempdir, TempDir};

    use super::super::config::BufferPoolConfig;
    use super::*;
    use crate::disk::FileDiskManager;

    fn create_test_pool(num_frames: usize) -> (BufferPoolManager, TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(FileDiskManager::open(dir.path().join("test.db")).unwrap());
        let pool = BufferPoolManager::new(BufferPoolConfig::new(num_frames), disk).unwrap();
        (pool, dir)
    }

    #[test]
    fn test_guard_unpins_on_drop() {
        let (pool, _dir) = create_test_pool(4);

        let guard = pool.new_page().unwrap().unwrap();
        let page_id = guard.page_id();
        assert_eq!(pool.pin_count(page_id), Some(1));

        drop(guard);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_guard_move_transfers_pin() {
        let (pool, _dir) = create_test_pool(4);

        let guard = pool.new_page().unwrap().unwrap();
        let page_id = guard.page_id();

        let moved = guard;
        assert_eq!(pool.pin_count(page_id), Some(1));
        drop(moved);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_guard_propagates_accumulated_dirty() {
        let (pool, _dir) = create_test_pool(4);

        let page_id = {
            let mut guard = pool.new_page().unwrap().unwrap();
            assert!(!guard.is_dirty());
            guard.data_mut()[0] = 1;
            assert!(guard.is_dirty());
            guard.page_id()
        };
        assert_eq!(pool.stats().dirty_frames, 1);
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_clean_guard_leaves_page_clean() {
        let (pool, _dir) = create_test_pool(4);

        {
            let guard = pool.new_page().unwrap().unwrap();
            let _ = guard.data();
        }
        assert_eq!(pool.stats().dirty_frames, 0);
    }

    #[test]
    fn test_read_guard_shares_latch() {
        let (pool, _dir) = create_test_pool(4);

        let page_id = {
            let mut guard = pool.new_page_write().unwrap().unwrap();
            guard.data_mut()[0..3].copy_from_slice(&[1, 2, 3]);
            guard.page_id()
        };

        let r1 = pool.fetch_page_read(page_id).unwrap().unwrap();
        let r2 = pool.fetch_page_read(page_id).unwrap().unwrap();
        assert_eq!(&r1[0..3], &[1, 2, 3]);
        assert_eq!(&r2[0..3], &[1, 2, 3]);
        assert_eq!(pool.pin_count(page_id), Some(2));
    }

    #[test]
    fn test_write_guard_lifecycle() {
        let (pool, _dir) = create_test_pool(4);

        let page_id;
        {
            // Move the guard into a nested scope, write through it, and
            // let the scope end.
            let guard = pool.new_page_write().unwrap().unwrap();
            page_id = guard.page_id();
            let mut moved = guard;
            moved.data_mut()[0] = 0xCD;
            moved.set_lsn(Lsn::new(7));
        }

        // Pin released, dirty set, latch free for a parallel reader.
        assert_eq!(pool.pin_count(page_id), Some(0));
        assert_eq!(pool.stats().dirty_frames, 1);

        std::thread::scope(|s| {
            s.spawn(|| {
                let reader = pool.fetch_page_read(page_id).unwrap().unwrap();
                assert_eq!(reader[0], 0xCD);
                assert_eq!(reader.page_lsn(), Lsn::new(7));
            });
        });
    }

    #[test]
    fn test_write_guard_deref_mut_marks_dirty() {
        let (pool, _dir) = create_test_pool(4);

        let mut guard = pool.new_page_write().unwrap().unwrap();
        assert!(!guard.is_dirty());
        guard[0] = 9;
        assert!(guard.is_dirty());
    }

    #[test]
    fn test_writer_blocks_reader_until_drop() {
        let (pool, _dir) = create_test_pool(4);

        let page_id = {
            let g = pool.new_page().unwrap().unwrap();
            g.page_id()
        };

        let mut writer = pool.fetch_page_write(page_id).unwrap().unwrap();
        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                // Blocks until the writer drops, then observes its write.
                let reader = pool.fetch_page_read(page_id).unwrap().unwrap();
                reader[0]
            });

            std::thread::sleep(std::time::Duration::from_millis(20));
            writer.data_mut()[0] = 0x42;
            drop(writer);

            assert_eq!(handle.join().unwrap(), 0x42);
        });
    }

    #[test]
    fn test_guard_keeps_page_resident_under_pressure() {
        let (pool, _dir) = create_test_pool(2);

        let guard = pool.new_page().unwrap().unwrap();
        let page_id = guard.page_id();

        // Churn the other frame.
        for _ in 0..3 {
            let other = pool.new_page().unwrap().unwrap();
            drop(other);
        }

        assert!(pool.contains(page_id));
        assert_eq!(guard.page_id(), page_id);
    }
}
