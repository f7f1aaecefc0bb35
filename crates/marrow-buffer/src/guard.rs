//! Scoped page guards.
//!
//! Guards bundle "pin + optional latch" into a single ownership-carrying
//! value: dropping a guard releases the frame latch (if held) and then
//! the pin, in that order. Guards are move-only; a moved-from guard runs
//! no destructor, and re-assignment drops the receiver's resources before
//! adopting the source's.
//!
//! Guards borrow the pool, so the pool outlives every guard by
//! construction; the pool itself does not track outstanding guards.

use std::ops::{Deref, DerefMut};

use marrow_common::types::PageId;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::frame::{BufferFrame, FrameId};
use crate::pool::BufferPoolManager;

/// Basic guard over a pinned page.
///
/// Holds one pin on the frame and unpins on drop, carrying the dirty
/// flag accumulated through [`PageGuard::data_mut`] / [`PageGuard::set_dirty`].
/// Data access takes the frame's rw-latch per call; use
/// [`ReadPageGuard`] / [`WritePageGuard`] to hold the latch for the
/// guard's whole lifetime.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    frame: &'a BufferFrame,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPoolManager, frame: &'a BufferFrame) -> Self {
        Self {
            pool,
            frame,
            page_id: frame.page_id(),
            dirty: false,
        }
    }

    pub(crate) fn frame(&self) -> &'a BufferFrame {
        self.frame
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Returns a reference to the page data, read-latched for the call.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Returns a mutable reference to the page data, write-latched for
    /// the call. Marks the page dirty.
    #[inline]
    pub fn data_mut(&mut self) -> impl DerefMut<Target = [u8]> + '_ {
        self.dirty = true;
        PageDataMut {
            guard: self.frame.write_data(),
        }
    }

    /// Marks the page dirty without touching the data.
    #[inline]
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns true if this guard will unpin the page as dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        // The pin held by this guard keeps the page resident, so the
        // unpin cannot fail.
        let _ = self.pool.unpin_page(self.page_id, self.dirty);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Helper struct to provide Deref for page data.
struct PageDataRef<'a> {
    guard: RwLockReadGuard<'a, Vec<u8>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Helper struct to provide DerefMut for page data.
struct PageDataMut<'a> {
    guard: RwLockWriteGuard<'a, Vec<u8>>,
}

impl Deref for PageDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for PageDataMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Guard over a pinned page holding its read latch.
///
/// Constructed by [`BufferPoolManager::fetch_page_read`]; the latch is
/// taken after the pool latch has been released.
pub struct ReadPageGuard<'a> {
    // Field order matters: the latch must be released before the inner
    // guard's drop unpins the page.
    data: RwLockReadGuard<'a, Vec<u8>>,
    guard: PageGuard<'a>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(guard: PageGuard<'a>) -> Self {
        let data = guard.frame().read_data();
        Self { data, guard }
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
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

/// Guard over a pinned page holding its write latch.
///
/// Constructed by [`BufferPoolManager::fetch_page_write`]. Mutating the
/// data marks the page dirty, so the drop-time unpin records it.
pub struct WritePageGuard<'a> {
    // Field order matters: the latch must be released before the inner
    // guard's drop unpins the page.
    data: RwLockWriteGuard<'a, Vec<u8>>,
    guard: PageGuard<'a>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(guard: PageGuard<'a>) -> Self {
        let data = guard.frame().write_data();
        Self { data, guard }
    }

    /// Returns the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the page data mutably, marking the page dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.set_dirty();
        &mut self.data
    }

    /// Marks the page dirty without touching the data.
    #[inline]
    pub fn set_dirty(&mut self) {
        self.guard.set_dirty();
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.set_dirty();
        &mut self.data
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
    use super::*;
    use crate::config::BufferPoolConfig;
    use marrow_storage::DiskManager;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 4096;

    fn create_pool(dir: &tempfile::TempDir, num_frames: usize) -> BufferPoolManager {
        let disk = DiskManager::open(dir.path().join("guards.db"), PAGE_SIZE).unwrap();
        let config = BufferPoolConfig::new(num_frames).with_page_size(PAGE_SIZE);
        BufferPoolManager::new(config, disk).unwrap()
    }

    #[test]
    fn test_basic_guard_unpins_on_drop() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (page_id, guard) = pool.new_page_guarded().unwrap();
        assert_eq!(pool.stats().pinned_frames, 1);

        drop(guard);
        assert_eq!(pool.stats().pinned_frames, 0);
        assert_eq!(pool.evictable_frames(), 1);

        // The pin is gone; a second unpin is underflow.
        assert!(pool.unpin_page(page_id, false).is_err());
    }

    #[test]
    fn test_basic_guard_carries_dirty_flag() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (page_id, mut guard) = pool.new_page_guarded().unwrap();
        guard.data_mut()[0] = 0x42;
        drop(guard);

        let guard = pool.fetch_page_basic(page_id).unwrap();
        assert!(guard.frame().is_dirty());
        assert_eq!(guard.data()[0], 0x42);
    }

    #[test]
    fn test_moved_guard_unpins_once() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (_, guard) = pool.new_page_guarded().unwrap();
        let moved = guard;
        assert_eq!(pool.stats().pinned_frames, 1);

        drop(moved);
        assert_eq!(pool.stats().pinned_frames, 0);
    }

    #[test]
    fn test_reassignment_drops_receiver_first() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (first_id, first) = pool.new_page_guarded().unwrap();
        let (_, second) = pool.new_page_guarded().unwrap();
        assert_eq!(pool.stats().pinned_frames, 2);

        let mut held = first;
        assert_eq!(held.page_id(), first_id);
        held = second;
        assert_eq!(pool.stats().pinned_frames, 1);
        assert_ne!(held.page_id(), first_id);

        drop(held);
        assert_eq!(pool.stats().pinned_frames, 0);
    }

    #[test]
    fn test_read_guard_releases_latch_then_pin() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (page_id, guard) = pool.new_page_guarded().unwrap();
        drop(guard);

        {
            let read = pool.fetch_page_read(page_id).unwrap();
            assert_eq!(read.page_id(), page_id);
            assert_eq!(pool.stats().pinned_frames, 1);
            assert_eq!(&read[0..2], &[0, 0]);
        }
        assert_eq!(pool.stats().pinned_frames, 0);

        // Latch is free again: a write guard can be taken immediately.
        let write = pool.fetch_page_write(page_id).unwrap();
        drop(write);
        assert_eq!(pool.stats().pinned_frames, 0);
    }

    #[test]
    fn test_write_guard_marks_dirty_on_mutation() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (page_id, guard) = pool.new_page_guarded().unwrap();
        drop(guard);

        {
            let mut write = pool.fetch_page_write(page_id).unwrap();
            write.data_mut()[0..4].copy_from_slice(&[9, 8, 7, 6]);
        }

        let read = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(&read[0..4], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_multiple_read_guards_coexist() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir, 2);

        let (page_id, guard) = pool.new_page_guarded().unwrap();
        drop(guard);

        let first = pool.fetch_page_read(page_id).unwrap();
        let second = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(pool.stats().pinned_frames, 1);
        assert_eq!(first.data(), second.data());

        drop(first);
        drop(second);
        assert_eq!(pool.stats().pinned_frames, 0);
    }
}
