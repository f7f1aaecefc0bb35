//! Buffer pool manager.
//!
//! The pool manager coordinates the frame array, free list, page table,
//! and LRU-K replacer, and serializes disk I/O for misses. A single
//! pool-wide mutex protects all bookkeeping state; page bytes are guarded
//! only by each frame's rw-latch, so data access proceeds without the
//! pool latch once a page is pinned.
//!
//! Locking order is always pool latch, then per-frame latch, and the two
//! are never held together across a public operation: guard constructors
//! take the frame latch only after the pool latch has been released.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use marrow_common::types::PageId;
use marrow_storage::DiskManager;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::BufferPoolConfig;
use crate::error::{BufferError, BufferResult};
use crate::frame::{BufferFrame, FrameId};
use crate::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use crate::replacer::{AccessType, LruKReplacer};
use crate::BufferPoolStats;

/// Bookkeeping state behind the pool latch.
struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page, in reuse order.
    free_list: VecDeque<FrameId>,
    /// Next page id to hand out; monotonic, never reused.
    next_page_id: PageId,
}

/// The buffer pool manager.
///
/// Keeps a bounded number of pages resident in fixed frames, satisfies
/// concurrent page requests, evicts cold frames through the LRU-K
/// replacer, and writes dirty pages back before their frames are reused.
///
/// Callers normally go through the guard constructors
/// ([`BufferPoolManager::fetch_page_read`] and friends); the raw
/// [`BufferPoolManager::fetch_page`] / [`BufferPoolManager::unpin_page`]
/// pair is exposed for callers that manage pin lifetimes themselves.
pub struct BufferPoolManager {
    /// Configuration (frame count, page size, replacer depth).
    config: BufferPoolConfig,
    /// The frame array; frame identity is stable for the pool's lifetime.
    frames: Vec<BufferFrame>,
    /// Page table, free list, and page id allocator.
    state: Mutex<PoolState>,
    /// Eviction policy; tracks exactly the resident frames.
    replacer: LruKReplacer,
    /// Byte-level page I/O sink.
    disk: DiskManager,
    /// Fetch counter for statistics.
    fetch_count: AtomicU64,
    /// Hit counter for statistics.
    hit_count: AtomicU64,
    /// Miss counter for statistics.
    miss_count: AtomicU64,
    /// Eviction counter for statistics.
    eviction_count: AtomicU64,
    /// Write-back counter for statistics.
    flush_count: AtomicU64,
}

impl BufferPoolManager {
    /// Creates a new buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: DiskManager) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;
        if disk.page_size() != config.page_size {
            return Err(BufferError::config(format!(
                "disk page size {} does not match pool page size {}",
                disk.page_size(),
                config.page_size
            )));
        }

        let frames: Vec<BufferFrame> = (0..config.num_frames)
            .map(|i| BufferFrame::new(FrameId::new(i), config.page_size))
            .collect();

        // Initially, every frame is in the free list.
        let free_list: VecDeque<FrameId> = (0..config.num_frames).map(FrameId::new).collect();

        info!(
            num_frames = config.num_frames,
            page_size = config.page_size,
            replacer_k = config.replacer_k,
            "buffer pool created"
        );

        Ok(Self {
            replacer: LruKReplacer::new(config.num_frames, config.replacer_k),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(config.num_frames),
                free_list,
                next_page_id: PageId::FIRST,
            }),
            config,
            disk,
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        })
    }

    /// Allocates a brand-new zeroed page, pinned in a frame.
    ///
    /// The returned frame has `pin_count = 1`; the caller owns that pin
    /// and must release it with [`BufferPoolManager::unpin_page`]. Fails
    /// with [`BufferError::NoFreeFrames`] when every frame is pinned.
    pub fn new_page(&self) -> BufferResult<(PageId, &BufferFrame)> {
        let mut state = self.state.lock();

        let frame_id = self.find_and_evict_frame(&mut state)?;
        self.replacer.set_evictable(frame_id, false);
        self.replacer.record_access(frame_id, AccessType::Unknown);

        let page_id = state.next_page_id;
        state.next_page_id = page_id.next();

        let frame = self.frame(frame_id);
        frame.set_page_id(page_id);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        frame.write_data().fill(0);

        trace!(page = %page_id, frame = frame_id.index(), "allocated new page");
        Ok((page_id, frame))
    }

    /// Fetches a page, reading it from disk if it is not resident.
    ///
    /// Increments the page's pin count; the caller must release the pin
    /// with [`BufferPoolManager::unpin_page`]. Fails with
    /// [`BufferError::NoFreeFrames`] when the page is not resident and
    /// every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<&BufferFrame> {
        self.fetch_page_with(page_id, AccessType::Unknown)
    }

    /// Fetches a page, recording the given access type with the replacer.
    pub fn fetch_page_with(
        &self,
        page_id: PageId,
        access_type: AccessType,
    ) -> BufferResult<&BufferFrame> {
        let mut state = self.state.lock();
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                frame_id
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                let frame_id = self.find_and_evict_frame(&mut state)?;
                let frame = self.frame(frame_id);
                if let Err(e) = self.disk.read_page(page_id, &mut frame.write_data()) {
                    // The frame is still empty; put it back for reuse.
                    state.free_list.push_front(frame_id);
                    return Err(e.into());
                }
                frame.set_page_id(page_id);
                state.page_table.insert(page_id, frame_id);
                frame_id
            }
        };

        // The miss path installs the mapping with pin_count = 0 and takes
        // the same pin as a resident hit.
        let frame = self.frame(frame_id);
        frame.pin();
        self.replacer.set_evictable(frame_id, false);
        self.replacer.record_access(frame_id, access_type);

        Ok(frame)
    }

    /// Releases one pin on a page, optionally marking it dirty.
    ///
    /// The dirty flag is OR-ed in, never cleared. When the pin count
    /// reaches zero the frame becomes evictable. Fails if the page is not
    /// resident or its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> BufferResult<()> {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(BufferError::page_not_found(page_id));
        };
        let frame = self.frame(frame_id);
        if frame.pin_count() == 0 {
            return Err(BufferError::PageNotPinned { page_id });
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }

        trace!(page = %page_id, frame = frame_id.index(), "unpinned page");
        Ok(())
    }

    /// Writes a page to disk, clearing its dirty bit.
    ///
    /// The write is unconditional, even for a clean page. Fails if the
    /// page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<()> {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(BufferError::page_not_found(page_id));
        };
        let frame = self.frame(frame_id);
        self.disk.write_page(page_id, &frame.read_data())?;
        frame.set_dirty(false);
        self.flush_count.fetch_add(1, Ordering::Relaxed);

        debug!(page = %page_id, "flushed page");
        Ok(())
    }

    /// Writes every resident page to disk, clearing all dirty bits.
    ///
    /// Returns the number of pages written (one per resident page,
    /// regardless of dirtiness).
    pub fn flush_all_pages(&self) -> BufferResult<usize> {
        let state = self.state.lock();

        let mut flushed = 0;
        for (&page_id, &frame_id) in &state.page_table {
            let frame = self.frame(frame_id);
            self.disk.write_page(page_id, &frame.read_data())?;
            frame.set_dirty(false);
            flushed += 1;
        }
        self.flush_count.fetch_add(flushed as u64, Ordering::Relaxed);

        debug!(pages = flushed, "flushed all resident pages");
        Ok(flushed)
    }

    /// Deletes a page from the pool, returning its frame to the free list.
    ///
    /// A non-resident page is vacuously deleted. A pinned page cannot be
    /// deleted and fails with [`BufferError::PagePinned`]. A dirty page is
    /// written back before its frame is freed.
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<()> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };
        let frame = self.frame(frame_id);
        let pin_count = frame.pin_count();
        if pin_count > 0 {
            return Err(BufferError::PagePinned {
                page_id,
                pin_count,
            });
        }

        if frame.is_dirty() {
            self.disk.write_page(page_id, &frame.read_data())?;
            frame.set_dirty(false);
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }

        state.page_table.remove(&page_id);
        frame.reset();
        self.replacer.remove(frame_id);
        state.free_list.push_back(frame_id);

        debug!(page = %page_id, frame = frame_id.index(), "deleted page");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Guard constructors
    // -------------------------------------------------------------------------

    /// Fetches a page wrapped in a basic guard that unpins on drop.
    pub fn fetch_page_basic(&self, page_id: PageId) -> BufferResult<PageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, frame))
    }

    /// Fetches a page and takes its read latch.
    ///
    /// The latch is acquired after the pool latch has been released, so a
    /// writer holding the page blocks this call without blocking the pool.
    pub fn fetch_page_read(&self, page_id: PageId) -> BufferResult<ReadPageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(ReadPageGuard::new(PageGuard::new(self, frame)))
    }

    /// Fetches a page and takes its write latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> BufferResult<WritePageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(WritePageGuard::new(PageGuard::new(self, frame)))
    }

    /// Allocates a new page wrapped in a basic guard.
    pub fn new_page_guarded(&self) -> BufferResult<(PageId, PageGuard<'_>)> {
        let (page_id, frame) = self.new_page()?;
        Ok((page_id, PageGuard::new(self, frame)))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Returns true if a page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the number of frames in the buffer pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns the number of frames currently in the free list.
    pub fn free_frames(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of frames the replacer considers evictable.
    pub fn evictable_frames(&self) -> usize {
        self.replacer.size()
    }

    /// Flushes the underlying data file to stable storage.
    pub fn sync(&self) -> BufferResult<()> {
        self.disk.sync()?;
        Ok(())
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.frames {
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
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    #[inline]
    fn frame(&self, frame_id: FrameId) -> &BufferFrame {
        &self.frames[frame_id.index()]
    }

    /// Obtains an empty frame: the free list front, or an evicted victim.
    ///
    /// A dirty victim is written back before its frame is handed out. The
    /// returned frame is empty (`page_id` invalid, clean, zeroed); the
    /// caller performs the install steps.
    fn find_and_evict_frame(&self, state: &mut PoolState) -> BufferResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferError::NoFreeFrames)?;
        let frame = self.frame(frame_id);
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            self.disk.write_page(old_page_id, &frame.read_data())?;
            frame.set_dirty(false);
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }

        state.page_table.remove(&old_page_id);
        frame.set_page_id(PageId::INVALID);
        frame.write_data().fill(0);
        self.eviction_count.fetch_add(1, Ordering::Relaxed);

        debug!(page = %old_page_id, frame = frame_id.index(), "evicted page");
        Ok(frame_id)
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPoolManager")
            .field("num_frames", &self.config.num_frames)
            .field("page_size", &self.config.page_size)
            .field("pages_resident", &self.state.lock().page_table.len())
            .finish()
    }
}
