//! # marrow-buffer
//!
//! Buffer pool manager for MarrowDB.
//!
//! The buffer pool keeps a bounded number of disk pages resident in
//! fixed-size frames and mediates between the disk manager and the
//! engine's higher layers:
//!
//! - **Page caching**: keep frequently accessed pages in memory
//! - **Pin/unpin**: reference counting for safe concurrent access
//! - **Dirty tracking**: write modified pages back before frame reuse
//! - **LRU-K eviction**: rank cold frames by backward K-distance
//! - **Scoped guards**: RAII handles that cannot leak pins or latches
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    BufferPoolManager                       │
//! │  ┌──────────────────────┐   ┌───────────────────────────┐ │
//! │  │      Page Table       │   │        Free List          │ │
//! │  │ HashMap<PageId,Frame> │   │   VecDeque<FrameId>       │ │
//! │  └──────────────────────┘   └───────────────────────────┘ │
//! │              │                                             │
//! │              ▼                                             │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                     Frame Array                        │ │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐     ┌─────────┐  │ │
//! │  │  │ page_id │ │ page_id │ │ page_id │ ... │ page_id │  │ │
//! │  │  │ pin_cnt │ │ pin_cnt │ │ pin_cnt │     │ pin_cnt │  │ │
//! │  │  │ dirty   │ │ dirty   │ │ dirty   │     │ dirty   │  │ │
//! │  │  │ data[]  │ │ data[]  │ │ data[]  │     │ data[]  │  │ │
//! │  │  └─────────┘ └─────────┘ └─────────┘     └─────────┘  │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │              │                                             │
//! │              ▼                                             │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                    LRU-K Replacer                      │ │
//! │  │        (access histories + evictable set)              │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use marrow_buffer::{BufferPoolConfig, BufferPoolManager};
//! use marrow_storage::DiskManager;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let disk = DiskManager::open("data.db", 4096)?;
//!     let config = BufferPoolConfig::new(64).with_page_size(4096);
//!     let pool = BufferPoolManager::new(config, disk)?;
//!
//!     let (page_id, mut guard) = pool.new_page_guarded()?;
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     drop(guard); // unpins, carrying the dirty flag
//!
//!     let guard = pool.fetch_page_read(page_id)?;
//!     assert_eq!(&guard[..5], b"hello");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use config::BufferPoolConfig;
pub use error::{BufferError, BufferResult};
pub use frame::{BufferFrame, FrameId};
pub use guard::{PageGuard, ReadPageGuard, WritePageGuard};
pub use pool::BufferPoolManager;
pub use replacer::{AccessType, LruKReplacer};

/// Statistics for buffer pool monitoring.
#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    /// Total number of page fetches.
    pub fetches: u64,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (required disk read).
    pub misses: u64,
    /// Number of pages evicted.
    pub evictions: u64,
    /// Number of pages written back to disk.
    pub flushes: u64,
    /// Current number of pinned frames.
    pub pinned_frames: usize,
    /// Current number of dirty frames.
    pub dirty_frames: usize,
}

impl BufferPoolStats {
    /// Returns the cache hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.fetches == 0 {
            0.0
        } else {
            self.hits as f64 / self.fetches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_ratio() {
        let mut stats = BufferPoolStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.fetches = 100;
        stats.hits = 80;
        assert!((stats.hit_ratio() - 0.8).abs() < f64::EPSILON);
    }
}
