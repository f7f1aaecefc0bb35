//! LRU-K eviction policy for the buffer pool.
//!
//! LRU-K (O'Neil et al.) ranks frames by *backward K-distance*: the span
//! between a frame's newest and K-th most recent access timestamps. A
//! frame with fewer than K recorded accesses has infinite distance and is
//! preferred for eviction; ties fall back to classical LRU on the oldest
//! retained timestamp. For K = 2 this keeps pages that were touched twice
//! over pages that were touched once in a recent burst.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::frame::FrameId;

/// Backward K-distance of a frame with fewer than `k` recorded accesses.
const INF: u64 = u64::MAX;

/// The kind of access being recorded.
///
/// The current policy ranks all access types equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    /// Access of unspecified origin.
    #[default]
    Unknown,
    /// Point lookup.
    Lookup,
    /// Sequential scan.
    Scan,
    /// Index traversal.
    Index,
}

/// Per-frame access history.
struct LruKNode {
    /// Last up to `k` access timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether the frame is a candidate for eviction.
    evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }
}

/// State behind the replacer's internal mutex.
struct ReplacerInner {
    /// One node per frame, indexed by frame id.
    nodes: Vec<LruKNode>,
    /// Monotone counter; advances by one on each recorded access.
    current_timestamp: u64,
    /// Number of frames currently marked evictable.
    evictable_count: usize,
}

/// LRU-K page replacement policy.
///
/// The replacer tracks access histories for the frames of a buffer pool
/// and selects eviction victims among the frames marked evictable. All
/// operations are serialized by an internal mutex, so the replacer can be
/// shared without external locking; when driven by the pool manager, the
/// pool latch already provides exclusion.
///
/// Out-of-range frame ids are programming bugs and panic.
pub struct LruKReplacer {
    inner: Mutex<ReplacerInner>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Creates a replacer for `num_frames` frames with history depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "replacer k must be >= 1");
        Self {
            inner: Mutex::new(ReplacerInner {
                nodes: (0..num_frames).map(|_| LruKNode::new()).collect(),
                current_timestamp: 0,
                evictable_count: 0,
            }),
            num_frames,
            k,
        }
    }

    /// Returns the history depth `k`.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Records an access to `frame_id` at the current timestamp.
    ///
    /// The history is trimmed to the last `k` entries. Evictability is
    /// unchanged.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) {
        self.check_frame(frame_id);
        let mut inner = self.inner.lock();

        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        let k = self.k;
        let node = &mut inner.nodes[frame_id.index()];
        node.history.push_back(timestamp);
        if node.history.len() > k {
            node.history.pop_front();
        }
    }

    /// Marks `frame_id` as evictable or not. Idempotent.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame(frame_id);
        let mut inner = self.inner.lock();

        let node = &mut inner.nodes[frame_id.index()];
        if node.evictable == evictable {
            return;
        }
        node.evictable = evictable;
        if evictable {
            inner.evictable_count += 1;
        } else {
            inner.evictable_count -= 1;
        }
    }

    /// Evicts the evictable frame with the greatest backward K-distance.
    ///
    /// Frames with fewer than `k` accesses have infinite distance; ties
    /// (infinite or equal finite distance) are broken by the smallest
    /// oldest-retained timestamp. On success the victim's history is
    /// cleared and it leaves the evictable set.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        let mut victim: Option<(usize, u64, u64)> = None;
        for (index, node) in inner.nodes.iter().enumerate() {
            if !node.evictable || node.history.is_empty() {
                continue;
            }
            let oldest = *node.history.front().expect("non-empty history");
            let distance = if node.history.len() < self.k {
                INF
            } else {
                node.history.back().expect("non-empty history") - oldest
            };

            let better = match victim {
                None => true,
                Some((_, best_distance, best_oldest)) => {
                    distance > best_distance
                        || (distance == best_distance && oldest < best_oldest)
                }
            };
            if better {
                victim = Some((index, distance, oldest));
            }
        }

        let (index, _, _) = victim?;
        let node = &mut inner.nodes[index];
        node.history.clear();
        node.evictable = false;
        inner.evictable_count -= 1;

        Some(FrameId::new(index))
    }

    /// Removes `frame_id` from the replacer, clearing its history.
    ///
    /// A no-op if the frame is not currently evictable; the pool only
    /// removes unpinned frames that are about to be freed.
    pub fn remove(&self, frame_id: FrameId) {
        self.check_frame(frame_id);
        let mut inner = self.inner.lock();

        let node = &mut inner.nodes[frame_id.index()];
        if !node.evictable {
            return;
        }
        node.history.clear();
        node.evictable = false;
        inner.evictable_count -= 1;
    }

    /// Returns the number of frames currently marked evictable.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id.index() < self.num_frames,
            "frame id {} out of range for replacer of {} frames",
            frame_id.index(),
            self.num_frames
        );
    }
}

impl std::fmt::Debug for LruKReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruKReplacer")
            .field("num_frames", &self.num_frames)
            .field("k", &self.k)
            .field("evictable", &self.size())
            .finish()
    }
}
