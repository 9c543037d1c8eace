//! LRU-K replacement policy.
//!
//! LRU-K picks eviction victims by *backward K-distance*: the gap between
//! the current logical time and a frame's K-th most recent access. Frames
//! with fewer than K recorded accesses have infinite distance and are
//! evicted first, oldest first, which degenerates to classical LRU while
//! the pool is cold. Frames with established reuse (K accesses inside a
//! warm window) are kept over frames touched once by a scan.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::error::{BufferError, BufferResult};
use super::frame::FrameId;

/// Access bookkeeping for one frame.
struct LruKNode {
    /// The most recent access timestamps, oldest first, at most K entries.
    ///
    /// Keeping only K is enough: the front is the K-th most recent access
    /// once the history is full, and the earliest access ever while it is
    /// not.
    history: VecDeque<u64>,
    /// Whether the frame may be chosen as a victim.
    evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }

    fn record(&mut self, timestamp: u64, k: usize) {
        self.history.push_back(timestamp);
        if self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// True once the frame has at least K recorded accesses.
    fn has_k_accesses(&self, k: usize) -> bool {
        self.history.len() >= k
    }

    /// The oldest tracked timestamp: the K-th most recent access for a
    /// full history, the first access ever otherwise.
    fn oldest_tracked(&self) -> u64 {
        self.history.front().copied().unwrap_or(0)
    }
}

/// Interior state, guarded by one mutex.
struct ReplacerState {
    node_store: HashMap<FrameId, LruKNode>,
    /// Logical clock, ticked on every recorded access.
    current_timestamp: u64,
    /// Number of evictable nodes.
    curr_size: usize,
}

/// Victim selection over unpinned frames using backward K-distance.
///
/// The replacer tracks per-frame access history and an evictable flag.
/// Frames enter via [`record_access`](Self::record_access), become
/// candidates via [`set_evictable`](Self::set_evictable), and leave via
/// [`evict`](Self::evict) or [`remove`](Self::remove). It holds frame ids
/// only - never page data.
pub struct LruKReplacer {
    /// The K in LRU-K.
    k: usize,
    /// Highest frame id the replacer accepts, fixed at construction.
    capacity: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer for `capacity` frames with the given `k`.
    pub fn new(capacity: usize, k: usize) -> Self {
        debug_assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            k,
            capacity,
            state: Mutex::new(ReplacerState {
                node_store: HashMap::with_capacity(capacity),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Records an access to the frame at the current logical time.
    ///
    /// Creates the node (non-evictable, empty history) on first sight.
    /// Never changes the evictable count. A frame id outside
    /// `[0, capacity)` is a caller bug.
    pub fn record_access(&self, frame_id: FrameId) -> BufferResult<()> {
        if frame_id.index() >= self.capacity {
            return Err(BufferError::invalid_frame(frame_id.index()));
        }
        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        state
            .node_store
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record(timestamp, self.k);
        state.current_timestamp += 1;
        Ok(())
    }

    /// Marks a tracked frame as evictable or not.
    ///
    /// Unknown frames are ignored. Only the `false -> true` and
    /// `true -> false` transitions change the evictable count.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.state.lock();
        let Some(node) = state.node_store.get_mut(&frame_id) else {
            return;
        };
        if node.evictable != evictable {
            node.evictable = evictable;
            if evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
    }

    /// Drops a frame from the replacer entirely.
    ///
    /// Unknown frames are ignored. Removing a non-evictable (pinned)
    /// frame is a caller bug. The capacity fixed at construction is
    /// unaffected.
    pub fn remove(&self, frame_id: FrameId) -> BufferResult<()> {
        let mut state = self.state.lock();
        let Some(node) = state.node_store.get(&frame_id) else {
            return Ok(());
        };
        if !node.evictable {
            return Err(BufferError::FrameNotEvictable {
                frame_id: frame_id.index(),
            });
        }
        state.node_store.remove(&frame_id);
        state.curr_size -= 1;
        Ok(())
    }

    /// Selects, removes, and returns the eviction victim.
    ///
    /// The victim is the evictable frame with the largest backward
    /// K-distance. Frames with fewer than K accesses have infinite
    /// distance and always outrank full-history frames; among them the
    /// one with the earliest first access wins. Among full histories the
    /// largest distance means the smallest K-th-recent timestamp, which
    /// also settles ties.
    ///
    /// Returns `None` when no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.curr_size == 0 {
            return None;
        }

        let k = self.k;
        let victim = state
            .node_store
            .iter()
            .filter(|(_, node)| node.evictable)
            .min_by(|(_, a), (_, b)| {
                match (a.has_k_accesses(k), b.has_k_accesses(k)) {
                    // Under-K histories (infinite distance) come first.
                    (false, true) => CmpOrdering::Less,
                    (true, false) => CmpOrdering::Greater,
                    _ => a.oldest_tracked().cmp(&b.oldest_tracked()),
                }
            })
            .map(|(&frame_id, _)| frame_id)?;

        state.node_store.remove(&victim);
        state.curr_size -= 1;
        Some(victim)
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// The frame-id capacity fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The configured K.
    pub fn k(&self) -> usize {
        self.k
    }
}

impl std::fmt::Debug for LruKReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LruKReplacer")
            .field("k", &self.k)
            .field("capacity", &self.capacity)
            .field("tracked", &state.node_store.len())
            .field("evictable", &state.curr_size)
            .finish()
    }
}
