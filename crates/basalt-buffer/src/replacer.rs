//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Marks a frame as evictable (unpinned) or not.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction and forgets it.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Removes an evictable frame from the replacer.
    ///
    /// Removing a pinned frame is a caller bug; the call is a no-op.
    fn remove(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU-K replacement algorithm implementation.
///
/// Tracks the last K access timestamps of each frame. The eviction victim
/// is the evictable frame with the largest backward K-distance (`now` minus
/// the K-th most recent access). Frames with fewer than K recorded accesses
/// have infinite K-distance; ties are broken by the earliest remembered
/// access, so among cold frames the policy degrades to plain LRU on the
/// oldest timestamp.
pub struct LruKReplacer {
    /// Number of frames the replacer may track.
    num_frames: usize,
    /// The K in LRU-K.
    k: usize,
    /// Internal state protected by a single mutex.
    inner: Mutex<LruKInner>,
}

struct LruKInner {
    /// Access history per tracked frame.
    nodes: HashMap<FrameId, LruKNode>,
    /// Monotonic logical clock, incremented on every recorded access.
    current_timestamp: u64,
    /// Number of frames currently marked evictable.
    evictable_count: usize,
}

struct LruKNode {
    /// Last K access timestamps, oldest first.
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer tracking up to `num_frames` frames.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LruKReplacer::new: k must be positive");
        Self {
            num_frames,
            k,
            inner: Mutex::new(LruKInner {
                nodes: HashMap::new(),
                current_timestamp: 0,
                evictable_count: 0,
            }),
        }
    }

    /// Returns the frame capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Returns the K parameter.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    fn check_frame_id(&self, frame_id: FrameId, op: &str) {
        assert!(
            (frame_id.0 as usize) < self.num_frames,
            "LruKReplacer::{op}: invalid frame id {frame_id}",
        );
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id, "record_access");

        let mut inner = self.inner.lock();

        if !inner.nodes.contains_key(&frame_id) {
            // The node store is bounded by the frame universe.
            if inner.nodes.len() >= self.num_frames {
                return;
            }
            inner.nodes.insert(
                frame_id,
                LruKNode {
                    history: VecDeque::with_capacity(self.k),
                    is_evictable: false,
                },
            );
        }

        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        if let Some(node) = inner.nodes.get_mut(&frame_id) {
            node.history.push_back(timestamp);
            if node.history.len() > self.k {
                node.history.pop_front();
            }
        }
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id, "set_evictable");

        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable == evictable {
            return;
        }
        node.is_evictable = evictable;
        if evictable {
            inner.evictable_count += 1;
        } else {
            inner.evictable_count -= 1;
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        if inner.evictable_count == 0 {
            return None;
        }

        let now = inner.current_timestamp;
        let mut victim: Option<FrameId> = None;
        let mut victim_distance = 0u64;
        let mut victim_earliest = u64::MAX;

        for (&frame_id, node) in &inner.nodes {
            if !node.is_evictable {
                continue;
            }
            let Some(&earliest) = node.history.front() else {
                continue;
            };
            let distance = if node.history.len() < self.k {
                u64::MAX
            } else {
                now - earliest
            };
            let colder = match victim {
                None => true,
                Some(_) => {
                    distance > victim_distance
                        || (distance == victim_distance && earliest < victim_earliest)
                }
            };
            if colder {
                victim = Some(frame_id);
                victim_distance = distance;
                victim_earliest = earliest;
            }
        }

        let frame_id = victim?;
        inner.nodes.remove(&frame_id);
        inner.evictable_count -= 1;
        Some(frame_id)
    }

    fn remove(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id, "remove");

        let mut inner = self.inner.lock();
        let Some(node) = inner.nodes.get(&frame_id) else {
            return;
        };
        if node.is_evictable {
            inner.nodes.remove(&frame_id);
            inner.evictable_count -= 1;
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}
