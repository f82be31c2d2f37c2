use std::collections::{HashMap, VecDeque};

use super::FrameId;

/// Hint describing why a page was accessed.
///
/// Carried through the pool API for future scan-resistant policies; the
/// current policy ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Per-frame bookkeeping for the LRU-K policy
struct LruKNode {
    /// Access timestamps, newest first, capped at k entries
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Timestamp of the k-th most recent access, if at least k are recorded
    fn kth_recent(&self, k: usize) -> Option<u64> {
        self.history.get(k - 1).copied()
    }

    /// Oldest timestamp still held in the bounded history
    fn oldest(&self) -> u64 {
        self.history.back().copied().unwrap_or(0)
    }
}

/// LRU-K replacement policy over a fixed universe of frame indices.
///
/// The victim is the evictable frame with the largest backward K-distance:
/// `now - t_k`, where `t_k` is the k-th most recent access, or +infinity for
/// frames with fewer than k recorded accesses. Infinite distances tie-break
/// on the oldest recorded access; equal finite distances fall back to the
/// smaller frame index.
pub struct LruKReplacer {
    node_store: HashMap<FrameId, LruKNode>,
    /// Logical clock; advanced by every access and eviction attempt
    current_timestamp: u64,
    /// Number of evictable nodes
    curr_size: usize,
    /// Size of the frame universe; frame ids must be below this
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "replacer k must be at least 1");
        Self {
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
            curr_size: 0,
            replacer_size: num_frames,
            k,
        }
    }

    /// Stamp `frame_id` with the current logical time, creating its node
    /// (non-evictable) on first access.
    ///
    /// A frame id outside the universe cannot come from caller input, only
    /// from a bug in the pool, and panics.
    pub fn record_access(&mut self, frame_id: FrameId, _access_type: AccessType) {
        assert!(
            frame_id < self.replacer_size,
            "invalid frame id {frame_id}"
        );
        self.current_timestamp += 1;
        let node = self.node_store.entry(frame_id).or_insert_with(LruKNode::new);
        node.history.push_front(self.current_timestamp);
        node.history.truncate(self.k);
    }

    /// Toggle evictability. Unknown frames are ignored; repeated calls with
    /// the same flag leave the evictable count untouched.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if let Some(node) = self.node_store.get_mut(&frame_id)
            && node.is_evictable != evictable
        {
            node.is_evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }
    }

    /// Drop a frame's node and history. Unknown frames are ignored.
    ///
    /// Removing a non-evictable node is permitted; the pool only does so for
    /// frames it has already verified to be unpinned.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.node_store.remove(&frame_id)
            && node.is_evictable
        {
            self.curr_size -= 1;
        }
    }

    /// Select, remove, and return the evictable frame with the largest
    /// backward K-distance, or None when no frame is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        self.current_timestamp += 1;
        let now = self.current_timestamp;

        // (frame, K-distance with None standing in for +infinity, oldest access)
        let mut victim: Option<(FrameId, Option<u64>, u64)> = None;
        for (&frame_id, node) in &self.node_store {
            if !node.is_evictable {
                continue;
            }
            let distance = node.kth_recent(self.k).map(|t| now - t);
            let oldest = node.oldest();
            let better = match victim {
                None => true,
                Some((best_id, best_distance, best_oldest)) => match (distance, best_distance) {
                    (None, None) => oldest < best_oldest,
                    (None, Some(_)) => true,
                    (Some(_), None) => false,
                    (Some(d), Some(b)) => d > b || (d == b && frame_id < best_id),
                },
            };
            if better {
                victim = Some((frame_id, distance, oldest));
            }
        }

        let (frame_id, _, _) = victim?;
        self.node_store.remove(&frame_id);
        self.curr_size -= 1;
        Some(frame_id)
    }

    /// Number of evictable frames
    pub fn size(&self) -> usize {
        self.curr_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(replacer: &mut LruKReplacer, frame_id: FrameId) {
        replacer.record_access(frame_id, AccessType::Unknown);
    }

    #[test]
    fn test_evict_empty() {
        let mut replacer = LruKReplacer::new(4, 2);
        assert_eq!(replacer.evict(), None);

        // a node that exists but is pinned is not a candidate either
        record(&mut replacer, 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_beats_finite() {
        let mut replacer = LruKReplacer::new(3, 2);

        // frames 0 and 1 reach k accesses; frame 2 stays at one
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        record(&mut replacer, 2);
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true);
        }

        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    fn test_largest_k_distance_wins() {
        let mut replacer = LruKReplacer::new(2, 2);

        // both frames have k accesses; frame 0's second-most-recent access
        // is older, so its backward K-distance is larger
        record(&mut replacer, 0);
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        record(&mut replacer, 1);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_ties_break_on_oldest_access() {
        let mut replacer = LruKReplacer::new(3, 3);

        // nobody reaches k = 3 accesses, so all distances are infinite
        record(&mut replacer, 1);
        record(&mut replacer, 0);
        record(&mut replacer, 2);
        record(&mut replacer, 0);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // frame 1 carries the earliest recorded access
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), Some(2));
    }

    #[test]
    fn test_set_evictable_size_accounting() {
        let mut replacer = LruKReplacer::new(4, 2);
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        assert_eq!(replacer.size(), 0);

        replacer.set_evictable(0, true);
        assert_eq!(replacer.size(), 1);

        // repeating the same flag is a no-op
        replacer.set_evictable(0, true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 2);

        replacer.set_evictable(0, false);
        assert_eq!(replacer.size(), 1);

        // unknown frames are ignored
        replacer.set_evictable(3, true);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_remove() {
        let mut replacer = LruKReplacer::new(4, 2);
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 2);

        replacer.remove(0);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(1));

        // removing an unknown frame is a no-op
        replacer.remove(0);
        assert_eq!(replacer.size(), 0);

        // removing a non-evictable node does not touch the evictable count
        record(&mut replacer, 2);
        replacer.remove(2);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_eviction_forgets_history() {
        let mut replacer = LruKReplacer::new(2, 2);
        record(&mut replacer, 0);
        record(&mut replacer, 0);
        replacer.set_evictable(0, true);
        assert_eq!(replacer.evict(), Some(0));

        // the frame comes back with a fresh, single-entry history
        record(&mut replacer, 1);
        record(&mut replacer, 1);
        record(&mut replacer, 0);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.evict(), Some(0));
    }

    #[test]
    #[should_panic(expected = "invalid frame id")]
    fn test_record_access_out_of_range() {
        let mut replacer = LruKReplacer::new(4, 2);
        replacer.record_access(4, AccessType::Unknown);
    }

    #[test]
    fn test_k_equal_one_degenerates_to_lru() {
        let mut replacer = LruKReplacer::new(3, 1);
        record(&mut replacer, 0);
        record(&mut replacer, 1);
        record(&mut replacer, 2);
        record(&mut replacer, 0);
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true);
        }

        // with k = 1 the distance is just recency of the last access
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(0));
    }
}
