use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, MinnowError, Result, Timestamp};

/// How a frame access originated. Carried for future policy refinement;
/// the current policy treats all access types alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// Up to k access timestamps, oldest at the front. When k timestamps
    /// are recorded, the front is the k-th most recent access.
    history: VecDeque<Timestamp>,
    /// Whether this frame may currently be evicted
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// The k-th most recent access timestamp, if k accesses are recorded.
    fn kth_back(&self, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            self.history.front().copied()
        }
    }
}

struct ReplacerInner {
    /// Per-frame history and evictable bit
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Frames with fewer than k accesses, in first-access order
    /// (front = earliest first access)
    unfull: VecDeque<FrameId>,
    /// Frames with at least k accesses, ordered by the k-th most recent
    /// access timestamp. The smallest key has the largest backward
    /// k-distance.
    full: BTreeSet<(Timestamp, FrameId)>,
    /// Monotonically increasing access counter
    current_timestamp: Timestamp,
    /// Number of frames currently marked evictable
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the frame whose backward k-distance (current timestamp minus the
/// timestamp of the k-th previous access) is largest. A frame with fewer
/// than k recorded accesses has +inf backward distance; ties among those are
/// broken by the earliest first-access timestamp, i.e. classic LRU.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Number of frame slots this replacer tracks; fixed at construction
    num_frames: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0);
        Self {
            k,
            num_frames,
            inner: Mutex::new(ReplacerInner {
                frames: HashMap::new(),
                unfull: VecDeque::new(),
                full: BTreeSet::new(),
                current_timestamp: 0,
                num_evictable: 0,
            }),
        }
    }

    /// Records an access to the given frame at the current timestamp.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) -> Result<()> {
        if frame_id.as_usize() >= self.num_frames {
            return Err(MinnowError::InvalidFrameId(frame_id));
        }

        let inner = &mut *self.inner.lock();
        let timestamp = inner.current_timestamp;
        inner.current_timestamp += 1;

        let info = inner
            .frames
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new);
        let was_new = info.history.is_empty();
        let old_kth = info.kth_back(self.k);

        info.history.push_back(timestamp);
        while info.history.len() > self.k {
            info.history.pop_front();
        }
        let new_kth = info.kth_back(self.k);

        match (old_kth, new_kth) {
            (None, None) => {
                // Still unfull; register on first access
                if was_new {
                    inner.unfull.push_back(frame_id);
                }
            }
            (None, Some(kth)) => {
                // Crossed into the full cohort
                if let Some(pos) = inner.unfull.iter().position(|&f| f == frame_id) {
                    inner.unfull.remove(pos);
                }
                inner.full.insert((kth, frame_id));
            }
            (Some(old), Some(new)) => {
                // Re-key within the full cohort
                inner.full.remove(&(old, frame_id));
                inner.full.insert((new, frame_id));
            }
            (Some(_), None) => unreachable!("history never shrinks on access"),
        }

        Ok(())
    }

    /// Evicts the evictable frame with the largest backward k-distance,
    /// clearing its history. Returns None if nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let inner = &mut *self.inner.lock();

        if inner.num_evictable == 0 {
            return None;
        }

        let frames = &inner.frames;

        // Unfull frames have +inf distance; the front was first seen
        // earliest and wins the LRU tie-break
        let mut victim = inner
            .unfull
            .iter()
            .copied()
            .find(|f| frames[f].is_evictable);

        // Otherwise the full cohort in ascending k-th-back timestamp order
        if victim.is_none() {
            victim = inner
                .full
                .iter()
                .map(|&(_, f)| f)
                .find(|f| frames[f].is_evictable);
        }

        let frame_id = victim?;
        Self::forget_frame(inner, frame_id, self.k);
        Some(frame_id)
    }

    /// Toggles a frame's evictable bit. A frame with no recorded history is
    /// left untouched.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        if frame_id.as_usize() >= self.num_frames {
            return Err(MinnowError::InvalidFrameId(frame_id));
        }

        let inner = &mut *self.inner.lock();
        let Some(info) = inner.frames.get_mut(&frame_id) else {
            return Ok(());
        };
        if info.history.is_empty() {
            return Ok(());
        }

        if info.is_evictable != evictable {
            info.is_evictable = evictable;
            if evictable {
                inner.num_evictable += 1;
            } else {
                inner.num_evictable -= 1;
            }
        }

        Ok(())
    }

    /// Forgets a frame's history entirely. The frame must currently be
    /// evictable; a frame with no history is a no-op.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.as_usize() >= self.num_frames {
            return Err(MinnowError::InvalidFrameId(frame_id));
        }

        let inner = &mut *self.inner.lock();
        let Some(info) = inner.frames.get(&frame_id) else {
            return Ok(());
        };
        if !info.is_evictable {
            return Err(MinnowError::FrameNotEvictable(frame_id));
        }

        Self::forget_frame(inner, frame_id, self.k);
        Ok(())
    }

    /// Number of currently evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Drops a frame (known evictable) from every structure.
    fn forget_frame(inner: &mut ReplacerInner, frame_id: FrameId, k: usize) {
        let info = inner.frames.remove(&frame_id).expect("frame tracked");
        debug_assert!(info.is_evictable);

        if let Some(kth) = info.kth_back(k) {
            inner.full.remove(&(kth, frame_id));
        } else if let Some(pos) = inner.unfull.iter().position(|&f| f == frame_id) {
            inner.unfull.remove(pos);
        }
        inner.num_evictable -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(replacer: &LruKReplacer, id: u32) {
        replacer
            .record_access(FrameId::new(id), AccessType::Unknown)
            .unwrap();
    }

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_inf_distance_uses_lru() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        touch(&replacer, 1);
        touch(&replacer, 2);

        for i in 0..3 {
            replacer.set_evictable(FrameId::new(i), true).unwrap();
        }
        assert_eq!(replacer.size(), 3);

        // All have one access (< k), so all are at +inf distance; the
        // earliest first access goes first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_replacer_unfull_beats_full() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        touch(&replacer, 0);
        touch(&replacer, 1);

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        // Frame 1 has < k accesses, hence +inf distance; it loses first
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_largest_k_distance_wins() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0: t=0,1; frame 1: t=2,3; frame 2: t=4,5
        for id in 0..3 {
            touch(&replacer, id);
            touch(&replacer, id);
        }
        for id in 0..3 {
            replacer.set_evictable(FrameId::new(id), true).unwrap();
        }

        // k-th-back timestamps are 0, 2, 4; the smallest (largest backward
        // distance) is evicted first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_k_replacer_history_capped_at_k() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0 accessed many times early; frame 1 twice later
        for _ in 0..10 {
            touch(&replacer, 0);
        }
        touch(&replacer, 1);
        touch(&replacer, 1);

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        // Frame 0's k-th-back access (t=8) predates frame 1's (t=10)
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_non_evictable_skipped() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        touch(&replacer, 1);
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        replacer.set_evictable(FrameId::new(0), true).unwrap();
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false).unwrap();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_set_evictable_without_history_is_noop() {
        let replacer = LruKReplacer::new(2, 10);
        replacer.set_evictable(FrameId::new(3), true).unwrap();
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        touch(&replacer, 1);
        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        replacer.remove(FrameId::new(0)).unwrap();
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_remove_non_evictable_fails() {
        let replacer = LruKReplacer::new(2, 10);

        touch(&replacer, 0);
        assert!(matches!(
            replacer.remove(FrameId::new(0)),
            Err(MinnowError::FrameNotEvictable(_))
        ));

        // No history at all is a no-op
        replacer.remove(FrameId::new(5)).unwrap();
    }

    #[test]
    fn test_lru_k_replacer_out_of_range() {
        let replacer = LruKReplacer::new(2, 4);

        assert!(matches!(
            replacer.record_access(FrameId::new(4), AccessType::Unknown),
            Err(MinnowError::InvalidFrameId(_))
        ));
        assert!(matches!(
            replacer.set_evictable(FrameId::new(7), true),
            Err(MinnowError::InvalidFrameId(_))
        ));
        assert!(matches!(
            replacer.remove(FrameId::new(7)),
            Err(MinnowError::InvalidFrameId(_))
        ));
    }

    #[test]
    fn test_lru_k_replacer_reaccess_moves_frame_back() {
        let replacer = LruKReplacer::new(2, 10);

        for id in 0..2 {
            touch(&replacer, id);
            touch(&replacer, id);
        }
        // Touch frame 0 twice more: its k-th-back becomes t=4, past
        // frame 1's t=2, so frame 1 now has the larger backward distance
        touch(&replacer, 0);
        touch(&replacer, 0);

        replacer.set_evictable(FrameId::new(0), true).unwrap();
        replacer.set_evictable(FrameId::new(1), true).unwrap();

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }
}
