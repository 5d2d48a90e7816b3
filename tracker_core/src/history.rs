//! Bounded per-object detection history.
//!
//! Each object id owns an oldest-first ring buffer of at most `window`
//! snapshots. Appending to a full buffer evicts the oldest entry; entries
//! are never reordered or modified after insertion.

use crate::types::{DetectedObject, ObjectId};
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Debug)]
pub struct HistoryStore {
    window: usize,
    series: HashMap<ObjectId, VecDeque<DetectedObject>>,
    /// Sum of all series lengths, kept in step with every append/evict
    entries: usize,
}

impl HistoryStore {
    /// `window` is clamped to at least one entry.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            series: HashMap::new(),
            entries: 0,
        }
    }

    /// Append every object of `batch` to its own series, creating the
    /// series on first sight and evicting the oldest entry when full.
    pub fn record(&mut self, batch: &[DetectedObject]) {
        let window = self.window;
        for obj in batch {
            let series = self
                .series
                .entry(obj.id)
                .or_insert_with(|| VecDeque::with_capacity(window.min(16)));
            if series.len() >= window {
                series.pop_front();
            } else {
                self.entries += 1;
            }
            series.push_back(*obj);
        }
    }

    /// Oldest-first copy of one object's history.
    pub fn get(&self, id: ObjectId) -> Option<Vec<DetectedObject>> {
        self.series.get(&id).map(|s| s.iter().copied().collect())
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of snapshots across all ids.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Drop every id whose newest snapshot is older than
    /// `current_cycle - max_idle_cycles`. Returns how many ids were dropped.
    pub fn prune_stale(&mut self, current_cycle: u64, max_idle_cycles: u64) -> usize {
        let before = self.series.len();
        let mut freed = 0;
        self.series.retain(|_, s| {
            let keep = s
                .back()
                .is_some_and(|o| current_cycle.saturating_sub(o.cycle) <= max_idle_cycles);
            if !keep {
                freed += s.len();
            }
            keep
        });
        self.entries -= freed;
        before - self.series.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, SensorSet};
    use proptest::prelude::*;
    use sensor_models::SensorKind;

    fn snap(id: u64, cycle: u64) -> DetectedObject {
        DetectedObject {
            id: ObjectId(id),
            cycle,
            position: [cycle as f64, 0.0, 0.0],
            velocity: [0.0; 3],
            classification: Classification::Pedestrian,
            confidence: 0.5,
            sensors: SensorSet::single(SensorKind::Camera),
        }
    }

    #[test]
    fn creates_series_on_first_sight() {
        let mut store = HistoryStore::new(100);
        assert!(store.get(ObjectId(7)).is_none());
        store.record(&[snap(7, 0), snap(8, 0)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(ObjectId(7)).map(|s| s.len()), Some(1));
        assert_eq!(store.entry_count(), 2);
    }

    #[test]
    fn window_plus_five_keeps_last_window_in_order() {
        let window = 100;
        let mut store = HistoryStore::new(window);
        for cycle in 0..(window as u64 + 5) {
            store.record(&[snap(1, cycle)]);
        }
        let series = store.get(ObjectId(1)).unwrap();
        assert_eq!(series.len(), window);
        let cycles: Vec<u64> = series.iter().map(|o| o.cycle).collect();
        let expected: Vec<u64> = (5..window as u64 + 5).collect();
        assert_eq!(cycles, expected);
        assert_eq!(store.entry_count(), window);
    }

    #[test]
    fn prune_drops_only_idle_ids() {
        let mut store = HistoryStore::new(10);
        store.record(&[snap(1, 0), snap(2, 0)]);
        store.record(&[snap(1, 5)]);
        assert_eq!(store.prune_stale(6, 3), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(ObjectId(2)).is_none());
        assert_eq!(store.entry_count(), 2);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_window(
            window in 1usize..20,
            ids in prop::collection::vec(0u64..5, 0..200),
        ) {
            let mut store = HistoryStore::new(window);
            for (cycle, id) in ids.iter().enumerate() {
                store.record(&[snap(*id, cycle as u64)]);
                for known in 0..5 {
                    let len = store.get(ObjectId(known)).map_or(0, |s| s.len());
                    prop_assert!(len <= window);
                }
            }
            let total: usize = (0..5)
                .map(|id| store.get(ObjectId(id)).map_or(0, |s| s.len()))
                .sum();
            prop_assert_eq!(total, store.entry_count());
        }
    }
}
