//! Bounded best-k heap of (score, id) pairs.
//!
//! The container holds at most `capacity` pairs. Once full, an insert only
//! displaces the current worst entry when the new score beats it, so a full
//! scan keeps the k best scores seen at O(1) comparisons per rejected
//! candidate and O(log k) per accepted one.
//!
//! Two orders are supported: [`BoundedHeap::smallest`] keeps the k smallest
//! scores (nearest-neighbor pruning) and [`BoundedHeap::largest`] keeps the
//! k largest (training-time outlier tracking). Internally the root of the
//! heap is always the *worst* retained entry. Equal scores do not displace
//! anything; distinct pairs with equal scores may coexist and their mutual
//! order is unspecified.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
    Smallest,
    Largest,
}

/// A bounded heap retaining the best `capacity` (score, id) pairs.
#[derive(Debug, Clone)]
pub struct BoundedHeap<S, I> {
    capacity: usize,
    keep: Keep,
    entries: Vec<(S, I)>,
}

impl<S, I> Default for BoundedHeap<S, I> {
    fn default() -> Self {
        Self {
            capacity: 0,
            keep: Keep::Smallest,
            entries: Vec::new(),
        }
    }
}

impl<S: PartialOrd + Copy, I: Copy> BoundedHeap<S, I> {
    /// Keep the `capacity` smallest scores.
    pub fn smallest(capacity: usize) -> Self {
        Self {
            capacity,
            keep: Keep::Smallest,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Keep the `capacity` largest scores.
    pub fn largest(capacity: usize) -> Self {
        Self {
            capacity,
            keep: Keep::Largest,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` when `a` strictly beats `b` under this heap's order.
    fn better(&self, a: S, b: S) -> bool {
        let ord = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
        match self.keep {
            Keep::Smallest => ord == std::cmp::Ordering::Less,
            Keep::Largest => ord == std::cmp::Ordering::Greater,
        }
    }

    /// Offer a pair. A full heap ignores scores that do not strictly beat
    /// the current worst retained score.
    pub fn insert(&mut self, score: S, id: I) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push((score, id));
            self.sift_up(self.entries.len() - 1);
            return;
        }
        if self.better(score, self.entries[0].0) {
            self.entries[0] = (score, id);
            self.sift_down(0);
        }
    }

    /// Iterate retained pairs in heap order.
    pub fn iter(&self) -> impl Iterator<Item = &(S, I)> {
        self.entries.iter()
    }

    /// Consume the heap, returning pairs sorted best-first (ascending score
    /// for a smallest-heap, descending for a largest-heap). Order among
    /// equal scores is unspecified.
    pub fn into_sorted_vec(self) -> Vec<(S, I)> {
        let keep = self.keep;
        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            let ord = a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal);
            match keep {
                Keep::Smallest => ord,
                Keep::Largest => ord.reverse(),
            }
        });
        entries
    }

    // Heap property: a parent is never better than its children, so the
    // root is the worst retained entry.
    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.better(self.entries[parent].0, self.entries[i].0) {
                self.entries.swap(parent, i);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut worst = i;
            if left < len && self.better(self.entries[worst].0, self.entries[left].0) {
                worst = left;
            }
            if right < len && self.better(self.entries[worst].0, self.entries[right].0) {
                worst = right;
            }
            if worst == i {
                break;
            }
            self.entries.swap(i, worst);
            i = worst;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_k_smallest_from_descending_inserts() {
        // Scores inserted in reverse order [N, N-1, ..., 1]; a capacity-5
        // heap must end up holding exactly [1, 2, 3, 4, 5].
        let n = 100u32;
        let mut heap = BoundedHeap::smallest(5);
        for (id, score) in (1..=n).rev().enumerate() {
            heap.insert(score, id as u64);
        }
        assert_eq!(heap.len(), 5);
        let sorted = heap.into_sorted_vec();
        let scores: Vec<u32> = sorted.iter().map(|&(s, _)| s).collect();
        assert_eq!(scores, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_keeps_k_smallest_from_ascending_inserts() {
        let mut heap = BoundedHeap::smallest(3);
        for score in 0..50 {
            heap.insert(score as f32, score);
        }
        let sorted = heap.into_sorted_vec();
        let scores: Vec<f32> = sorted.iter().map(|&(s, _)| s).collect();
        assert_eq!(scores, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_largest_mode_keeps_maxima() {
        let mut heap = BoundedHeap::largest(4);
        for score in [3.0f32, 9.0, 1.0, 7.0, 5.0, 8.0, 2.0] {
            heap.insert(score, score as u64);
        }
        let sorted = heap.into_sorted_vec();
        let scores: Vec<f32> = sorted.iter().map(|&(s, _)| s).collect();
        assert_eq!(scores, vec![9.0, 8.0, 7.0, 5.0]);
    }

    #[test]
    fn test_underfilled_heap_returns_everything() {
        let mut heap = BoundedHeap::smallest(10);
        heap.insert(2.0f32, 0u64);
        heap.insert(1.0, 1);
        assert_eq!(heap.len(), 2);
        let sorted = heap.into_sorted_vec();
        assert_eq!(sorted, vec![(1.0, 1), (2.0, 0)]);
    }

    #[test]
    fn test_equal_scores_do_not_displace() {
        let mut heap = BoundedHeap::smallest(2);
        heap.insert(1.0f32, 10u64);
        heap.insert(1.0, 11);
        // Heap is full with worst score 1.0; another 1.0 is a no-op.
        heap.insert(1.0, 12);
        let mut ids: Vec<u64> = heap.into_sorted_vec().iter().map(|&(_, i)| i).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_zero_capacity_ignores_inserts() {
        let mut heap = BoundedHeap::smallest(0);
        heap.insert(1.0f32, 0u64);
        assert!(heap.is_empty());
        assert!(heap.into_sorted_vec().is_empty());
    }

    #[test]
    fn test_matches_full_sort_on_random_input() {
        // Same check the reference implementation ran against a large
        // random vector: heap contents equal the k-smallest of a full sort.
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(99);
        let scores: Vec<f32> = (0..5500).map(|_| rng.gen_range(0.0..1000.0)).collect();

        let mut heap = BoundedHeap::smallest(7);
        for (i, &s) in scores.iter().enumerate() {
            heap.insert(s, i as u64);
        }
        let from_heap: Vec<f32> = heap.into_sorted_vec().iter().map(|&(s, _)| s).collect();

        let mut sorted = scores;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(from_heap, &sorted[..7]);
    }

    #[test]
    fn test_min_degree_heap_over_integers() {
        // The training loop tracks (degree, centroid) pairs this way.
        let mut heap = BoundedHeap::smallest(3);
        for (centroid, degree) in [(0u64, 40u64), (1, 2), (2, 17), (3, 0), (4, 5)] {
            heap.insert(degree, centroid);
        }
        let sorted = heap.into_sorted_vec();
        assert_eq!(sorted[0], (0, 3));
        assert_eq!(sorted[1], (2, 1));
        assert_eq!(sorted[2], (5, 4));
    }
}
