//! Property tests for the bounded top-k heap: for any insertion sequence,
//! the retained scores are exactly the k best of the full input.

use cumulus::index::heap::BoundedHeap;
use proptest::prelude::*;

proptest! {
    #[test]
    fn smallest_heap_keeps_k_smallest(
        scores in prop::collection::vec(0u32..10_000, 0..300),
        k in 0usize..24,
    ) {
        let mut heap = BoundedHeap::smallest(k);
        for (i, &s) in scores.iter().enumerate() {
            heap.insert(s, i as u64);
        }

        let retained: Vec<u32> = heap.into_sorted_vec().iter().map(|&(s, _)| s).collect();

        let mut expected = scores.clone();
        expected.sort_unstable();
        expected.truncate(k);

        prop_assert_eq!(retained, expected);
    }

    #[test]
    fn largest_heap_keeps_k_largest(
        scores in prop::collection::vec(-5_000i32..5_000, 0..300),
        k in 0usize..24,
    ) {
        let mut heap = BoundedHeap::largest(k);
        for (i, &s) in scores.iter().enumerate() {
            heap.insert(s, i as u64);
        }

        let retained: Vec<i32> = heap.into_sorted_vec().iter().map(|&(s, _)| s).collect();

        let mut expected = scores.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(k);

        prop_assert_eq!(retained, expected);
    }

    #[test]
    fn heap_size_never_exceeds_capacity(
        scores in prop::collection::vec(0u32..100, 0..200),
        k in 0usize..16,
    ) {
        let mut heap = BoundedHeap::smallest(k);
        for (i, &s) in scores.iter().enumerate() {
            heap.insert(s, i as u64);
            prop_assert!(heap.len() <= k);
            prop_assert_eq!(heap.len(), scores.len().min(k).min(i + 1));
        }
    }
}
