//! Target partitioning.
//!
//! Targets are split across workers in config order: every partition gets
//! `n / w` targets and the first `n % w` partitions get one extra. No
//! partition is empty as long as `w <= n`.

/// Split `items` into `workers` contiguous partitions.
#[must_use]
pub fn partition<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if workers == 0 {
        return Vec::new();
    }
    let n = items.len();
    let base = n / workers;
    let remainder = n % workers;

    let mut partitions = Vec::with_capacity(workers);
    let mut items = items.into_iter();
    for i in 0..workers {
        let size = base + usize::from(i < remainder);
        partitions.push(items.by_ref().take(size).collect());
    }
    partitions
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let parts = partition(vec![1, 2, 3, 4], 2);
        assert_eq!(parts, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_remainder_goes_to_first_partitions() {
        let parts = partition(vec![1, 2, 3, 4, 5, 6, 7], 3);
        assert_eq!(parts, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]]);
    }

    #[test]
    fn test_single_worker_takes_everything() {
        let parts = partition(vec![1, 2, 3], 1);
        assert_eq!(parts, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_partitioning_preserves_order_and_count() {
        let items: Vec<u32> = (0..23).collect();
        let parts = partition(items.clone(), 5);
        assert_eq!(parts.len(), 5);
        let flattened: Vec<u32> = parts.into_iter().flatten().collect();
        assert_eq!(flattened, items);
    }

    #[test]
    fn test_no_empty_partitions_when_workers_fit() {
        for n in 1..=12usize {
            for w in 1..=n {
                let parts = partition((0..n).collect::<Vec<_>>(), w);
                assert!(parts.iter().all(|p| !p.is_empty()), "n={n} w={w}");
            }
        }
    }

    #[test]
    fn test_zero_workers_yields_nothing() {
        assert!(partition(vec![1], 0).is_empty());
    }

    #[test]
    fn test_more_workers_than_items_leaves_empty_tails() {
        let parts = partition(vec![1, 2], 4);
        assert_eq!(parts, vec![vec![1], vec![2], vec![], vec![]]);
    }
}
