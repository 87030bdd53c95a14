//! Batch planning: split an ordered job selection into contiguous,
//! near-equal-sized groups, one per submission script.

/// Partition `items` into at most `num_scripts` contiguous batches.
///
/// With `n = items.len()` and `p = min(num_scripts, n)` each batch holds
/// `ceil(n / p)` items, except possibly the last. Every item lands in
/// exactly one batch and their concatenation preserves the input order.
/// An empty input yields no batches.
pub fn plan<T>(items: &[T], num_scripts: usize) -> Vec<&[T]> {
    if items.is_empty() || num_scripts == 0 {
        return Vec::new();
    }
    let p = num_scripts.min(items.len());
    let size = items.len().div_ceil(p);
    items.chunks(size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_even_split() {
        let jobs = ["job_2", "job_3", "job_4", "job_5"];
        let batches = plan(&jobs, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], &["job_2", "job_3"]);
        assert_eq!(batches[1], &["job_4", "job_5"]);
    }

    #[test]
    fn test_plan_uneven_split() {
        let jobs = [1, 2, 3, 4, 5];
        let batches = plan(&jobs, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], &[1, 2, 3]);
        assert_eq!(batches[1], &[4, 5]);
    }

    #[test]
    fn test_plan_more_scripts_than_jobs() {
        let jobs = ["a", "b"];
        let batches = plan(&jobs, 5);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_plan_empty() {
        let jobs: [&str; 0] = [];
        assert!(plan(&jobs, 3).is_empty());
    }

    #[test]
    fn test_plan_single_script() {
        let jobs = [1, 2, 3];
        let batches = plan(&jobs, 1);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], &[1, 2, 3]);
    }

    proptest! {
        #[test]
        fn prop_plan_covers_all(n in 0usize..64, p in 1usize..16) {
            let items: Vec<usize> = (0..n).collect();
            let batches = plan(&items, p);

            let total: usize = batches.iter().map(|b| b.len()).sum();
            prop_assert_eq!(total, n);
            prop_assert!(batches.len() <= p.min(n));
            prop_assert_eq!(batches.is_empty(), n == 0);

            let flat: Vec<usize> = batches.iter().flat_map(|b| b.iter().copied()).collect();
            prop_assert_eq!(flat, items);
        }
    }
}
