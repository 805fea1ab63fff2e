//! Property tests for fold partitioning

use proptest::prelude::*;
use rsdm::folds::{partition, partition_stratified};
use rsdm::SdmError;

fn spread(sizes: &[usize]) -> usize {
    sizes.iter().max().unwrap_or(&0) - sizes.iter().min().unwrap_or(&0)
}

proptest! {
    #[test]
    fn partition_covers_every_sample_once(
        n in 2usize..200,
        k_frac in 0.0f64..1.0,
        shuffle in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let k = 2 + ((n - 2) as f64 * k_frac) as usize;
        let folds = partition(n, k, shuffle, Some(seed)).unwrap();
        prop_assert_eq!(folds.len(), k);

        let mut all: Vec<usize> = (0..k).flat_map(|f| folds.test_indices(f).to_vec()).collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        prop_assert!(spread(&folds.sizes()) <= 1);
    }

    #[test]
    fn train_and_test_are_complementary(
        n in 2usize..80,
        seed in any::<u64>(),
    ) {
        let k = n.min(5);
        let folds = partition(n, k, true, Some(seed)).unwrap();
        for (train, test) in folds.splits() {
            prop_assert_eq!(train.len() + test.len(), n);
            prop_assert!(train.iter().all(|i| !test.contains(i)));
        }
    }

    #[test]
    fn seeded_shuffle_is_deterministic(n in 2usize..100, seed in any::<u64>()) {
        let k = n.min(7);
        let a = partition(n, k, true, Some(seed)).unwrap();
        let b = partition(n, k, true, Some(seed)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn stratified_folds_balance_classes(
        labels in prop::collection::vec(0u8..3, 6..120),
        seed in any::<u64>(),
    ) {
        let labels: Vec<f64> = labels.into_iter().map(f64::from).collect();
        let k = 3;
        let folds = partition_stratified(&labels, k, true, Some(seed)).unwrap();
        prop_assert!(spread(&folds.sizes()) <= 1);

        for class in [0.0, 1.0, 2.0] {
            let per_fold: Vec<usize> = (0..k)
                .map(|f| folds.test_indices(f).iter().filter(|&&i| labels[i] == class).count())
                .collect();
            prop_assert!(spread(&per_fold) <= 1, "class {} spread {:?}", class, per_fold);
        }
    }

    #[test]
    fn invalid_fold_counts_rejected(n in 1usize..50, extra in 1usize..10) {
        let too_many = partition(n, n + extra, false, None);
        let is_invalid = matches!(too_many, Err(SdmError::InvalidFoldCount { .. }));
        prop_assert!(is_invalid);
        prop_assert!(partition(n.max(2), 1, false, None).is_err());
    }
}
