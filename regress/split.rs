//! Seeded row partitioning: the 80/20 train/test split and the k-fold
//! partitions used by cross-validated grid search.
//!
//! All randomness flows from an explicit seed so that each seed's result is
//! independently reproducible (the seed loop itself is sequential).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffles `0..n` with a seeded RNG and splits off the leading fraction as
/// the test set. `test_fraction` is rounded up, matching the convention of
/// the reference splitter, so a 5-row table at 0.20 yields exactly 1 test row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_fraction).ceil() as usize).min(n);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    (train, test)
}

/// Contiguous (non-shuffled) k-fold partitions of `0..n`.
///
/// The first `n % k` folds receive one extra row. Returns one
/// (train, validation) index pair per fold.
pub fn k_fold(n: usize, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    assert!(k >= 2, "k-fold requires at least 2 folds");
    let base = n / k;
    let extra = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let len = base + usize::from(fold < extra);
        let end = start + len;
        let valid: Vec<usize> = (start..end).collect();
        let train: Vec<usize> = (0..start).chain(end..n).collect();
        folds.push((train, valid));
        start = end;
    }
    folds
}
