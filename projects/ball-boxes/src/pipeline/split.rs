use crate::error::DatasetError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of each side of a train/test split, in permutation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Fails unless `test_ratio` lies strictly between 0 and 1.
pub fn check_test_ratio(test_ratio: f64) -> Result<(), DatasetError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(DatasetError::InvalidSplit(format!(
            "test ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }
    Ok(())
}

/// Shuffles `0..n` with a seeded RNG; the first `ceil(n * test_ratio)`
/// indices become the test set and the rest the training set.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Result<SplitIndices, DatasetError> {
    check_test_ratio(test_ratio)?;

    let n_test = (n as f64 * test_ratio).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(DatasetError::InvalidSplit(format!(
            "{} sample(s) with test ratio {} leaves train={} test={}",
            n, test_ratio, n_train, n_test
        )));
    }

    let mut permutation: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let train = permutation.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: permutation,
    })
}
