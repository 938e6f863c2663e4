// Persistence of the prepared dataset
//
// Arrays are written as .npy files under fixed names so the model stage can
// reload them without re-running extraction. Existing files are replaced.

use crate::config::test_filenames_path;
use crate::error::DatasetError;
use crate::pipeline::types::PreparedDataset;
use ndarray::{Array2, Array4};
use ndarray_npy::{read_npy, write_npy};
use std::fs;
use std::path::{Path, PathBuf};

pub const TRAIN_IMAGES: &str = "trainImages";
pub const TEST_IMAGES: &str = "testImages";
pub const TRAIN_TARGETS: &str = "trainTargets";
pub const TEST_TARGETS: &str = "testTargets";

pub fn array_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.npy", name))
}

/// The four arrays as read back from disk
#[derive(Debug, Clone)]
pub struct StoredDataset {
    pub train_images: Array4<f32>,
    pub test_images: Array4<f32>,
    pub train_targets: Array2<f32>,
    pub test_targets: Array2<f32>,
}

/// Writes the four arrays and `test_images.txt` into `dir`.
pub fn save_dataset(dataset: &PreparedDataset, dir: &Path) -> Result<(), DatasetError> {
    fs::create_dir_all(dir)?;

    write_npy(array_path(dir, TRAIN_IMAGES), &dataset.train.images)?;
    write_npy(array_path(dir, TEST_IMAGES), &dataset.test.images)?;
    write_npy(array_path(dir, TRAIN_TARGETS), &dataset.train.targets)?;
    write_npy(array_path(dir, TEST_TARGETS), &dataset.test.targets)?;

    tracing::info!("Saving testing filenames...");
    write_test_filenames(&test_filenames_path(dir), &dataset.test.filenames)?;
    Ok(())
}

pub fn load_dataset(dir: &Path) -> Result<StoredDataset, DatasetError> {
    Ok(StoredDataset {
        train_images: read_npy(array_path(dir, TRAIN_IMAGES))?,
        test_images: read_npy(array_path(dir, TEST_IMAGES))?,
        train_targets: read_npy(array_path(dir, TRAIN_TARGETS))?,
        test_targets: read_npy(array_path(dir, TEST_TARGETS))?,
    })
}

pub fn write_test_filenames(path: &Path, filenames: &[String]) -> Result<(), DatasetError> {
    fs::write(path, filenames.join("\n"))?;
    Ok(())
}

/// Non-empty lines of a filename list.
pub fn read_test_filenames(path: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}
