// Pipeline configuration
//
// Every stage receives its paths and tunables through these structs instead
// of reading fixed locations.

use crate::error::DatasetError;
use crate::pipeline::split::check_test_ratio;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "dataset";
pub const DEFAULT_BOX_RADIUS: i32 = 5;
pub const DEFAULT_TEST_RATIO: f64 = 0.10;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MODEL_PATH: &str = "detector.json";

/// Spatial size of the arrays fed to the model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl ImageSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            height: 270,
            width: 480,
        }
    }
}

/// What the dataset builder does with a box that crosses the image border.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EdgePolicy {
    /// Clamp coordinates into `[0, w] x [0, h]` so targets stay in [0, 1].
    #[default]
    Clamp,
    /// Fail the build with `BoxOutOfBounds`.
    Reject,
    /// Normalize the raw coordinates; targets may leave [0, 1].
    PassThrough,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineConfig {
    pub video_path: PathBuf,
    pub labels_path: PathBuf,
    pub output_dir: PathBuf,
    pub image_size: ImageSize,
    pub test_ratio: f64,
    pub seed: u64,
    pub box_radius: i32,
    pub edge_policy: EdgePolicy,
}

impl PipelineConfig {
    pub fn new(video_path: impl Into<PathBuf>, labels_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            labels_path: labels_path.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            image_size: ImageSize::default(),
            test_ratio: DEFAULT_TEST_RATIO,
            seed: DEFAULT_SEED,
            box_radius: DEFAULT_BOX_RADIUS,
            edge_policy: EdgePolicy::default(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        check_test_ratio(self.test_ratio)?;
        if self.box_radius <= 0 {
            return Err(DatasetError::malformed(
                "configuration",
                0,
                format!("box radius must be positive, got {}", self.box_radius),
            ));
        }
        if self.image_size.height == 0 || self.image_size.width == 0 {
            return Err(DatasetError::malformed(
                "configuration",
                0,
                "image size must be non-zero",
            ));
        }
        Ok(())
    }

    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    pub fn image_path(&self, frame_no: usize) -> PathBuf {
        self.images_dir().join(format!("{}.png", frame_no))
    }

    pub fn annotations_path(&self) -> PathBuf {
        self.output_dir.join("annotations.csv")
    }

    pub fn test_filenames_path(&self) -> PathBuf {
        test_filenames_path(&self.output_dir)
    }
}

pub fn test_filenames_path(output_dir: &Path) -> PathBuf {
    output_dir.join("test_images.txt")
}

/// Settings for the model stage.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrainConfig {
    pub dataset_dir: PathBuf,
    pub model_path: PathBuf,
    /// Number of images passed to `Regressor::predict` at once during validation.
    pub batch_size: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            batch_size: 16,
        }
    }
}

impl TrainConfig {
    pub fn history_path(&self) -> PathBuf {
        self.model_path.with_file_name("training_history.json")
    }
}

/// Settings for the inference stage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct InferenceConfig {
    /// Model input size.
    pub image_size: ImageSize,
    /// Width of the frame predictions are scaled to; height follows the aspect ratio.
    pub display_width: u32,
}

impl InferenceConfig {
    pub const VIDEO_DISPLAY_WIDTH: u32 = 960;
    pub const IMAGE_DISPLAY_WIDTH: u32 = 600;

    pub fn new(image_size: ImageSize, display_width: u32) -> Self {
        Self {
            image_size,
            display_width,
        }
    }
}
