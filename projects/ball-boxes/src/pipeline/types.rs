use crate::annotations::NormalizedBox;
use crate::video::Frame;
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};

/// Outcome of one frame-extraction pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSummary {
    pub frames_scanned: usize,
    pub extracted: usize,
    /// Frames with no point label (ball missing or occluded).
    pub unlabeled: usize,
    /// Labeled frames that could not be seeked to or decoded.
    pub decode_failures: Vec<usize>,
    /// Labels pointing past the end of the video.
    pub labels_beyond_video: usize,
}

/// One image with its regression target, before pixel scaling
pub struct Sample {
    /// Resized to the model input size.
    pub image: Frame,
    pub target: NormalizedBox,
    pub filename: String,
}

/// Index-aligned arrays for one side of the split
#[derive(Debug, Clone)]
pub struct SplitArrays {
    /// N x H x W x 3, values in [0, 1]
    pub images: Array4<f32>,
    /// N x 4: startX, startY, endX, endY
    pub targets: Array2<f32>,
    pub filenames: Vec<String>,
}

impl SplitArrays {
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub train: SplitArrays,
    pub test: SplitArrays,
}
