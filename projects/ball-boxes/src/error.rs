use std::path::PathBuf;
use thiserror::Error;

use crate::annotations::BoundingBox;

/// Errors raised by the data-preparation stages.
///
/// Stage entry points return `anyhow::Result`; these values travel inside it
/// and can be recovered with `downcast_ref::<DatasetError>()`.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Malformed input in {source_name} (line {line}): {reason}")]
    MalformedInput {
        source_name: String,
        line: u64,
        reason: String,
    },
    #[error("Failed to decode frame {frame_no}: {reason}")]
    FrameDecode { frame_no: usize, reason: String },
    #[error("Image referenced by annotations not found: {}", path.display())]
    MissingImage { path: PathBuf },
    #[error("Box {bbox:?} of {filename} lies outside its {width}x{height} image")]
    BoxOutOfBounds {
        filename: String,
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("NPY write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
    #[error("NPY read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),
}

impl DatasetError {
    pub fn malformed(source_name: impl Into<String>, line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}
