use crate::config::PipelineConfig;
use crate::pipeline::types::{ExtractionSummary, PreparedDataset};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "dataset_metadata.json";

/// Record of one preprocessing run, stored beside its artifacts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetMetadata {
    pub created_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub extraction: ExtractionSummary,
    pub train_samples: usize,
    pub test_samples: usize,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

impl DatasetMetadata {
    pub fn new(config: &PipelineConfig, extraction: ExtractionSummary, dataset: &PreparedDataset) -> Self {
        Self {
            created_at: Utc::now(),
            config: config.clone(),
            extraction,
            train_samples: dataset.train.len(),
            test_samples: dataset.test.len(),
            output_dir: config.output_dir.clone(),
        }
    }
}

pub fn write_metadata(metadata: &DatasetMetadata) -> Result<PathBuf> {
    fs::create_dir_all(&metadata.output_dir)?;
    let metadata_path = metadata.output_dir.join(METADATA_FILE);
    let content = serde_json::to_string_pretty(metadata)?;
    fs::write(&metadata_path, content)?;
    Ok(metadata_path)
}

/// Reads the metadata of a previous run, if `output_dir` holds one.
pub fn read_metadata(output_dir: &Path) -> Result<Option<DatasetMetadata>> {
    let metadata_path = output_dir.join(METADATA_FILE);
    if !metadata_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(metadata_path)?;
    let mut metadata: DatasetMetadata = serde_json::from_str(&content)?;
    metadata.output_dir = output_dir.to_path_buf();
    Ok(Some(metadata))
}
