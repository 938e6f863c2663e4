// Box regressor capability
//
// Feature extraction and optimisation live behind `Regressor`; the pipeline
// only hands it [0, 1]-scaled N x H x W x 3 images and N x 4 targets.

use crate::annotations::NormalizedBox;
use crate::config::{ImageSize, TrainConfig};
use crate::pipeline::persist::StoredDataset;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use ndarray::{concatenate, Array2, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub trait Regressor {
    fn fit(&mut self, images: ArrayView4<f32>, targets: ArrayView2<f32>) -> Result<()>;
    /// One `startX, startY, endX, endY` row per input image.
    fn predict(&self, images: ArrayView4<f32>) -> Result<Array2<f32>>;
    fn save(&self, path: &Path) -> Result<()>;
    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;
}

/// Baseline that always predicts the mean training box.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MeanBoxRegressor {
    mean: Option<[f32; 4]>,
    input_size: Option<ImageSize>,
}

impl MeanBoxRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_size(&self) -> Option<ImageSize> {
        self.input_size
    }

    fn check_input(&self, images: &ArrayView4<f32>) -> Result<()> {
        let shape = images.shape();
        if shape[3] != 3 {
            return Err(anyhow!("Expected 3 channels, got {}", shape[3]));
        }
        if let Some(size) = self.input_size {
            if (shape[1], shape[2]) != (size.height as usize, size.width as usize) {
                return Err(anyhow!(
                    "Model expects {}x{} inputs, got {}x{}",
                    size.width,
                    size.height,
                    shape[2],
                    shape[1]
                ));
            }
        }
        Ok(())
    }
}

impl Regressor for MeanBoxRegressor {
    fn fit(&mut self, images: ArrayView4<f32>, targets: ArrayView2<f32>) -> Result<()> {
        if images.len_of(Axis(0)) != targets.nrows() {
            return Err(anyhow!(
                "{} images but {} targets",
                images.len_of(Axis(0)),
                targets.nrows()
            ));
        }
        if targets.ncols() != 4 {
            return Err(anyhow!("Targets must have 4 columns, got {}", targets.ncols()));
        }
        let mean = targets
            .mean_axis(Axis(0))
            .ok_or_else(|| anyhow!("Cannot fit on an empty training set"))?;

        let shape = images.shape();
        self.input_size = Some(ImageSize::new(shape[1] as u32, shape[2] as u32));
        self.mean = Some([mean[0], mean[1], mean[2], mean[3]]);
        Ok(())
    }

    fn predict(&self, images: ArrayView4<f32>) -> Result<Array2<f32>> {
        let mean = self
            .mean
            .ok_or_else(|| anyhow!("Model has not been fitted"))?;
        self.check_input(&images)?;

        let n = images.len_of(Axis(0));
        Ok(Array2::from_shape_fn((n, 4), |(_, col)| mean[col]))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to save model to {}", path.display()))
    }

    fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Runs `predict` over `images` in chunks of `batch_size`.
pub fn predict_batched(
    regressor: &dyn Regressor,
    images: ArrayView4<f32>,
    batch_size: usize,
) -> Result<Array2<f32>> {
    if batch_size == 0 {
        return Err(anyhow!("Batch size must be positive"));
    }
    let batches = images
        .axis_chunks_iter(Axis(0), batch_size)
        .map(|batch| regressor.predict(batch))
        .collect::<Result<Vec<_>>>()?;
    if batches.is_empty() {
        return Ok(Array2::zeros((0, 4)));
    }
    let views: Vec<_> = batches.iter().map(|b| b.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

pub fn mse(predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let diff = &predictions - &targets;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

pub fn mean_iou(predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
    let ious: Vec<f32> = predictions
        .rows()
        .into_iter()
        .zip(targets.rows())
        .filter_map(|(p, t)| {
            let p = NormalizedBox::from_slice(&p.to_vec())?;
            let t = NormalizedBox::from_slice(&t.to_vec())?;
            Some(p.iou(&t))
        })
        .collect();
    if ious.is_empty() {
        0.0
    } else {
        ious.iter().sum::<f32>() / ious.len() as f32
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub samples: usize,
    pub mse: f32,
    pub mean_iou: f32,
}

pub fn evaluate(
    regressor: &dyn Regressor,
    images: ArrayView4<f32>,
    targets: ArrayView2<f32>,
    batch_size: usize,
) -> Result<Evaluation> {
    let predictions = predict_batched(regressor, images, batch_size)?;
    Ok(Evaluation {
        samples: targets.nrows(),
        mse: mse(predictions.view(), targets),
        mean_iou: mean_iou(predictions.view(), targets),
    })
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrainingHistory {
    pub trained_at: DateTime<Utc>,
    pub train: Evaluation,
    pub validation: Evaluation,
}

/// Fits on the training split, scores both splits and writes the model and
/// its history next to each other.
pub fn train_and_validate(
    regressor: &mut dyn Regressor,
    dataset: &StoredDataset,
    config: &TrainConfig,
) -> Result<TrainingHistory> {
    tracing::info!(
        "Training started on {} sample(s)...",
        dataset.train_targets.nrows()
    );
    regressor.fit(dataset.train_images.view(), dataset.train_targets.view())?;

    let history = TrainingHistory {
        trained_at: Utc::now(),
        train: evaluate(
            regressor,
            dataset.train_images.view(),
            dataset.train_targets.view(),
            config.batch_size,
        )?,
        validation: evaluate(
            regressor,
            dataset.test_images.view(),
            dataset.test_targets.view(),
            config.batch_size,
        )?,
    };
    tracing::info!(
        "train_loss={:.6} val_loss={:.6} val_iou={:.4}",
        history.train.mse,
        history.validation.mse,
        history.validation.mean_iou
    );

    tracing::info!("Saving trained model to {}", config.model_path.display());
    regressor.save(&config.model_path)?;
    fs::write(
        config.history_path(),
        serde_json::to_string_pretty(&history)?,
    )?;

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array4};

    fn images(n: usize) -> Array4<f32> {
        Array4::from_elem((n, 4, 6, 3), 0.5)
    }

    #[test]
    fn test_mean_regressor_predicts_mean_box() {
        let targets = array![[0.1f32, 0.2, 0.3, 0.4], [0.3, 0.4, 0.5, 0.6]];
        let mut model = MeanBoxRegressor::new();
        model.fit(images(2).view(), targets.view()).unwrap();

        let predictions = model.predict(images(3).view()).unwrap();
        assert_eq!(predictions.shape(), &[3, 4]);
        for row in predictions.rows() {
            for (got, want) in row.iter().zip([0.2f32, 0.3, 0.4, 0.5]) {
                assert!((got - want).abs() < 1e-6);
            }
        }
        assert_eq!(model.input_size(), Some(ImageSize::new(4, 6)));
    }

    #[test]
    fn test_unfitted_or_mismatched_input_fails() {
        let model = MeanBoxRegressor::new();
        assert!(model.predict(images(1).view()).is_err());

        let mut model = MeanBoxRegressor::new();
        model
            .fit(images(1).view(), array![[0.0f32, 0.0, 1.0, 1.0]].view())
            .unwrap();
        let wrong = Array4::<f32>::zeros((1, 5, 6, 3));
        assert!(model.predict(wrong.view()).is_err());

        let mut model = MeanBoxRegressor::new();
        assert!(model
            .fit(images(0).view(), Array2::<f32>::zeros((0, 4)).view())
            .is_err());
        assert!(model
            .fit(images(2).view(), Array2::<f32>::zeros((1, 4)).view())
            .is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        let mut model = MeanBoxRegressor::new();
        model
            .fit(images(1).view(), array![[0.1f32, 0.2, 0.3, 0.4]].view())
            .unwrap();
        model.save(&path).unwrap();

        let loaded = MeanBoxRegressor::load(&path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_predict_batched_matches_single_pass() {
        let mut model = MeanBoxRegressor::new();
        model
            .fit(images(1).view(), array![[0.1f32, 0.2, 0.3, 0.4]].view())
            .unwrap();

        let all = images(7);
        let batched = predict_batched(&model, all.view(), 3).unwrap();
        let single = model.predict(all.view()).unwrap();
        assert_eq!(batched, single);

        let empty = predict_batched(&model, images(0).view(), 3).unwrap();
        assert_eq!(empty.shape(), &[0, 4]);
        assert!(predict_batched(&model, all.view(), 0).is_err());
    }

    #[test]
    fn test_metrics() {
        let targets = array![[0.0f32, 0.0, 0.5, 0.5], [0.5, 0.5, 1.0, 1.0]];
        assert_eq!(mse(targets.view(), targets.view()), 0.0);
        assert!((mean_iou(targets.view(), targets.view()) - 1.0).abs() < 1e-6);

        let shifted = array![[0.5f32, 0.5, 1.0, 1.0], [0.0, 0.0, 0.5, 0.5]];
        assert!((mse(shifted.view(), targets.view()) - 0.25).abs() < 1e-6);
        assert_eq!(mean_iou(shifted.view(), targets.view()), 0.0);
    }

    #[test]
    fn test_train_and_validate_writes_model_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = StoredDataset {
            train_images: images(4),
            test_images: images(1),
            train_targets: array![
                [0.1f32, 0.1, 0.2, 0.2],
                [0.1, 0.1, 0.2, 0.2],
                [0.3, 0.3, 0.4, 0.4],
                [0.3, 0.3, 0.4, 0.4]
            ],
            test_targets: array![[0.2f32, 0.2, 0.3, 0.3]],
        };
        let config = TrainConfig {
            dataset_dir: dir.path().to_path_buf(),
            model_path: dir.path().join("detector.json"),
            batch_size: 2,
        };

        let mut model = MeanBoxRegressor::new();
        let history = train_and_validate(&mut model, &dataset, &config).unwrap();
        assert_eq!(history.train.samples, 4);
        assert!((history.train.mse - 0.01).abs() < 1e-6);
        assert!(history.validation.mse < 1e-9);
        assert!((history.validation.mean_iou - 1.0).abs() < 1e-5);

        assert!(config.model_path.exists());
        let saved: TrainingHistory =
            serde_json::from_str(&fs::read_to_string(config.history_path()).unwrap()).unwrap();
        assert_eq!(saved.validation.samples, 1);
    }
}
