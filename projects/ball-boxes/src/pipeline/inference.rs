// Inference stage: runs a fitted regressor over a video or a list of images,
// and renders stored predictions back onto video frames.

use crate::annotations::{BoundingBox, NormalizedBox, Prediction, PredictionWriter};
use crate::config::{ImageSize, InferenceConfig};
use crate::pipeline::dataset::resize_to;
use crate::pipeline::persist::read_test_filenames;
use crate::regressor::Regressor;
use crate::video::processor::{process_video, progress_bar};
use crate::video::{Frame, ImageCodec};
use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Resizes to the model input size and scales to a 1 x H x W x 3 batch in [0, 1].
pub fn frame_to_input(frame: Frame, size: ImageSize) -> Result<Array4<f32>> {
    let resized = resize_to(frame, size);
    let pixels = Array4::from_shape_vec(
        (1, size.height as usize, size.width as usize, 3),
        resized.into_raw(),
    )?;
    Ok(pixels.mapv(|v| v as f32 / 255.0))
}

/// Size of a frame scaled to `display_width`, keeping the aspect ratio.
pub fn display_size(width: u32, height: u32, display_width: u32) -> (u32, u32) {
    let ratio = display_width as f64 / width as f64;
    (display_width, (height as f64 * ratio) as u32)
}

fn to_display(frame: Frame, display_width: u32) -> Frame {
    let (width, height) = frame.dimensions();
    let (dw, dh) = display_size(width, height, display_width);
    if (dw, dh) == (width, height) {
        return frame;
    }
    imageops::resize(&frame, dw, dh, FilterType::Triangle)
}

fn predict_one(regressor: &dyn Regressor, input: Array4<f32>) -> Result<NormalizedBox> {
    let predictions = regressor.predict(input.view())?;
    if predictions.nrows() != 1 {
        return Err(anyhow!(
            "Expected one prediction, got {}",
            predictions.nrows()
        ));
    }
    NormalizedBox::from_slice(&predictions.row(0).to_vec())
        .ok_or_else(|| anyhow!("Prediction must have 4 values, got {}", predictions.ncols()))
}

/// Predicts every frame of the video and writes `predictions.csv`.
/// Boxes are in pixels of the frame scaled to `config.display_width`.
pub fn predict_video(
    codec: &dyn ImageCodec,
    regressor: &dyn Regressor,
    video_path: &Path,
    predictions_path: &Path,
    config: InferenceConfig,
) -> Result<usize> {
    let mut source = codec
        .open_video(video_path)
        .with_context(|| format!("Failed to open video at: '{}'", video_path.display()))?;
    let mut writer = PredictionWriter::create(predictions_path)
        .with_context(|| format!("Failed to create {}", predictions_path.display()))?;

    tracing::info!(
        "Predicting {} into {}",
        video_path.display(),
        predictions_path.display()
    );

    let stats = process_video(
        source.as_mut(),
        |frame_no: usize, frame: Frame| -> Result<()> {
            let (width, height) = frame.dimensions();
            let (dw, dh) = display_size(width, height, config.display_width);
            let target = predict_one(regressor, frame_to_input(frame, config.image_size)?)?;
            writer.write(&Prediction::new(frame_no, target.denormalize(dw, dh)))?;
            Ok(())
        },
    )?;
    writer.flush()?;

    tracing::info!(
        "Predicted {} frame(s) in {:.1}s",
        stats.processed_frames,
        stats.duration.as_secs_f64()
    );
    Ok(stats.processed_frames)
}

/// A `.txt` input is a list of image paths; anything else is one image.
pub fn resolve_image_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let is_list = input
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);
    if is_list {
        Ok(read_test_filenames(input)
            .with_context(|| format!("Failed to read image list {}", input.display()))?)
    } else {
        Ok(vec![input.to_path_buf()])
    }
}

/// Predicts each image and writes an annotated copy into `output_dir`.
pub fn predict_images(
    codec: &dyn ImageCodec,
    regressor: &dyn Regressor,
    image_paths: &[PathBuf],
    output_dir: &Path,
    config: InferenceConfig,
) -> Result<Vec<(PathBuf, BoundingBox)>> {
    fs::create_dir_all(output_dir)?;

    let mut results = Vec::with_capacity(image_paths.len());
    for path in image_paths {
        let frame = codec
            .read_image(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let target = predict_one(regressor, frame_to_input(frame.clone(), config.image_size)?)?;

        let display = to_display(frame, config.display_width);
        let (dw, dh) = display.dimensions();
        let bbox = target.denormalize(dw, dh);

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
        let output_path = output_dir.join(file_name);
        codec.write_annotated(&output_path, &display, &bbox)?;
        tracing::debug!("{} -> {:?}", path.display(), bbox);

        results.push((output_path, bbox));
    }

    tracing::info!("Annotated {} image(s) into {}", results.len(), output_dir.display());
    Ok(results)
}

/// Writes annotated frames from `from_frame` onward for every frame with a
/// stored prediction. Returns the number of frames written.
pub fn render_predictions(
    codec: &dyn ImageCodec,
    video_path: &Path,
    predictions: &BTreeMap<usize, BoundingBox>,
    from_frame: usize,
    display_width: u32,
    output_dir: &Path,
) -> Result<usize> {
    let mut source = codec
        .open_video(video_path)
        .with_context(|| format!("Failed to open video at: '{}'", video_path.display()))?;
    let total_frames = source.frame_count()?;
    if from_frame >= total_frames {
        return Err(anyhow!(
            "Start frame {} is past the end of the video (max frame number = {})",
            from_frame,
            total_frames.saturating_sub(1)
        ));
    }
    source.seek_to_frame(from_frame)?;
    fs::create_dir_all(output_dir)?;

    let pb = progress_bar((total_frames - from_frame) as u64)?;
    let mut written = 0;
    for frame_no in from_frame..total_frames {
        let Ok(frame) = source.read_frame() else {
            tracing::warn!("Stopped rendering at undecodable frame {}", frame_no);
            break;
        };
        pb.inc(1);

        let Some(bbox) = predictions.get(&frame_no) else {
            continue;
        };
        let display = to_display(frame, display_width);
        let output_path = output_dir.join(format!("frame_{:06}.png", frame_no));
        codec.write_annotated(&output_path, &display, bbox)?;
        written += 1;
    }
    pb.finish_with_message("Done");

    Ok(written)
}
