use crate::cli::{Args, Command, EvaluateArgs, PredictArgs, PrepareArgs, RenderArgs, TrainArgs};
use anyhow::{Context, Result};
use ball_boxes::annotations::{read_point_labels, read_predictions};
use ball_boxes::config::InferenceConfig;
use ball_boxes::pipeline::dataset::build_dataset;
use ball_boxes::pipeline::extract::extract_frames;
use ball_boxes::pipeline::inference::{
    predict_images, predict_video, render_predictions, resolve_image_inputs,
};
use ball_boxes::pipeline::persist::{load_dataset, save_dataset};
use ball_boxes::regressor::{evaluate as score, train_and_validate, MeanBoxRegressor, Regressor};
use ball_boxes::run_context::{read_metadata, write_metadata, DatasetMetadata};
use ball_boxes::video::codec_for;
use std::fs;
use std::path::Path;
use tracing::info;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "webm", "m4v"];

pub fn run(args: Args) -> Result<()> {
    match &args.command {
        Command::Prepare(cmd) => prepare(&args.backend, cmd),
        Command::Train(cmd) => train(cmd),
        Command::Predict(cmd) => predict(&args.backend, cmd),
        Command::Render(cmd) => render(&args.backend, cmd),
        Command::Evaluate(cmd) => evaluate(cmd),
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn prepare(backend: &str, cmd: &PrepareArgs) -> Result<()> {
    let config = cmd.to_config();
    config.validate()?;
    let codec = codec_for(backend)?;

    info!("Reading ball positions from {}", config.labels_path.display());
    let index = read_point_labels(&config.labels_path)
        .with_context(|| format!("Failed to read {}", config.labels_path.display()))?;
    info!("{} labeled frame(s)", index.len());

    let extraction = extract_frames(codec.as_ref(), &index, &config)?;
    if !extraction.decode_failures.is_empty() {
        tracing::warn!(
            "{} frame(s) could not be decoded: {:?}",
            extraction.decode_failures.len(),
            extraction.decode_failures
        );
    }

    let dataset = build_dataset(codec.as_ref(), &config)?;
    info!("Saving dataset to {}", config.output_dir.display());
    save_dataset(&dataset, &config.output_dir)?;

    let metadata = DatasetMetadata::new(&config, extraction, &dataset);
    let metadata_path = write_metadata(&metadata)?;
    info!("Run metadata written to {}", metadata_path.display());
    Ok(())
}

fn train(cmd: &TrainArgs) -> Result<()> {
    let config = cmd.to_config();
    if let Some(metadata) = read_metadata(&config.dataset_dir)? {
        info!(
            "Dataset prepared {} from {} ({} train / {} test)",
            metadata.created_at.format("%Y-%m-%d %H:%M:%S"),
            metadata.config.video_path.display(),
            metadata.train_samples,
            metadata.test_samples
        );
    }
    let dataset = load_dataset(&config.dataset_dir)
        .with_context(|| format!("Failed to load dataset from {}", config.dataset_dir.display()))?;

    let mut model = MeanBoxRegressor::new();
    let history = train_and_validate(&mut model, &dataset, &config)?;
    info!(
        "Trained on {} sample(s), validated on {}",
        history.train.samples, history.validation.samples
    );
    Ok(())
}

fn predict(backend: &str, cmd: &PredictArgs) -> Result<()> {
    let model = MeanBoxRegressor::load(&cmd.model)?;
    let image_size = model.input_size().unwrap_or_default();
    let codec = codec_for(backend)?;

    if is_video(&cmd.input) {
        fs::create_dir_all(&cmd.output_dir)?;
        let predictions_path = cmd.output_dir.join("predictions.csv");
        if predictions_path.exists() && !cmd.force {
            info!(
                "{} already exists, pass --force to regenerate",
                predictions_path.display()
            );
            return Ok(());
        }
        let config = InferenceConfig::new(
            image_size,
            cmd.display_width.unwrap_or(InferenceConfig::VIDEO_DISPLAY_WIDTH),
        );
        predict_video(codec.as_ref(), &model, &cmd.input, &predictions_path, config)?;
    } else {
        let inputs = resolve_image_inputs(&cmd.input)?;
        let config = InferenceConfig::new(
            image_size,
            cmd.display_width.unwrap_or(InferenceConfig::IMAGE_DISPLAY_WIDTH),
        );
        predict_images(
            codec.as_ref(),
            &model,
            &inputs,
            &cmd.output_dir.join("predictions"),
            config,
        )?;
    }
    Ok(())
}

fn render(backend: &str, cmd: &RenderArgs) -> Result<()> {
    let predictions = read_predictions(&cmd.predictions)
        .with_context(|| format!("Failed to read {}", cmd.predictions.display()))?;
    let codec = codec_for(backend)?;
    let written = render_predictions(
        codec.as_ref(),
        &cmd.input,
        &predictions,
        cmd.from_frame,
        cmd.display_width,
        &cmd.output_dir,
    )?;
    info!("Rendered {} frame(s) into {}", written, cmd.output_dir.display());
    Ok(())
}

fn evaluate(cmd: &EvaluateArgs) -> Result<()> {
    let dataset = load_dataset(&cmd.dataset_dir)?;
    let model = MeanBoxRegressor::load(&cmd.model)?;
    let evaluation = score(
        &model,
        dataset.test_images.view(),
        dataset.test_targets.view(),
        cmd.batch_size,
    )?;
    info!(
        "Test split: {} sample(s), mse={:.6}, mean_iou={:.4}",
        evaluation.samples, evaluation.mse, evaluation.mean_iou
    );
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video() {
        assert!(is_video(Path::new("match.mp4")));
        assert!(is_video(Path::new("clips/Match.MOV")));
        assert!(!is_video(Path::new("dataset/test_images.txt")));
        assert!(!is_video(Path::new("frame.png")));
        assert!(!is_video(Path::new("noext")));
    }
}
