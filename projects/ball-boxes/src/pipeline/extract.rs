// Frame extractor: writes one image and one annotation row per labeled frame

use crate::annotations::{BoundingBox, BoxAnnotation, BoxAnnotationWriter, PointIndex};
use crate::config::PipelineConfig;
use crate::error::DatasetError;
use crate::pipeline::types::ExtractionSummary;
use crate::video::processor::progress_bar;
use crate::video::{Frame, ImageCodec, VideoSource};
use anyhow::{Context, Result};
use std::fs;

pub fn extract_frames(
    codec: &dyn ImageCodec,
    index: &PointIndex,
    config: &PipelineConfig,
) -> Result<ExtractionSummary> {
    let mut source = codec
        .open_video(&config.video_path)
        .with_context(|| format!("Failed to open video at: '{}'", config.video_path.display()))?;
    extract_from_source(codec, source.as_mut(), index, config)
}

/// Walks `[0, frame_count)`, skipping unlabeled frames. A frame that fails to
/// seek or decode is logged and left out; every other error aborts the pass.
pub fn extract_from_source(
    codec: &dyn ImageCodec,
    source: &mut dyn VideoSource,
    index: &PointIndex,
    config: &PipelineConfig,
) -> Result<ExtractionSummary> {
    let images_dir = config.images_dir();
    fs::create_dir_all(&images_dir)
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;

    let annotations_path = config.annotations_path();
    let mut writer = BoxAnnotationWriter::create(&annotations_path)
        .with_context(|| format!("Failed to create {}", annotations_path.display()))?;

    let total_frames = source.frame_count()?;
    tracing::info!(
        "Video has {} frame(s) at {:.2} fps",
        total_frames,
        source.source_fps()?
    );
    let mut summary = ExtractionSummary {
        labels_beyond_video: index.beyond(total_frames),
        ..ExtractionSummary::default()
    };
    if summary.labels_beyond_video > 0 {
        tracing::warn!(
            "{} label(s) refer to frames past the end of the video ({} frames)",
            summary.labels_beyond_video,
            total_frames
        );
    }

    tracing::info!(
        "Extracting {} labeled frame(s) from {} into {}",
        index.len() - summary.labels_beyond_video,
        config.video_path.display(),
        images_dir.display()
    );

    let pb = progress_bar(total_frames as u64)?;
    for frame_no in 0..total_frames {
        pb.inc(1);
        summary.frames_scanned += 1;

        // Some frames don't have the ball or it is occluded
        let Some(label) = index.get(frame_no) else {
            summary.unlabeled += 1;
            continue;
        };

        let frame = match decode_frame(source, frame_no) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("{}; skipping", e);
                summary.decode_failures.push(frame_no);
                continue;
            }
        };

        let bbox = BoundingBox::around(label.x, label.y, config.box_radius).ok_or_else(|| {
            DatasetError::malformed(
                config.labels_path.display().to_string(),
                0,
                format!(
                    "box of radius {} around ({}, {}) for frame {} overflows pixel range",
                    config.box_radius, label.x, label.y, frame_no
                ),
            )
        })?;
        let image_path = config.image_path(frame_no);
        codec.write_image(&image_path, &frame)?;
        writer.write(&BoxAnnotation::new(image_path.display().to_string(), bbox))?;
        summary.extracted += 1;
    }
    writer.flush()?;
    pb.finish_with_message("Done");

    tracing::info!(
        "Extracted {} frame(s), {} unlabeled, {} failed to decode",
        summary.extracted,
        summary.unlabeled,
        summary.decode_failures.len()
    );

    Ok(summary)
}

fn decode_frame(source: &mut dyn VideoSource, frame_no: usize) -> Result<Frame, DatasetError> {
    source
        .seek_to_frame(frame_no)
        .and_then(|_| source.read_frame())
        .map_err(|e| DatasetError::FrameDecode {
            frame_no,
            reason: format!("{:#}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{parse_point_labels, read_box_annotations};
    use crate::video::memory::{synthetic_video, MemoryCodec};
    use std::path::Path;

    const LABELS: &str = "frame_no,ball_x,ball_y\n2,100,100\n5,200,150\n8,300,200\n";

    fn setup(frames: crate::video::memory::FrameList) -> (tempfile::TempDir, MemoryCodec, PipelineConfig) {
        let dir = tempfile::tempdir().unwrap();
        let codec = MemoryCodec::new().with_video("match.mp4", frames);
        let config =
            PipelineConfig::new("match.mp4", "labels.csv").with_output_dir(dir.path().join("dataset"));
        (dir, codec, config)
    }

    fn png_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .map(|ext| ext == "png")
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn test_extracts_only_labeled_frames() {
        let (_dir, codec, config) = setup(synthetic_video(10, 640, 360));
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();

        let summary = extract_frames(&codec, &index, &config).unwrap();
        assert_eq!(summary.frames_scanned, 10);
        assert_eq!(summary.extracted, 3);
        assert_eq!(summary.unlabeled, 7);
        assert!(summary.decode_failures.is_empty());

        assert_eq!(png_count(&config.images_dir()), 3);
        for frame_no in [2, 5, 8] {
            assert!(config.image_path(frame_no).exists());
        }
        assert!(!config.image_path(3).exists());

        let rows = read_box_annotations(&config.annotations_path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            BoxAnnotation::new(
                config.image_path(2).display().to_string(),
                BoundingBox {
                    x1: 95,
                    y1: 95,
                    x2: 105,
                    y2: 105
                }
            )
        );
        assert_eq!(rows[2].bbox(), BoundingBox::around(300.0, 200.0, 5).unwrap());
    }

    #[test]
    fn test_written_image_is_the_seeked_frame() {
        let (_dir, codec, config) = setup(synthetic_video(10, 32, 24));
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();
        extract_frames(&codec, &index, &config).unwrap();

        let image = codec.read_image(&config.image_path(5)).unwrap();
        assert_eq!(image.dimensions(), (32, 24));
        assert_eq!(image.get_pixel(0, 0)[0], 5);
    }

    #[test]
    fn test_decode_failure_is_skipped_not_fatal() {
        let mut frames = synthetic_video(10, 64, 48);
        frames[5] = None;
        let (_dir, codec, config) = setup(frames);
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();

        let summary = extract_frames(&codec, &index, &config).unwrap();
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.decode_failures, vec![5]);
        assert!(!config.image_path(5).exists());

        let rows = read_box_annotations(&config.annotations_path()).unwrap();
        let filenames: Vec<_> = rows.iter().map(|r| r.filename.clone()).collect();
        assert_eq!(
            filenames,
            vec![
                config.image_path(2).display().to_string(),
                config.image_path(8).display().to_string()
            ]
        );
    }

    #[test]
    fn test_rerun_overwrites_previous_output() {
        let (_dir, codec, config) = setup(synthetic_video(10, 16, 16));
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();

        extract_frames(&codec, &index, &config).unwrap();
        let summary = extract_frames(&codec, &index, &config).unwrap();
        assert_eq!(summary.extracted, 3);

        let content = fs::read_to_string(config.annotations_path()).unwrap();
        assert_eq!(content.matches("Filename").count(), 1);
        assert_eq!(read_box_annotations(&config.annotations_path()).unwrap().len(), 3);
    }

    #[test]
    fn test_labels_past_end_of_video_are_counted() {
        let (_dir, codec, config) = setup(synthetic_video(6, 16, 16));
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();

        let summary = extract_frames(&codec, &index, &config).unwrap();
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.labels_beyond_video, 1);
    }

    #[test]
    fn test_box_overflowing_pixel_range_is_malformed() {
        let (_dir, codec, mut config) = setup(synthetic_video(10, 16, 16));
        config.box_radius = i32::MAX;
        let index = parse_point_labels(LABELS.as_bytes(), "labels.csv").unwrap();

        let err = extract_frames(&codec, &index, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_missing_video_fails() {
        let (_dir, codec, mut config) = setup(synthetic_video(1, 4, 4));
        config.video_path = "other.mp4".into();
        let index = PointIndex::default();
        assert!(extract_frames(&codec, &index, &config).is_err());
    }
}
