use super::{Frame, ImageCodec, VideoSource};
use crate::annotations::BoundingBox;
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::{self, Mat, Rect, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_POS_FRAMES},
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    source_fps: f64,
    total_frames: usize,
}

impl OpencvReader {
    pub fn new(path: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(path, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvReader: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;

        tracing::info!(
            "OpencvReader: opened {}, duration={:.2}s, fps={:.2}, stream_frames={}",
            path,
            raw_count as f64 / fps,
            fps,
            raw_count
        );

        Ok(Self {
            capture,
            source_fps: fps,
            total_frames: raw_count,
        })
    }
}

impl VideoSource for OpencvReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if !self.capture.set(CAP_PROP_POS_FRAMES, frame_num as f64)? {
            return Err(anyhow!("Failed to seek to frame {}", frame_num));
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }

        mat_to_frame(&frame)
    }
}

/// Codec backed by OpenCV's videoio/imgcodecs modules.
#[derive(Default)]
pub struct OpencvCodec;

impl OpencvCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for OpencvCodec {
    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(OpencvReader::new(path_str(path)?)?))
    }

    fn read_image(&self, path: &Path) -> Result<Frame> {
        let mat = imgcodecs::imread(path_str(path)?, imgcodecs::IMREAD_COLOR)?;
        if mat.empty() {
            return Err(anyhow!("Could not load image from {}", path.display()));
        }
        mat_to_frame(&mat)
    }

    fn write_image(&self, path: &Path, frame: &Frame) -> Result<()> {
        let mat = frame_to_mat(frame)?;
        write_mat(path, &mat)
    }

    fn write_annotated(&self, path: &Path, frame: &Frame, bbox: &BoundingBox) -> Result<()> {
        let mut mat = frame_to_mat(frame)?;
        let rect = Rect::new(bbox.x1, bbox.y1, bbox.x2 - bbox.x1, bbox.y2 - bbox.y1);
        let color = Scalar::new(0.0, 255.0, 0.0, 0.0); // Green
        imgproc::rectangle(&mut mat, rect, color, 2, imgproc::LINE_8, 0)?;
        write_mat(path, &mat)
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", path.display()))
}

fn write_mat(path: &Path, mat: &Mat) -> Result<()> {
    let written = imgcodecs::imwrite(path_str(path)?, mat, &Vector::<i32>::new())
        .with_context(|| format!("Failed to write image {}", path.display()))?;
    if !written {
        return Err(anyhow!("OpenCV refused to write {}", path.display()));
    }
    Ok(())
}

/// Convert an OpenCV Mat (BGR) to an RGB frame
fn mat_to_frame(mat: &Mat) -> Result<Frame> {
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color_def(mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    Frame::from_vec(size.width as u32, size.height as u32, buffer)
        .ok_or_else(|| anyhow!("Failed to create frame buffer from Mat data"))
}

/// Convert an RGB frame to an OpenCV Mat (BGR)
fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    let (width, height) = frame.dimensions();
    let mut rgb_mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb_mat.data_bytes_mut()?.copy_from_slice(frame.as_raw());

    let mut bgr_mat = Mat::default();
    imgproc::cvt_color_def(&rgb_mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr_mat)
}
