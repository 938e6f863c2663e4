// In-memory codec for tests: videos are lists of frames, images go through
// the `image` crate on disk so path-based checks behave as in production.

use super::{Frame, ImageCodec, VideoSource};
use crate::annotations::BoundingBox;
use anyhow::{anyhow, Context, Result};
use image::Rgb;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// `None` marks a frame that fails to decode.
pub type FrameList = Vec<Option<Frame>>;

#[derive(Default)]
pub struct MemoryCodec {
    videos: HashMap<PathBuf, FrameList>,
    pub annotated: RefCell<Vec<(PathBuf, BoundingBox)>>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, path: impl Into<PathBuf>, frames: FrameList) -> Self {
        self.videos.insert(path.into(), frames);
        self
    }
}

/// Solid frame whose red channel encodes `frame_no`.
pub fn solid_frame(width: u32, height: u32, frame_no: usize) -> Frame {
    Frame::from_pixel(width, height, Rgb([frame_no as u8, 64, 128]))
}

pub fn synthetic_video(frame_count: usize, width: u32, height: u32) -> FrameList {
    (0..frame_count)
        .map(|i| Some(solid_frame(width, height, i)))
        .collect()
}

impl ImageCodec for MemoryCodec {
    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        let frames = self
            .videos
            .get(path)
            .ok_or_else(|| anyhow!("Failed to open video file: {}", path.display()))?;
        Ok(Box::new(MemoryVideo {
            frames: frames.clone(),
            position: 0,
        }))
    }

    fn read_image(&self, path: &Path) -> Result<Frame> {
        Ok(image::open(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?
            .to_rgb8())
    }

    fn write_image(&self, path: &Path, frame: &Frame) -> Result<()> {
        frame
            .save(path)
            .with_context(|| format!("Failed to write image {}", path.display()))
    }

    fn write_annotated(&self, path: &Path, frame: &Frame, bbox: &BoundingBox) -> Result<()> {
        self.annotated
            .borrow_mut()
            .push((path.to_path_buf(), *bbox));
        self.write_image(path, frame)
    }
}

pub struct MemoryVideo {
    frames: FrameList,
    position: usize,
}

impl VideoSource for MemoryVideo {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.frames.len())
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(30.0)
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if frame_num >= self.frames.len() {
            return Err(anyhow!("Seek past end of stream: {}", frame_num));
        }
        self.position = frame_num;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let slot = self
            .frames
            .get(self.position)
            .ok_or_else(|| anyhow!("End of stream"))?;
        self.position += 1;
        slot.clone()
            .ok_or_else(|| anyhow!("Corrupt frame at {}", self.position - 1))
    }
}
