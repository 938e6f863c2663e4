#[cfg(test)]
pub mod memory;
#[cfg(feature = "opencv")]
pub mod opencv_reader;
pub mod processor;

use crate::annotations::BoundingBox;
use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// A decoded frame or image, RGB, row-major.
pub type Frame = RgbImage;

pub trait VideoSource {
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()>;
    /// Decodes the frame at the current position and advances by one.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Video/image I/O capability. Backends own decoding and encoding; the
/// dataset code only ever sees `Frame`s.
pub trait ImageCodec {
    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>>;
    fn read_image(&self, path: &Path) -> Result<Frame>;
    /// Encodes `frame` at `path`, replacing any existing file.
    fn write_image(&self, path: &Path, frame: &Frame) -> Result<()>;
    /// Like `write_image`, with `bbox` drawn as a rectangle.
    fn write_annotated(&self, path: &Path, frame: &Frame, bbox: &BoundingBox) -> Result<()>;
}

pub fn codec_for(backend: &str) -> Result<Box<dyn ImageCodec>> {
    match backend {
        #[cfg(feature = "opencv")]
        "opencv" => Ok(Box::new(opencv_reader::OpencvCodec::new())),
        _ => Err(anyhow::anyhow!(
            "Unsupported or disabled backend: {}",
            backend
        )),
    }
}
