use crate::video::{Frame, VideoSource};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct ProcessingStats {
    pub processed_frames: usize,
    pub duration: Duration,
}

/// A trait for handling video frames. This separates the "how to process"
/// from the "how to read and orchestrate" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame_no: usize, frame: Frame) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(usize, Frame) -> Result<()>,
{
    fn process(&mut self, frame_no: usize, frame: Frame) -> Result<()> {
        self(frame_no, frame)
    }
}

pub fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow}, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Feeds every frame of `source`, from its current position, to `processor`
/// until the stream stops decoding.
pub fn process_video<P>(source: &mut dyn VideoSource, mut processor: P) -> Result<ProcessingStats>
where
    P: FrameProcessor,
{
    let start_time = Instant::now();
    let total_frames = source.frame_count()?;
    let pb = progress_bar(total_frames as u64)?;

    let mut processed_frames = 0;
    while let Ok(frame) = source.read_frame() {
        processor.process(processed_frames, frame)?;
        processed_frames += 1;
        pb.inc(1);
    }

    pb.finish_with_message("Done");

    Ok(ProcessingStats {
        processed_frames,
        duration: start_time.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::memory::{synthetic_video, MemoryCodec};
    use crate::video::ImageCodec;
    use std::path::Path;

    #[test]
    fn test_process_video_visits_frames_in_order() {
        let codec = MemoryCodec::new().with_video("clip.mp4", synthetic_video(4, 8, 6));
        let mut source = codec.open_video(Path::new("clip.mp4")).unwrap();

        let mut seen = Vec::new();
        let stats = process_video(source.as_mut(), |frame_no: usize, frame: Frame| -> Result<()> {
            seen.push((frame_no, frame.get_pixel(0, 0)[0]));
            Ok(())
        })
        .unwrap();

        assert_eq!(stats.processed_frames, 4);
        assert_eq!(seen, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_process_video_stops_at_undecodable_frame() {
        let mut frames = synthetic_video(5, 4, 4);
        frames[3] = None;
        let codec = MemoryCodec::new().with_video("clip.mp4", frames);
        let mut source = codec.open_video(Path::new("clip.mp4")).unwrap();

        let stats = process_video(source.as_mut(), |_: usize, _: Frame| -> Result<()> { Ok(()) }).unwrap();
        assert_eq!(stats.processed_frames, 3);
    }

    #[test]
    fn test_processor_error_aborts() {
        let codec = MemoryCodec::new().with_video("clip.mp4", synthetic_video(3, 4, 4));
        let mut source = codec.open_video(Path::new("clip.mp4")).unwrap();

        let result = process_video(source.as_mut(), |frame_no: usize, _: Frame| -> Result<()> {
            if frame_no == 1 {
                anyhow::bail!("boom");
            }
            Ok(())
        });
        assert!(result.is_err());
    }
}
