// Dataset builder: turns annotations.csv plus the extracted images into
// index-aligned train/test arrays.
//
// Samples are produced lazily by `SampleSource` and written straight into the
// preallocated array of the split they belong to, so only one decoded image
// is alive at a time.

use crate::annotations::{read_box_annotations, BoundingBox, BoxAnnotation};
use crate::config::{EdgePolicy, ImageSize, PipelineConfig};
use crate::error::DatasetError;
use crate::pipeline::split::train_test_split;
use crate::pipeline::types::{PreparedDataset, Sample, SplitArrays};
use crate::video::processor::progress_bar;
use crate::video::{Frame, ImageCodec};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use indicatif::ProgressBar;
use ndarray::{aview1, s, Array2, Array4, ArrayView3, Zip};
use std::path::Path;

/// Restartable, finite sequence of samples over a set of annotation rows.
#[derive(Clone, Copy)]
pub struct SampleSource<'a> {
    codec: &'a dyn ImageCodec,
    rows: &'a [BoxAnnotation],
    image_size: ImageSize,
    edge_policy: EdgePolicy,
}

impl<'a> SampleSource<'a> {
    pub fn new(
        codec: &'a dyn ImageCodec,
        rows: &'a [BoxAnnotation],
        image_size: ImageSize,
        edge_policy: EdgePolicy,
    ) -> Self {
        Self {
            codec,
            rows,
            image_size,
            edge_policy,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in file order. Each call starts from the first row again.
    pub fn iter(&self) -> SampleStream<'a, std::ops::Range<usize>> {
        SampleStream {
            source: *self,
            indices: 0..self.rows.len(),
        }
    }

    /// The rows at `indices`, in that order.
    pub fn select<'i>(
        &self,
        indices: &'i [usize],
    ) -> SampleStream<'a, std::iter::Copied<std::slice::Iter<'i, usize>>> {
        SampleStream {
            source: *self,
            indices: indices.iter().copied(),
        }
    }

    pub fn load(&self, row: usize) -> Result<Sample> {
        let annotation = &self.rows[row];
        let path = Path::new(&annotation.filename);
        // Annotations and images come from the same extraction pass; a gap
        // cannot be repaired here.
        if !path.is_file() {
            return Err(DatasetError::MissingImage {
                path: path.to_path_buf(),
            }
            .into());
        }

        let image = self
            .codec
            .read_image(path)
            .with_context(|| format!("Failed to load {}", annotation.filename))?;
        let (width, height) = image.dimensions();

        let bbox = self.apply_edge_policy(annotation, width, height)?;
        let target = bbox.normalize(width, height);

        Ok(Sample {
            image: resize_to(image, self.image_size),
            target,
            filename: annotation.filename.clone(),
        })
    }

    fn apply_edge_policy(
        &self,
        annotation: &BoxAnnotation,
        width: u32,
        height: u32,
    ) -> Result<BoundingBox, DatasetError> {
        let bbox = annotation.bbox();
        if bbox.is_within(width, height) {
            return Ok(bbox);
        }

        match self.edge_policy {
            EdgePolicy::Clamp => {
                let clamped = bbox.clamp_to(width, height);
                // A ball labeled entirely off-image clamps to a zero-area box
                if !clamped.has_area() {
                    return Err(self.out_of_bounds(annotation, bbox, width, height));
                }
                tracing::debug!("Clamping {:?} of {} to {}x{}", bbox, annotation.filename, width, height);
                Ok(clamped)
            }
            EdgePolicy::Reject => Err(self.out_of_bounds(annotation, bbox, width, height)),
            EdgePolicy::PassThrough => Ok(bbox),
        }
    }

    fn out_of_bounds(
        &self,
        annotation: &BoxAnnotation,
        bbox: BoundingBox,
        width: u32,
        height: u32,
    ) -> DatasetError {
        DatasetError::BoxOutOfBounds {
            filename: annotation.filename.clone(),
            bbox,
            width,
            height,
        }
    }
}

pub struct SampleStream<'a, I> {
    source: SampleSource<'a>,
    indices: I,
}

impl<I: Iterator<Item = usize>> Iterator for SampleStream<'_, I> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.indices.next().map(|row| self.source.load(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

/// Nearest-neighbour resize to the model input size.
pub fn resize_to(image: Frame, size: ImageSize) -> Frame {
    if image.dimensions() == (size.width, size.height) {
        return image;
    }
    imageops::resize(&image, size.width, size.height, FilterType::Nearest)
}

/// Reads `annotations.csv`, splits its rows and loads both sides.
pub fn build_dataset(codec: &dyn ImageCodec, config: &PipelineConfig) -> Result<PreparedDataset> {
    let annotations_path = config.annotations_path();
    let rows = read_box_annotations(&annotations_path)
        .with_context(|| format!("Failed to read {}", annotations_path.display()))?;
    build_from_rows(codec, &rows, config)
}

pub fn build_from_rows(
    codec: &dyn ImageCodec,
    rows: &[BoxAnnotation],
    config: &PipelineConfig,
) -> Result<PreparedDataset> {
    let split = train_test_split(rows.len(), config.test_ratio, config.seed)?;
    let source = SampleSource::new(codec, rows, config.image_size, config.edge_policy);

    tracing::info!(
        "Loading dataset: {} sample(s), {} train / {} test",
        rows.len(),
        split.train.len(),
        split.test.len()
    );

    let pb = progress_bar(rows.len() as u64)?;
    let train = fill_split(&source, &split.train, &pb)?;
    let test = fill_split(&source, &split.test, &pb)?;
    pb.finish_with_message("Done");

    Ok(PreparedDataset { train, test })
}

/// Streams the samples at `indices` into one contiguous array, then scales
/// the whole array to [0, 1] in a single pass.
fn fill_split(source: &SampleSource, indices: &[usize], pb: &ProgressBar) -> Result<SplitArrays> {
    let (height, width) = (
        source.image_size.height as usize,
        source.image_size.width as usize,
    );
    let mut images = Array4::<f32>::zeros((indices.len(), height, width, 3));
    let mut targets = Array2::<f32>::zeros((indices.len(), 4));
    let mut filenames = Vec::with_capacity(indices.len());

    for (slot, sample) in source.select(indices).enumerate() {
        let sample = sample?;
        let pixels = ArrayView3::from_shape((height, width, 3), sample.image.as_raw().as_slice())?;
        Zip::from(images.slice_mut(s![slot, .., .., ..]))
            .and(&pixels)
            .for_each(|dst, &src| *dst = src as f32);

        let target = sample.target.to_array();
        targets.row_mut(slot).assign(&aview1(&target));
        filenames.push(sample.filename);
        pb.inc(1);
    }

    images.mapv_inplace(|v| v / 255.0);

    Ok(SplitArrays {
        images,
        targets,
        filenames,
    })
}
