// Annotation record definitions
//
// This module contains the point labels read from the labeling tool, the
// bounding-box rows written by the frame extractor, and the prediction rows
// written by the inference stage, together with their CSV readers/writers.

use crate::error::DatasetError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::Path;

/// A row type with a fixed CSV column order.
pub trait CsvRecord: Serialize + DeserializeOwned {
    const HEADER: &'static [&'static str];
}

/// Ball position for one frame, in pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub frame_no: usize,
    pub ball_x: f64,
    pub ball_y: f64,
}

impl CsvRecord for PointRecord {
    const HEADER: &'static [&'static str] = &["frame_no", "ball_x", "ball_y"];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLabel {
    pub x: f64,
    pub y: f64,
}

/// Point labels keyed by frame number.
#[derive(Debug, Clone, Default)]
pub struct PointIndex {
    labels: BTreeMap<usize, PointLabel>,
}

impl PointIndex {
    pub fn get(&self, frame_no: usize) -> Option<&PointLabel> {
        self.labels.get(&frame_no)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = usize> + '_ {
        self.labels.keys().copied()
    }

    /// Labels whose frame number is not below `frame_count`.
    pub fn beyond(&self, frame_count: usize) -> usize {
        self.labels.range(frame_count..).count()
    }

    /// Builds the index, rejecting repeated frame numbers.
    pub fn from_records(
        records: impl IntoIterator<Item = PointRecord>,
        source_name: &str,
    ) -> Result<Self, DatasetError> {
        let mut labels = BTreeMap::new();
        for (row, record) in records.into_iter().enumerate() {
            if pixel(record.ball_x).is_none() || pixel(record.ball_y).is_none() {
                return Err(DatasetError::malformed(
                    source_name,
                    row as u64 + 2,
                    format!(
                        "ball position ({}, {}) of frame {} is not a pixel coordinate",
                        record.ball_x, record.ball_y, record.frame_no
                    ),
                ));
            }
            let label = PointLabel {
                x: record.ball_x,
                y: record.ball_y,
            };
            if labels.insert(record.frame_no, label).is_some() {
                return Err(DatasetError::malformed(
                    source_name,
                    row as u64 + 2,
                    format!("duplicate frame_no {}", record.frame_no),
                ));
            }
        }
        Ok(Self { labels })
    }
}

pub fn read_point_labels(path: &Path) -> Result<PointIndex, DatasetError> {
    let source_name = path.display().to_string();
    let records = read_records::<PointRecord>(path)?;
    PointIndex::from_records(records, &source_name)
}

pub fn parse_point_labels<I: Read>(input: I, source_name: &str) -> Result<PointIndex, DatasetError> {
    let records = parse_records::<PointRecord, I>(input, source_name)?;
    PointIndex::from_records(records, source_name)
}

/// Axis-aligned box in pixel coordinates
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Square of half-width `radius` around a point, truncating the point to
    /// whole pixels first. `None` if a corner does not fit in `i32`.
    pub fn around(x: f64, y: f64, radius: i32) -> Option<Self> {
        let cx = pixel(x)?;
        let cy = pixel(y)?;
        Some(Self {
            x1: cx.checked_sub(radius)?,
            y1: cy.checked_sub(radius)?,
            x2: cx.checked_add(radius)?,
            y2: cy.checked_add(radius)?,
        })
    }

    /// Positive width and height.
    pub fn has_area(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn is_within(&self, width: u32, height: u32) -> bool {
        let (w, h) = (width as i32, height as i32);
        self.x1 >= 0 && self.y1 >= 0 && self.x2 <= w && self.y2 <= h
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Expresses the box as fractions of the image width and height.
    pub fn normalize(&self, width: u32, height: u32) -> NormalizedBox {
        let (w, h) = (width as f64, height as f64);
        NormalizedBox {
            start_x: (self.x1 as f64 / w) as f32,
            start_y: (self.y1 as f64 / h) as f32,
            end_x: (self.x2 as f64 / w) as f32,
            end_y: (self.y2 as f64 / h) as f32,
        }
    }
}

/// Truncates `v` to a whole pixel; `None` for NaN, infinities and values
/// outside `i32`.
fn pixel(v: f64) -> Option<i32> {
    let t = v.trunc();
    (t.is_finite() && t >= i32::MIN as f64 && t <= i32::MAX as f64).then_some(t as i32)
}

/// Box as fractions of image width/height; the model's regression target.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
}

impl NormalizedBox {
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [start_x, start_y, end_x, end_y] => Some(Self {
                start_x: *start_x,
                start_y: *start_y,
                end_x: *end_x,
                end_y: *end_y,
            }),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.start_x, self.start_y, self.end_x, self.end_y]
    }

    pub fn denormalize(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f32, height as f32);
        BoundingBox {
            x1: (self.start_x * w).round() as i32,
            y1: (self.start_y * h).round() as i32,
            x2: (self.end_x * w).round() as i32,
            y2: (self.end_y * h).round() as i32,
        }
    }

    pub fn area(&self) -> f32 {
        (self.end_x - self.start_x).max(0.0) * (self.end_y - self.start_y).max(0.0)
    }

    pub fn iou(&self, other: &NormalizedBox) -> f32 {
        let ix = (self.end_x.min(other.end_x) - self.start_x.max(other.start_x)).max(0.0);
        let iy = (self.end_y.min(other.end_y) - self.start_y.max(other.start_y)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One row of annotations.csv
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoxAnnotation {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "ball_x1")]
    pub x1: i32,
    #[serde(rename = "ball_y1")]
    pub y1: i32,
    #[serde(rename = "ball_x2")]
    pub x2: i32,
    #[serde(rename = "ball_y2")]
    pub y2: i32,
}

impl CsvRecord for BoxAnnotation {
    const HEADER: &'static [&'static str] = &["Filename", "ball_x1", "ball_y1", "ball_x2", "ball_y2"];
}

impl BoxAnnotation {
    pub fn new(filename: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            filename: filename.into(),
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
        }
    }
}

pub fn read_box_annotations(path: &Path) -> Result<Vec<BoxAnnotation>, DatasetError> {
    read_records(path)
}

/// One row of predictions.csv, in display-frame pixels
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Prediction {
    #[serde(rename = "Frame_no")]
    pub frame_no: usize,
    #[serde(rename = "ball_x1")]
    pub x1: i32,
    #[serde(rename = "ball_y1")]
    pub y1: i32,
    #[serde(rename = "ball_x2")]
    pub x2: i32,
    #[serde(rename = "ball_y2")]
    pub y2: i32,
}

impl CsvRecord for Prediction {
    const HEADER: &'static [&'static str] = &["Frame_no", "ball_x1", "ball_y1", "ball_x2", "ball_y2"];
}

impl Prediction {
    pub fn new(frame_no: usize, bbox: BoundingBox) -> Self {
        Self {
            frame_no,
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
        }
    }
}

/// Predictions keyed by frame number; a later row for the same frame wins.
pub fn read_predictions(path: &Path) -> Result<BTreeMap<usize, BoundingBox>, DatasetError> {
    Ok(read_records::<Prediction>(path)?
        .into_iter()
        .map(|p| (p.frame_no, p.bbox()))
        .collect())
}

/// CSV writer that emits the header once, on creation.
pub struct RecordWriter<W: Write, R> {
    writer: csv::Writer<W>,
    _record: PhantomData<R>,
}

pub type BoxAnnotationWriter<W> = RecordWriter<W, BoxAnnotation>;
pub type PredictionWriter<W> = RecordWriter<W, Prediction>;

impl<R: CsvRecord> RecordWriter<File, R> {
    /// Truncates any existing file at `path`.
    pub fn create(path: &Path) -> Result<Self, DatasetError> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write, R: CsvRecord> RecordWriter<W, R> {
    pub fn new(inner: W) -> Result<Self, DatasetError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(R::HEADER)?;
        Ok(Self {
            writer,
            _record: PhantomData,
        })
    }

    pub fn write(&mut self, record: &R) -> Result<(), DatasetError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DatasetError> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn read_records<R: CsvRecord>(path: &Path) -> Result<Vec<R>, DatasetError> {
    let file = File::open(path)?;
    parse_records(file, &path.display().to_string())
}

pub fn parse_records<R: CsvRecord, I: Read>(
    input: I,
    source_name: &str,
) -> Result<Vec<R>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| csv_to_malformed(source_name, e))?
        .clone();
    let missing: Vec<&str> = R::HEADER
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(DatasetError::malformed(
            source_name,
            1,
            format!("header is missing column(s) {}", missing.join(", ")),
        ));
    }

    reader
        .deserialize()
        .map(|row| row.map_err(|e| csv_to_malformed(source_name, e)))
        .collect()
}

fn csv_to_malformed(source_name: &str, err: csv::Error) -> DatasetError {
    if err.is_io_error() {
        return DatasetError::Csv(err);
    }
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    DatasetError::malformed(source_name, line, err.to_string())
}
