use ball_boxes::config::{
    EdgePolicy, ImageSize, PipelineConfig, TrainConfig, DEFAULT_BOX_RADIUS, DEFAULT_MODEL_PATH,
    DEFAULT_OUTPUT_DIR, DEFAULT_SEED, DEFAULT_TEST_RATIO,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video/image codec backend
    #[arg(long, global = true, default_value = "opencv", env = "BALL_BOXES_BACKEND")]
    pub backend: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract labeled frames from a video and build the train/test arrays
    Prepare(PrepareArgs),
    /// Fit the box regressor on a prepared dataset
    Train(TrainArgs),
    /// Predict boxes for a video (predictions.csv) or for images (annotated copies)
    Predict(PredictArgs),
    /// Draw the boxes of an existing predictions.csv onto video frames
    Render(RenderArgs),
    /// Score a model on the test split
    Evaluate(EvaluateArgs),
}

#[derive(clap::Args, Debug)]
pub struct PrepareArgs {
    /// Path to video file
    pub video: PathBuf,

    /// Path to csv with ball positions
    pub labels: PathBuf,

    /// Root directory for output artifacts
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, env = "BALL_BOXES_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Seed of the train/test shuffle
    #[arg(long, default_value_t = DEFAULT_SEED, env = "BALL_BOXES_SEED")]
    pub seed: u64,

    /// Fraction of samples held out for testing
    #[arg(long, default_value_t = DEFAULT_TEST_RATIO, env = "BALL_BOXES_TEST_RATIO")]
    pub test_ratio: f64,

    /// Half-width of the box drawn around each ball position, in pixels
    #[arg(long, default_value_t = DEFAULT_BOX_RADIUS, env = "BALL_BOXES_BOX_RADIUS")]
    pub box_radius: i32,

    /// Handling of boxes that cross the image border
    #[arg(long, value_enum, default_value_t = EdgePolicy::Clamp, env = "BALL_BOXES_EDGE_POLICY")]
    pub edge_policy: EdgePolicy,

    #[arg(long, default_value_t = 270, env = "BALL_BOXES_IMAGE_HEIGHT")]
    pub image_height: u32,

    #[arg(long, default_value_t = 480, env = "BALL_BOXES_IMAGE_WIDTH")]
    pub image_width: u32,
}

impl PrepareArgs {
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            video_path: self.video.clone(),
            labels_path: self.labels.clone(),
            output_dir: self.output_dir.clone(),
            image_size: ImageSize::new(self.image_height, self.image_width),
            test_ratio: self.test_ratio,
            seed: self.seed,
            box_radius: self.box_radius,
            edge_policy: self.edge_policy,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct TrainArgs {
    /// Directory holding the .npy arrays
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, env = "BALL_BOXES_OUTPUT_DIR")]
    pub dataset_dir: PathBuf,

    /// Where to save the trained model
    #[arg(long, default_value = DEFAULT_MODEL_PATH, env = "BALL_BOXES_MODEL")]
    pub model: PathBuf,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            dataset_dir: self.dataset_dir.clone(),
            model_path: self.model.clone(),
            batch_size: self.batch_size,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct PredictArgs {
    /// Video file, image file, or .txt list of image paths
    #[arg(short, long, default_value = "dataset/test_images.txt")]
    pub input: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL_PATH, env = "BALL_BOXES_MODEL")]
    pub model: PathBuf,

    /// Directory for predictions.csv or annotated images
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Width predictions are scaled to (960 for video, 600 for images)
    #[arg(long)]
    pub display_width: Option<u32>,

    /// Regenerate predictions.csv even if it exists
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Video the predictions were made on
    #[arg(short, long)]
    pub input: PathBuf,

    #[arg(long, default_value = "predictions.csv")]
    pub predictions: PathBuf,

    /// First frame to render
    #[arg(long, default_value_t = 0)]
    pub from_frame: usize,

    #[arg(long, default_value = "rendered")]
    pub output_dir: PathBuf,

    /// Must match the width used when predicting
    #[arg(long, default_value_t = 960)]
    pub display_width: u32,
}

#[derive(clap::Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, env = "BALL_BOXES_OUTPUT_DIR")]
    pub dataset_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL_PATH, env = "BALL_BOXES_MODEL")]
    pub model: PathBuf,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
}
