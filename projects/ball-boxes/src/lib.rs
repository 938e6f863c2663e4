pub mod annotations;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod regressor;
pub mod run_context;
pub mod video;
