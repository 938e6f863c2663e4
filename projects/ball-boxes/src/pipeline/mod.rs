// Dataset preparation and inference stages

pub mod dataset;
pub mod extract;
pub mod inference;
pub mod persist;
pub mod split;
pub mod types;
