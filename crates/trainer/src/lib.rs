pub mod config;
pub mod data;
pub mod dataset;
pub mod hub;
pub mod metrics;
pub mod pipeline;
pub mod schedule;
pub mod train;

pub use config::TrainerConfig;
pub use pipeline::{run_evaluation, run_training};
pub use train::Trainer;
