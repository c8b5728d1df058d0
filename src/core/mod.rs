pub mod engine;
pub mod indicators;
pub mod pipeline;
pub mod prompt;
pub mod schedule;

pub use crate::domain::ports::{Pipeline, Storage};
pub use engine::ReportEngine;
pub use pipeline::ReportPipeline;
