pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{BybitClient, DiscordNotifier, KrakenClient, LocalStorage, OpenAiClient};
pub use config::Settings;
pub use core::{engine::ReportEngine, pipeline::ReportPipeline};
pub use utils::error::{Result, TrandError};
