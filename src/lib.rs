pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};
pub use config::AppConfig;

pub use adapters::LocalStorage;
pub use core::{
    analyzer::AnalyzerPipeline, bootstrap::Launcher, collector::CollectorPipeline, etl::EtlEngine,
};
pub use utils::error::{PulseError, Result};
