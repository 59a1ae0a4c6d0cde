pub mod config;
pub mod manager;


pub use config::{EngineConfig, LoggingSettings, Settings};
pub use manager::SettingsManager;
