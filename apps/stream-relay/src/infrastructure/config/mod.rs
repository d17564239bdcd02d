//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ConfigError, DiscordSettings, RelayConfig, Secret, ServerSettings, StreamSettings,
    TwitterSettings,
};
