//! Configuration file parsing for Mirror Deck
//!
//! Supports `<config_dir>/mirror-deck/config.toml` or an explicit path.

pub mod settings;
pub mod types;

pub use settings::{
    config_dir, default_config_path, init_config_dir, load_default_settings, load_settings,
};
pub use types::*;
