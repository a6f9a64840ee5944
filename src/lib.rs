//! Mirror Deck Library
//!
//! Headless front end over the `mdeck-app` coordinator.

pub mod headless;

pub use headless::runner::{run_devices, run_headless, WatchOptions};
pub use headless::HeadlessEvent;
