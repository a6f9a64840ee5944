//! # mdeck-core - Core Domain Types
//!
//! Foundation crate for Mirror Deck. Provides domain types, error handling,
//! event definitions and logging bootstrap.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`DeviceId`] - Opaque device identifier (adb serial)
//! - [`LogEntry`] - A single log line with level, source, and timestamp
//! - [`LogLevel`], [`LogSource`] - Severity and origin of a log entry
//! - [`MAX_LOG_LINES`] - Lines retained per log buffer
//!
//! ### Transactions (`transaction`)
//! - [`ParsedEvent`] - One classified install/push log line
//! - [`PendingTransaction`], [`CompletedTransaction`] - Correlation halves
//! - [`NotificationKey`] - Dedup key for user-visible notifications
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - stdout/stderr/exit signals of a mirroring process
//! - [`PresenceEvent`] - Device connect/disconnect batches
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use mdeck_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod transaction;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use events::{PresenceEvent, ProcessEvent};
pub use transaction::{
    CompletedTransaction, NotificationKey, Outcome, ParsedEvent, PendingTransaction,
    TransactionKind,
};
pub use types::{DeviceId, LogEntry, LogLevel, LogSource, MAX_LOG_LINES};
