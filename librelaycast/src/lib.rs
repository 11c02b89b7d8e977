//! Relaycast - forward new X posts into Telegram forum topics
//!
//! Each run polls upstream accounts for recent posts, skips the ones already
//! forwarded, publishes the rest into the account's topic of a Telegram
//! supergroup, and records what was delivered in small flat state files.

pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod rotation;
pub mod sink;
pub mod source;
pub mod state;
pub mod types;

// In-memory fakes are available for all builds to support integration tests
pub mod mock;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{RelayError, Result};
pub use relay::Relay;
pub use state::{FileStore, RunLock, StateStore, StateStoreExt};
pub use types::{Account, Post, ProcessedSet, RunOptions, RunReport};
