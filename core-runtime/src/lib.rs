//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the offline audio crates:
//! - Logging and tracing setup
//! - Configuration with fail-fast bridge validation
//! - Event bus used as the user-facing notification channel

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{OfflineConfig, OfflineConfigBuilder, ProxyRule};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, EventStream};
