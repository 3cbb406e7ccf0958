//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline audio core and the
//! platform it runs on. Each trait represents a capability the core requires
//! but that is implemented differently per platform (desktop, web, mobile).
//!
//! ## Traits
//!
//! ### Networking & Storage
//! - [`HttpClient`](http::HttpClient) - Single-attempt HTTP fetches
//! - [`CacheStorage`](cache::CacheStorage) / [`CacheStore`](cache::CacheStore) -
//!   Named, versioned URL → response stores
//! - [`SettingsStore`](storage::SettingsStore) - Durable string slots
//!
//! ### User Interaction
//! - [`UserPrompt`](prompt::UserPrompt) - Confirmation for destructive actions
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and keep the distinction between network failures
//! ([`BridgeError::Network`]) and storage failures
//! ([`BridgeError::Storage`], [`BridgeError::QuotaExceeded`]), because the
//! core reacts to them differently.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod cache;
pub mod error;
pub mod http;
pub mod prompt;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use cache::{CacheStorage, CacheStore};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use prompt::UserPrompt;
pub use storage::SettingsStore;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
