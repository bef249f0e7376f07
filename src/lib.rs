//! On-Air Light Daemon Library
//!
//! Mirrors camera-in-use state onto a Hue-compatible light so anyone near
//! the desk can see when the camera is live.
//!
//! ## Architecture (5 Components)
//!
//! 1. UsageProbe - Consent ledger traversal (is the camera held right now?)
//! 2. HueClient - Bridge REST adapter returning device-confirmed state
//! 3. LightReconciler - Desired vs observed state machine with off debounce
//! 4. LightScheduler - Fast tick + drift resync cadences in one owning task
//! 5. AppConfig - Environment-driven daemon configuration
//!
//! ## Design Principles
//!
//! - Observed state only ever comes from the device's own answers
//! - Commands are idempotent and retried by cadence, not by backoff
//! - One owning task, no shared mutable reconcile state

pub mod config;
pub mod error;
pub mod hue_client;
pub mod reconciler;
pub mod scheduler;
pub mod usage_probe;

pub use config::AppConfig;
pub use error::{Error, Result};
