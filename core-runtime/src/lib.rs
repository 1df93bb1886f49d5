//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the account binding core:
//! - Logging and tracing setup
//! - Configuration builder with fail-fast bridge validation
//! - Event bus for account lifecycle events
//!
//! Other workspace crates depend on this one for those conventions; it holds
//! no binding logic of its own.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
