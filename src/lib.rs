//! Workspace placeholder crate.
//!
//! This crate exposes the workspace feature flags that map onto the individual
//! crates (`core-service` and the desktop adapters it pulls in). Host
//! applications can depend on `drive-link-workspace` and enable
//! `desktop-shims` without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{AccountService, CoreError, Result};
