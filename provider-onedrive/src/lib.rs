//! # OneDrive Provider
//!
//! Microsoft identity platform and Graph integration for account binding.
//!
//! ## Overview
//!
//! This module provides:
//! - Endpoint catalogue for the global and 21Vianet clouds
//! - App-registration deep link for the bind form
//! - [`OneDriveProviderFactory`], building OAuth clients per binding
//! - [`GraphAccountRefresher`], renewing tokens and caching drive owner and quota

pub mod cloud;
pub mod error;
pub mod factory;
pub mod refresher;
pub mod registration;

pub use cloud::{OneDriveCloud, SCOPES};
pub use error::{OneDriveError, Result};
pub use factory::OneDriveProviderFactory;
pub use refresher::GraphAccountRefresher;
pub use registration::registration_link;
