//! # Account Binding
//!
//! Links a single cloud-storage account to the service through the OAuth 2.0
//! authorization-code flow.
//!
//! ## Overview
//!
//! An administrator registers an application with the provider, submits its
//! credentials through [`BindingFlow::bind`], consents on the provider's
//! page, and lands on [`BindingFlow::callback`], which redeems the one-time
//! binding and persists the resulting tokens.
//!
//! ## Features
//!
//! - Single-use, TTL-bounded pending bindings ([`token_store`])
//! - Plain and composite OAuth `state` encodings ([`state`])
//! - Pluggable providers behind [`OAuthProvider`] / [`OAuthProviderFactory`]
//! - Account persistence through the host's settings store ([`account_store`])
//! - Binding lifecycle events on the core event bus

pub mod account_store;
pub mod error;
pub mod flow;
pub mod oauth;
pub mod state;
pub mod token_store;
pub mod types;

pub use account_store::{AccountStore, SettingsAccountStore, ACCOUNT_KEY};
pub use error::{BindingError, ErrorKind, Result};
pub use flow::{AccountRefresher, BindRequest, BindingFlow, BindingFlowConfig};
pub use oauth::{OAuthConfig, OAuthFlowManager, OAuthProvider, OAuthProviderFactory};
pub use state::StateToken;
pub use token_store::{MemoryTokenStore, TokenStore};
pub use types::{Account, AccountInfo, BindingParams, CallbackOutcome, PendingBinding, TokenResult};
