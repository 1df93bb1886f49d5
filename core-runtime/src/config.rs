//! # Core Configuration Module
//!
//! Builder-based configuration for the account binding core.
//!
//! ## Overview
//!
//! `CoreConfig` carries the host bridges (settings store, HTTP client, clock)
//! and the few knobs the binding flow needs. The builder validates everything
//! up front and returns actionable errors, so a misconfigured service fails at
//! startup instead of on the first callback.
//!
//! ## Required
//!
//! - `public_base_url` - absolute http(s) URL this service is reachable at;
//!   the OAuth callback URL is derived from it
//! - `SettingsStore` - durable storage for the account record
//! - `HttpClient` - outbound calls to the identity provider
//!
//! With the `desktop-shims` feature, `SqliteSettingsStore` (at
//! `database_path`) and `ReqwestHttpClient` are injected when not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .public_base_url("https://drive.example.com")
//!     .settings_store(Arc::new(MySettingsStore))
//!     .http_client(Arc::new(MyHttpClient))
//!     .build()?;
//!
//! assert_eq!(
//!     config.callback_url(),
//!     "https://drive.example.com/api/account/callback"
//! );
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Path of the OAuth callback endpoint, relative to `public_base_url`.
pub const CALLBACK_PATH: &str = "/api/account/callback";

/// Web front-end domain whose redirect URIs receive composite state tokens.
pub const DEFAULT_TRUSTED_FRONTEND_DOMAIN: &str = "olaindex.github.io";

/// Application name shown in the provider's app-registration portal.
pub const DEFAULT_APP_NAME: &str = "drive-link";

/// How long a pending binding stays redeemable.
pub const DEFAULT_PENDING_BINDING_TTL: Duration = Duration::from_secs(15 * 60);

/// Upper bound accepted for `pending_binding_ttl`.
pub const MAX_PENDING_BINDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Bound on a single code exchange with the provider.
pub const DEFAULT_TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Core configuration for the account binding service.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL this service is reachable at
    pub public_base_url: Url,

    /// Redirect URIs containing this domain get composite state tokens
    pub trusted_frontend_domain: String,

    /// Name used in the provider registration deep link
    pub app_name: String,

    /// Lifetime of a pending binding
    pub pending_binding_ttl: Duration,

    /// Timeout for the authorization-code exchange
    pub token_exchange_timeout: Duration,

    /// Durable settings storage holding the account record
    pub settings_store: Arc<dyn SettingsStore>,

    /// HTTP client for provider calls
    pub http_client: Arc<dyn HttpClient>,

    /// Time source for token expiry computation
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("public_base_url", &self.public_base_url.as_str())
            .field("trusted_frontend_domain", &self.trusted_frontend_domain)
            .field("app_name", &self.app_name)
            .field("pending_binding_ttl", &self.pending_binding_ttl)
            .field("token_exchange_timeout", &self.token_exchange_timeout)
            .field("settings_store", &"SettingsStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Absolute URL the provider redirects back to after consent.
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.public_base_url.as_str().trim_end_matches('/'),
            CALLBACK_PATH
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.public_base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "public_base_url must use http or https, got '{}'",
                self.public_base_url.scheme()
            )));
        }

        if self.trusted_frontend_domain.trim().is_empty() {
            return Err(Error::Config(
                "trusted_frontend_domain cannot be empty".to_string(),
            ));
        }

        if self.app_name.trim().is_empty() {
            return Err(Error::Config("app_name cannot be empty".to_string()));
        }

        if self.pending_binding_ttl.is_zero() || self.pending_binding_ttl > MAX_PENDING_BINDING_TTL
        {
            return Err(Error::Config(format!(
                "pending_binding_ttl must be between 1s and {}s, got {}s",
                MAX_PENDING_BINDING_TTL.as_secs(),
                self.pending_binding_ttl.as_secs()
            )));
        }

        if self.token_exchange_timeout.is_zero() {
            return Err(Error::Config(
                "token_exchange_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required to persist the account record. \
                 Desktop: enable the 'desktop-shims' feature and set database_path to use SqliteSettingsStore. \
                 Otherwise inject a store with .settings_store()."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to exchange authorization codes. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Otherwise inject a client with .http_client()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let path = database_path.cloned().ok_or_else(|| Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "No SettingsStore injected and no database_path set. \
                 Use .database_path() for the default SqliteSettingsStore or .settings_store()."
            .to_string(),
    })?;

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        Ok(runtime.block_on(SqliteSettingsStore::new(path))?)
    };

    // block_on panics inside an active runtime, so hop to a plain thread
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    public_base_url: Option<String>,
    trusted_frontend_domain: Option<String>,
    app_name: Option<String>,
    pending_binding_ttl: Option<Duration>,
    token_exchange_timeout: Option<Duration>,
    database_path: Option<PathBuf>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the base URL this service is reachable at (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().public_base_url("https://drive.example.com");
    /// ```
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Sets the web front-end domain that gets composite state tokens.
    pub fn trusted_frontend_domain(mut self, domain: impl Into<String>) -> Self {
        self.trusted_frontend_domain = Some(domain.into());
        self
    }

    /// Sets the application name used in the registration deep link.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Sets how long a pending binding stays redeemable.
    pub fn pending_binding_ttl(mut self, ttl: Duration) -> Self {
        self.pending_binding_ttl = Some(ttl);
        self
    }

    /// Sets the timeout for the authorization-code exchange.
    pub fn token_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.token_exchange_timeout = Some(timeout);
        self
    }

    /// Sets the SQLite file used by the default settings store.
    ///
    /// Only consulted with the `desktop-shims` feature when no settings store
    /// is injected.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when `public_base_url` is missing or invalid, or a
    ///   knob is out of range
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   desktop default applies
    pub fn build(self) -> Result<CoreConfig> {
        let raw_base_url = self.public_base_url.ok_or_else(|| {
            Error::Config(
                "public_base_url is required. Use .public_base_url() to set it.".to_string(),
            )
        })?;

        let public_base_url = Url::parse(&raw_base_url).map_err(|e| {
            Error::Config(format!("Invalid public_base_url '{}': {}", raw_base_url, e))
        })?;

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.database_path.as_ref())?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            public_base_url,
            trusted_frontend_domain: self
                .trusted_frontend_domain
                .unwrap_or_else(|| DEFAULT_TRUSTED_FRONTEND_DOMAIN.to_string()),
            app_name: self
                .app_name
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            pending_binding_ttl: self
                .pending_binding_ttl
                .unwrap_or(DEFAULT_PENDING_BINDING_TTL),
            token_exchange_timeout: self
                .token_exchange_timeout
                .unwrap_or(DEFAULT_TOKEN_EXCHANGE_TIMEOUT),
            settings_store,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
