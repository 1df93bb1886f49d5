//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (HTTP client, settings store, clock)
//! and the OneDrive provider into a ready [`BindingFlow`]. Desktop hosts
//! typically enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`]; other hosts build a [`CoreConfig`] with their own
//! bridges and pass it to [`AccountService::new`].
//!
//! The request layer maps the five account operations onto this type and
//! turns [`CoreError::kind`] into response codes.

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{AccountInfo, BindRequest, CallbackOutcome, ErrorKind};
pub use core_runtime::config::CoreConfig;

use core_auth::{
    BindingFlow, BindingFlowConfig, MemoryTokenStore, SettingsAccountStore, TokenStore,
};
use core_runtime::events::{EventBus, EventStream};
use provider_onedrive::{GraphAccountRefresher, OneDriveProviderFactory};
use std::sync::Arc;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct AccountService {
    config: Arc<CoreConfig>,
    flow: Arc<BindingFlow>,
    event_bus: EventBus,
}

impl AccountService {
    /// Build the service with an in-process token store.
    pub fn new(config: CoreConfig) -> Result<Self> {
        Self::with_token_store(config, Arc::new(MemoryTokenStore::new()))
    }

    /// Build the service around an externally provided token store, e.g. one
    /// shared between several service instances.
    pub fn with_token_store(config: CoreConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::default();
        let accounts = Arc::new(SettingsAccountStore::new(Arc::clone(
            &config.settings_store,
        )));
        let providers = Arc::new(OneDriveProviderFactory::new(
            Arc::clone(&config.http_client),
            config.app_name.clone(),
            config.token_exchange_timeout,
        ));
        let refresher = Arc::new(
            GraphAccountRefresher::new(
                accounts.clone(),
                providers.clone(),
                Arc::clone(&config.http_client),
                Arc::clone(&config.clock),
            )
            .with_request_timeout(config.token_exchange_timeout),
        );

        let flow = BindingFlow::new(
            BindingFlowConfig::from(&config),
            tokens,
            accounts,
            providers,
            Arc::clone(&config.clock),
            event_bus.clone(),
        )
        .with_refresher(refresher);

        info!(
            callback_url = %config.callback_url(),
            pending_binding_ttl_secs = config.pending_binding_ttl.as_secs(),
            "Account service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            flow: Arc::new(flow),
            event_bus,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Stream of binding lifecycle events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Link to the provider's app-registration portal.
    pub fn apply(&self, redirect_uri: &str) -> Result<String> {
        Ok(self.flow.apply(redirect_uri)?)
    }

    /// Start binding; returns the provider's authorize URL.
    pub async fn bind(&self, request: BindRequest) -> Result<String> {
        Ok(self.flow.bind(request).await?)
    }

    /// Finish binding from the provider redirect.
    pub async fn callback(&self, state: &str, code: &str) -> Result<CallbackOutcome> {
        Ok(self.flow.callback(state, code).await?)
    }

    pub async fn unbind(&self) -> Result<()> {
        Ok(self.flow.unbind().await?)
    }

    pub async fn info(&self) -> AccountInfo {
        self.flow.info().await
    }

    /// Renew the access token if needed and re-read the drive profile.
    pub async fn refresh(&self) -> Result<()> {
        Ok(self.flow.refresh().await?)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Opens (or creates) the SQLite settings database at `database_path` and
/// uses the reqwest-backed HTTP client.
///
/// ```ignore
/// let service = core_service::bootstrap_desktop(
///     "https://drive.example.com",
///     "/var/lib/drive-link/settings.db",
/// )
/// .await?;
/// let url = service.apply("https://drive.example.com/api/account/callback")?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    public_base_url: impl Into<String>,
    database_path: impl Into<std::path::PathBuf>,
) -> Result<AccountService> {
    let settings = bridge_desktop::SqliteSettingsStore::new(database_path.into())
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    let http = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

    let config = CoreConfig::builder()
        .public_base_url(public_base_url)
        .settings_store(Arc::new(settings))
        .http_client(Arc::new(http))
        .build()?;

    AccountService::new(config)
}
