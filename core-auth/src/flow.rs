//! # Account Binding Flow
//!
//! Orchestrates linking a cloud-storage account through the OAuth 2.0
//! authorization-code flow.
//!
//! ## Lifecycle
//!
//! ```text
//! apply ──> registration deep link (no state)
//!
//! bind ──> PendingBinding in TokenStore ──> authorize URL
//!                    │
//!                    │  provider redirects with code + state
//!                    v
//! callback ──> take pending ──> exchange code ──> persist Account ──> refresh profile
//!                    │
//!                    └── unknown / expired / consumed ──> "Invalid state"
//!
//! unbind ──> Account cleared
//! info   ──> {owner, quota}
//! ```
//!
//! A pending binding is redeemable exactly once and only within its TTL.
//! Registration fields are persisted eagerly on `bind`, so the form shows the
//! last values entered even when the user abandons the provider's consent
//! page. Tokens are only written after a successful exchange; a failed
//! callback leaves the stored account untouched.
//!
//! `unbind` racing with an in-flight `callback` can leave the account bound:
//! the callback's write lands after the clear. There is no version check.

use crate::account_store::AccountStore;
use crate::error::{BindingError, Result};
use crate::oauth::OAuthProviderFactory;
use crate::state::StateToken;
use crate::token_store::TokenStore;
use crate::types::{format_expiry, AccountInfo, BindingParams, CallbackOutcome, PendingBinding};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::time::Clock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AccountEvent, CoreEvent, EventBus, Receiver};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Redirect used when a pending binding carries none.
pub const DEFAULT_POST_LOGIN_REDIRECT: &str = "/";

const SLUG_BYTES: usize = 32;

/// Refreshes provider-side data for the stored account after binding.
///
/// Invoked once per successful callback on a spawned task; failures are
/// logged and never reach the callback's caller.
#[async_trait]
pub trait AccountRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Knobs the flow needs from the service configuration.
#[derive(Debug, Clone)]
pub struct BindingFlowConfig {
    /// This service's OAuth callback URL, embedded in composite state tokens
    pub callback_url: String,
    /// Redirect URIs containing this domain get composite state tokens
    pub trusted_frontend_domain: String,
    pub pending_binding_ttl: Duration,
    pub token_exchange_timeout: Duration,
}

impl From<&CoreConfig> for BindingFlowConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            callback_url: config.callback_url(),
            trusted_frontend_domain: config.trusted_frontend_domain.clone(),
            pending_binding_ttl: config.pending_binding_ttl,
            token_exchange_timeout: config.token_exchange_timeout,
        }
    }
}

/// Input to [`BindingFlow::bind`].
#[derive(Clone, Default)]
pub struct BindRequest {
    pub account_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub post_login_redirect: String,
}

impl BindRequest {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("account_type", &self.account_type),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("post_login_redirect", &self.post_login_redirect),
        ];

        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(BindingError::Validation { field: *field }),
            None => Ok(()),
        }
    }

    fn params(&self) -> BindingParams {
        BindingParams {
            account_type: self.account_type.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }
}

impl fmt::Debug for BindRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindRequest")
            .field("account_type", &self.account_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("post_login_redirect", &self.post_login_redirect)
            .finish()
    }
}

/// The account binding state machine.
pub struct BindingFlow {
    config: BindingFlowConfig,
    tokens: Arc<dyn TokenStore>,
    accounts: Arc<dyn AccountStore>,
    providers: Arc<dyn OAuthProviderFactory>,
    refresher: Option<Arc<dyn AccountRefresher>>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl BindingFlow {
    pub fn new(
        config: BindingFlowConfig,
        tokens: Arc<dyn TokenStore>,
        accounts: Arc<dyn AccountStore>,
        providers: Arc<dyn OAuthProviderFactory>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            tokens,
            accounts,
            providers,
            refresher: None,
            clock,
            event_bus,
        }
    }

    /// Run `refresher` after every successful callback.
    pub fn with_refresher(mut self, refresher: Arc<dyn AccountRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    fn emit(&self, event: AccountEvent) {
        self.event_bus.emit(CoreEvent::Account(event));
    }

    /// Deep link into the provider's app-registration portal.
    #[instrument(skip(self))]
    pub fn apply(&self, redirect_uri: &str) -> Result<String> {
        if redirect_uri.trim().is_empty() {
            return Err(BindingError::Validation {
                field: "redirect_uri",
            });
        }

        self.providers.registration_link(redirect_uri)
    }

    /// Start a binding and return the provider's authorize URL.
    #[instrument(skip(self, request), fields(account_type = %request.account_type))]
    pub async fn bind(&self, request: BindRequest) -> Result<String> {
        request.validate()?;
        let params = request.params();

        self.accounts.save_registration(&params).await?;

        let slug = generate_slug();
        let state = StateToken::for_redirect(
            slug.clone(),
            &params.redirect_uri,
            &self.config.trusted_frontend_domain,
            &self.config.callback_url,
        );
        let state_token = state.encode();

        let provider = self.providers.provider(&params)?;
        let authorize_url = provider.authorize_url(&state_token)?;

        let pending = PendingBinding {
            slug: slug.clone(),
            state_token,
            params,
            post_login_redirect: request.post_login_redirect,
            created_at: self.clock.unix_timestamp(),
        };
        let raw = serde_json::to_string(&pending)?;
        self.tokens
            .put(&slug, &raw, self.config.pending_binding_ttl)
            .await?;

        info!(
            composite_state = matches!(state, StateToken::Composite { .. }),
            ttl_secs = self.config.pending_binding_ttl.as_secs(),
            "Binding started"
        );
        self.emit(AccountEvent::BindingStarted {
            account_type: pending.params.account_type,
        });

        Ok(authorize_url)
    }

    /// Complete a binding from the provider's redirect.
    #[instrument(skip(self, state, code))]
    pub async fn callback(&self, state: &str, code: &str) -> Result<CallbackOutcome> {
        let decoded = StateToken::decode(state);
        let slug = decoded.slug();

        let raw = if state.is_empty() || slug.is_empty() {
            None
        } else {
            self.tokens.take(slug).await?
        };

        let Some(raw) = raw else {
            // Stray entry keyed by the undecoded state; the slug itself is already gone
            if !state.is_empty() {
                self.tokens.delete(state).await?;
            }
            warn!("Callback with unknown or expired state");
            return Err(BindingError::InvalidState);
        };

        let pending: PendingBinding = serde_json::from_str(&raw)?;

        match self.complete(&pending, code).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "Binding failed");
                self.emit(AccountEvent::BindingFailed {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                Err(e)
            }
        }
    }

    async fn complete(&self, pending: &PendingBinding, code: &str) -> Result<CallbackOutcome> {
        let provider = self.providers.provider(&pending.params)?;

        let tokens = match timeout(
            self.config.token_exchange_timeout,
            provider.exchange_code(code),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(BindingError::Exchange(format!(
                    "Token exchange timed out after {}s",
                    self.config.token_exchange_timeout.as_secs()
                )))
            }
        };

        let expires = format_expiry(tokens.expires_at(self.clock.now()));

        let mut account = match self.accounts.load().await {
            Ok(current) => current.unwrap_or_default(),
            Err(BindingError::Serialization(e)) => {
                warn!(error = %e, "Replacing unreadable account record");
                Default::default()
            }
            Err(e) => return Err(e),
        };
        account.apply_params(&pending.params);
        // Profile data belongs to whatever account was bound before
        account.extend = None;
        account.access_token = Some(tokens.access_token);
        account.refresh_token = tokens.refresh_token;
        account.access_token_expires = Some(expires.clone());

        self.accounts.save(&account).await?;

        info!(
            account_type = %account.account_type,
            expires_at = %expires,
            "Account bound"
        );
        self.emit(AccountEvent::Bound {
            account_type: account.account_type.clone(),
            expires_at: expires,
        });

        self.spawn_refresh();

        let redirect = if pending.post_login_redirect.is_empty() {
            DEFAULT_POST_LOGIN_REDIRECT.to_string()
        } else {
            pending.post_login_redirect.clone()
        };

        Ok(CallbackOutcome { redirect })
    }

    fn spawn_refresh(&self) {
        let Some(refresher) = self.refresher.clone() else {
            return;
        };
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            match refresher.refresh().await {
                Ok(()) => {
                    debug!("Account profile refreshed after binding");
                    event_bus.emit(CoreEvent::Account(AccountEvent::ExtendRefreshed));
                }
                Err(e) => warn!(error = %e, "Account refresh after binding failed"),
            }
        });
    }

    /// Refresh tokens and profile data now, reporting the outcome.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let Some(refresher) = self.refresher.as_ref() else {
            return Ok(());
        };

        refresher.refresh().await?;
        self.emit(AccountEvent::ExtendRefreshed);
        Ok(())
    }

    /// Forget the stored account.
    #[instrument(skip(self))]
    pub async fn unbind(&self) -> Result<()> {
        self.accounts.clear().await?;

        info!("Account unbound");
        self.emit(AccountEvent::Unbound);
        Ok(())
    }

    /// Owner and quota of the bound account; empty when unknown.
    pub async fn info(&self) -> AccountInfo {
        match self.accounts.load().await {
            Ok(Some(account)) => account.info(),
            Ok(None) => AccountInfo::default(),
            Err(e) => {
                warn!(error = %e, "Could not read account record");
                AccountInfo::default()
            }
        }
    }
}

/// Random binding identifier, URL-safe and unpadded.
fn generate_slug() -> String {
    let mut bytes = [0u8; SLUG_BYTES];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
