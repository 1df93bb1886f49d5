//! Persistence for the single account record
//!
//! The account lives in the host's settings store as one JSON document under
//! [`ACCOUNT_KEY`]. Writes replace the whole document; the settings store
//! guarantees single-key atomicity.

use crate::error::{BindingError, Result};
use crate::types::{Account, BindingParams};
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings key holding the serialized [`Account`].
pub const ACCOUNT_KEY: &str = "account";

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current record, or `None` when nothing has been stored.
    async fn load(&self) -> Result<Option<Account>>;

    /// Replace the record.
    async fn save(&self, account: &Account) -> Result<()>;

    /// Replace the record with a fresh, unbound one holding `params`.
    ///
    /// Tokens and profile data of a previously bound account are dropped;
    /// unknown keys in `extra` survive. An unreadable record is overwritten.
    async fn save_registration(&self, params: &BindingParams) -> Result<()> {
        let extra = match self.load().await {
            Ok(current) => current.map(|account| account.extra).unwrap_or_default(),
            Err(BindingError::Serialization(_)) => Default::default(),
            Err(e) => return Err(e),
        };

        let mut account = Account {
            extra,
            ..Account::default()
        };
        account.apply_params(params);
        self.save(&account).await
    }

    /// Remove the record. Clearing an absent record is not an error.
    async fn clear(&self) -> Result<()>;
}

/// [`AccountStore`] backed by a [`SettingsStore`].
#[derive(Clone)]
pub struct SettingsAccountStore {
    settings: Arc<dyn SettingsStore>,
}

impl SettingsAccountStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl AccountStore for SettingsAccountStore {
    async fn load(&self) -> Result<Option<Account>> {
        let Some(raw) = self.settings.get_string(ACCOUNT_KEY).await? else {
            return Ok(None);
        };

        let account: Account = serde_json::from_str(&raw).map_err(|e| {
            warn!(error = %e, "Stored account record is not valid JSON");
            BindingError::Serialization(format!("Failed to parse account record: {}", e))
        })?;

        Ok(Some(account))
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let raw = serde_json::to_string(account)?;
        self.settings.set_string(ACCOUNT_KEY, &raw).await?;

        debug!(bound = account.is_bound(), "Stored account record");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.settings.delete(ACCOUNT_KEY).await?;

        info!("Cleared account record");
        Ok(())
    }
}
