//! Keeps the stored account's tokens and Graph profile current.
//!
//! After a successful binding the flow runs [`GraphAccountRefresher`] once,
//! in the background. It renews the access token when it is about to expire,
//! then reads the drive resource and stores the owner and quota under the
//! account's `extend` projection.

use crate::cloud::OneDriveCloud;
use crate::error::OneDriveError;
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_auth::types::format_expiry;
use core_auth::{Account, AccountRefresher, AccountStore, OAuthProviderFactory, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Renew tokens expiring within this window.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveResource {
    drive_type: Option<String>,
    owner: Option<Value>,
    quota: Option<Value>,
}

impl DriveResource {
    fn into_extend(self) -> Map<String, Value> {
        let mut extend = Map::new();
        if let Some(owner) = self.owner {
            extend.insert("owner".to_string(), owner);
        }
        if let Some(quota) = self.quota {
            extend.insert("quota".to_string(), quota);
        }
        if let Some(drive_type) = self.drive_type {
            extend.insert("drive_type".to_string(), Value::String(drive_type));
        }
        extend
    }
}

pub struct GraphAccountRefresher {
    accounts: Arc<dyn AccountStore>,
    providers: Arc<dyn OAuthProviderFactory>,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    request_timeout: Duration,
}

impl GraphAccountRefresher {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        providers: Arc<dyn OAuthProviderFactory>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            providers,
            http_client,
            clock,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn needs_refresh(&self, account: &Account, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(self.refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::zero());

        match account.expires_at() {
            Some(expires_at) => expires_at - now <= margin,
            None => true,
        }
    }

    /// Renew the access token in place. Returns whether anything changed.
    async fn renew_token(&self, account: &mut Account) -> Result<bool> {
        let now = self.clock.now();
        if !self.needs_refresh(account, now) {
            return Ok(false);
        }

        let Some(refresh_token) = account.refresh_token.clone() else {
            warn!("Access token is expiring and no refresh token is stored");
            return Ok(false);
        };

        let provider = self.providers.provider(&account.params())?;
        let tokens = provider.refresh_access_token(&refresh_token).await?;

        account.access_token_expires = Some(format_expiry(tokens.expires_at(now)));
        account.access_token = Some(tokens.access_token);
        account.refresh_token = tokens.refresh_token.or(Some(refresh_token));

        info!("Access token renewed");
        Ok(true)
    }

    async fn fetch_drive(
        &self,
        cloud: OneDriveCloud,
        access_token: &str,
    ) -> std::result::Result<Map<String, Value>, OneDriveError> {
        let request = HttpRequest::new(HttpMethod::Get, format!("{}me/drive", cloud.graph_url()))
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;
        check_status(&response)?;

        let drive: DriveResource = response.json()?;
        debug!(drive_type = ?drive.drive_type, "Fetched drive resource");
        Ok(drive.into_extend())
    }
}

fn check_status(response: &HttpResponse) -> std::result::Result<(), OneDriveError> {
    match response.status {
        status if (200..300).contains(&status) => Ok(()),
        401 => Err(OneDriveError::AuthRequired),
        429 => {
            let retry_after = response
                .header("retry-after")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0);
            Err(OneDriveError::Throttled(retry_after))
        }
        status => Err(OneDriveError::ApiError {
            status_code: status,
            message: response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string()),
        }),
    }
}

#[async_trait]
impl AccountRefresher for GraphAccountRefresher {
    #[instrument(skip(self))]
    async fn refresh(&self) -> Result<()> {
        let Some(mut account) = self.accounts.load().await?.filter(Account::is_bound) else {
            return Err(OneDriveError::NotBound.into());
        };

        let renewed_from = account.access_token.clone();
        if self.renew_token(&mut account).await? {
            // The account may have been unbound or rebound while the token endpoint answered
            let current = self
                .accounts
                .load()
                .await?
                .filter(|current| current.access_token == renewed_from);
            let Some(mut current) = current else {
                debug!("Account changed during token renewal, discarding tokens");
                return Ok(());
            };

            current.access_token = account.access_token.clone();
            current.refresh_token = account.refresh_token.clone();
            current.access_token_expires = account.access_token_expires.clone();
            self.accounts.save(&current).await?;
        }

        let Some(access_token) = account.access_token.clone() else {
            return Err(OneDriveError::NotBound.into());
        };
        let cloud = OneDriveCloud::from_account_type(&account.account_type);
        let extend = self.fetch_drive(cloud, &access_token).await?;

        // The account may have been unbound or rebound while Graph answered
        let current = self
            .accounts
            .load()
            .await?
            .filter(|current| current.access_token.as_deref() == Some(access_token.as_str()));
        let Some(mut current) = current else {
            debug!("Account changed during refresh, discarding profile");
            return Ok(());
        };

        current.extend = Some(extend);
        self.accounts.save(&current).await?;

        info!("Account profile refreshed");
        Ok(())
    }
}
