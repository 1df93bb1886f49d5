//! [`OAuthProviderFactory`] for OneDrive.

use crate::cloud::OneDriveCloud;
use crate::registration::registration_link;
use bridge_traits::http::HttpClient;
use core_auth::oauth::{OAuthConfig, OAuthFlowManager, OAuthProvider, OAuthProviderFactory};
use core_auth::{BindingParams, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PROVIDER_NAME: &str = "onedrive";

/// Builds OAuth clients against the national cloud named by each binding's
/// account type.
pub struct OneDriveProviderFactory {
    http_client: Arc<dyn HttpClient>,
    app_name: String,
    request_timeout: Duration,
}

impl OneDriveProviderFactory {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        app_name: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            app_name: app_name.into(),
            request_timeout,
        }
    }

    pub fn oauth_config(&self, params: &BindingParams) -> OAuthConfig {
        let cloud = OneDriveCloud::from_account_type(&params.account_type);

        OAuthConfig {
            provider: PROVIDER_NAME.to_string(),
            client_id: params.client_id.clone(),
            client_secret: Some(params.client_secret.clone()),
            redirect_uri: params.redirect_uri.clone(),
            scopes: OneDriveCloud::scopes(),
            auth_url: cloud.authorize_url(),
            token_url: cloud.token_url(),
            request_timeout: self.request_timeout,
        }
    }
}

impl OAuthProviderFactory for OneDriveProviderFactory {
    fn provider(&self, params: &BindingParams) -> Result<Arc<dyn OAuthProvider>> {
        let config = self.oauth_config(params);
        debug!(token_url = %config.token_url, "Building OneDrive OAuth client");

        Ok(Arc::new(OAuthFlowManager::new(
            config,
            Arc::clone(&self.http_client),
        )))
    }

    fn registration_link(&self, redirect_uri: &str) -> Result<String> {
        Ok(registration_link(&self.app_name, redirect_uri))
    }
}
