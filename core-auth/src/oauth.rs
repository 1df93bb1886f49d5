//! OAuth 2.0 Authorization Code Flow
//!
//! Provider-agnostic pieces of RFC 6749 needed for account binding:
//! - Building authorize URLs that carry the binding's `state`
//! - Exchanging an authorization code for tokens (single attempt)
//! - Refreshing an access token (bounded retries on 5xx)
//!
//! # Security
//!
//! Authorization codes, client secrets and tokens are never logged. Token
//! endpoint error bodies are logged because providers only put error codes
//! and descriptions there.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager, OAuthProvider};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthConfig {
//!     provider: "onedrive".to_string(),
//!     client_id: "client-id".to_string(),
//!     client_secret: Some("client-secret".to_string()),
//!     redirect_uri: "https://drive.example.com/api/account/callback".to_string(),
//!     scopes: vec!["offline_access".to_string(), "files.readwrite.all".to_string()],
//!     auth_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize".to_string(),
//!     token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string(),
//!     request_timeout: Duration::from_secs(30),
//! };
//!
//! let provider = OAuthFlowManager::new(config, http_client);
//! let url = provider.authorize_url("state-token")?;
//! // Redirect the browser to `url`, then on callback:
//! let tokens = provider.exchange_code("code-from-callback").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{BindingError, Result};
use crate::types::{BindingParams, TokenResult};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::logging::strip_query;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};
use url::Url;

const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// One OAuth 2.0 identity provider, already configured with a client
/// registration.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// URL to send the browser to. `state` is embedded verbatim.
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Redeem an authorization code. Never retried; codes are single-use.
    async fn exchange_code(&self, code: &str) -> Result<TokenResult>;

    /// Obtain a fresh access token. A response without a new refresh token
    /// keeps the old one.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResult>;
}

/// Builds providers for a client registration.
///
/// The client id, secret and redirect URI come from the user at bind time,
/// so a provider cannot be constructed up front.
pub trait OAuthProviderFactory: Send + Sync {
    fn provider(&self, params: &BindingParams) -> Result<Arc<dyn OAuthProvider>>;

    /// Deep link into the provider's app-registration portal, pre-filled with
    /// `redirect_uri`.
    fn registration_link(&self, redirect_uri: &str) -> Result<String>;
}

/// OAuth 2.0 client configuration for one provider endpoint pair.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Label used in logs (e.g. "onedrive")
    pub provider: String,
    pub client_id: String,
    /// Absent for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Bound on each token endpoint call
    pub request_timeout: Duration,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// HTTP implementation of [`OAuthProvider`] over an injected [`HttpClient`].
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn token_request(&self, fields: &[(&str, &str)]) -> Result<HttpRequest> {
        let mut form: Vec<(&str, &str)> = fields.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(ref client_secret) = self.config.client_secret {
            form.push(("client_secret", client_secret.as_str()));
        }

        HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Accept", "application/json")
            .timeout(self.config.request_timeout)
            .form(&form)
            .map_err(|e| BindingError::Exchange(format!("Failed to encode token request: {}", e)))
    }

    /// Execute with both the transport timeout and an outer deadline, so a
    /// host client that ignores `HttpRequest::timeout` still cannot hang us.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, String> {
        match timeout(self.config.request_timeout, self.http_client.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "timed out after {}s",
                self.config.request_timeout.as_secs()
            )),
        }
    }
}

fn error_body(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

#[async_trait]
impl OAuthProvider for OAuthFlowManager {
    #[instrument(skip(self, state), fields(provider = %self.config.provider))]
    fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| BindingError::InvalidProviderUrl(format!("{}: {}", self.config.auth_url, e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);

        debug!(endpoint = %strip_query(url.as_str()), "Built authorization URL");
        Ok(url.to_string())
    }

    #[instrument(skip(self, code), fields(provider = %self.config.provider))]
    async fn exchange_code(&self, code: &str) -> Result<TokenResult> {
        let request = self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])?;

        debug!("Exchanging authorization code for tokens");

        let response = self.send(request).await.map_err(|e| {
            warn!(error = %e, "Token endpoint unreachable");
            BindingError::Exchange(e)
        })?;

        if !response.is_success() {
            let status = response.status;
            let body = error_body(&response);
            warn!(status, error = %body, "Token exchange rejected");
            return Err(BindingError::Exchange(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().map_err(|e| {
            BindingError::Exchange(format!("Malformed token response: {}", e))
        })?;

        info!(
            expires_in = ?token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code"
        );

        Ok(token_response.into_result(None))
    }

    #[instrument(skip(self, refresh_token), fields(provider = %self.config.provider))]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResult> {
        let request = self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])?;

        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .send(request.clone())
                .await
                .map_err(BindingError::TokenRefreshFailed)?;

            if response.is_success() {
                let token_response: TokenResponse = response.json().map_err(|e| {
                    BindingError::TokenRefreshFailed(format!("Malformed token response: {}", e))
                })?;

                info!(expires_in = ?token_response.expires_in, "Refreshed access token");
                return Ok(token_response.into_result(Some(refresh_token)));
            }

            let status = response.status;

            if response.is_client_error() {
                let body = error_body(&response);
                warn!(status, error = %body, "Token refresh rejected");
                return Err(BindingError::TokenRefreshFailed(format!(
                    "Token endpoint returned {}: {}",
                    status, body
                )));
            }

            if attempts >= MAX_REFRESH_ATTEMPTS {
                return Err(BindingError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {} - {}",
                    attempts,
                    status,
                    error_body(&response)
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                status,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

/// Token endpoint response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_result(self, previous_refresh_token: Option<&str>) -> TokenResult {
        TokenResult {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh_token.map(str::to_string)),
            expires_in: self.expires_in,
        }
    }
}

/// Some endpoints send `expires_in` as a string.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(secs)) => Some(secs),
        Some(Seconds::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct StubHttpClient {
        responses: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubHttpClient {
        fn with(responses: Vec<BridgeResult<HttpResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::OperationFailed("no stub response".into())))
        }
    }

    fn response(status: u16, body: &str) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn config() -> OAuthConfig {
        OAuthConfig {
            provider: "test".to_string(),
            client_id: "c1".to_string(),
            client_secret: Some("s1".to_string()),
            redirect_uri: "https://host/cb".to_string(),
            scopes: vec!["offline_access".to_string(), "files.read".to_string()],
            auth_url: "https://login.example.com/authorize".to_string(),
            token_url: "https://login.example.com/token".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn body_of(request: &HttpRequest) -> String {
        String::from_utf8(request.body.clone().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_authorize_url_embeds_state() {
        let manager = OAuthFlowManager::new(config(), StubHttpClient::with(vec![]));
        let url = Url::parse(&manager.authorize_url("abc+/=").unwrap()).unwrap();

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "c1");
        assert_eq!(pairs["redirect_uri"], "https://host/cb");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "offline_access files.read");
        assert_eq!(pairs["state"], "abc+/=");
    }

    #[test]
    fn test_authorize_url_invalid_endpoint() {
        let mut bad = config();
        bad.auth_url = "not a valid url".to_string();
        let manager = OAuthFlowManager::new(bad, StubHttpClient::with(vec![]));

        assert!(matches!(
            manager.authorize_url("s"),
            Err(BindingError::InvalidProviderUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let http = StubHttpClient::with(vec![response(
            200,
            r#"{"access_token":"A","refresh_token":"R","expires_in":3600,"token_type":"Bearer"}"#,
        )]);
        let manager = OAuthFlowManager::new(config(), http.clone());

        let tokens = manager.exchange_code("the-code").await.unwrap();
        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R"));
        assert_eq!(tokens.expires_in, Some(3600));

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));
        let form: HashMap<String, String> = serde_urlencoded::from_str(&body_of(&requests[0])).unwrap();
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "the-code");
        assert_eq!(form["client_secret"], "s1");
        assert_eq!(form["redirect_uri"], "https://host/cb");
    }

    #[tokio::test]
    async fn test_exchange_code_is_not_retried() {
        let http = StubHttpClient::with(vec![
            response(503, "unavailable"),
            response(200, r#"{"access_token":"A"}"#),
        ]);
        let manager = OAuthFlowManager::new(config(), http.clone());

        let err = manager.exchange_code("code").await.unwrap_err();
        assert!(matches!(err, BindingError::Exchange(ref msg) if msg.contains("503")));
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_exchange_code_malformed_body() {
        let http = StubHttpClient::with(vec![response(200, "<html>")]);
        let manager = OAuthFlowManager::new(config(), http);

        assert!(matches!(
            manager.exchange_code("code").await,
            Err(BindingError::Exchange(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_network_error() {
        let http = StubHttpClient::with(vec![Err(BridgeError::Timeout("slow".into()))]);
        let manager = OAuthFlowManager::new(config(), http);

        assert!(matches!(
            manager.exchange_code("code").await,
            Err(BindingError::Exchange(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_retries_server_errors() {
        let http = StubHttpClient::with(vec![
            response(500, "oops"),
            response(502, "oops"),
            response(200, r#"{"access_token":"A2","expires_in":"1800"}"#),
        ]);
        let manager = OAuthFlowManager::new(config(), http.clone());

        let tokens = manager.refresh_access_token("R").await.unwrap();
        assert_eq!(tokens.access_token, "A2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R"));
        assert_eq!(tokens.expires_in, Some(1800));
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_gives_up_after_max_attempts() {
        let http = StubHttpClient::with(vec![
            response(500, "a"),
            response(500, "b"),
            response(500, "c"),
        ]);
        let manager = OAuthFlowManager::new(config(), http.clone());

        let err = manager.refresh_access_token("R").await.unwrap_err();
        assert!(matches!(err, BindingError::TokenRefreshFailed(_)));
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_fails_fast_on_client_error() {
        let http = StubHttpClient::with(vec![response(400, r#"{"error":"invalid_grant"}"#)]);
        let manager = OAuthFlowManager::new(config(), http.clone());

        let err = manager.refresh_access_token("R").await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
        assert_eq!(http.requests().len(), 1);
    }

    #[test]
    fn test_token_response_without_lifetime() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"access_token":"A"}"#).unwrap();
        let tokens = parsed.into_result(None);
        assert_eq!(tokens.expires_in, None);
        assert_eq!(tokens.refresh_token, None);
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        assert!(!format!("{:?}", config()).contains("s1"));
    }
}
