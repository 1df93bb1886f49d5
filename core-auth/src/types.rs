use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Format of `Account::access_token_expires`.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stored expiry when the provider did not report a lifetime.
pub const EXPIRY_UNKNOWN: &str = "1970-01-01 00:00:00";

/// Format an absolute expiry the way it is persisted.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use core_auth::types::format_expiry;
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
/// assert_eq!(format_expiry(Some(at)), "2024-05-01 13:00:00");
/// assert_eq!(format_expiry(None), "1970-01-01 00:00:00");
/// ```
pub fn format_expiry(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format(EXPIRY_FORMAT).to_string(),
        None => EXPIRY_UNKNOWN.to_string(),
    }
}

/// Parse a persisted expiry. Returns `None` for malformed values; the epoch
/// sentinel parses to the epoch.
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, EXPIRY_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Client registration the user typed into the bind form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingParams {
    pub account_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for BindingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingParams")
            .field("account_type", &self.account_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// In-flight binding, stored in the token store under its slug until the
/// provider calls back or the entry expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBinding {
    pub slug: String,
    /// Value sent to the provider as `state`
    pub state_token: String,
    pub params: BindingParams,
    /// Where the browser goes once the account is linked
    pub post_login_redirect: String,
    /// Creation time, Unix seconds
    pub created_at: i64,
}

/// The single persisted account record.
///
/// Before the first successful callback only the registration fields are
/// set; a record is *bound* once it carries an access token. Keys this type
/// does not know about are kept in `extra` and written back untouched.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` UTC, or [`EXPIRY_UNKNOWN`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expires: Option<String>,
    /// Provider profile projection (`owner`, `quota`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extend: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    pub fn is_bound(&self) -> bool {
        self.access_token.is_some()
    }

    /// Overwrite the registration fields with `params`.
    pub fn apply_params(&mut self, params: &BindingParams) {
        self.account_type = params.account_type.clone();
        self.client_id = params.client_id.clone();
        self.client_secret = params.client_secret.clone();
        self.redirect_uri = params.redirect_uri.clone();
    }

    pub fn params(&self) -> BindingParams {
        BindingParams {
            account_type: self.account_type.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }

    /// Parsed access token expiry; `None` when absent or malformed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token_expires.as_deref().and_then(parse_expiry)
    }

    pub fn info(&self) -> AccountInfo {
        match &self.extend {
            Some(extend) => AccountInfo {
                owner: extend.get("owner").cloned(),
                quota: extend.get("quota").cloned(),
            },
            None => AccountInfo::default(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_type", &self.account_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_token_expires", &self.access_token_expires)
            .field("extend", &self.extend.is_some())
            .finish()
    }
}

/// Public projection of the account's provider profile.
///
/// Serializes to `{}` when nothing is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Value>,
}

impl AccountInfo {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.quota.is_none()
    }
}

/// Tokens returned by a code exchange or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when the provider reported one
    pub expires_in: Option<i64>,
}

impl TokenResult {
    /// Absolute expiry relative to `now`.
    ///
    /// A negative lifetime, or one that does not fit a timestamp, counts as
    /// unknown.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = self.expires_in.filter(|secs| *secs >= 0)?;
        chrono::Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of a successful callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    /// Where to send the browser next
    pub redirect: String,
}
