//! Microsoft identity platform endpoints per national cloud.

use tracing::warn;

/// Delegated permissions requested at consent time.
pub const SCOPES: &str = "offline_access files.readwrite.all";

/// National cloud an account lives in, selected by the bind form's
/// `account_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneDriveCloud {
    /// Global Microsoft identity platform
    Global,
    /// Operated by 21Vianet
    China,
}

impl OneDriveCloud {
    /// Resolve an account type. Unknown values fall back to the global cloud.
    pub fn from_account_type(account_type: &str) -> Self {
        match account_type.trim().to_ascii_lowercase().as_str() {
            "com" | "global" | "onedrive" => OneDriveCloud::Global,
            "cn" => OneDriveCloud::China,
            other => {
                warn!(account_type = other, "Unknown account type, using global cloud");
                OneDriveCloud::Global
            }
        }
    }

    pub fn account_type(&self) -> &'static str {
        match self {
            OneDriveCloud::Global => "com",
            OneDriveCloud::China => "cn",
        }
    }

    fn login_base(&self) -> &'static str {
        match self {
            OneDriveCloud::Global => "https://login.microsoftonline.com/common/oauth2/v2.0/",
            OneDriveCloud::China => "https://login.chinacloudapi.cn/common/oauth2/v2.0/",
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}authorize", self.login_base())
    }

    pub fn token_url(&self) -> String {
        format!("{}token", self.login_base())
    }

    /// Graph API root, with trailing slash.
    pub fn graph_url(&self) -> &'static str {
        match self {
            OneDriveCloud::Global => "https://graph.microsoft.com/v1.0/",
            OneDriveCloud::China => "https://microsoftgraph.chinacloudapi.cn/v1.0/",
        }
    }

    pub fn scopes() -> Vec<String> {
        SCOPES.split_whitespace().map(str::to_string).collect()
    }
}
