//! OAuth `state` token codec.
//!
//! A binding's `state` is either its slug verbatim, or, for redirect URIs
//! hosted on the trusted web front-end, a composite token carrying the slug
//! together with this service's callback URL so the front-end knows where to
//! forward the provider's response. Composite tokens are STANDARD base64 of
//! the JSON array `[slug, callback_url]`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateToken {
    Plain(String),
    Composite { slug: String, callback_url: String },
}

impl StateToken {
    /// Choose the encoding for a binding whose redirect URI is `redirect_uri`.
    pub fn for_redirect(
        slug: impl Into<String>,
        redirect_uri: &str,
        trusted_domain: &str,
        callback_url: &str,
    ) -> Self {
        let slug = slug.into();
        if !trusted_domain.is_empty() && redirect_uri.contains(trusted_domain) {
            StateToken::Composite {
                slug,
                callback_url: callback_url.to_string(),
            }
        } else {
            StateToken::Plain(slug)
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            StateToken::Plain(slug) => slug,
            StateToken::Composite { slug, .. } => slug,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            StateToken::Plain(slug) => slug.clone(),
            StateToken::Composite { slug, callback_url } => {
                // Serializing two strings cannot fail
                let json = serde_json::json!([slug, callback_url]).to_string();
                STANDARD.encode(json)
            }
        }
    }

    /// Decode an incoming `state`. Never fails: anything that is not a
    /// composite token is taken as a plain slug.
    pub fn decode(raw: &str) -> Self {
        Self::decode_composite(raw).unwrap_or_else(|| StateToken::Plain(raw.to_string()))
    }

    fn decode_composite(raw: &str) -> Option<Self> {
        let bytes = STANDARD.decode(raw).ok()?;
        let parts: Vec<serde_json::Value> = serde_json::from_slice(&bytes).ok()?;
        let slug = parts.first()?.as_str()?.to_string();
        let callback_url = parts
            .get(1)
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();

        Some(StateToken::Composite { slug, callback_url })
    }
}
