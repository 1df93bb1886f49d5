//! Deep link into the Microsoft app-registration quick start.
//!
//! The portal takes a `deepLink` parameter whose value is itself a URL with
//! an embedded, separately encoded `ru` return URL. The redirect URI is
//! inserted unencoded at both inner levels, matching what the portal expects.

use url::form_urlencoded;

const PORTAL_URL: &str = "https://apps.dev.microsoft.com/";
const QUICKSTART_URL: &str = "https://developer.microsoft.com/en-us/graph/quick-start";
/// Platform preselected on the quick-start page
pub const QUICKSTART_PLATFORM: &str = "option-php";

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Build the registration link for `redirect_uri`, naming the app `app_name`.
pub fn registration_link(app_name: &str, redirect_uri: &str) -> String {
    let ru = format!(
        "{}?appID=_appId_&appName=_appName_&redirectUrl={}&platform={}",
        QUICKSTART_URL, redirect_uri, QUICKSTART_PLATFORM
    );
    let deep_link = format!(
        "/quickstart/graphIO?publicClientSupport=false&appName={}&redirectUrl={}&allowImplicitFlow=false&ru={}",
        app_name,
        redirect_uri,
        encode(&ru)
    );

    format!("{}?deepLink={}", PORTAL_URL, encode(&deep_link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn param(url: &str, name: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[test]
    fn test_link_nests_return_url() {
        let link = registration_link("drive-link", "https://host/cb");
        assert!(link.starts_with("https://apps.dev.microsoft.com/?deepLink=%2Fquickstart%2FgraphIO"));

        let deep_link = param(&link, "deepLink");
        assert!(deep_link.starts_with("/quickstart/graphIO?publicClientSupport=false"));
        assert!(deep_link.contains("&appName=drive-link&redirectUrl=https://host/cb&"));

        let ru = param(&format!("https://x{}", deep_link), "ru");
        assert_eq!(
            ru,
            "https://developer.microsoft.com/en-us/graph/quick-start?appID=_appId_&appName=_appName_&redirectUrl=https://host/cb&platform=option-php"
        );
    }
}
