use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::FixedClock;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use core_auth::{
    Account, AccountRefresher, AccountStore, BindRequest, BindingError, BindingFlow,
    BindingFlowConfig, SettingsAccountStore,
};
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use mockall::mock;
use provider_onedrive::{GraphAccountRefresher, OneDriveProviderFactory};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

const TOKEN_BODY: &str =
    r#"{"token_type":"Bearer","access_token":"A","refresh_token":"R","expires_in":3600}"#;
const DRIVE_BODY: &str = r#"{"driveType":"personal","owner":{"user":{"displayName":"Alice"}},"quota":{"total":1024,"used":12}}"#;

#[derive(Default)]
struct StubHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubHttpClient {
    fn with(responses: Vec<(u16, &str)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| HttpResponse {
                        status,
                        headers: HashMap::new(),
                        body: Bytes::from(body.to_string()),
                    })
                    .collect(),
            ),
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
            .ok_or_else(|| BridgeError::OperationFailed("no stub response".into()))
    }
}

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

#[derive(Default)]
struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

struct Setup {
    flow: BindingFlow,
    accounts: Arc<SettingsAccountStore>,
    refresher: Arc<GraphAccountRefresher>,
    event_bus: EventBus,
}

fn setup(http: Arc<dyn HttpClient>) -> Setup {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let accounts = Arc::new(SettingsAccountStore::new(Arc::new(
        MemorySettings::default(),
    )));
    let providers = Arc::new(OneDriveProviderFactory::new(
        http.clone(),
        "drive-link",
        Duration::from_secs(5),
    ));
    let refresher = Arc::new(GraphAccountRefresher::new(
        accounts.clone(),
        providers.clone(),
        http,
        clock.clone(),
    ));
    let event_bus = EventBus::new(16);

    let flow = BindingFlow::new(
        BindingFlowConfig {
            callback_url: "https://drive.example.com/api/account/callback".into(),
            trusted_frontend_domain: "olaindex.github.io".into(),
            pending_binding_ttl: Duration::from_secs(900),
            token_exchange_timeout: Duration::from_secs(30),
        },
        Arc::new(core_auth::MemoryTokenStore::new()),
        accounts.clone(),
        providers,
        clock,
        event_bus.clone(),
    )
    .with_refresher(refresher.clone());

    Setup {
        flow,
        accounts,
        refresher,
        event_bus,
    }
}

fn request(account_type: &str) -> BindRequest {
    BindRequest {
        account_type: account_type.into(),
        client_id: "c1".into(),
        client_secret: "s1".into(),
        redirect_uri: "https://host/cb".into(),
        post_login_redirect: "https://app/done".into(),
    }
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

async fn wait_for_refresh(events: &mut core_runtime::events::Receiver<CoreEvent>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CoreEvent::Account(AccountEvent::ExtendRefreshed)) = events.recv().await {
                break;
            }
        }
    })
    .await
    .expect("profile refresh did not finish");
}

#[tokio::test]
async fn test_bind_and_callback_against_global_cloud() {
    let http = StubHttpClient::with(vec![(200, TOKEN_BODY), (200, DRIVE_BODY)]);
    let s = setup(http.clone());
    let mut events = s.event_bus.subscribe();

    let authorize_url = s.flow.bind(request("com")).await.unwrap();
    assert!(authorize_url
        .starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"));
    let params = query(&authorize_url);
    assert_eq!(params["client_id"], "c1");
    assert_eq!(params["redirect_uri"], "https://host/cb");
    assert_eq!(params["scope"], "offline_access files.readwrite.all");

    let outcome = s.flow.callback(&params["state"], "the-code").await.unwrap();
    assert_eq!(outcome.redirect, "https://app/done");

    wait_for_refresh(&mut events).await;

    let requests = http.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].url,
        "https://login.microsoftonline.com/common/oauth2/v2.0/token"
    );
    let form: HashMap<String, String> =
        serde_urlencoded::from_bytes(requests[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "the-code");
    assert_eq!(form["client_secret"], "s1");

    assert_eq!(requests[1].method, HttpMethod::Get);
    assert_eq!(requests[1].url, "https://graph.microsoft.com/v1.0/me/drive");
    assert_eq!(
        requests[1].headers.get("Authorization"),
        Some(&"Bearer A".to_string())
    );

    let info = s.flow.info().await;
    assert_eq!(info.owner.unwrap()["user"]["displayName"], "Alice");
    assert_eq!(info.quota.unwrap()["total"], 1024);

    let account = s.accounts.load().await.unwrap().unwrap();
    assert_eq!(account.access_token_expires.as_deref(), Some("2024-01-01 01:00:00"));
    assert_eq!(account.extend.unwrap()["drive_type"], "personal");
}

#[tokio::test]
async fn test_china_cloud_endpoints() {
    let http = StubHttpClient::with(vec![(200, TOKEN_BODY), (200, DRIVE_BODY)]);
    let s = setup(http.clone());
    let mut events = s.event_bus.subscribe();

    let authorize_url = s.flow.bind(request("cn")).await.unwrap();
    assert!(authorize_url.starts_with("https://login.chinacloudapi.cn/common/oauth2/v2.0/authorize?"));

    let state = query(&authorize_url)["state"].clone();
    s.flow.callback(&state, "code").await.unwrap();
    wait_for_refresh(&mut events).await;

    let requests = http.requests();
    assert_eq!(
        requests[0].url,
        "https://login.chinacloudapi.cn/common/oauth2/v2.0/token"
    );
    assert_eq!(
        requests[1].url,
        "https://microsoftgraph.chinacloudapi.cn/v1.0/me/drive"
    );
}

#[tokio::test]
async fn test_refresher_renews_expiring_token() {
    let http = StubHttpClient::with(vec![
        (200, r#"{"access_token":"B","expires_in":3600}"#),
        (200, DRIVE_BODY),
    ]);
    let s = setup(http.clone());

    s.accounts
        .save(&Account {
            account_type: "com".into(),
            client_id: "c1".into(),
            client_secret: "s1".into(),
            redirect_uri: "https://host/cb".into(),
            access_token: Some("A".into()),
            refresh_token: Some("R".into()),
            access_token_expires: Some("2024-01-01 00:01:00".into()),
            ..Account::default()
        })
        .await
        .unwrap();

    s.refresher.refresh().await.unwrap();

    let account = s.accounts.load().await.unwrap().unwrap();
    assert_eq!(account.access_token.as_deref(), Some("B"));
    assert_eq!(account.refresh_token.as_deref(), Some("R"));
    assert_eq!(account.access_token_expires.as_deref(), Some("2024-01-01 01:00:00"));
    assert!(account.extend.is_some());

    let requests = http.requests();
    let form: HashMap<String, String> =
        serde_urlencoded::from_bytes(requests[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], "R");
    assert_eq!(
        requests[1].headers.get("Authorization"),
        Some(&"Bearer B".to_string())
    );
}

/// Clears the stored account while the token endpoint is answering.
struct UnbindDuringRenewal {
    accounts: Arc<SettingsAccountStore>,
    requests: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpClient for UnbindDuringRenewal {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.url.clone());
        self.accounts
            .clear()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(br#"{"access_token":"B","refresh_token":"R2","expires_in":3600}"#),
        })
    }
}

#[tokio::test]
async fn test_renewal_does_not_resurrect_unbound_account() {
    let accounts = Arc::new(SettingsAccountStore::new(Arc::new(
        MemorySettings::default(),
    )));
    let http = Arc::new(UnbindDuringRenewal {
        accounts: accounts.clone(),
        requests: Mutex::default(),
    });
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let providers = Arc::new(OneDriveProviderFactory::new(
        http.clone(),
        "drive-link",
        Duration::from_secs(5),
    ));
    let refresher = GraphAccountRefresher::new(accounts.clone(), providers, http.clone(), clock);

    accounts
        .save(&Account {
            account_type: "com".into(),
            client_id: "c1".into(),
            client_secret: "s1".into(),
            redirect_uri: "https://host/cb".into(),
            access_token: Some("A".into()),
            refresh_token: Some("R".into()),
            access_token_expires: Some("1970-01-01 00:00:00".into()),
            ..Account::default()
        })
        .await
        .unwrap();

    refresher.refresh().await.unwrap();

    assert!(accounts.load().await.unwrap().is_none());
    let requests = http.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec!["https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string()]
    );
}

#[tokio::test]
async fn test_graph_rejection_keeps_profile() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|request| request.url.ends_with("/me/drive"))
        .times(1)
        .returning(|_| {
            Ok(HttpResponse {
                status: 401,
                headers: HashMap::new(),
                body: Bytes::from_static(b"{\"error\":{\"code\":\"InvalidAuthenticationToken\"}}"),
            })
        });
    let s = setup(Arc::new(http));

    s.accounts
        .save(&Account {
            account_type: "com".into(),
            access_token: Some("A".into()),
            access_token_expires: Some("2024-01-01 02:00:00".into()),
            ..Account::default()
        })
        .await
        .unwrap();

    let err = s.refresher.refresh().await.unwrap_err();

    assert!(matches!(err, BindingError::TokenRefreshFailed(ref m) if m == "Authentication required"));
    assert!(s.flow.info().await.is_empty());
}

#[tokio::test]
async fn test_apply_links_to_registration_portal() {
    let s = setup(StubHttpClient::with(vec![]));

    let link = s.flow.apply("https://host/cb").unwrap();

    assert!(link.starts_with("https://apps.dev.microsoft.com/?deepLink="));
    let deep_link = query(&link)["deepLink"].clone();
    assert!(deep_link.contains("appName=drive-link"));
    assert!(deep_link.contains("platform%3Doption-php"));
}
