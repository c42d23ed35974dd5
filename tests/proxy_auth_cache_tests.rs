mod support;

use catalog_ingest::api::gazelle::GazelleRequests;
use catalog_ingest::api::proxy::HttpProxy;
use catalog_ingest::api::spotify::SpotifySavedAlbumsRequests;
use catalog_ingest::api::{Cursor, Proxy};
use catalog_ingest::auth_cache::{AuthCache, Credentials};
use catalog_ingest::config::{ProviderConfig, ProviderKind};
use catalog_ingest::http::{HttpMethod, ResponseEnvelope};
use catalog_ingest::IngestError;
use serde_json::json;
use std::sync::Arc;
use support::ScriptedTransport;

const TRACKER: &str = "https://tracker.example";
const LOGIN: &str = "https://tracker.example/login.php";
const BROWSE: &str = "https://tracker.example/ajax.php";

fn gazelle_config(api_key: Option<&str>) -> Arc<ProviderConfig> {
    let mut cfg = ProviderConfig::new("orpheus", ProviderKind::Gazelle, "https://tracker.example/");
    cfg.username = "user".into();
    cfg.password = "pass".into();
    cfg.api_key = api_key.map(str::to_string);
    cfg.auth_key = "AUTHKEY".into();
    cfg.pass_key = "PASSKEY".into();
    Arc::new(cfg)
}

fn gazelle_proxy(
    cfg: Arc<ProviderConfig>,
    transport: &Arc<ScriptedTransport>,
    cache: &Arc<AuthCache>,
) -> HttpProxy<GazelleRequests> {
    let base = cfg.base().unwrap();
    HttpProxy::new(
        cfg.clone(),
        GazelleRequests::new(cfg, base),
        transport.clone(),
        cache.clone(),
    )
}

fn login_ok() -> ResponseEnvelope {
    ResponseEnvelope::new(302, "text/html", "")
        .with_header("location", "index.php")
        .with_header("set-cookie", "session=abc123; path=/; HttpOnly")
}

fn browse_page() -> ResponseEnvelope {
    ResponseEnvelope::json(
        200,
        json!({"status": "success", "response": {"currentPage": 1, "pages": 1, "results": []}})
            .to_string(),
    )
}

#[tokio::test]
async fn login_once_then_reuse_cached_session() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(HttpMethod::Post, LOGIN, login_ok())
            .route(HttpMethod::Get, BROWSE, browse_page()),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(None), &transport, &cache);

    assert!(proxy.fetch_page(None).await.unwrap().is_some());
    assert!(proxy.fetch_page(Some(&Cursor::new("2"))).await.unwrap().is_some());

    assert_eq!(transport.count(HttpMethod::Post, LOGIN), 1);
    assert_eq!(transport.count(HttpMethod::Get, BROWSE), 2);

    let requests = transport.requests();
    let login = &requests[0];
    assert!(login.form.contains(&("username".to_string(), "user".to_string())));
    assert!(login.form.contains(&("keeplogged".to_string(), "1".to_string())));

    let second_page = &requests[2];
    assert_eq!(second_page.url, "https://tracker.example/ajax.php?action=browse&page=2");
    assert_eq!(second_page.header_value("cookie"), Some("session=abc123"));

    let cached = cache.get(TRACKER).unwrap();
    assert_eq!(cached.cookies.get("session").map(String::as_str), Some("abc123"));
}

#[tokio::test]
async fn api_key_skips_login() {
    let transport =
        Arc::new(ScriptedTransport::new().route(HttpMethod::Get, BROWSE, browse_page()));
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(Some("secret-key")), &transport, &cache);

    proxy.fetch_page(None).await.unwrap();

    assert_eq!(transport.count(HttpMethod::Post, LOGIN), 0);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header_value("authorization"), Some("secret-key"));
    assert_eq!(requests[0].header_value("cookie"), None);
    assert_eq!(cache.get(TRACKER), Some(Credentials::authorization("secret-key")));
}

#[tokio::test]
async fn unexpected_status_drops_cached_session() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(HttpMethod::Post, LOGIN, login_ok())
            .route(HttpMethod::Get, BROWSE, ResponseEnvelope::new(500, "text/html", "oops"))
            .route(HttpMethod::Get, BROWSE, browse_page()),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(None), &transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    match &err {
        IngestError::UnexpectedResponse { provider, reason, envelope } => {
            assert_eq!(provider, "orpheus");
            assert_eq!(reason, "Unexpected response status 500 code from API request");
            assert_eq!(envelope.status, 500);
            assert_eq!(envelope.body, "oops");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(cache.get(TRACKER).is_none());
    assert!(cache.is_empty());

    // the next fetch re-authenticates
    assert!(proxy.fetch_page(None).await.unwrap().is_some());
    assert_eq!(transport.count(HttpMethod::Post, LOGIN), 2);
    assert!(cache.get(TRACKER).is_some());
}

#[tokio::test]
async fn non_json_content_type_drops_cached_session() {
    let transport = Arc::new(
        ScriptedTransport::new().route(
            HttpMethod::Get,
            BROWSE,
            ResponseEnvelope::new(200, "text/html; charset=utf-8", "<html>login</html>"),
        ),
    );
    let cache = Arc::new(AuthCache::new());
    let cfg = gazelle_config(Some("key"));
    let proxy = gazelle_proxy(cfg, &transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        concat!(
            "orpheus: Unexpected response header text/html; charset=utf-8 ",
            "from API request, expected application/json"
        )
    );
    assert_eq!(err.envelope().map(|e| e.status), Some(200));
    assert!(cache.get(TRACKER).is_none());
}

#[tokio::test]
async fn json_content_type_with_charset_is_accepted() {
    let page = ResponseEnvelope::new(
        200,
        "Application/JSON; charset=utf-8",
        "{\"status\":\"success\"}",
    );
    let transport = Arc::new(ScriptedTransport::new().route(HttpMethod::Get, BROWSE, page));
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(Some("key")), &transport, &cache);

    assert_eq!(
        proxy.fetch_page(None).await.unwrap(),
        Some(json!({"status": "success"}))
    );
    assert!(cache.get(TRACKER).is_some());
}

#[tokio::test]
async fn failed_login_caches_nothing() {
    let redirect_to_login = ResponseEnvelope::new(302, "text/html", "")
        .with_header("location", "login.php")
        .with_header("set-cookie", "session=deleted");
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(HttpMethod::Post, LOGIN, redirect_to_login)
            .route(HttpMethod::Get, BROWSE, browse_page()),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(None), &transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    assert!(matches!(err, IngestError::UnexpectedResponse { .. }));
    assert!(cache.is_empty());
    assert_eq!(transport.count(HttpMethod::Get, BROWSE), 0);
}

#[tokio::test]
async fn login_without_cookie_is_rejected() {
    let transport = Arc::new(
        ScriptedTransport::new().route(
            HttpMethod::Post,
            LOGIN,
            ResponseEnvelope::new(200, "text/html", ""),
        ),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(None), &transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    assert!(err.to_string().contains("session cookie"));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn missing_login_credentials_is_a_config_error() {
    let mut cfg = (*gazelle_config(None)).clone();
    cfg.password.clear();
    let transport = Arc::new(ScriptedTransport::new());
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(Arc::new(cfg), &transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    assert!(matches!(err, IngestError::Config { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn empty_or_unparseable_bodies_are_absent_pages() {
    for body in ["", "   ", "null", "{not json"] {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route(HttpMethod::Get, BROWSE, ResponseEnvelope::json(200, body)),
        );
        let cache = Arc::new(AuthCache::new());
        let proxy = gazelle_proxy(gazelle_config(Some("key")), &transport, &cache);
        assert_eq!(proxy.fetch_page(None).await.unwrap(), None, "body {:?}", body);
        // a well-typed but empty answer is not an auth failure
        assert!(cache.get(TRACKER).is_some());
    }
}

#[tokio::test]
async fn transport_failure_is_a_connection_error() {
    let transport = Arc::new(
        ScriptedTransport::new().route_error(HttpMethod::Get, BROWSE, "connection reset"),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = gazelle_proxy(gazelle_config(Some("key")), &transport, &cache);

    match proxy.fetch_page(None).await.unwrap_err() {
        IngestError::Connection { provider, url, reason } => {
            assert_eq!(provider, "orpheus");
            assert_eq!(url, "https://tracker.example/ajax.php?action=browse");
            assert_eq!(reason, "connection reset");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

const TOKEN: &str = "https://accounts.spotify.example/api/token";
const ALBUMS: &str = "https://api.spotify.example/v1/me/albums";

fn spotify_proxy(
    transport: &Arc<ScriptedTransport>,
    cache: &Arc<AuthCache>,
) -> HttpProxy<SpotifySavedAlbumsRequests> {
    let mut cfg = ProviderConfig::new(
        "spotify",
        ProviderKind::SpotifySavedAlbums,
        "https://api.spotify.example/v1",
    );
    cfg.auth_base_url = "https://accounts.spotify.example".into();
    cfg.client_id = "id".into();
    cfg.client_secret = "secret".into();
    cfg.refresh_token = "refresh".into();
    let cfg = Arc::new(cfg);
    let base = cfg.base().unwrap();
    HttpProxy::new(
        cfg.clone(),
        SpotifySavedAlbumsRequests::new(cfg, base),
        transport.clone(),
        cache.clone(),
    )
}

#[tokio::test]
async fn rejected_token_is_refreshed_on_next_fetch() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(
                HttpMethod::Post,
                TOKEN,
                ResponseEnvelope::json(200, json!({"access_token": "first"}).to_string()),
            )
            .route(
                HttpMethod::Post,
                TOKEN,
                ResponseEnvelope::json(200, json!({"access_token": "second"}).to_string()),
            )
            .route(HttpMethod::Get, ALBUMS, ResponseEnvelope::json(401, "{\"error\":\"expired\"}"))
            .route(HttpMethod::Get, ALBUMS, ResponseEnvelope::json(200, "{\"items\":[]}")),
    );
    let cache = Arc::new(AuthCache::new());
    let proxy = spotify_proxy(&transport, &cache);

    let err = proxy.fetch_page(None).await.unwrap_err();
    assert_eq!(err.envelope().map(|e| e.status), Some(401));
    assert!(cache.is_empty());

    assert_eq!(proxy.fetch_page(None).await.unwrap(), Some(json!({"items": []})));
    assert_eq!(transport.count(HttpMethod::Post, TOKEN), 2);

    let pages: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|r| r.method == HttpMethod::Get)
        .collect();
    assert_eq!(pages[0].header_value("authorization"), Some("Bearer first"));
    assert_eq!(pages[1].header_value("authorization"), Some("Bearer second"));
    assert_eq!(pages[1].url, "https://api.spotify.example/v1/me/albums?limit=50");
}

#[tokio::test]
async fn providers_keep_separate_cache_entries() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(HttpMethod::Get, BROWSE, ResponseEnvelope::new(403, "text/html", ""))
            .route(
                HttpMethod::Post,
                TOKEN,
                ResponseEnvelope::json(200, json!({"access_token": "tok"}).to_string()),
            )
            .route(HttpMethod::Get, ALBUMS, ResponseEnvelope::json(200, "{\"items\":[]}")),
    );
    let cache = Arc::new(AuthCache::new());
    let spotify = spotify_proxy(&transport, &cache);
    let gazelle = gazelle_proxy(gazelle_config(Some("key")), &transport, &cache);

    spotify.fetch_page(None).await.unwrap();
    assert!(gazelle.fetch_page(None).await.is_err());

    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get("https://api.spotify.example/v1/"),
        Some(Credentials::bearer("tok"))
    );
}
