//! End-to-end pairing journeys through the public API.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::{assert_eq, assert_ne};
use tower::ServiceExt;

use pairgate::config::Config;
use pairgate::http::{AppState, router};
use pairgate::pairing::PairingOrchestrator;
use pairgate::session::SessionStore;
use pairgate::wa::SimulatedClientFactory;
use pairgate::{PairingCodeCache, PhoneNumber};

const NUMBER: &str = "923027598014";

struct Gateway {
    app: Router,
    factory: Arc<SimulatedClientFactory>,
    store: SessionStore,
    _tmp: tempfile::TempDir,
}

fn gateway(factory: SimulatedClientFactory, code_ttl: Duration) -> Gateway {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        code_ttl,
        stabilize_delay: Duration::from_millis(10),
        post_open_delay: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(50),
        ..Config::default()
    };
    let factory = Arc::new(factory);
    let store = SessionStore::new(tmp.path());
    let cache = Arc::new(PairingCodeCache::new().with_ttl(config.code_ttl));
    let orchestrator = Arc::new(PairingOrchestrator::new(
        cache,
        store.clone(),
        factory.clone(),
        &config,
    ));
    orchestrator.spawn_sweeper(config.sweep_interval);

    Gateway {
        app: router(AppState { orchestrator }),
        factory,
        store,
        _tmp: tmp,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn full_pairing_journey_delivers_credentials_and_purges_state() {
    let gw = gateway(
        SimulatedClientFactory::new().link_after(Duration::from_millis(80)),
        Duration::from_secs(300),
    );

    // Initiate with a messy-but-valid number.
    let (status, code) = get(&gw.app, "/?num=%2B92%20302%207598014").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(code.len(), 9, "expected XXXX-XXXX, got {code}");

    // The code is pollable while the link is pending.
    let (status, body) = get(&gw.app, "/check?num=923027598014").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["pairing_code"], code.as_str());
    assert!(json["expires_in"].as_i64().unwrap() <= 300);

    // Once the link opens, the credential file goes to the user's own chat
    // and every piece of local state disappears.
    let number = PhoneNumber::normalize(NUMBER).unwrap();
    let store = gw.store.clone();
    wait_until(move || !store.exists(&number)).await;

    let clients = gw.factory.opened_clients().await;
    assert_eq!(clients.len(), 1);
    let sent = clients[0].sent_documents().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "923027598014@s.whatsapp.net");
    assert_eq!(sent[0].filename, "creds.json");
    assert!(!sent[0].caption.is_empty());

    let (status, _) = get(&gw.app, "/check?num=923027598014").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_code_answers_410_and_directory_is_reaped() {
    let gw = gateway(SimulatedClientFactory::new(), Duration::from_millis(150));

    let (status, _) = get(&gw.app, "/?num=923027598014").await;
    assert_eq!(status, StatusCode::OK);
    let number = PhoneNumber::normalize(NUMBER).unwrap();
    assert!(gw.store.exists(&number));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let (status, body) = get(&gw.app, "/check?num=923027598014").await;
    // Either this poll saw the expired entry (410) or the sweeper already
    // evicted it (404); both mean the code is gone.
    assert!(
        status == StatusCode::GONE || status == StatusCode::NOT_FOUND,
        "got {status}: {body}"
    );

    // The sweeper reaps the session directory along with the entry.
    let store = gw.store.clone();
    wait_until(move || !store.exists(&number)).await;
}

#[tokio::test]
async fn close_before_code_fails_and_caches_nothing() {
    let gw = gateway(
        SimulatedClientFactory::new().close_after(Duration::from_millis(2)),
        Duration::from_secs(300),
    );

    let (status, _) = get(&gw.app, "/?num=923027598014").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = get(&gw.app, "/check?num=923027598014").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let number = PhoneNumber::normalize(NUMBER).unwrap();
    assert!(!gw.store.exists(&number));
}

#[tokio::test]
async fn second_attempt_replaces_first_code() {
    let gw = gateway(SimulatedClientFactory::new(), Duration::from_secs(300));

    let (_, first) = get(&gw.app, "/?num=923027598014").await;
    let (_, second) = get(&gw.app, "/?num=923027598014").await;
    assert_ne!(first, second);

    let (status, body) = get(&gw.app, "/check?num=923027598014").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["pairing_code"], second.as_str());
}
