//! End-to-end proxy tests: selection, failure handling, admin API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use relay_proxy::admin::setup_admin_router;
use relay_proxy::config::{PolicyConfig, ProxyConfig, UpstreamConfig};
use relay_proxy::http::{AppState, HttpServer};

mod common;

fn base_config(proxy_addr: SocketAddr, upstreams: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    for addr in upstreams {
        config.upstreams.push(UpstreamConfig {
            dial: addr.to_string(),
        });
    }
    config
}

async fn spawn_proxy(config: ProxyConfig) -> AppState {
    let proxy_addr = config.listener.bind_address.clone();
    let state = AppState::new(config).unwrap();
    let server = HttpServer::new(state.clone());
    let listener = tokio::net::TcpListener::bind(&proxy_addr).await.unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    state
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn round_robin_alternates_between_backends() {
    let b1_addr: SocketAddr = "127.0.0.1:28811".parse().unwrap();
    let b2_addr: SocketAddr = "127.0.0.1:28812".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28813".parse().unwrap();

    common::start_mock_backend(b1_addr, "b1").await;
    common::start_mock_backend(b2_addr, "b2").await;

    let mut config = base_config(proxy_addr, &[b1_addr, b2_addr]);
    config.load_balancing = PolicyConfig::RoundRobin;
    spawn_proxy(config).await;

    let client = client();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..10 {
        let body = client
            .get(format!("http://{proxy_addr}"))
            .send()
            .await
            .expect("proxy unreachable")
            .text()
            .await
            .unwrap();
        *counts.entry(body).or_default() += 1;
    }

    assert_eq!(counts.get("b1"), Some(&5), "counts: {counts:?}");
    assert_eq!(counts.get("b2"), Some(&5), "counts: {counts:?}");
}

#[tokio::test]
async fn dead_backend_yields_bad_gateway() {
    // Nothing listens on the upstream address.
    let dead_addr: SocketAddr = "127.0.0.1:28821".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28822".parse().unwrap();

    let config = base_config(proxy_addr, &[dead_addr]);
    let state = spawn_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy_addr}"))
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(res.status(), 502);

    // The failure is recorded against the host.
    let host = state.registry.get(&dead_addr.to_string()).unwrap();
    assert!(host.fails() >= 1);
    assert_eq!(host.num_requests(), 0);
}

#[tokio::test]
async fn sticky_cookie_pins_a_backend() {
    let b1_addr: SocketAddr = "127.0.0.1:28831".parse().unwrap();
    let b2_addr: SocketAddr = "127.0.0.1:28832".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28833".parse().unwrap();

    common::start_mock_backend(b1_addr, "b1").await;
    common::start_mock_backend(b2_addr, "b2").await;

    let mut config = base_config(proxy_addr, &[b1_addr, b2_addr]);
    config.load_balancing = PolicyConfig::Cookie {
        name: None,
        secret: Some("test-secret".to_string()),
        max_age_secs: None,
        fallback: None,
    };
    spawn_proxy(config).await;

    // First request gets a cookie; replaying it pins the backend.
    let client = client();
    let res = client
        .get(format!("http://{proxy_addr}"))
        .send()
        .await
        .expect("proxy unreachable");
    let cookie = res
        .headers()
        .get("set-cookie")
        .expect("sticky cookie missing")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let first = res.text().await.unwrap();

    for _ in 0..5 {
        let res = client
            .get(format!("http://{proxy_addr}"))
            .header("cookie", &cookie)
            .send()
            .await
            .unwrap();
        assert!(res.headers().get("set-cookie").is_none());
        assert_eq!(res.text().await.unwrap(), first);
    }
}

#[tokio::test]
async fn admin_reports_upstream_snapshot() {
    let b1_addr: SocketAddr = "127.0.0.1:28841".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28842".parse().unwrap();
    let admin_addr: SocketAddr = "127.0.0.1:28843".parse().unwrap();

    common::start_mock_backend(b1_addr, "b1").await;
    let config = base_config(proxy_addr, &[b1_addr]);
    let state = spawn_proxy(config).await;

    let admin_router = setup_admin_router(state);
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(admin_listener, admin_router).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = client();
    for _ in 0..3 {
        client
            .get(format!("http://{proxy_addr}"))
            .send()
            .await
            .unwrap();
    }

    let snapshot: Vec<serde_json::Value> = client
        .get(format!("http://{admin_addr}/admin/upstreams"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0]["address"], b1_addr.to_string());
    assert_eq!(snapshot[0]["num_requests"], 0);
    assert_eq!(snapshot[0]["fails"], 0);

    // Read-only endpoint: writes are rejected.
    let res = client
        .post(format!("http://{admin_addr}/admin/upstreams"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);
}

#[tokio::test]
async fn reload_swaps_pool_but_keeps_counters() {
    let b1_addr: SocketAddr = "127.0.0.1:28851".parse().unwrap();
    let b2_addr: SocketAddr = "127.0.0.1:28852".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28853".parse().unwrap();

    common::start_mock_backend(b1_addr, "b1").await;
    common::start_mock_backend(b2_addr, "b2").await;

    let config = base_config(proxy_addr, &[b1_addr]);
    let state = spawn_proxy(config).await;

    let client = client();
    let body = client
        .get(format!("http://{proxy_addr}"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "b1");

    // Swap the pool to the second backend only.
    let new_config = base_config(proxy_addr, &[b2_addr]);
    state.reload(new_config).unwrap();

    let body = client
        .get(format!("http://{proxy_addr}"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "b2");

    // The first host's record survives in the registry.
    assert!(state.registry.get(&b1_addr.to_string()).is_some());
}
