//! End-to-end tests: rate limiting and forwarding over real sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use rampart::load_balancer::Target;
use rampart::ratelimit::{KeySource, RateLimiter};
use rampart::transport::{HttpTransport, Transport, TransportConfig};
use rampart::upstream::Upstream;

mod common;

fn http() -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new(&TransportConfig::default()))
}

/// Sleep into the early part of a fresh second.
async fn align_to_second() {
    let into = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_millis();
    if into > 500 {
        tokio::time::sleep(Duration::from_millis(u64::from(1010 - into))).await;
    }
}

#[tokio::test]
async fn fixed_window_rejects_third_request() {
    let backend = common::start_mock_backend("ok").await;
    let gateway = common::start_gateway(
        Upstream::single_host(backend.to_string(), http()),
        Some(RateLimiter::fixed_window(2, Duration::from_secs(1))),
    )
    .await;
    let client = common::client();
    let url = format!("http://{gateway}/");

    align_to_second().await;
    let first = client.get(&url).send().await.unwrap();
    let second = client.get(&url).send().await.unwrap();
    let third = client.get(&url).send().await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = third.headers()["retry-after"].to_str().unwrap();
    assert!(retry_after.parse::<u64>().is_ok(), "{retry_after}");
    assert_eq!(third.text().await.unwrap(), "Too Many Requests");

    // Next window admits again
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let later = client.get(&url).send().await.unwrap();
    assert_eq!(later.status(), StatusCode::OK);
}

#[tokio::test]
async fn round_robin_alternates_backends() {
    let a = common::start_mock_backend("a").await;
    let b = common::start_mock_backend("b").await;
    let gateway = common::start_gateway(
        Upstream::round_robin(vec![
            Target::new(a.to_string(), http()),
            Target::new(b.to_string(), http()),
        ]),
        None,
    )
    .await;
    let client = common::client();

    let mut bodies = Vec::new();
    for _ in 0..4 {
        let res = client.get(format!("http://{gateway}/")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        bodies.push(res.text().await.unwrap());
    }
    assert_eq!(bodies, vec!["a", "b", "a", "b"]);
}

#[tokio::test]
async fn get_retried_on_next_target() {
    let dead = common::dead_address().await;
    let alive = common::start_mock_backend("alive").await;
    let gateway = common::start_gateway(
        Upstream::round_robin(vec![
            Target::new(dead.to_string(), http()),
            Target::new(alive.to_string(), http()),
        ]),
        None,
    )
    .await;

    let res = common::client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "alive");
}

#[tokio::test]
async fn post_with_body_not_retried() {
    let dead = common::dead_address().await;
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let alive = common::start_programmable_backend(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (200, "alive".to_string()) }
    })
    .await;
    let gateway = common::start_gateway(
        Upstream::round_robin(vec![
            Target::new(dead.to_string(), http()),
            Target::new(alive.to_string(), http()),
        ]),
        None,
    )
    .await;

    let res = common::client()
        .post(format!("http://{gateway}/"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Bad Gateway");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_targets_is_service_unavailable() {
    let gateway = common::start_gateway(Upstream::round_robin(Vec::new()), None).await;
    let res = common::client()
        .get(format!("http://{gateway}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Service Unavailable");
}

#[tokio::test]
async fn concurrent_queue_admits_queued_and_rejects_overflow() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        (200, "slow".to_string())
    })
    .await;
    let gateway = common::start_gateway(
        Upstream::single_host(backend.to_string(), http()),
        Some(RateLimiter::concurrent_queue(1, 1).with_key(KeySource::Constant("all".into()))),
    )
    .await;
    let client = common::client();
    let url = format!("http://{gateway}/");

    let first = tokio::spawn({
        let (client, url) = (client.clone(), url.clone());
        async move { client.get(url).send().await.unwrap().status() }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = tokio::spawn({
        let (client, url) = (client.clone(), url.clone());
        async move { client.get(url).send().await.unwrap().status() }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let rejected = client.get(&url).send().await.unwrap().status();

    assert_eq!(rejected, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(first.await.unwrap(), StatusCode::OK);
    assert_eq!(queued.await.unwrap(), StatusCode::OK);
}
