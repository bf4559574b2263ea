use std::time::Duration;

use anyhow::Result;
use request_directory::bench_support::{
    e2e_catalog, init_test_tracing, random_user_id, GatewayHarness, USER_HEADER,
};
use request_directory_catalog::Credits;
use request_directory_gateway::transport::{encode_multipart, FilePayload, IMAGE_FIELD};
use request_directory_ledger::EntryKind;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{credits_of, png_bytes};

async fn downstream_replying(delay: Duration) -> MockServer {
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/infer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "label": "safe" }))
                .set_delay(delay),
        )
        .mount(&downstream)
        .await;
    downstream
}

#[tokio::test(flavor = "multi_thread")]
async fn latency_priced_call_settles_to_measured_cost() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_replying(Duration::from_millis(50)).await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["label"], "safe");

    let actual = credits_of(&reply.body["funds"]["actual"]);
    let remaining = credits_of(&reply.body["funds"]["remaining"]);
    // 50ms at 0.0001 per second of latency.
    assert!(actual >= Credits::new(dec!(0.000005)), "actual {actual}");
    assert!(actual < Credits::new(dec!(0.0005)), "actual {actual}");
    assert_eq!(remaining + actual, Credits::new(dec!(1)));
    assert_eq!(harness.balance(&user).await?, remaining);

    let kinds: Vec<EntryKind> = harness
        .ledger_entries(&user)
        .await?
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    // Newest first.
    assert_eq!(kinds, vec![EntryKind::Reconcile, EntryKind::Reserve, EntryKind::Open]);

    let request_id = reply.request_id.expect("request id header");
    let record = harness.get(&user, &format!("/requests/{request_id}")).await?;
    assert_eq!(record.body["status"], "success");
    assert_eq!(credits_of(&record.body["cost"]), actual);

    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn flat_rate_call_matches_expected_balance() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_replying(Duration::from_millis(50)).await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1.000000))).await?;

    let reply = harness
        .upload(&user, "nudenet-fixed", png_bytes(), "photo.png")
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["label"], "safe");
    assert_eq!(credits_of(&reply.body["funds"]["actual"]), Credits::new(dec!(0.000005)));
    assert_eq!(credits_of(&reply.body["funds"]["remaining"]), Credits::new(dec!(0.999995)));
    assert_eq!(harness.balance(&user).await?, Credits::new(dec!(0.999995)));

    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn insufficient_funds_has_no_side_effects() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_replying(Duration::ZERO).await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(0.00005))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "message": "You don't have enough credits." }));
    assert!(reply.request_id.is_none());

    assert_eq!(harness.balance(&user).await?, Credits::new(dec!(0.00005)));
    assert_eq!(harness.ledger_entries(&user).await?.len(), 1);
    let listing = harness.get(&user, "/requests").await?;
    assert!(listing.body["requests"].as_array().unwrap().is_empty());
    assert!(downstream.received_requests().await.unwrap().is_empty());

    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_calls_never_overdraw() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_replying(Duration::from_millis(20)).await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    let opening = Credits::new(dec!(0.0003));
    harness.open_account(&user, opening).await?;

    let file = FilePayload::new(png_bytes(), Some("photo.png"), Some("image/png"));
    let mut calls = JoinSet::new();
    for _ in 0..8 {
        let encoded = encode_multipart(&file, IMAGE_FIELD);
        let request = harness
            .client()
            .post(harness.url("/v1/nudenet-fixed"))
            .header(USER_HEADER, user.as_str())
            .headers(encoded.headers()?)
            .body(encoded.body);
        calls.spawn(async move {
            let response = request.send().await?;
            let status = response.status();
            let body: Value = response.json().await?;
            Ok::<_, reqwest::Error>((status, body))
        });
    }

    let mut succeeded = 0i64;
    while let Some(joined) = calls.join_next().await {
        let (status, body) = joined??;
        match status {
            StatusCode::OK => succeeded += 1,
            StatusCode::BAD_REQUEST => {
                assert_eq!(body["message"], "You don't have enough credits.")
            }
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    assert!(succeeded >= 3, "only {succeeded} calls succeeded");
    let balance = harness.balance(&user).await?;
    assert!(!balance.is_negative());
    let spent = Credits::new(dec!(0.000005) * Decimal::from(succeeded));
    assert_eq!(balance, opening - spent);

    harness.shutdown().await
}
