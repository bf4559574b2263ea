use std::time::Duration;

use anyhow::Result;
use request_directory::bench_support::{
    e2e_catalog, init_test_tracing, random_user_id, GatewayHarness, USER_HEADER,
};
use request_directory_catalog::Credits;
use request_directory_gateway::transport::{encode_multipart, FilePayload};
use request_directory_ledger::EntryKind;
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{credits_of, png_bytes};

async fn assert_refunded_and_failed(
    harness: &GatewayHarness,
    user: &str,
    request_id: Option<String>,
) -> Result<()> {
    assert_eq!(harness.balance(user).await?, Credits::new(dec!(1)));

    let kinds: Vec<EntryKind> = harness
        .ledger_entries(user)
        .await?
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::Refund, EntryKind::Reserve, EntryKind::Open]);

    let request_id = request_id.expect("failed calls still carry a request id");
    let record = harness.get(user, &format!("/requests/{request_id}")).await?;
    assert_eq!(record.body["status"], "failed");
    assert!(credits_of(&record.body["cost"]).is_zero());
    assert!(credits_of(&record.body["response"]["funds"]["actual"]).is_zero());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn downstream_error_refunds_and_hides_detail() -> Result<()> {
    init_test_tracing();
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/infer"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Traceback: model exploded"))
        .expect(1)
        .mount(&downstream)
        .await;

    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1.0))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({ "message": "Failed to get response from nudenet." }));
    assert!(!reply.body.to_string().contains("exploded"));

    assert_refunded_and_failed(&harness, &user, reply.request_id).await?;
    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_downstream_body_is_not_billed() -> Result<()> {
    init_test_tracing();
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/infer"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&downstream)
        .await;

    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1.0))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert_refunded_and_failed(&harness, &user, reply.request_id).await?;
    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn downstream_timeout_is_refunded() -> Result<()> {
    init_test_tracing();
    let downstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/infer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "label": "late" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&downstream)
        .await;

    let mut harness = GatewayHarness::start_with(&e2e_catalog(&downstream.uri()), |config| {
        config.downstream_timeout_secs = 1;
    })
    .await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1.0))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Failed to get response from nudenet.");

    assert_refunded_and_failed(&harness, &user, reply.request_id).await?;
    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_input_is_rejected_without_mutation() -> Result<()> {
    init_test_tracing();
    let downstream = MockServer::start().await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1.0))).await?;

    let no_url = harness.post_json(&user, "nudenet", &json!({})).await?;
    assert_eq!(no_url.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        no_url.body["message"],
        "You haven't provided a URL. The `url` field is required."
    );

    // A multipart body whose only part is not named `image`.
    let file = FilePayload::new(png_bytes(), Some("photo.png"), Some("image/png"));
    let encoded = encode_multipart(&file, "photo");
    let response = harness
        .client()
        .post(harness.url("/v1/nudenet"))
        .header(USER_HEADER, user.as_str())
        .headers(encoded.headers()?)
        .body(encoded.body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(
        body["message"],
        "You haven't provided an image. The `image` field is required."
    );

    assert_eq!(harness.balance(&user).await?, Credits::new(dec!(1.0)));
    assert_eq!(harness.ledger_entries(&user).await?.len(), 1);
    let listing = harness.get(&user, "/requests").await?;
    assert!(listing.body["requests"].as_array().unwrap().is_empty());
    assert!(downstream.received_requests().await.unwrap().is_empty());

    harness.shutdown().await
}
