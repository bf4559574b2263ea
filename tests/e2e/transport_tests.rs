use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use request_directory::bench_support::{e2e_catalog, init_test_tracing, random_user_id, GatewayHarness};
use request_directory_catalog::Credits;
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{credits_of, png_bytes};

const CENSORED: &[u8] = b"censored image bytes";

async fn downstream_with_image_host() -> MockServer {
    let downstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/cat.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png_bytes().to_vec()),
        )
        .mount(&downstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/infer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "label": "safe",
            "censored_image": general_purpose::STANDARD.encode(CENSORED),
        })))
        .mount(&downstream)
        .await;
    downstream
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_url_is_fetched_forwarded_and_outputs_linked() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_with_image_host().await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1))).await?;

    let image_url = format!("{}/images/cat.png", downstream.uri());
    let reply = harness
        .post_json(&user, "nudenet", &json!({ "url": image_url }))
        .await?;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["label"], "safe");
    let request_id = reply.request_id.clone().expect("request id header");

    let forwarded = downstream
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|request| request.method.as_str() == "POST")
        .expect("downstream was called");
    let forwarded_body = String::from_utf8_lossy(&forwarded.body).into_owned();
    assert!(forwarded_body.contains(r#"name="file"; filename="cat.png""#));
    assert!(forwarded_body.contains("e2e test image"));

    let censored_url = reply.body["censored_image"].as_str().expect("output link");
    assert!(censored_url.starts_with(&format!(
        "{}/assets/{user}/{request_id}/{request_id}-nudenet-censored_image.png",
        harness.base_url()
    )));
    let censored = harness.client().get(censored_url).send().await?;
    assert_eq!(censored.status(), StatusCode::OK);
    assert_eq!(censored.bytes().await?.as_ref(), CENSORED);

    let record = harness.get(&user, &format!("/requests/{request_id}")).await?;
    assert_eq!(record.body["status"], "success");
    assert_eq!(record.body["request"]["type"], "url");
    assert_eq!(record.body["request"]["file_name"], "cat.png");
    assert_eq!(
        credits_of(&record.body["response"]["funds"]["actual"]),
        credits_of(&reply.body["funds"]["actual"])
    );

    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_asset_links_are_refused() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_with_image_host().await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1))).await?;

    let reply = harness.upload(&user, "nudenet", png_bytes(), "photo.png").await?;
    assert_eq!(reply.status, StatusCode::OK);
    let link = Url::parse(reply.body["censored_image"].as_str().expect("output link"))?;

    let mut other_user = link.clone();
    other_user.set_path(&link.path().replace(&user, "someone-else"));
    let response = harness.client().get(other_user).send().await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut unsigned = link.clone();
    unsigned.set_query(None);
    let response = harness.client().get(unsigned).send().await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    harness.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_remote_image_is_refunded() -> Result<()> {
    init_test_tracing();
    let downstream = downstream_with_image_host().await;
    let mut harness = GatewayHarness::start(&e2e_catalog(&downstream.uri())).await?;
    let user = random_user_id("e2e");
    harness.open_account(&user, Credits::new(dec!(1))).await?;

    let missing = format!("{}/images/missing.png", downstream.uri());
    let reply = harness.post_json(&user, "nudenet", &json!({ "url": missing })).await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Failed to fetch image from URL");
    assert_eq!(harness.balance(&user).await?, Credits::new(dec!(1)));

    let request_id = reply.request_id.expect("request id header");
    let record = harness.get(&user, &format!("/requests/{request_id}")).await?;
    assert_eq!(record.body["status"], "failed");
    assert_eq!(record.body["request"]["url"], missing);

    let posts = downstream
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 0);

    harness.shutdown().await
}
