use std::time::Duration;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use request_directory::bench_support::{e2e_catalog, random_user_id, GatewayHarness};
use request_directory_catalog::{CostModel, Credits};
use request_directory_gateway::transport::{encode_multipart, parse_multipart_form, FilePayload};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bench_multipart(c: &mut Criterion) {
    let mut group = c.benchmark_group("multipart");

    for size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let file = FilePayload::new(
            Bytes::from(vec![0x5a; size]),
            Some("bench.png"),
            Some("image/png"),
        );
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &file, |b, file| {
            b.iter(|| encode_multipart(file, "file"));
        });

        let encoded = encode_multipart(&file, "image");
        group.bench_with_input(BenchmarkId::new("parse", size), &encoded, |b, encoded| {
            b.iter(|| parse_multipart_form(&encoded.content_type, &encoded.body).expect("parse"));
        });
    }

    group.finish();
}

fn bench_cost_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("cost_model");
    let proportional = CostModel::DurationProportional {
        baseline: Credits::new(dec!(0.0001)),
    };
    let fixed = CostModel::Fixed(Credits::new(dec!(0.000005)));
    let elapsed = Duration::from_micros(50_123);

    group.bench_function("duration_proportional", |b| {
        b.iter(|| proportional.actual_cost(elapsed));
    });
    group.bench_function("fixed", |b| b.iter(|| fixed.actual_cost(elapsed)));
    group.finish();
}

fn bench_gateway_round_trip(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("gateway");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2));

    let (downstream, harness, user) = runtime.block_on(async {
        let downstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/infer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "label": "safe" })))
            .mount(&downstream)
            .await;

        let harness = GatewayHarness::start(&e2e_catalog(&downstream.uri()))
            .await
            .expect("harness");
        let user = random_user_id("bench");
        harness
            .open_account(&user, Credits::new(dec!(1000000)))
            .await
            .expect("account");
        (downstream, harness, user)
    });

    let image = Bytes::from(vec![0x5a; 64 * 1024]);
    let (gateway, user, image) = (&harness, user.as_str(), &image);
    group.bench_function(BenchmarkId::new("upload", "nudenet-fixed"), |b| {
        b.to_async(&runtime).iter(|| async move {
            let reply = gateway
                .upload(user, "nudenet-fixed", image.clone(), "bench.png")
                .await
                .expect("call");
            assert!(reply.status.is_success());
        });
    });

    group.finish();
    drop(harness);
    drop(downstream);
}

criterion_group!(
    benches,
    bench_multipart,
    bench_cost_models,
    bench_gateway_round_trip
);
criterion_main!(benches);
