use request_directory_catalog::Credits;
use request_directory_request_log::{
    EncryptionPolicy, PayloadCipher, RequestFilter, RequestLogError, RequestLogger,
    RequestStatus, RequestUpdate, SqliteRequestLog,
};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

const KEY: &str = "8f2b6c1d0e9a7b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4";

fn encrypted_log() -> SqliteRequestLog {
    SqliteRequestLog::open_in_memory()
        .unwrap()
        .with_cipher(Some(PayloadCipher::from_hex(KEY).unwrap()))
}

#[tokio::test]
async fn begin_creates_pending_record() {
    let log = SqliteRequestLog::open_in_memory().unwrap();
    let id = log.begin("alice", "nudenet").await.unwrap();

    let record = log.get("alice", id).await.unwrap().expect("record exists");
    assert_eq!(record.status, RequestStatus::Pending);
    assert_eq!(record.service, "nudenet");
    assert!(record.cost.is_zero());
    assert!(record.request.is_none());
    assert!(!record.encrypted);
}

#[tokio::test]
async fn disjoint_updates_merge() {
    let log = SqliteRequestLog::open_in_memory().unwrap();
    let id = log.begin("alice", "nudenet").await.unwrap();

    log.update(
        id,
        RequestUpdate::status(RequestStatus::Pending)
            .with_request(json!({ "image": "https://assets/alice/x/cat.png" })),
    )
    .await
    .unwrap();
    log.update(
        id,
        RequestUpdate::status(RequestStatus::Success)
            .with_response(json!({ "label": "safe" }))
            .with_cost(Credits::new(dec!(0.000005))),
    )
    .await
    .unwrap();

    let record = log.get("alice", id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Success);
    assert_eq!(
        record.request,
        Some(json!({ "image": "https://assets/alice/x/cat.png" }))
    );
    assert_eq!(record.response, Some(json!({ "label": "safe" })));
    assert_eq!(record.cost, Credits::new(dec!(0.000005)));
}

#[tokio::test]
async fn status_takes_latest_value() {
    let log = SqliteRequestLog::open_in_memory().unwrap();
    let id = log.begin("alice", "nudenet").await.unwrap();

    log.update(id, RequestUpdate::status(RequestStatus::Failed).with_cost(Credits::ZERO))
        .await
        .unwrap();
    log.update(id, RequestUpdate::status(RequestStatus::Success))
        .await
        .unwrap();

    let record = log.get("alice", id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Success);
}

#[tokio::test]
async fn updating_unknown_request_fails() {
    let log = SqliteRequestLog::open_in_memory().unwrap();
    let err = log
        .update(Uuid::new_v4(), RequestUpdate::status(RequestStatus::Failed))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestLogError::NotFound(_)));
}

#[tokio::test]
async fn records_are_scoped_to_their_owner() {
    let log = SqliteRequestLog::open_in_memory().unwrap();
    let id = log.begin("alice", "nudenet").await.unwrap();
    assert!(log.get("mallory", id).await.unwrap().is_none());
    assert!(log
        .list("mallory", &RequestFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn encrypted_payloads_are_sealed_at_rest() {
    let dir = tempfile::tempdir().unwrap();
    let cipher = PayloadCipher::from_hex(KEY).unwrap();
    let log = SqliteRequestLog::new(dir.path())
        .unwrap()
        .with_cipher(Some(cipher.clone()));

    let id = log.begin("alice", "nudenet").await.unwrap();
    log.update(
        id,
        RequestUpdate::status(RequestStatus::Success)
            .with_response(json!({ "label": "secret-label" }))
            .encrypted(true),
    )
    .await
    .unwrap();

    let record = log.get("alice", id).await.unwrap().unwrap();
    assert!(record.encrypted);
    assert_eq!(record.response, Some(json!({ "label": "secret-label" })));

    let raw: String = rusqlite::Connection::open(dir.path().join("requests.db"))
        .unwrap()
        .query_row(
            "SELECT response FROM requests WHERE id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!raw.contains("secret-label"));
    assert!(raw.contains("nonce"));

    let keyless = SqliteRequestLog::new(dir.path()).unwrap();
    let sealed = keyless.get("alice", id).await.unwrap().unwrap();
    assert_ne!(sealed.response, Some(json!({ "label": "secret-label" })));
}

#[tokio::test]
async fn reject_policy_refuses_encryption_without_key() {
    let log = SqliteRequestLog::open_in_memory()
        .unwrap()
        .with_policy(EncryptionPolicy::Reject);
    assert!(matches!(
        log.ensure_encryptable(true),
        Err(RequestLogError::EncryptionUnavailable)
    ));
    assert!(log.ensure_encryptable(false).is_ok());

    let id = log.begin("alice", "nudenet").await.unwrap();
    let err = log
        .update(
            id,
            RequestUpdate::status(RequestStatus::Success)
                .with_response(json!({ "a": 1 }))
                .encrypted(true),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RequestLogError::EncryptionUnavailable));
}

#[tokio::test]
async fn plaintext_policy_stores_plaintext_and_says_so() {
    let log = SqliteRequestLog::open_in_memory()
        .unwrap()
        .with_policy(EncryptionPolicy::Plaintext);
    assert!(log.ensure_encryptable(true).is_ok());

    let id = log.begin("alice", "nudenet").await.unwrap();
    log.update(
        id,
        RequestUpdate::status(RequestStatus::Success)
            .with_response(json!({ "a": 1 }))
            .encrypted(true),
    )
    .await
    .unwrap();

    let record = log.get("alice", id).await.unwrap().unwrap();
    assert!(!record.encrypted);
    assert_eq!(record.response, Some(json!({ "a": 1 })));
}

#[tokio::test]
async fn list_filters_by_service_and_status() {
    let log = encrypted_log();
    let first = log.begin("alice", "nudenet").await.unwrap();
    let second = log.begin("alice", "facelandmarks").await.unwrap();
    let third = log.begin("alice", "nudenet").await.unwrap();
    log.update(first, RequestUpdate::status(RequestStatus::Success))
        .await
        .unwrap();
    log.update(third, RequestUpdate::status(RequestStatus::Failed))
        .await
        .unwrap();

    let all = log.list("alice", &RequestFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, third);

    let nudenet = log
        .list(
            "alice",
            &RequestFilter {
                service: Some("nudenet".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(nudenet.len(), 2);

    let failed = log
        .list(
            "alice",
            &RequestFilter {
                status: Some(RequestStatus::Failed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, third);

    let pending = log
        .list(
            "alice",
            &RequestFilter {
                status: Some(RequestStatus::Pending),
                limit: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);
}
