use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use request_directory_catalog::Credits;
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cipher::{EncryptedPayload, EncryptionPolicy, PayloadCipher};
use crate::error::RequestLogError;
use crate::schema::init_database;
use crate::types::{RequestFilter, RequestId, RequestRecord, RequestStatus, RequestUpdate};
use crate::REQUESTS_DB_FILENAME;

pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Durable per-call audit trail.
#[async_trait]
pub trait RequestLogger: Send + Sync {
    /// Fails with [`RequestLogError::EncryptionUnavailable`] when `encrypt`
    /// cannot be honoured under the configured policy.
    fn ensure_encryptable(&self, encrypt: bool) -> Result<(), RequestLogError>;

    async fn begin(&self, user_id: &str, service: &str) -> Result<RequestId, RequestLogError>;

    async fn update(&self, id: RequestId, update: RequestUpdate) -> Result<(), RequestLogError>;

    async fn get(
        &self,
        user_id: &str,
        id: RequestId,
    ) -> Result<Option<RequestRecord>, RequestLogError>;

    async fn list(
        &self,
        user_id: &str,
        filter: &RequestFilter,
    ) -> Result<Vec<RequestRecord>, RequestLogError>;
}

#[derive(Clone)]
pub struct SqliteRequestLog {
    conn: Arc<Mutex<Connection>>,
    cipher: Option<PayloadCipher>,
    policy: EncryptionPolicy,
}

struct StoredPayload {
    text: Option<String>,
    encrypted: bool,
}

impl SqliteRequestLog {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, RequestLogError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(REQUESTS_DB_FILENAME);
        let is_new = !db_path.exists();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        if is_new {
            init_database(&conn)?;
            info!(path = %db_path.display(), "initialized request log database");
        }

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, RequestLogError> {
        let conn = Connection::open_in_memory()?;
        init_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            cipher: None,
            policy: EncryptionPolicy::default(),
        }
    }

    pub fn with_cipher(mut self, cipher: Option<PayloadCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_policy(mut self, policy: EncryptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn run<T, F>(&self, op: F) -> Result<T, RequestLogError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RequestLogError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| RequestLogError::Poisoned)?;
            op(&*conn)
        })
        .await?
    }

    fn seal(&self, payload: Option<&Value>, encrypt: bool) -> Result<StoredPayload, RequestLogError> {
        let Some(payload) = payload else {
            return Ok(StoredPayload {
                text: None,
                encrypted: false,
            });
        };

        match (&self.cipher, encrypt) {
            (Some(cipher), true) => {
                let sealed = cipher.encrypt(payload)?;
                Ok(StoredPayload {
                    text: Some(serde_json::to_string(&sealed)?),
                    encrypted: true,
                })
            }
            _ => Ok(StoredPayload {
                text: Some(serde_json::to_string(payload)?),
                encrypted: false,
            }),
        }
    }

    fn open(&self, text: Option<String>, encrypted: bool) -> Option<Value> {
        let text = text?;
        if !encrypted {
            return serde_json::from_str(&text).ok();
        }

        let envelope: EncryptedPayload = serde_json::from_str(&text).ok()?;
        match &self.cipher {
            Some(cipher) => match cipher.decrypt(&envelope) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(error = %err, "unable to decrypt logged payload");
                    serde_json::to_value(envelope).ok()
                }
            },
            None => serde_json::to_value(envelope).ok(),
        }
    }
}

struct RawRecord {
    id: String,
    user_id: String,
    service: String,
    status: String,
    request: Option<String>,
    response: Option<String>,
    request_encrypted: bool,
    response_encrypted: bool,
    cost: i64,
    created_at: String,
    updated_at: String,
}

const SELECT_COLUMNS: &str = "id, user_id, service, status, request, response, request_encrypted, response_encrypted, cost, created_at, updated_at";

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service: row.get(2)?,
        status: row.get(3)?,
        request: row.get(4)?,
        response: row.get(5)?,
        request_encrypted: row.get::<_, i64>(6)? != 0,
        response_encrypted: row.get::<_, i64>(7)? != 0,
        cost: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl SqliteRequestLog {
    fn decode(&self, raw: RawRecord) -> Option<RequestRecord> {
        let id = match Uuid::parse_str(&raw.id) {
            Ok(id) => id,
            Err(err) => {
                warn!(request_id = %raw.id, error = %err, "skipping request with malformed id");
                return None;
            }
        };
        let status = match raw.status.parse::<RequestStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!(request_id = %raw.id, error = %err, "skipping request with unknown status");
                return None;
            }
        };

        Some(RequestRecord {
            id,
            user_id: raw.user_id,
            service: raw.service,
            status,
            request: self.open(raw.request, raw.request_encrypted),
            response: self.open(raw.response, raw.response_encrypted),
            cost: Credits::from_units(raw.cost),
            encrypted: raw.request_encrypted || raw.response_encrypted,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

#[async_trait]
impl RequestLogger for SqliteRequestLog {
    fn ensure_encryptable(&self, encrypt: bool) -> Result<(), RequestLogError> {
        if encrypt && self.cipher.is_none() && self.policy == EncryptionPolicy::Reject {
            return Err(RequestLogError::EncryptionUnavailable);
        }
        Ok(())
    }

    async fn begin(&self, user_id: &str, service: &str) -> Result<RequestId, RequestLogError> {
        let id = Uuid::new_v4();
        let user_id = user_id.to_string();
        let service = service.to_string();

        self.run(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                r#"
                INSERT INTO requests (id, user_id, service, status, cost, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
                "#,
                params![
                    id.to_string(),
                    user_id,
                    service,
                    RequestStatus::Pending.as_str(),
                    now
                ],
            )?;
            debug!(request_id = %id, user_id = %user_id, service = %service, "logged pending request");
            Ok(id)
        })
        .await
    }

    async fn update(&self, id: RequestId, update: RequestUpdate) -> Result<(), RequestLogError> {
        self.ensure_encryptable(update.encrypt)?;
        if update.encrypt && self.cipher.is_none() {
            warn!(request_id = %id, "encryption requested without a key, storing plaintext");
        }

        let request = self.seal(update.request.as_ref(), update.encrypt)?;
        let response = self.seal(update.response.as_ref(), update.encrypt)?;
        let cost = match update.cost {
            Some(cost) => Some(cost.to_units().ok_or_else(|| {
                RequestLogError::InvalidCost(format!("cost out of range: {cost}"))
            })?),
            None => None,
        };
        let status = update.status;

        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE requests SET
                    status = ?1,
                    request = COALESCE(?2, request),
                    request_encrypted = CASE WHEN ?2 IS NULL THEN request_encrypted ELSE ?3 END,
                    response = COALESCE(?4, response),
                    response_encrypted = CASE WHEN ?4 IS NULL THEN response_encrypted ELSE ?5 END,
                    cost = COALESCE(?6, cost),
                    updated_at = ?7
                WHERE id = ?8
                "#,
                params![
                    status.as_str(),
                    request.text,
                    request.encrypted,
                    response.text,
                    response.encrypted,
                    cost,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )?;

            if changed == 0 {
                return Err(RequestLogError::NotFound(id.to_string()));
            }
            debug!(request_id = %id, status = %status, "updated request log");
            Ok(())
        })
        .await
    }

    async fn get(
        &self,
        user_id: &str,
        id: RequestId,
    ) -> Result<Option<RequestRecord>, RequestLogError> {
        let user_id = user_id.to_string();
        let raw = self
            .run(move |conn| {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM requests WHERE id = ?1 AND user_id = ?2");
                Ok(conn
                    .query_row(&sql, params![id.to_string(), user_id], raw_record)
                    .optional()?)
            })
            .await?;

        Ok(raw.and_then(|raw| self.decode(raw)))
    }

    async fn list(
        &self,
        user_id: &str,
        filter: &RequestFilter,
    ) -> Result<Vec<RequestRecord>, RequestLogError> {
        let mut conditions = vec!["user_id = :user_id".to_string()];
        let mut bindings: Vec<(String, SqlValue)> =
            vec![(":user_id".into(), user_id.to_string().into())];

        if let Some(service) = &filter.service {
            conditions.push("service = :service".into());
            bindings.push((":service".into(), service.clone().into()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = :status".into());
            bindings.push((":status".into(), status.as_str().to_string().into()));
        }

        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM requests WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT {limit}",
            conditions.join(" AND ")
        );

        let rows = self
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let named: Vec<(&str, &dyn ToSql)> = bindings
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                    .collect();
                let rows = stmt.query_map(named.as_slice(), raw_record)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await?;

        Ok(rows.into_iter().filter_map(|raw| self.decode(raw)).collect())
    }
}
