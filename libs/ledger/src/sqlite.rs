use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use request_directory_catalog::Credits;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::ledger::{EntryKind, Ledger, LedgerEntry};
use crate::schema::init_database;
use crate::LEDGER_DB_FILENAME;

/// SQLite-backed [`Ledger`].
///
/// The connection is shared behind a mutex and every operation runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(LEDGER_DB_FILENAME);
        let is_new = !db_path.exists();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        if is_new {
            init_database(&conn)?;
            info!(path = %db_path.display(), "initialized ledger database");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| LedgerError::Poisoned)?;
            op(&mut *conn)
        })
        .await?
    }

    /// Applies `funds = funds - delta` and journals it.
    async fn adjust(
        &self,
        user_id: &str,
        kind: EntryKind,
        delta: i64,
    ) -> Result<Credits, LedgerError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let balance = tx
                .query_row(
                    r#"
                    UPDATE users
                    SET funds = funds - ?1, updated_at = ?2
                    WHERE id = ?3
                    RETURNING funds
                    "#,
                    params![delta, Utc::now().to_rfc3339(), user_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))?;
            journal(&tx, &user_id, kind, -delta, balance)?;
            tx.commit()?;
            Ok(Credits::from_units(balance))
        })
        .await
    }
}

fn units(amount: Credits) -> Result<i64, LedgerError> {
    if amount.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount cannot be negative: {amount}"
        )));
    }
    amount
        .to_units()
        .ok_or_else(|| LedgerError::InvalidAmount(format!("amount out of range: {amount}")))
}

fn journal(
    tx: &Transaction<'_>,
    user_id: &str,
    kind: EntryKind,
    amount: i64,
    balance_after: i64,
) -> Result<(), LedgerError> {
    tx.execute(
        r#"
        INSERT INTO ledger_entries (user_id, kind, amount, balance_after, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            user_id,
            kind.as_str(),
            amount,
            balance_after,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

fn current_funds(conn: &Connection, user_id: &str) -> Result<Option<i64>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT funds FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?)
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn balance(&self, user_id: &str) -> Result<Credits, LedgerError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            current_funds(conn, &user_id)?
                .map(Credits::from_units)
                .ok_or(LedgerError::AccountNotFound(user_id))
        })
        .await
    }

    async fn reserve(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError> {
        let required = units(amount)?;
        let user = user_id.to_string();
        let result = self
            .run(move |conn| {
                let tx = conn.transaction()?;
                let reserved = tx
                    .query_row(
                        r#"
                        UPDATE users
                        SET funds = funds - ?1, updated_at = ?2
                        WHERE id = ?3 AND funds >= ?1
                        RETURNING funds
                        "#,
                        params![required, Utc::now().to_rfc3339(), user],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;

                let Some(balance) = reserved else {
                    return match current_funds(&tx, &user)? {
                        Some(balance) => Err(LedgerError::InsufficientFunds {
                            balance: Credits::from_units(balance),
                            required: Credits::from_units(required),
                        }),
                        None => Err(LedgerError::AccountNotFound(user)),
                    };
                };

                journal(&tx, &user, EntryKind::Reserve, -required, balance)?;
                tx.commit()?;
                Ok(Credits::from_units(balance))
            })
            .await;

        match &result {
            Ok(balance) => debug!(user_id, %amount, %balance, "reserved funds"),
            Err(LedgerError::InsufficientFunds { balance, .. }) => {
                debug!(user_id, %amount, %balance, "reservation refused")
            }
            Err(err) => warn!(user_id, error = %err, "reservation failed"),
        }
        result
    }

    async fn reconcile(
        &self,
        user_id: &str,
        actual: Credits,
        reserved: Credits,
    ) -> Result<Credits, LedgerError> {
        let delta = units(actual)? - units(reserved)?;
        let balance = self.adjust(user_id, EntryKind::Reconcile, delta).await?;
        debug!(user_id, %actual, %reserved, %balance, "reconciled reservation");
        if balance.is_negative() {
            warn!(user_id, %balance, "reconciliation left balance negative");
        }
        Ok(balance)
    }

    async fn refund(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError> {
        let balance = self.adjust(user_id, EntryKind::Refund, -units(amount)?).await?;
        debug!(user_id, %amount, %balance, "refunded reservation");
        Ok(balance)
    }

    async fn credit(&self, user_id: &str, amount: Credits) -> Result<Credits, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("credit must be positive".into()));
        }
        let balance = self.adjust(user_id, EntryKind::Credit, -units(amount)?).await?;
        info!(user_id, %amount, %balance, "credited account");
        Ok(balance)
    }

    async fn open_account(&self, user_id: &str, initial: Credits) -> Result<Credits, LedgerError> {
        let initial = units(initial)?;
        let user = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            let inserted = tx.execute(
                r#"
                INSERT INTO users (id, funds, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(id) DO NOTHING
                "#,
                params![user, initial, now],
            )?;

            if inserted == 0 {
                let existing = current_funds(&tx, &user)?.unwrap_or_default();
                return Ok(Credits::from_units(existing));
            }

            journal(&tx, &user, EntryKind::Open, initial, initial)?;
            tx.commit()?;
            info!(user_id = %user, "opened account");
            Ok(Credits::from_units(initial))
        })
        .await
    }

    async fn entries(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT user_id, kind, amount, balance_after, created_at
                FROM ledger_entries
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )?;

            let rows = stmt.query_map(params![user_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (user_id, kind, amount, balance_after, created_at) = row?;
                entries.push(LedgerEntry {
                    user_id,
                    kind: kind.parse()?,
                    amount: Credits::from_units(amount),
                    balance_after: Credits::from_units(balance_after),
                    created_at,
                });
            }
            Ok(entries)
        })
        .await
    }
}
