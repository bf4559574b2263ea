use rusqlite::Connection;

pub const USERS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    funds INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const LEDGER_ENTRIES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id),
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub const LEDGER_ENTRIES_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entries_user ON ledger_entries(user_id, id);
"#;

pub fn init_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(USERS_TABLE_SCHEMA)?;
    conn.execute_batch(LEDGER_ENTRIES_TABLE_SCHEMA)?;
    conn.execute_batch(LEDGER_ENTRIES_INDEXES)?;
    Ok(())
}
