use rusqlite::Connection;

pub const REQUESTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    service TEXT NOT NULL,
    status TEXT NOT NULL,
    request TEXT,
    response TEXT,
    request_encrypted INTEGER NOT NULL DEFAULT 0,
    response_encrypted INTEGER NOT NULL DEFAULT 0,
    cost INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub const REQUESTS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_requests_user_created ON requests(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_requests_user_service ON requests(user_id, service);
"#;

pub fn init_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(REQUESTS_TABLE_SCHEMA)?;
    conn.execute_batch(REQUESTS_INDEXES)?;
    Ok(())
}
