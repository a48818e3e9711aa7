//! Schema upgrades for the draft database.
//!
//! The applied level lives in SQLite's `user_version` header field. Each
//! upgrade runs in its own transaction together with the version bump, so a
//! failed upgrade leaves the file at the previous level.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// Ordered schema levels. Level N is `SCHEMA[N - 1]`.
const SCHEMA: &[(&str, &str)] = &[(
    "draft answers and flow position",
    r#"
        CREATE TABLE draft_answers (
            user_id TEXT NOT NULL,
            field TEXT NOT NULL CHECK (length(field) > 0),
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, field)
        );
        CREATE TABLE onboarding_flow (
            user_id TEXT PRIMARY KEY,
            step TEXT NOT NULL,
            last_error TEXT,
            updated_at TEXT NOT NULL
        );
    "#,
)];

/// Bring the schema up to the newest level.
pub async fn upgrade(conn: &Connection) -> Result<(), DatabaseError> {
    let current = schema_level(conn).await?;

    for (index, (name, sql)) in SCHEMA.iter().enumerate() {
        let level = index as i64 + 1;
        if level <= current {
            continue;
        }
        info!(level, name, "Upgrading draft schema");
        conn.execute_batch(&format!(
            "BEGIN; {sql} PRAGMA user_version = {level}; COMMIT;"
        ))
        .await
        .map_err(|e| DatabaseError::Migration(format!("level {level} ({name}): {e}")))?;
    }

    debug!(level = SCHEMA.len(), "Draft schema ready");
    Ok(())
}

/// The schema level recorded in the database file; 0 for a fresh file.
pub async fn schema_level(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("PRAGMA user_version", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading user_version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Migration(format!("reading user_version: {e}"))),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!("reading user_version: {e}"))),
    }
}
