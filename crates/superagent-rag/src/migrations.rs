//! Database schema migrations for the document registry.

use rusqlite::Connection;
use tracing::info;

use crate::error::RagError;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), RagError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| RagError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| RagError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: documents");
    }

    Ok(())
}

/// Version 1: document registry.
fn apply_v1(conn: &Connection) -> Result<(), RagError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL,
            file_name       TEXT NOT NULL,
            file_type       TEXT NOT NULL DEFAULT '',
            file_size       INTEGER NOT NULL DEFAULT 0,
            metadata        TEXT NOT NULL DEFAULT '{}',
            status          TEXT NOT NULL DEFAULT 'processing'
                            CHECK (status IN ('processing', 'completed', 'failed')),
            chunk_count     INTEGER NOT NULL DEFAULT 0,
            vector_ids      TEXT NOT NULL DEFAULT '[]',
            content_preview TEXT,
            error           TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_tenant_created
            ON documents (tenant_id, created_at DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'documents');
        ",
    )
    .map_err(|e| RagError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO documents (id, tenant_id, file_name, status, created_at)
             VALUES ('x', 't', 'f.txt', 'bogus', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
