use anyhow::{Context, Result};
use log::info;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to inspect schema_version table")?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        BEGIN;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS video (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT
        );

        CREATE TABLE IF NOT EXISTS transcriptline (
            video_id TEXT NOT NULL,
            start_sec INTEGER NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY (video_id, start_sec)
        );

        CREATE TABLE IF NOT EXISTS segment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES video(id),
            start_sec INTEGER NOT NULL CHECK (start_sec >= 0),
            keyword TEXT NOT NULL,
            text TEXT,
            image_path TEXT
        );

        CREATE INDEX IF NOT EXISTS ix_segment_video_id ON segment(video_id);

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;
        "#,
    )
    .context("Failed to apply schema v1")?;

    info!("Database schema migrated to v{SCHEMA_VERSION}");
    Ok(())
}
