use anyhow::{Context, Result};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::models::{NewSegment, SegmentRecord, TranscriptLine, Video};
use crate::services::migrations;

/// Owns the SQLite connection holding videos, transcript lines and segments.
pub struct Store {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {parent:?}"))?;
            }
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;
        let store = Self::from_connection(conn, db_path)?;
        info!("Database initialized at: {:?}", store.db_path());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        migrations::run_migrations(&conn).context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` on the blocking pool so long SQLite writes stay off the
    /// async executor.
    pub async fn blocking<F, T>(self: Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&self))
            .await
            .context("Store task did not complete")?
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock database connection: {e}"))?;
        f(&mut conn)
    }

    pub fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, title FROM video WHERE id = ?1",
                params![video_id],
                |row| {
                    Ok(Video {
                        id: row.get(0)?,
                        title: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to load video")
        })
    }

    pub fn transcript_lines(&self, video_id: &str) -> Result<Vec<TranscriptLine>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT video_id, start_sec, text FROM transcriptline
                     WHERE video_id = ?1 ORDER BY start_sec ASC",
                )
                .context("Failed to prepare transcript query")?;

            let lines = stmt
                .query_map(params![video_id], |row| {
                    Ok(TranscriptLine {
                        video_id: row.get(0)?,
                        start_sec: row.get(1)?,
                        text: row.get(2)?,
                    })
                })
                .context("Failed to query transcript lines")?;

            lines
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to collect transcript lines")
        })
    }

    /// Replace every stored line of `video_id` in one transaction. Lines that
    /// land on the same whole second are merged in arrival order.
    pub fn replace_transcript(&self, video_id: &str, lines: &[(i64, String)]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .context("Failed to start transcript transaction")?;

            tx.execute(
                "DELETE FROM transcriptline WHERE video_id = ?1",
                params![video_id],
            )
            .context("Failed to delete old transcript lines")?;

            {
                let mut insert = tx
                    .prepare(
                        "INSERT INTO transcriptline (video_id, start_sec, text) VALUES (?1, ?2, ?3)
                         ON CONFLICT(video_id, start_sec) DO UPDATE SET text = text || ' ' || excluded.text",
                    )
                    .context("Failed to prepare transcript insert")?;
                for (start_sec, text) in lines {
                    insert
                        .execute(params![video_id, start_sec, text])
                        .context("Failed to insert transcript line")?;
                }
            }

            tx.commit().context("Failed to commit transcript")?;
            Ok(())
        })
    }

    pub fn segments(&self, video_id: &str) -> Result<Vec<SegmentRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, video_id, start_sec, keyword, text, image_path FROM segment
                     WHERE video_id = ?1 ORDER BY start_sec ASC, id ASC",
                )
                .context("Failed to prepare segment query")?;

            let segments = stmt
                .query_map(params![video_id], |row| {
                    Ok(SegmentRecord {
                        id: row.get(0)?,
                        video_id: row.get(1)?,
                        start_sec: row.get(2)?,
                        keyword: row.get(3)?,
                        text: row.get(4)?,
                        image_path: row.get(5)?,
                    })
                })
                .context("Failed to query segments")?;

            segments
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to collect segments")
        })
    }

    /// Replace the segment set of `video_id` in one transaction, creating the
    /// owning video row when missing.
    pub fn replace_segments(&self, video_id: &str, segments: &[NewSegment]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .context("Failed to start segment transaction")?;

            let created = tx
                .execute(
                    "INSERT OR IGNORE INTO video (id) VALUES (?1)",
                    params![video_id],
                )
                .context("Failed to create video row")?;
            if created > 0 {
                info!("Created video row for {video_id}");
            }

            tx.execute("DELETE FROM segment WHERE video_id = ?1", params![video_id])
                .context("Failed to delete old segments")?;

            {
                let mut insert = tx
                    .prepare(
                        "INSERT INTO segment (video_id, start_sec, keyword, text, image_path)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .context("Failed to prepare segment insert")?;
                for segment in segments {
                    insert
                        .execute(params![
                            video_id,
                            segment.start_sec,
                            segment.keyword,
                            segment.text,
                            segment.image_path,
                        ])
                        .context("Failed to insert segment")?;
                }
            }

            tx.commit().context("Failed to commit segments")?;
            Ok(())
        })
    }
}
