#![forbid(unsafe_code)]

//! SQLite persistence for trending videos.
//!
//! Everything lives in a single `videos` table keyed by the platform video id.
//! Rows are written once by ingestion and never updated afterwards; the only
//! way to remove them is [`StoreConnection::reset`], which drops the table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use libsql::{Builder, Connection, Row, params, params::IntoParams};
use serde::{Deserialize, Serialize};

/// One stored trending video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_name: String,
    pub category_name: String,
    pub view_count: i64,
    pub like_count: i64,
    pub published_at: String,
    /// Left empty on insert to let SQLite stamp `CURRENT_TIMESTAMP`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            video_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            channel_name TEXT NOT NULL,
            category_name TEXT NOT NULL DEFAULT 'Other',
            view_count INTEGER NOT NULL DEFAULT 0,
            like_count INTEGER NOT NULL DEFAULT 0,
            published_at TEXT,
            fetched_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_videos_view_count ON videos(view_count);
        "#,
    )
    .await?;
    Ok(())
}

/// Location of the SQLite file. Cheap to clone; every call to
/// [`VideoStore::connect`] opens a fresh connection that closes on drop, so
/// no connection outlives the request that opened it.
#[derive(Debug, Clone)]
pub struct VideoStore {
    path: PathBuf,
}

impl VideoStore {
    /// Creates the database file (and parent directory) if needed and makes
    /// sure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let store = Self { path };
        store.connect().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn connect(&self) -> Result<StoreConnection> {
        let db = Builder::new_local(&self.path)
            .build()
            .await
            .with_context(|| format!("opening video DB {}", self.path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        let conn = StoreConnection { conn };
        conn.initialize().await?;
        Ok(conn)
    }
}

/// A single open connection plus the operations the rest of the crate needs.
pub struct StoreConnection {
    conn: Connection,
}

impl StoreConnection {
    /// Creates the table and index when missing. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        ensure_schema(&self.conn)
            .await
            .context("creating videos schema")
    }

    /// Drops every stored video and recreates an empty schema.
    pub async fn reset(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                DROP INDEX IF EXISTS idx_videos_view_count;
                DROP TABLE IF EXISTS videos;
                "#,
            )
            .await
            .context("dropping videos table")?;
        self.initialize().await
    }

    /// Inserts `record` unless a row with the same `video_id` already exists.
    /// Existing rows are left untouched. Returns `true` when a row was written.
    pub async fn insert_if_absent(&self, record: &VideoRecord) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                r#"
                INSERT INTO videos (
                    video_id, title, channel_id, channel_name, category_name,
                    view_count, like_count, published_at, fetched_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, COALESCE(?9, CURRENT_TIMESTAMP)
                )
                ON CONFLICT(video_id) DO NOTHING
                "#,
                params![
                    record.video_id.as_str(),
                    record.title.as_str(),
                    record.channel_id.as_str(),
                    record.channel_name.as_str(),
                    record.category_name.as_str(),
                    record.view_count,
                    record.like_count,
                    record.published_at.as_str(),
                    record.fetched_at.as_deref(),
                ],
            )
            .await
            .with_context(|| format!("inserting video {}", record.video_id))?;
        Ok(changed > 0)
    }

    /// Runs a read-only query and maps every row, preserving result order.
    pub async fn query_rows<T, F>(
        &self,
        sql: &str,
        params: impl IntoParams,
        map: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(&Row) -> Result<T>,
    {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .context("running aggregate query")?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(map(&row)?);
        }
        Ok(results)
    }

    /// Like [`StoreConnection::query_rows`] for statements that always yield
    /// exactly one row (plain aggregates without GROUP BY).
    pub async fn query_one<T, F>(&self, sql: &str, params: impl IntoParams, map: F) -> Result<T>
    where
        F: Fn(&Row) -> Result<T>,
    {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .context("running aggregate query")?;
        let row = rows.next().await?.context("aggregate returned no row")?;
        map(&row)
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let mut records = self
            .query_rows(
                r#"
                SELECT video_id, title, channel_id, channel_name, category_name,
                       view_count, like_count, published_at, fetched_at
                FROM videos
                WHERE video_id = ?1
                "#,
                [video_id],
                row_to_video_record,
            )
            .await?;
        Ok(records.pop())
    }

    pub async fn count_videos(&self) -> Result<i64> {
        self.query_one("SELECT COUNT(*) FROM videos", params![], |row| {
            Ok(row.get::<i64>(0)?)
        })
        .await
    }
}

/// Column order must match the SELECT in [`StoreConnection::get_video`].
fn row_to_video_record(row: &Row) -> Result<VideoRecord> {
    Ok(VideoRecord {
        video_id: row.get(0)?,
        title: row.get(1)?,
        channel_id: row.get(2)?,
        channel_name: row.get(3)?,
        category_name: row.get(4)?,
        view_count: row.get(5)?,
        like_count: row.get(6)?,
        published_at: row.get::<Option<String>>(7)?.unwrap_or_default(),
        fetched_at: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn sample_video(id: &str) -> VideoRecord {
        VideoRecord {
            video_id: id.to_owned(),
            title: format!("Video {id}"),
            channel_id: format!("UC-{id}"),
            channel_name: format!("Channel {id}"),
            category_name: "Music".into(),
            view_count: 1_000,
            like_count: 50,
            published_at: "2024-01-01T00:00:00Z".into(),
            fetched_at: None,
        }
    }

    /// Opens a brand-new store inside a temp directory. The directory handle
    /// must stay alive for as long as the store is used.
    pub(crate) async fn create_store() -> Result<(tempfile::TempDir, VideoStore)> {
        let dir = tempdir()?;
        let store = VideoStore::open(dir.path().join("data/trending.db")).await?;
        Ok((dir, store))
    }

    /// Runs raw SQL on `conn`, for tests that need to tamper with the schema.
    pub(crate) async fn execute_raw(conn: &StoreConnection, sql: &str) -> Result<()> {
        conn.conn.execute_batch(sql).await?;
        Ok(())
    }

    #[tokio::test]
    async fn opens_store_and_creates_schema() -> Result<()> {
        let (_temp, store) = create_store().await?;
        assert!(store.path().exists(), "database file should be created");

        let conn = store.connect().await?;
        let journal = conn
            .query_one("PRAGMA journal_mode", params![], |row| {
                Ok(row.get::<String>(0)?)
            })
            .await?;
        assert_eq!(journal.to_lowercase(), "wal");

        for (kind, name) in [("table", "videos"), ("index", "idx_videos_view_count")] {
            let found = conn
                .query_rows(
                    "SELECT name FROM sqlite_master WHERE type = ?1 AND name = ?2",
                    [kind, name],
                    |row| Ok(row.get::<String>(0)?),
                )
                .await?;
            assert_eq!(found, vec![name.to_string()]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn initialize_is_idempotent() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        conn.insert_if_absent(&sample_video("keep")).await?;
        conn.initialize().await?;
        conn.initialize().await?;
        assert_eq!(conn.count_videos().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn insert_if_absent_skips_existing_rows() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;

        let original = sample_video("alpha");
        assert!(conn.insert_if_absent(&original).await?);

        let mut changed = original.clone();
        changed.title = "Rewritten".into();
        changed.view_count = 9_999;
        assert!(!conn.insert_if_absent(&changed).await?);

        let stored = conn.get_video("alpha").await?.expect("row stored");
        assert_eq!(stored.title, "Video alpha");
        assert_eq!(stored.view_count, 1_000);
        assert_eq!(conn.count_videos().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn fetched_at_defaults_to_insert_time() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        conn.insert_if_absent(&sample_video("auto")).await?;

        let mut stamped = sample_video("stamped");
        stamped.fetched_at = Some("2024-02-03 04:05:06".into());
        conn.insert_if_absent(&stamped).await?;

        let auto = conn.get_video("auto").await?.expect("auto row");
        assert!(auto.fetched_at.is_some_and(|value| !value.is_empty()));
        let stamped = conn.get_video("stamped").await?.expect("stamped row");
        assert_eq!(stamped.fetched_at.as_deref(), Some("2024-02-03 04:05:06"));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_connections_never_duplicate_rows() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let first = store.connect().await?;
        let second = store.connect().await?;

        let record = sample_video("race");
        let (a, b) = tokio::join!(
            first.insert_if_absent(&record),
            second.insert_if_absent(&record)
        );
        let inserted = [a?, b?].iter().filter(|done| **done).count();
        assert_eq!(inserted, 1);
        assert_eq!(first.count_videos().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reset_drops_all_rows_and_keeps_schema() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        for id in ["a", "b", "c"] {
            conn.insert_if_absent(&sample_video(id)).await?;
        }
        assert_eq!(conn.count_videos().await?, 3);

        conn.reset().await?;
        assert_eq!(conn.count_videos().await?, 0);

        // A fresh connection sees the empty table and can write again.
        let other = store.connect().await?;
        assert_eq!(other.count_videos().await?, 0);
        assert!(other.insert_if_absent(&sample_video("a")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn query_rows_preserves_order() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        for (id, views) in [("low", 10), ("high", 300), ("mid", 200)] {
            let mut record = sample_video(id);
            record.view_count = views;
            conn.insert_if_absent(&record).await?;
        }

        let ids = conn
            .query_rows(
                "SELECT video_id FROM videos ORDER BY view_count DESC LIMIT ?1",
                params![2_i64],
                |row| Ok(row.get::<String>(0)?),
            )
            .await?;
        assert_eq!(ids, vec!["high".to_string(), "mid".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn get_video_returns_none_for_missing_rows() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        assert!(conn.get_video("ghost").await?.is_none());
        Ok(())
    }
}
