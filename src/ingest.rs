#![forbid(unsafe_code)]

//! A single fetch-and-store pass over the trending chart.
//!
//! Items are written one by one with insert-if-absent semantics: videos we
//! already know are skipped silently, and rows written before a failure stay
//! committed.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    categories::category_name,
    config::AppConfig,
    storage::{StoreConnection, VideoRecord},
    youtube::{TrendingItem, VideoPlatform},
};

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Pulls the configured region's trending chart and stores every video not
/// seen before.
pub async fn fetch_trending(
    conn: &StoreConnection,
    platform: Arc<dyn VideoPlatform>,
    config: &AppConfig,
) -> Result<IngestReport> {
    let region_code = config.region_code.clone();
    let max_results = config.max_results;
    let items = tokio::task::spawn_blocking(move || {
        platform.list_trending(&region_code, max_results)
    })
    .await
    .context("trending fetch task failed")??;
    debug!(count = items.len(), region = %config.region_code, "fetched trending chart");

    store_trending(conn, &items).await
}

/// Inserts `items` in order, counting new rows and skipping known ids.
pub async fn store_trending(
    conn: &StoreConnection,
    items: &[TrendingItem],
) -> Result<IngestReport> {
    let fetched_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mut report = IngestReport::default();

    for item in items {
        let record = to_record(item, &fetched_at);
        if conn.insert_if_absent(&record).await? {
            report.inserted += 1;
        } else {
            debug!(video_id = %record.video_id, "video already stored");
            report.skipped += 1;
        }
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "trending ingestion finished"
    );
    Ok(report)
}

/// Maps a platform item onto the stored row shape. The category label is
/// resolved here, once, and never recomputed.
pub fn to_record(item: &TrendingItem, fetched_at: &str) -> VideoRecord {
    VideoRecord {
        video_id: item.id.clone(),
        title: item.title.clone(),
        channel_id: item.channel_id.clone(),
        channel_name: item.channel_title.clone(),
        category_name: category_name(item.category_id.as_deref()).to_string(),
        view_count: item.view_count.max(0),
        like_count: item.like_count.max(0),
        published_at: item.published_at.clone(),
        fetched_at: Some(fetched_at.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::OTHER_CATEGORY;
    use crate::storage::tests::{create_store, execute_raw};
    use crate::youtube::fake::{FakePlatform, trending_item};

    fn config() -> AppConfig {
        AppConfig {
            region_code: "IN".into(),
            max_results: 50,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn second_pass_over_same_chart_inserts_nothing() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let platform: Arc<FakePlatform> = Arc::new(FakePlatform::with_trending(vec![
            trending_item("a", "One", 100, 10),
            trending_item("b", "Two", 200, 20),
            trending_item("c", "One", 300, 30),
        ]));

        let first = fetch_trending(&conn, platform.clone(), &config()).await?;
        assert_eq!(first, IngestReport { inserted: 3, skipped: 0 });

        let second = fetch_trending(&conn, platform.clone(), &config()).await?;
        assert_eq!(second, IngestReport { inserted: 0, skipped: 3 });
        assert_eq!(conn.count_videos().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn passes_region_and_page_size_from_config() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let platform = Arc::new(FakePlatform::default());
        let config = AppConfig {
            region_code: "US".into(),
            max_results: 10,
            ..AppConfig::default()
        };

        fetch_trending(&conn, platform.clone(), &config).await?;

        let calls = platform.trending_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("US".to_string(), 10)]);
        Ok(())
    }

    #[tokio::test]
    async fn new_items_are_added_next_to_known_ones() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let platform = Arc::new(FakePlatform::with_trending(vec![trending_item("a", "One", 100, 10)]));
        fetch_trending(&conn, platform.clone(), &config()).await?;

        let mut changed = trending_item("a", "One", 999_999, 10);
        changed.title = "Renamed".into();
        *platform.trending.lock().unwrap() = vec![changed, trending_item("b", "Two", 5, 1)];
        let report = fetch_trending(&conn, platform.clone(), &config()).await?;

        assert_eq!(report, IngestReport { inserted: 1, skipped: 1 });
        let kept = conn.get_video("a").await?.expect("original row");
        assert_eq!(kept.title, "Trending a");
        assert_eq!(kept.view_count, 100);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_chart_count_once() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let items = vec![
            trending_item("dup", "One", 100, 10),
            trending_item("dup", "One", 100, 10),
        ];

        let report = store_trending(&conn, &items).await?;

        assert_eq!(report, IngestReport { inserted: 1, skipped: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn unknown_category_is_stored_as_other() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let mut odd = trending_item("odd", "One", 100, 10);
        odd.category_id = Some("99".into());
        let mut missing = trending_item("missing", "One", 100, 10);
        missing.category_id = None;

        store_trending(&conn, &[odd, missing, trending_item("music", "Two", 1, 1)]).await?;

        assert_eq!(
            conn.get_video("odd").await?.unwrap().category_name,
            OTHER_CATEGORY
        );
        assert_eq!(
            conn.get_video("missing").await?.unwrap().category_name,
            OTHER_CATEGORY
        );
        assert_eq!(conn.get_video("music").await?.unwrap().category_name, "Music");
        Ok(())
    }

    #[tokio::test]
    async fn platform_failure_propagates_without_writes() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        let platform = Arc::new(FakePlatform {
            trending_error: Some("API key not valid.".into()),
            ..FakePlatform::with_trending(vec![trending_item("a", "One", 1, 1)])
        });

        let err = fetch_trending(&conn, platform, &config()).await.unwrap_err();

        assert_eq!(err.to_string(), "API key not valid.");
        assert_eq!(conn.count_videos().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_keeps_rows_written_before_it() -> Result<()> {
        let (_temp, store) = create_store().await?;
        let conn = store.connect().await?;
        execute_raw(
            &conn,
            r#"
            CREATE TRIGGER reject_bad BEFORE INSERT ON videos
            WHEN NEW.video_id = 'bad'
            BEGIN
                SELECT RAISE(ABORT, 'disk gone');
            END;
            "#,
        )
        .await?;
        let items = vec![
            trending_item("good", "One", 100, 10),
            trending_item("bad", "One", 200, 20),
            trending_item("late", "Two", 300, 30),
        ];

        let err = store_trending(&conn, &items).await.unwrap_err();

        assert!(format!("{err:#}").contains("disk gone"));
        assert_eq!(conn.count_videos().await?, 1);
        assert!(conn.get_video("good").await?.is_some());
        assert!(conn.get_video("late").await?.is_none());
        Ok(())
    }

    #[test]
    fn to_record_copies_fields_and_stamps_fetch_time() {
        let item = trending_item("v1", "Creator", 1_000, 50);
        let record = to_record(&item, "2024-06-01 08:00:00");

        assert_eq!(record.video_id, "v1");
        assert_eq!(record.title, "Trending v1");
        assert_eq!(record.channel_id, "UC-Creator");
        assert_eq!(record.channel_name, "Creator");
        assert_eq!(record.category_name, "Music");
        assert_eq!(record.view_count, 1_000);
        assert_eq!(record.like_count, 50);
        assert_eq!(record.published_at, "2024-03-01T12:00:00Z");
        assert_eq!(record.fetched_at.as_deref(), Some("2024-06-01 08:00:00"));
    }
}
