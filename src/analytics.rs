#![forbid(unsafe_code)]

//! Read-only aggregates behind the dashboard panels. Each function answers
//! one panel and returns rows already shaped for JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use libsql::params;
use serde::Serialize;

use crate::{
    categories::OTHER_CATEGORY,
    storage::StoreConnection,
    youtube::{ChannelStats, VideoPlatform},
};

/// Distinct channels handed to the platform for live statistics.
pub const CREATOR_SAMPLE_SIZE: i64 = 50;
pub const TOP_CREATORS_LIMIT: usize = 10;
pub const TOP_VIDEOS_LIMIT: i64 = 5;
pub const TOP_CHANNELS_LIMIT: i64 = 10;
pub const ENGAGEMENT_LIMIT: i64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_videos: i64,
    pub total_channels: i64,
    pub total_views: i64,
    pub total_likes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCreator {
    pub channel_name: String,
    pub subscriber_count: i64,
    pub total_views: i64,
    pub video_count: i64,
}

impl From<ChannelStats> for TopCreator {
    fn from(stats: ChannelStats) -> Self {
        Self {
            channel_name: stats.title,
            subscriber_count: stats.subscriber_count,
            total_views: stats.view_count,
            video_count: stats.video_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendingVideo {
    pub title: String,
    pub channel_name: String,
    pub view_count: i64,
    pub like_count: i64,
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel_name: String,
    pub video_count: i64,
    pub total_views: i64,
    pub avg_views: f64,
    pub total_likes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category_name: String,
    pub video_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub avg_views: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementRow {
    pub title: String,
    pub channel_name: String,
    pub view_count: i64,
    pub like_count: i64,
    /// Likes per hundred views, rounded to two decimals.
    pub engagement_rate: f64,
}

pub async fn stats_summary(conn: &StoreConnection) -> Result<StatsSummary> {
    conn.query_one(
        r#"
        SELECT COUNT(*),
               COUNT(DISTINCT channel_name),
               COALESCE(SUM(view_count), 0),
               COALESCE(SUM(like_count), 0)
        FROM videos
        "#,
        params![],
        |row| {
            Ok(StatsSummary {
                total_videos: row.get(0)?,
                total_channels: row.get(1)?,
                total_views: row.get(2)?,
                total_likes: row.get(3)?,
            })
        },
    )
    .await
}

/// Channel ids sampled for the creator ranking: the first
/// [`CREATOR_SAMPLE_SIZE`] distinct channels in table order. No ORDER BY, so
/// which channels make the cut is whatever SQLite returns first.
pub async fn sampled_channel_ids(conn: &StoreConnection) -> Result<Vec<String>> {
    conn.query_rows(
        r#"
        SELECT DISTINCT channel_id, channel_name
        FROM videos
        LIMIT ?1
        "#,
        params![CREATOR_SAMPLE_SIZE],
        |row| Ok(row.get::<String>(0)?),
    )
    .await
}

/// Ranks sampled channels by live subscriber count. Ties keep the order the
/// platform returned them in. An empty store never reaches the platform.
pub async fn top_creators(
    conn: &StoreConnection,
    platform: Arc<dyn VideoPlatform>,
) -> Result<Vec<TopCreator>> {
    let channel_ids = sampled_channel_ids(conn).await?;
    if channel_ids.is_empty() {
        return Ok(Vec::new());
    }

    let stats = tokio::task::spawn_blocking(move || platform.list_channel_stats(&channel_ids))
        .await
        .context("channel statistics task failed")??;

    Ok(rank_creators(stats))
}

fn rank_creators(stats: Vec<ChannelStats>) -> Vec<TopCreator> {
    let mut creators: Vec<TopCreator> = stats.into_iter().map(TopCreator::from).collect();
    creators.sort_by(|a, b| b.subscriber_count.cmp(&a.subscriber_count));
    creators.truncate(TOP_CREATORS_LIMIT);
    creators
}

pub async fn top_trending_videos(conn: &StoreConnection) -> Result<Vec<TrendingVideo>> {
    conn.query_rows(
        r#"
        SELECT title, channel_name, view_count, like_count, category_name
        FROM videos
        ORDER BY view_count DESC, rowid ASC
        LIMIT ?1
        "#,
        params![TOP_VIDEOS_LIMIT],
        |row| {
            Ok(TrendingVideo {
                title: row.get(0)?,
                channel_name: row.get(1)?,
                view_count: row.get(2)?,
                like_count: row.get(3)?,
                category_name: row.get(4)?,
            })
        },
    )
    .await
}

pub async fn top_channels(conn: &StoreConnection) -> Result<Vec<ChannelSummary>> {
    conn.query_rows(
        r#"
        SELECT channel_name,
               COUNT(*) AS video_count,
               SUM(view_count) AS total_views,
               AVG(view_count) AS avg_views,
               SUM(like_count) AS total_likes
        FROM videos
        GROUP BY channel_name
        ORDER BY total_views DESC, channel_name ASC
        LIMIT ?1
        "#,
        params![TOP_CHANNELS_LIMIT],
        |row| {
            Ok(ChannelSummary {
                channel_name: row.get(0)?,
                video_count: row.get(1)?,
                total_views: row.get(2)?,
                avg_views: row.get(3)?,
                total_likes: row.get(4)?,
            })
        },
    )
    .await
}

/// Per-category totals, leaving out the catch-all bucket.
pub async fn popular_categories(conn: &StoreConnection) -> Result<Vec<CategorySummary>> {
    conn.query_rows(
        r#"
        SELECT category_name,
               COUNT(*) AS video_count,
               SUM(view_count) AS total_views,
               SUM(like_count) AS total_likes,
               AVG(view_count) AS avg_views
        FROM videos
        WHERE category_name != ?1
        GROUP BY category_name
        ORDER BY total_views DESC, category_name ASC
        "#,
        params![OTHER_CATEGORY],
        |row| {
            Ok(CategorySummary {
                category_name: row.get(0)?,
                video_count: row.get(1)?,
                total_views: row.get(2)?,
                total_likes: row.get(3)?,
                avg_views: row.get(4)?,
            })
        },
    )
    .await
}

/// Most viewed videos with their like ratio. Rows without views are skipped
/// since the ratio is undefined for them.
pub async fn views_likes_analysis(conn: &StoreConnection) -> Result<Vec<EngagementRow>> {
    conn.query_rows(
        r#"
        SELECT title,
               channel_name,
               view_count,
               like_count,
               ROUND(CAST(like_count AS REAL) / view_count * 100, 2) AS engagement_rate
        FROM videos
        WHERE view_count > 0
        ORDER BY view_count DESC, rowid ASC
        LIMIT ?1
        "#,
        params![ENGAGEMENT_LIMIT],
        |row| {
            Ok(EngagementRow {
                title: row.get(0)?,
                channel_name: row.get(1)?,
                view_count: row.get(2)?,
                like_count: row.get(3)?,
                engagement_rate: row.get(4)?,
            })
        },
    )
    .await
}
