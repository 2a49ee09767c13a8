#![forbid(unsafe_code)]

//! Trending-video ingestion and dashboard analytics.

pub mod analytics;
pub mod categories;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod storage;
pub mod youtube;
