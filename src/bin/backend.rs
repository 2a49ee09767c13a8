#![forbid(unsafe_code)]

//! Axum backend for the trending dashboard.
//!
//! The JSON endpoints under `/api` wrap ingestion and the analytics panels;
//! everything else is answered from the static `www` directory. Each request
//! opens its own SQLite connection and drops it before responding, so the
//! only state shared between requests is the database file itself.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::Serialize;
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use trendboard::{
    analytics::{
        self, CategorySummary, ChannelSummary, EngagementRow, StatsSummary, TopCreator,
        TrendingVideo,
    },
    config::{AppConfig, ConfigOverrides, resolve_app_config},
    ingest,
    logging::init_tracing,
    storage::{StoreConnection, VideoStore},
    youtube::{VideoPlatform, YouTubeClient},
};

/// Literal body for every static miss.
const NOT_FOUND_BODY: &str = "Not found";
const INDEX_FILE: &str = "index.html";

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Serve the trending dashboard and its JSON API")]
struct BackendArgs {
    /// SQLite file holding the ingested videos.
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Directory containing index.html and the dashboard assets.
    #[arg(long)]
    www_root: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Alternate .env file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            db_path: self.db_path,
            www_root: self.www_root,
            host: self.host,
            port: self.port,
            env_path: self.env_file,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TRENDBOARD_HOST")
}

/// Shared state injected into every Axum handler. Nothing in here is mutable;
/// the store only knows where the database lives.
#[derive(Clone)]
struct AppState {
    store: VideoStore,
    platform: Arc<dyn VideoPlatform>,
    config: Arc<AppConfig>,
}

impl AppState {
    async fn connect(&self) -> ApiResult<StoreConnection> {
        Ok(self.store.connect().await?)
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        error!(error = %message, "request failed");
        Self::internal(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct FetchTrendingResponse {
    success: bool,
    inserted: usize,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    success: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BackendArgs::parse();
    let config = resolve_app_config(args.into_overrides())?;
    init_tracing(&config.log_level)?;

    if config.api_key_is_placeholder() {
        warn!("YOUTUBE_API_KEY is not set; YouTube requests will be rejected");
    }

    let host = parse_host_arg(&config.host)?;
    let addr = SocketAddr::new(host, config.port);
    let store = VideoStore::open(&config.db_path)
        .await
        .context("initializing video store")?;
    let platform: Arc<dyn VideoPlatform> = Arc::new(YouTubeClient::new(config.api_key.clone()));
    info!(
        db = %config.db_path.display(),
        www = %config.www_root.display(),
        region = %config.region_code,
        "starting trending dashboard"
    );

    let app = router(AppState {
        store,
        platform,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/fetch-trending", post(fetch_trending_videos))
        .route("/api/stats", get(get_stats))
        .route("/api/top-indian-youtubers", get(get_top_youtubers))
        .route("/api/top-trending-videos", get(get_top_trending_videos))
        .route("/api/top-channels", get(get_top_channels))
        .route("/api/popular-categories", get(get_popular_categories))
        .route("/api/views-likes-analysis", get(get_views_likes_analysis))
        .route("/api/reset-db", post(reset_db))
        .fallback(static_fallback)
        .with_state(state)
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        warn!(%err, "failed to install Ctrl+C handler");
    }
}

async fn fetch_trending_videos(
    State(state): State<AppState>,
) -> ApiResult<Json<FetchTrendingResponse>> {
    let conn = state.connect().await?;
    let report = ingest::fetch_trending(&conn, state.platform.clone(), &state.config).await?;
    Ok(Json(FetchTrendingResponse {
        success: true,
        inserted: report.inserted,
    }))
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsSummary>> {
    let conn = state.connect().await?;
    Ok(Json(analytics::stats_summary(&conn).await?))
}

async fn get_top_youtubers(State(state): State<AppState>) -> ApiResult<Json<Vec<TopCreator>>> {
    let conn = state.connect().await?;
    let creators = analytics::top_creators(&conn, state.platform.clone()).await?;
    Ok(Json(creators))
}

async fn get_top_trending_videos(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<TrendingVideo>>> {
    let conn = state.connect().await?;
    Ok(Json(analytics::top_trending_videos(&conn).await?))
}

async fn get_top_channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelSummary>>> {
    let conn = state.connect().await?;
    Ok(Json(analytics::top_channels(&conn).await?))
}

async fn get_popular_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CategorySummary>>> {
    let conn = state.connect().await?;
    Ok(Json(analytics::popular_categories(&conn).await?))
}

async fn get_views_likes_analysis(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EngagementRow>>> {
    let conn = state.connect().await?;
    Ok(Json(analytics::views_likes_analysis(&conn).await?))
}

async fn reset_db(State(state): State<AppState>) -> ApiResult<Json<ResetResponse>> {
    let conn = state.connect().await?;
    conn.reset().await?;
    info!("video store reset");
    Ok(Json(ResetResponse { success: true }))
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return static_not_found();
    }

    match serve_www_path(&state.config.www_root, path).await {
        Some(response) => response,
        None => static_not_found(),
    }
}

fn static_not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

/// Maps a request path onto a file under `root` plus its content type. Only
/// the index page, stylesheets and scripts are served.
fn resolve_www_path(root: &Path, request_path: &str) -> Option<(PathBuf, &'static str)> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Some((root.join(INDEX_FILE), "text/html; charset=utf-8"));
    }

    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    let content_type = match candidate.extension()?.to_str()? {
        "css" => "text/css",
        "js" => "application/javascript",
        _ => return None,
    };
    Some((root.join(candidate), content_type))
}

async fn serve_www_path(root: &Path, request_path: &str) -> Option<Response> {
    let (path, content_type) = resolve_www_path(root, request_path)?;
    let file = File::open(&path).await.ok()?;
    let metadata = file.metadata().await.ok()?;
    if !metadata.is_file() {
        return None;
    }

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    Some(response)
}
