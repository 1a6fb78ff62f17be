//! Axum + Askama web UI for the mission explorer.
//!
//! The page is server-rendered: the level tabs swap the feed region via
//! htmx partials, and card activation swaps the detail overlay partial
//! into a modal root. Filtering is therefore a rendering decision here,
//! not client-side state.

use std::path::PathBuf;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use mex_core::{format_date_long, format_date_short, Level, MateriRow, Mission, Source};
use mex_feed::LevelRow;
use mex_storage::MissionStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "mex-web";

const CARD_DESCRIPTION_FALLBACK: &str = "Lihat misi ini...";
const MODAL_DESCRIPTION_FALLBACK: &str = "Misi robotik sedang dirangkum.";
const MODAL_DETAIL_FALLBACK: &str = "Detail misi sedang disiapkan.";
const MODAL_LEVEL_FALLBACK: &str = "ROBOTIC";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MissionStore>,
    /// Immutable level snapshot, fetched once before the server binds.
    pub levels: Arc<Vec<Level>>,
    pub workspace_root: PathBuf,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MissionStore>,
        levels: Vec<Level>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            levels: Arc::new(levels),
            workspace_root: workspace_root.into(),
        }
    }
}

/// One rendered mission card. All fallbacks and formatting are resolved
/// before templating; an empty `image_url` means "render the icon".
#[derive(Debug, Clone)]
pub struct CardView {
    pub id: i64,
    pub source_tag: String,
    pub tanggal: String,
    pub date_short: String,
    pub image_url: String,
    pub icon: String,
    pub level_kode: String,
    pub title: String,
    pub description: String,
    pub source_icon: String,
}

#[derive(Debug, Clone)]
pub struct RowView {
    pub kode: String,
    pub level_id: i64,
    pub icon: String,
    pub cards: Vec<CardView>,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    levels: Vec<Level>,
}

#[derive(Template)]
#[template(path = "feed_all.html")]
struct FeedAllTemplate {
    live: Vec<CardView>,
    rows: Vec<RowView>,
}

#[derive(Template)]
#[template(path = "feed_level.html")]
struct FeedLevelTemplate {
    rows: Vec<RowView>,
}

#[derive(Template)]
#[template(path = "modal.html")]
struct ModalTemplate {
    image_url: String,
    title: String,
    level_kode: String,
    date_long: String,
    description: String,
    detail: String,
}

#[derive(Debug, Deserialize, Default)]
struct FeedQuery {
    level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetailQuery {
    tanggal: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/feed", get(feed_handler))
        .route("/materi/{source}/{id}", get(materi_detail_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

/// Loads the level snapshot (degrading to an empty list on failure),
/// binds, and serves. Port comes from `MEX_WEB_PORT`, default 8000.
pub async fn serve_from_env(store: Arc<dyn MissionStore>) -> anyhow::Result<()> {
    let port: u16 = std::env::var("MEX_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let levels = match store.levels().await {
        Ok(levels) => levels,
        Err(err) => {
            warn!(%err, "level fetch failed, serving without tabs or rows");
            Vec::new()
        }
    };
    let state = AppState::new(store, levels, ".");
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "mission explorer listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub fn icon_for_level(kode: &str) -> &'static str {
    match kode {
        "Kiddy" => "\u{1F9E9}",
        "Beginner" => "\u{2699}\u{FE0F}",
        "Robotic" => "\u{1F916}",
        "Terapi Wicara" => "\u{1F5E3}\u{FE0F}",
        _ => "\u{1F680}",
    }
}

fn icon_for_source(source: Source) -> &'static str {
    match source {
        Source::Private => "\u{1F3E0}",
        Source::Sekolah => "\u{1F3EB}",
    }
}

fn card_view(mission: &Mission) -> CardView {
    CardView {
        id: mission.id,
        source_tag: mission.source.as_str().to_string(),
        tanggal: mission.tanggal.format("%Y-%m-%d").to_string(),
        date_short: format_date_short(mission.tanggal),
        image_url: mission.image_url.clone().unwrap_or_default(),
        icon: icon_for_level(&mission.level_kode).to_string(),
        level_kode: mission.level_kode.clone(),
        title: mission.title.clone(),
        description: mission
            .description
            .clone()
            .unwrap_or_else(|| CARD_DESCRIPTION_FALLBACK.to_string()),
        source_icon: icon_for_source(mission.source).to_string(),
    }
}

fn row_view(row: &LevelRow) -> RowView {
    RowView {
        kode: row.level.kode.clone(),
        level_id: row.level.id,
        icon: icon_for_level(&row.level.kode).to_string(),
        cards: row.missions.iter().map(card_view).collect(),
    }
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    render_html(IndexTemplate {
        levels: state.levels.as_ref().clone(),
    })
}

async fn feed_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Response {
    let selected = query.level.unwrap_or_else(|| "all".to_string());
    if selected == "all" {
        let live = mex_feed::load_live_missions(state.store.as_ref()).await;
        let rows = mex_feed::load_level_rows(state.store.as_ref(), &state.levels).await;
        render_html(FeedAllTemplate {
            live: live.iter().map(card_view).collect(),
            rows: rows.iter().map(row_view).collect(),
        })
    } else {
        let rows = match state.levels.iter().find(|l| l.kode == selected) {
            Some(level) => {
                mex_feed::load_level_rows(state.store.as_ref(), std::slice::from_ref(level)).await
            }
            None => Vec::new(),
        };
        render_html(FeedLevelTemplate {
            rows: rows.iter().map(row_view).collect(),
        })
    }
}

/// Detail overlay partial. Any failure along the way (unknown source
/// tag, unparseable date, store error, missing row) returns 204 so the
/// client swap is a no-op and the overlay state is left unchanged.
async fn materi_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((source, id)): AxumPath<(String, i64)>,
    Query(query): Query<DetailQuery>,
) -> Response {
    let Some(source) = Source::parse(&source) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let Some(tanggal) = query
        .tanggal
        .as_deref()
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
    else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match state.store.material_detail(source, id).await {
        Ok(Some(materi)) => render_html(modal_template(&materi, tanggal)),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            warn!(source = source.as_str(), materi_id = id, %err, "detail fetch failed, keeping overlay closed");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn modal_template(materi: &MateriRow, tanggal: NaiveDate) -> ModalTemplate {
    let level_kode = materi
        .level_kode
        .clone()
        .unwrap_or_else(|| MODAL_LEVEL_FALLBACK.to_string());
    let image_url = materi.image_url.clone().unwrap_or_else(|| {
        format!("https://via.placeholder.com/600x400?text={level_kode}+Project")
    });
    ModalTemplate {
        image_url,
        title: materi.resolved_title().unwrap_or_default(),
        level_kode,
        date_long: format_date_long(tanggal),
        description: materi
            .resolved_description()
            .unwrap_or_else(|| MODAL_DESCRIPTION_FALLBACK.to_string()),
        detail: materi
            .detail
            .clone()
            .unwrap_or_else(|| MODAL_DETAIL_FALLBACK.to_string()),
    }
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
