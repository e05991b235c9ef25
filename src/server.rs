use crate::aggregate::{aggregate, AggregationResult, Metric};
use crate::config::AppConfig;
use crate::data::{CacheStats, DatasetCache, MirrorWarehouse, Warehouse};
use crate::error::PipelineError;
use crate::export::{to_csv_bytes, ExportError};
use crate::filter::{options, select, FilterState};
use crate::map::{assemble, to_geojson, MarkerFields};
use crate::pages::{self, heritage, PageContext, PageParams};
use crate::types::{Column, Dataset};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use lru::LruCache;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info};

/// Query keys that carry request options rather than filter selections.
pub const RESERVED_KEYS: [&str; 7] = [
    "session", "group_by", "metric", "top", "column", "format", "sentinel",
];
const DEFAULT_SESSION: &str = "default";

type Params = HashMap<String, String>;

pub struct AppState {
    pub config: AppConfig,
    warehouse: Option<Arc<dyn Warehouse>>,
    /// One dataset cache per browser session, least recently used evicted first.
    sessions: Mutex<LruCache<String, Arc<Mutex<DatasetCache>>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let warehouse = config
            .warehouse
            .as_ref()
            .and_then(MirrorWarehouse::from_config)
            .map(|w| Arc::new(w) as Arc<dyn Warehouse>);
        Self::with_warehouse(config, warehouse)
    }

    pub fn with_warehouse(config: AppConfig, warehouse: Option<Arc<dyn Warehouse>>) -> Self {
        let capacity = NonZeroUsize::new(config.server.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            warehouse,
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn session(&self, id: &str) -> Arc<Mutex<DatasetCache>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = sessions.get(id) {
            return Arc::clone(cache);
        }
        debug!(session = id, "new session");
        let cache = Arc::new(Mutex::new(match &self.warehouse {
            Some(warehouse) => DatasetCache::with_warehouse(Arc::clone(warehouse)),
            None => DatasetCache::new(),
        }));
        if let Some((evicted, _)) = sessions.push(id.to_string(), Arc::clone(&cache)) {
            debug!(session = %evicted, "session evicted");
        }
        cache
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn filter(&self, params: &Params) -> FilterState {
        FilterState::from_pairs(
            params
                .iter()
                .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str())),
            &self.config.aggregation.sentinels(),
        )
    }
}

fn session_id(params: &Params) -> &str {
    params
        .get("session")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SESSION)
}

/// Runs `f` against the requesting session's cache on the blocking pool,
/// since a cache miss reads the source from disk.
async fn with_cache<T, F>(state: &Arc<AppState>, params: &Params, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState, &mut DatasetCache) -> Result<T, ApiError> + Send + 'static,
{
    let session = state.session(session_id(params));
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut cache = session.lock().unwrap_or_else(PoisonError::into_inner);
        f(state.as_ref(), &mut *cache)
    })
    .await?
}

async fn load(state: &Arc<AppState>, key: &str, params: &Params) -> Result<Arc<Dataset>, ApiError> {
    let source = state.config.source_key(key)?;
    with_cache(state, params, move |_, cache| Ok(cache.get(&source)?)).await
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("{0}")]
    BadRequest(String),
    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::UnknownDataset(_) | PipelineError::UnknownPage(_) => StatusCode::NOT_FOUND,
        PipelineError::UnknownColumn { .. } => StatusCode::BAD_REQUEST,
        PipelineError::DataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Pipeline(e) | ApiError::Export(ExportError::Pipeline(e)) => status_for(e),
            ApiError::Export(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        debug!(%status, error = %self, "request failed");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app: Router<Arc<AppState>> = Router::new()
        .route("/api/datasets", get(list_datasets))
        .route("/api/datasets/:key/schema", get(schema_handler))
        .route("/api/datasets/:key/options", get(options_handler))
        .route("/api/datasets/:key/aggregate", get(aggregate_handler))
        .route("/api/datasets/:key/map", get(map_handler))
        .route("/api/datasets/:key/export", get(export_handler))
        .route("/api/pages", get(list_pages))
        .route("/api/pages/heritage/export", get(heritage_export_handler))
        .route("/api/pages/:page", get(page_handler))
        .route("/api/session", get(session_handler));

    if let Some(dir) = &state.config.server.static_dir {
        app = app.fallback_service(ServeDir::new(state.config.base_dir.join(dir)));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct DatasetInfo {
    key: String,
    label: String,
    source: String,
}

async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<Vec<DatasetInfo>> {
    let config = &state.config;
    Json(
        config
            .datasets
            .keys()
            .map(|key| DatasetInfo {
                key: key.clone(),
                label: config.dataset_label(key).to_string(),
                source: config
                    .source_key(key)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct SchemaResponse {
    key: String,
    rows: usize,
    columns: Vec<Column>,
}

async fn schema_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let dataset = load(&state, &key, &params).await?;
    Ok(Json(SchemaResponse {
        rows: dataset.len(),
        columns: dataset.schema().columns().to_vec(),
        key,
    }))
}

async fn options_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<String>>, ApiError> {
    let column = params
        .get("column")
        .ok_or_else(|| ApiError::BadRequest("missing `column` parameter".into()))?;
    let dataset = load(&state, &key, &params).await?;
    let sentinel = params.get("sentinel").map(String::as_str);
    Ok(Json(options(&dataset, column, sentinel)?))
}

async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<AggregationResult>, ApiError> {
    let group_by = params
        .get("group_by")
        .ok_or_else(|| ApiError::BadRequest("missing `group_by` parameter".into()))?;
    let top = match params.get("top") {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid `top` value '{raw}'")))?,
        None => state.config.aggregation.top_n,
    };
    let metric = Metric::from_option(params.get("metric").map(String::as_str));

    let dataset = load(&state, &key, &params).await?;
    let records = select(&dataset, &state.filter(&params));
    Ok(Json(aggregate(&dataset, &records, group_by, &metric, top)?))
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let dataset = load(&state, &key, &params).await?;
    let fields = MarkerFields::infer(dataset.schema())?;
    let filter = state.filter(&params);
    let records = select(&dataset, &filter);
    let view = assemble(&dataset, &records, &filter, &fields, &state.config.map)?;
    Ok(match params.get("format").map(String::as_str) {
        Some("geojson") => Json(to_geojson(&view)).into_response(),
        _ => Json(view).into_response(),
    })
}

fn csv_response(file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let dataset = load(&state, &key, &params).await?;
    let records = select(&dataset, &state.filter(&params));
    let body = to_csv_bytes(&dataset, &records, None)?;
    Ok(csv_response(&format!("{key}_filtered.csv"), body))
}

fn page_params(params: &Params) -> PageParams {
    PageParams::from_pairs(
        params
            .iter()
            .filter(|(k, _)| k.as_str() != "session")
            .map(|(k, v)| (k.clone(), v.clone())),
    )
}

async fn list_pages() -> Json<Vec<&'static str>> {
    Json(pages::PAGES.to_vec())
}

async fn page_handler(
    State(state): State<Arc<AppState>>,
    Path(page): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<pages::Page>, ApiError> {
    let page_params = page_params(&params);
    let rendered = with_cache(&state, &params, move |state, cache| {
        Ok(pages::render(&mut PageContext::new(cache, &state.config), &page, &page_params)?)
    })
    .await?;
    Ok(Json(rendered))
}

async fn heritage_export_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let page_params = page_params(&params);
    let body = with_cache(&state, &params, move |state, cache| {
        Ok(heritage::export_csv(&mut PageContext::new(cache, &state.config), &page_params)?)
    })
    .await?;
    Ok(csv_response(heritage::EXPORT_FILE_NAME, body))
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<CacheStats>, ApiError> {
    let stats = with_cache(&state, &params, |_, cache| Ok(cache.stats())).await?;
    Ok(Json(stats))
}
