//! Axum server for the report API.
//!
//! Error responses use a uniform `{"error": message}` shape: validation
//! failures are 400, execution failures are 500.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::catalog::PicklistOption;
use crate::compiler::RawReportQuery;
use crate::config::Settings;
use crate::engine::{EngineError, ReportEngine, ReportOutput};
use crate::store::definitions::{Definition, DefinitionKind, DefinitionStore};
use crate::store::{Pool, StoreError};

/// Application state shared across handlers.
pub struct AppState {
    pub engine: ReportEngine,
    pub definitions: DefinitionStore,
}

/// Build the axum router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Catalog and data routes
        .route("/api/objects", get(get_catalog))
        .route("/api/objects/{source}/data", post(run_report))
        .route("/api/fields/{token}/options", get(field_options))
        .route("/api/fields/{token}/suggest", get(field_suggest))
        // Saved definition routes
        .route("/api/modules", get(list_modules))
        .route("/api/modules", post(create_module))
        .route("/api/modules/{id}", put(update_module))
        .route("/api/modules/{id}", delete(delete_module))
        .route("/api/queries", get(list_queries))
        .route("/api/queries", post(create_query))
        .route("/api/queries/{id}", put(update_query))
        .route("/api/queries/{id}", delete(delete_query))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Start the web server.
pub async fn serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(settings.catalog.registry());
    let pool = Pool::open(
        settings.store.resolved_path()?,
        settings.store.pool_capacity,
        settings.store.query_timeout(),
    )?;
    let definitions = DefinitionStore::open(pool.clone()).await?;
    let engine = ReportEngine::new(registry, pool);

    let state = Arc::new(AppState {
        engine,
        definitions,
    });
    let app = router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("report API listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Error Mapping
// ============================================================================

/// A handler error carrying its HTTP status.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Compile(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("report request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!("store operation failed: {}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Catalog & Data Handlers
// ============================================================================

/// GET /api/objects - the full schema catalog, keyed by table id.
async fn get_catalog(State(state): State<Arc<AppState>>) -> Response {
    Json(state.engine.registry().tables()).into_response()
}

/// POST /api/objects/:source/data - compile and execute a report query.
async fn run_report(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    Json(raw): Json<RawReportQuery>,
) -> Result<Json<ReportOutput>, ApiError> {
    let output = state.engine.run(&source, &raw).await?;
    Ok(Json(output))
}

/// GET /api/fields/:token/options - value options for filter dropdowns.
async fn field_options(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Vec<PicklistOption>>, ApiError> {
    let options = state.engine.field_options(&token).await?;
    Ok(Json(options))
}

/// GET /api/fields/:token/suggest - autocomplete suggestions.
async fn field_suggest(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let values = state.engine.suggest(&token).await?;
    Ok(Json(values))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Saved Definition Handlers
// ============================================================================

/// Body for creating a definition; both fields may be omitted.
#[derive(Deserialize)]
struct CreateDefinition {
    name: Option<String>,
    text: Option<String>,
}

/// Body for updating a definition.
#[derive(Deserialize)]
struct UpdateDefinition {
    name: String,
    text: String,
}

async fn list_definitions(
    state: &AppState,
    kind: DefinitionKind,
) -> Result<Json<Vec<Definition>>, ApiError> {
    Ok(Json(state.definitions.list(kind).await?))
}

async fn create_definition(
    state: &AppState,
    kind: DefinitionKind,
    body: CreateDefinition,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = state.definitions.create(kind, body.name, body.text).await?;
    Ok(Json(json!({ "id": id })))
}

async fn update_definition(
    state: &AppState,
    kind: DefinitionKind,
    id: i64,
    body: UpdateDefinition,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.definitions.update(kind, id, body.name, body.text).await?;
    Ok(Json(json!({ "id": id })))
}

async fn delete_definition(
    state: &AppState,
    kind: DefinitionKind,
    id: i64,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.definitions.delete(kind, id).await?;
    Ok(Json(json!({ "id": id })))
}

async fn list_modules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Definition>>, ApiError> {
    list_definitions(&state, DefinitionKind::Report).await
}

async fn create_module(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDefinition>,
) -> Result<Json<serde_json::Value>, ApiError> {
    create_definition(&state, DefinitionKind::Report, body).await
}

async fn update_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDefinition>,
) -> Result<Json<serde_json::Value>, ApiError> {
    update_definition(&state, DefinitionKind::Report, id, body).await
}

async fn delete_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    delete_definition(&state, DefinitionKind::Report, id).await
}

async fn list_queries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Definition>>, ApiError> {
    list_definitions(&state, DefinitionKind::Query).await
}

async fn create_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDefinition>,
) -> Result<Json<serde_json::Value>, ApiError> {
    create_definition(&state, DefinitionKind::Query, body).await
}

async fn update_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDefinition>,
) -> Result<Json<serde_json::Value>, ApiError> {
    update_definition(&state, DefinitionKind::Query, id, body).await
}

async fn delete_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    delete_definition(&state, DefinitionKind::Query, id).await
}
