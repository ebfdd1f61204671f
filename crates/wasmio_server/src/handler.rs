//! Request handlers for `/api/event`.
//!
//! Each request builds its own query engine over the table store, so a
//! trap poisons only that request's module instance. A GET only ever
//! reads and a POST only ever writes; the unused direction of the driver
//! is a no-op.

use crate::api::AppState;
use crate::store::TableStore;
use axum::extract::{OriginalUri, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use wasmio_core::{Failure, Raised};
use wasmio_engine::{EngineConfig, HostDriver, InsertQuery, Query, QueryEngine, QueryOutput};
use wasmio_wasm::{FailureClassifier, HostFunction};

/// Event names a POST picks from
pub const NAME_CHOICES: [&str; 5] = ["EuroRust", "RustLab", "RustNation", "RustConf", "RustFest"];

/// Years a POST picks from
pub const YEAR_CHOICES: [u32; 6] = [2020, 2021, 2022, 2023, 2024, 2025];

/// One listed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    /// Row id
    pub id: u64,
    /// Event document
    pub data: Value,
}

/// Failure body: `{ "panic": bool, "message": string | null }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// True when the module trapped
    pub panic: bool,
    /// Panic text for a trap, the error message otherwise
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Build the body for a classified failure
    ///
    /// A trap reports the captured diagnostic, or the runtime's sentinel
    /// when none was captured.
    #[must_use]
    pub fn from_failure(failure: &Failure) -> Self {
        Self {
            panic: failure.is_trap(),
            message: Some(failure.message().to_string()),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = serde_json::to_string_pretty(&self)
            .unwrap_or_else(|_| r#"{ "panic": false, "message": null }"#.to_string());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/json")],
            body,
        )
            .into_response()
    }
}

impl AppState {
    fn classifier(&self) -> FailureClassifier {
        match &self.panic_registry {
            Some(registry) => FailureClassifier::new().with_registry(Arc::clone(registry)),
            None => FailureClassifier::new(),
        }
    }

    fn render_error(&self, raised: &Raised) -> Response {
        let failure = self.classifier().classify_and_clear(raised);
        if failure.is_trap() {
            tracing::error!("query engine trapped: {}", failure.message());
        } else {
            tracing::warn!("query failed: {}", failure.message());
        }
        ErrorResponse::from_failure(&failure).into_response()
    }

    fn engine(&self, driver: HostDriver) -> QueryEngine {
        QueryEngine::with_config(Arc::new(driver), EngineConfig::new("query_engine"))
    }
}

/// Driver whose `query_raw` reads from the store
fn reading_driver(store: Arc<TableStore>) -> HostDriver {
    HostDriver::query_only(HostFunction::asynchronous("query_raw", move |sql| {
        let store = Arc::clone(&store);
        async move {
            let sql = sql.as_str().unwrap_or_default().to_string();
            let rows = store.query(&sql).await.map_err(|e| Raised::error(e.to_string()))?;
            Ok(Value::Array(rows))
        }
    }))
}

/// Driver whose `execute_raw` writes to the store
fn writing_driver(store: Arc<TableStore>) -> HostDriver {
    HostDriver::execute_only(HostFunction::asynchronous("execute_raw", move |sql| {
        let store = Arc::clone(&store);
        async move {
            let sql = sql.as_str().unwrap_or_default().to_string();
            let count = store.execute(&sql).await.map_err(|e| Raised::error(e.to_string()))?;
            Ok(json!({ "rowsImpacted": count }))
        }
    }))
}

/// Insert one event through a fresh engine
///
/// # Errors
///
/// Returns whatever the engine raised
pub async fn insert_event(state: &AppState, data: Map<String, Value>) -> Result<u64, Raised> {
    let engine = state.engine(writing_driver(Arc::clone(&state.store)));
    let query = Query::Insert(InsertQuery::new(
        state.config.table.clone(),
        state.config.field.clone(),
        data,
    ));
    match engine.execute(query).await? {
        QueryOutput::Insert { rows_impacted } => Ok(rows_impacted),
        QueryOutput::Select(rows) => Err(Raised::error(format!(
            "expected rows impacted, got {} rows",
            rows.len()
        ))),
    }
}

/// `GET /api/event`: every event, newest first
pub async fn list_events(State(state): State<AppState>) -> Response {
    let engine = state.engine(reading_driver(Arc::clone(&state.store)));
    let query = json!({
        "_tag": "select",
        "value": { "field": state.config.field, "table": state.config.table },
    });

    let output = match engine.query(query).await {
        Ok(output) => output,
        Err(raised) => return state.render_error(&raised),
    };

    let field = state.config.field.as_str();
    let mut events = Vec::with_capacity(output.rows().len());
    for row in output.rows() {
        let data = match &row[field] {
            Value::String(text) => match serde_json::from_str(text) {
                Ok(data) => data,
                Err(e) => return state.render_error(&Raised::from_error(&e)),
            },
            other => other.clone(),
        };
        events.push(EventEntry {
            id: row["id"].as_u64().unwrap_or_default(),
            data,
        });
    }

    Json(events).into_response()
}

/// `POST /api/event`: insert a random event, then redirect back
pub async fn create_event(State(state): State<AppState>, OriginalUri(uri): OriginalUri) -> Response {
    let data = random_event();
    match insert_event(&state, data).await {
        Ok(rows_impacted) => {
            tracing::info!("Inserted new event {}", rows_impacted);
            (
                StatusCode::MOVED_PERMANENTLY,
                [(header::LOCATION, uri.path().to_string())],
            )
                .into_response()
        }
        Err(raised) => state.render_error(&raised),
    }
}

/// Any other path
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found.")
}

/// Pick a random `{ name, year }` event
#[must_use]
pub fn random_event() -> Map<String, Value> {
    let mut rng = rand::thread_rng();
    let name = NAME_CHOICES.choose(&mut rng).copied().unwrap_or(NAME_CHOICES[0]);
    let year = YEAR_CHOICES.choose(&mut rng).copied().unwrap_or(YEAR_CHOICES[0]);

    let mut event = Map::new();
    event.insert("name".to_string(), json!(name));
    event.insert("year".to_string(), json!(year));
    event
}
