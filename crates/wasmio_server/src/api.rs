//! API server

use crate::config::{ServerConfig, ServerError};
use crate::handler;
use crate::store::TableStore;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use wasmio_core::Raised;
use wasmio_wasm::PanicRegistry;

/// State shared by every request
#[derive(Debug, Clone)]
pub struct AppState {
    /// Host database
    pub store: Arc<TableStore>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Registry consulted when rendering traps
    pub panic_registry: Option<Arc<PanicRegistry>>,
}

impl AppState {
    /// Create state over a store that already holds the events table
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let store = TableStore::new();
        store.create_table(config.table.clone());
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            panic_registry: None,
        }
    }

    /// Render traps with diagnostics from this registry
    #[must_use]
    pub fn with_panic_registry(mut self, registry: Arc<PanicRegistry>) -> Self {
        self.panic_registry = Some(registry);
        self
    }

    /// Insert the configured seed events
    ///
    /// # Errors
    ///
    /// Returns the first failure raised by the engine
    pub async fn seed(&self) -> Result<usize, Raised> {
        for event in &self.config.seed {
            handler::insert_event(self, event.clone()).await?;
        }
        Ok(self.config.seed.len())
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/event",
            get(handler::list_events).post(handler::create_event),
        )
        .route(
            "/api/event/",
            get(handler::list_events).post(handler::create_event),
        )
        .fallback(handler::not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// HTTP server for the event service
#[derive(Debug)]
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Create a server
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind and serve until the process stops
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or the server fails
    pub async fn serve(self) -> Result<(), ServerError> {
        let bind = self.state.config.bind.clone();
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|source| ServerError::Bind {
                bind: bind.clone(),
                source,
            })?;
        tracing::info!("listening on {}", bind);
        axum::serve(listener, router(self.state)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ErrorResponse, EventEntry, NAME_CHOICES};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(ServerConfig::new())
    }

    async fn send(state: &AppState, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_list_starts_empty() {
        let (status, _, body) = send(&state(), "GET", "/api/event").await;
        assert_eq!(status, StatusCode::OK);
        let events: Vec<EventEntry> = serde_json::from_slice(&body).unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_create_redirects_and_lists() {
        let state = state();
        let (status, headers, _) = send(&state, "POST", "/api/event").await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(headers[header::LOCATION], "/api/event");

        send(&state, "POST", "/api/event").await;
        let (status, _, body) = send(&state, "GET", "/api/event").await;
        assert_eq!(status, StatusCode::OK);

        let events: Vec<EventEntry> = serde_json::from_slice(&body).unwrap();
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 1]);
        let name = events[0].data["name"].as_str().unwrap();
        assert!(NAME_CHOICES.contains(&name));
        assert!(events[0].data["year"].is_u64());
    }

    #[tokio::test]
    async fn test_seed_events() {
        let Value::Object(event) = json!({ "name": "RustLab", "year": 2024 }) else {
            unreachable!()
        };
        let state = AppState::new(ServerConfig::new().with_seed(event));
        assert_eq!(state.seed().await, Ok(1));

        let (_, _, body) = send(&state, "GET", "/api/event/").await;
        let events: Vec<EventEntry> = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            events,
            vec![EventEntry {
                id: 1,
                data: json!({ "name": "RustLab", "year": 2024 })
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (status, _, body) = send(&state(), "GET", "/api/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"Not Found.");
    }

    #[tokio::test]
    async fn test_missing_table_renders_error() {
        let mut state = state();
        state.store = Arc::new(TableStore::new());

        let (status, headers, body) = send(&state, "GET", "/api/event").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers[header::CONTENT_TYPE], "text/json");

        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            error,
            ErrorResponse {
                panic: false,
                message: Some("no such table: event".to_string())
            }
        );

        let (status, _, body) = send(&state, "POST", "/api/event").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!error.panic);
    }
}
