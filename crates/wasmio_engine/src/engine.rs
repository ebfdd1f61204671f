//! Query engine.
//!
//! Every query walks one [`Dispatch`]:
//!
//! ```text
//! Idle -> Decoding -> Executing -> Succeeded
//!            |            |
//!            +------------+------> Failed
//! ```
//!
//! A query that decodes makes exactly one driver call; a query that does
//! not decode makes none. Dispatches share nothing, so concurrent queries
//! on one engine neither block nor observe each other.

use crate::driver::Driver;
use crate::query::{Query, QueryOutput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wasmio_core::{CoreError, CoreResult, Raised};
use wasmio_wasm::{Module, ModuleConfig};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of the module instance the engine runs in
    pub module_name: String,
    /// Log every statement sent to the driver at `info`
    pub log_sql: bool,
}

impl EngineConfig {
    /// Create a new engine config
    #[must_use]
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            log_sql: true,
        }
    }

    /// Enable/disable statement logging
    #[must_use]
    pub fn with_log_sql(mut self, log_sql: bool) -> Self {
        self.log_sql = log_sql;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("query_engine")
    }
}

/// Dispatch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchState {
    /// Nothing received yet
    Idle,
    /// Decoding the tagged query
    Decoding,
    /// Waiting on the driver
    Executing,
    /// Driver answered
    Succeeded,
    /// Decoding or the driver failed
    Failed,
}

impl DispatchState {
    /// Check if a transition is allowed
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Decoding)
                | (Self::Decoding, Self::Executing)
                | (Self::Decoding, Self::Failed)
                | (Self::Executing, Self::Succeeded)
                | (Self::Executing, Self::Failed)
        )
    }

    /// True for `Succeeded` and `Failed`
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle of a single query
#[derive(Debug)]
pub struct Dispatch {
    id: u64,
    state: DispatchState,
}

impl Dispatch {
    /// Start a dispatch in `Idle`
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: DispatchState::Idle,
        }
    }

    /// Dispatch id, unique per engine
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns an internal error if the transition is not allowed
    pub fn advance(&mut self, next: DispatchState) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::Internal {
                message: format!("invalid dispatch transition {} -> {}", self.state, next),
            });
        }
        tracing::debug!(dispatch = self.id, "{} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `Failed` and hand back the failure
    fn fail(&mut self, raised: Raised) -> Raised {
        if let Err(e) = self.advance(DispatchState::Failed) {
            return Raised::from_error(&e);
        }
        tracing::debug!(dispatch = self.id, "query failed: {}", raised);
        raised
    }
}

/// Query input, before decoding
enum Input<'a> {
    Value(Value),
    Text(&'a str),
    Decoded(Query),
}

impl Input<'_> {
    fn decode(self) -> Result<Query, Raised> {
        match self {
            Self::Value(value) => Query::from_value(value).map_err(Raised::from),
            Self::Text(text) => text.parse::<Query>().map_err(Raised::from),
            Self::Decoded(query) => Ok(query),
        }
    }
}

/// Decodes tagged queries and runs them on a driver
pub struct QueryEngine {
    config: EngineConfig,
    driver: Arc<dyn Driver>,
    module: Module,
    next_dispatch: AtomicU64,
}

impl QueryEngine {
    /// Create an engine with default settings
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, EngineConfig::default())
    }

    /// Create an engine with a config
    #[must_use]
    pub fn with_config(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        let module = Module::new(ModuleConfig::new(config.module_name.clone()));
        Self {
            config,
            driver,
            module,
            next_dispatch: AtomicU64::new(1),
        }
    }

    /// Get the engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Module instance the engine runs in
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Run a query given as a host value
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the query does not decode, the driver's
    /// failure unchanged, or a `RuntimeError` if the engine traps
    pub async fn query(&self, input: Value) -> Result<QueryOutput, Raised> {
        self.run(Input::Value(input)).await
    }

    /// Run a query given as JSON text
    ///
    /// # Errors
    ///
    /// As [`Self::query`]; decode errors carry the line and column
    pub async fn query_str(&self, input: &str) -> Result<QueryOutput, Raised> {
        self.run(Input::Text(input)).await
    }

    /// Run a query that is already decoded
    ///
    /// # Errors
    ///
    /// Returns the driver's failure unchanged, or a `RuntimeError` if the
    /// engine traps
    pub async fn execute(&self, query: Query) -> Result<QueryOutput, Raised> {
        self.run(Input::Decoded(query)).await
    }

    async fn run(&self, input: Input<'_>) -> Result<QueryOutput, Raised> {
        let id = self.next_dispatch.fetch_add(1, Ordering::Relaxed);
        self.module.call_async("query", self.dispatch(id, input)).await
    }

    async fn dispatch(&self, id: u64, input: Input<'_>) -> Result<QueryOutput, Raised> {
        let mut dispatch = Dispatch::new(id);
        dispatch.advance(DispatchState::Decoding).map_err(|e| Raised::from_error(&e))?;

        let query = match input.decode() {
            Ok(query) => query,
            Err(raised) => return Err(dispatch.fail(raised)),
        };
        tracing::debug!(dispatch = id, "query: {:?}", query);
        dispatch.advance(DispatchState::Executing).map_err(|e| Raised::from_error(&e))?;

        let sql = query.to_sql();
        if self.config.log_sql {
            tracing::info!("{}({})", query.primitive(), sql);
        }
        let reply = match &query {
            Query::Insert(_) => self.driver.execute_raw(sql).await,
            Query::Select(_) => self.driver.query_raw(sql).await,
        };

        let output = match reply {
            Ok(reply) => QueryOutput::from_reply(&query, reply).map_err(Raised::from),
            Err(raised) => Err(raised),
        };
        match output {
            Ok(output) => {
                dispatch.advance(DispatchState::Succeeded).map_err(|e| Raised::from_error(&e))?;
                Ok(output)
            }
            Err(raised) => Err(dispatch.fail(raised)),
        }
    }
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::HostDriver;
    use crate::query::{InsertQuery, SelectQuery};
    use async_trait::async_trait;
    use futures::future::join_all;
    use serde_json::{Map, json};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::Notify;
    use wasmio_wasm::{CallRecorder, FailureClassifier, HostFunction};

    fn recorded_engine() -> (QueryEngine, CallRecorder, CallRecorder) {
        let writes = CallRecorder::new();
        let reads = CallRecorder::new();
        let driver = HostDriver::new(
            writes.wrap_async("execute_raw", |_sql| async { Ok(json!({ "rowsImpacted": 1 })) }),
            reads.wrap_async("query_raw", |_sql| async {
                Ok(json!([{ "id": 1, "data": { "name": "RustConf", "year": 2023 } }]))
            }),
        );
        (QueryEngine::new(Arc::new(driver)), writes, reads)
    }

    #[test]
    fn test_dispatch_transitions() {
        let mut dispatch = Dispatch::new(1);
        assert_eq!(dispatch.state(), DispatchState::Idle);
        assert!(dispatch.advance(DispatchState::Executing).is_err());
        dispatch.advance(DispatchState::Decoding).unwrap();
        dispatch.advance(DispatchState::Executing).unwrap();
        dispatch.advance(DispatchState::Succeeded).unwrap();
        assert!(dispatch.state().is_terminal());
        assert!(dispatch.advance(DispatchState::Failed).is_err());
    }

    #[tokio::test]
    async fn test_insert_calls_execute_raw_once() {
        let (engine, writes, reads) = recorded_engine();
        let output = engine
            .query(json!({
                "_tag": "insert",
                "value": { "table": "event", "field": "data", "data": { "name": "RustConf", "year": 2023 } }
            }))
            .await
            .unwrap();

        assert_eq!(output, QueryOutput::Insert { rows_impacted: 1 });
        assert_eq!(
            writes.calls(),
            vec![json!(
                r#"INSERT INTO event (data) VALUES (json('{"name":"RustConf","year":2023}'))"#
            )]
        );
        assert_eq!(reads.call_count(), 0);
    }

    #[tokio::test]
    async fn test_select_calls_query_raw_once() {
        let (engine, writes, reads) = recorded_engine();
        let output = engine
            .query_str(r#"{ "_tag": "select", "value": { "table": "event", "field": "data" } }"#)
            .await
            .unwrap();

        assert_eq!(output.rows().len(), 1);
        assert_eq!(output.rows()[0]["data"]["year"], 2023);
        assert_eq!(reads.call_count(), 1);
        assert_eq!(writes.call_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_makes_no_call() {
        let (engine, writes, reads) = recorded_engine();

        let err = engine
            .query(json!({ "_tag": "upsert", "value": {} }))
            .await
            .unwrap_err();
        assert_eq!(err.name(), Some("Error"));

        let err = engine
            .query_str(r#"{ "_tag": "insert", "value": { "table": "event", "field": "data" } }"#)
            .await
            .unwrap_err();
        let failure = FailureClassifier::new().classify(&err);
        assert!(failure.message().starts_with("missing field `data`"));
        assert!(failure.source_location().is_some());

        let err = engine.query(json!({ "value": {} })).await.unwrap_err();
        assert!(err.message().contains("missing field `_tag`"));

        assert_eq!(writes.call_count(), 0);
        assert_eq!(reads.call_count(), 0);
        assert!(!engine.module().is_poisoned());
    }

    #[tokio::test]
    async fn test_driver_failure_propagates_unchanged() {
        let driver = HostDriver::query_only(HostFunction::asynchronous("query_raw", |_sql| async {
            Err::<Value, _>(Raised::text("D1_ERROR: no such table: event"))
        }));
        let engine = QueryEngine::new(Arc::new(driver));
        let err = engine
            .execute(Query::Select(SelectQuery::new("event", "data")))
            .await
            .unwrap_err();
        assert_eq!(err, Raised::text("D1_ERROR: no such table: event"));
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_structured_error() {
        let driver = HostDriver::query_only(HostFunction::sync("query_raw", |_sql| Ok(json!(7))));
        let engine = QueryEngine::new(Arc::new(driver));
        let err = engine
            .execute(Query::Select(SelectQuery::new("event", "data")))
            .await
            .unwrap_err();
        assert_eq!(err.name(), Some("Error"));
        assert!(err.message().starts_with("unexpected reply from query_raw"));
    }

    #[tokio::test]
    async fn test_concurrent_queries_each_get_their_own_result() {
        let (engine, _writes, reads) = recorded_engine();
        let queries = (0..10).map(|_| engine.execute(Query::Select(SelectQuery::new("event", "data"))));
        let results = join_all(queries).await;

        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|o| o.rows().len() == 1)));
        assert_eq!(reads.call_count(), 10);
    }

    #[tokio::test]
    async fn test_pending_query_does_not_block_another() {
        let release = Arc::new(Notify::new());
        let gate = Arc::clone(&release);
        let driver = HostDriver::new(
            HostFunction::asynchronous("execute_raw", move |_sql| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(json!({ "rowsImpacted": 1 }))
                }
            }),
            HostFunction::asynchronous("query_raw", |_sql| async { Ok(json!([])) }),
        );
        let engine = QueryEngine::new(Arc::new(driver));
        let insert_done = AtomicBool::new(false);

        let insert = async {
            let output = engine
                .execute(Query::Insert(InsertQuery::new("event", "data", Map::new())))
                .await;
            insert_done.store(true, Ordering::SeqCst);
            output
        };
        let select = async {
            let output = engine.execute(Query::Select(SelectQuery::new("event", "data"))).await;
            let insert_finished_first = insert_done.load(Ordering::SeqCst);
            release.notify_one();
            (output, insert_finished_first)
        };

        let (inserted, (selected, insert_finished_first)) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(insert, select) },
        )
        .await
        .unwrap();

        assert!(!insert_finished_first);
        assert_eq!(selected, Ok(QueryOutput::Select(vec![])));
        assert_eq!(inserted, Ok(QueryOutput::Insert { rows_impacted: 1 }));
    }

    struct PanickingDriver;

    #[async_trait]
    impl Driver for PanickingDriver {
        async fn execute_raw(&self, _query: String) -> Result<Value, Raised> {
            panic!("driver exploded")
        }

        async fn query_raw(&self, _query: String) -> Result<Value, Raised> {
            Ok(json!([]))
        }
    }

    #[tokio::test]
    async fn test_panic_during_query_is_trap() {
        let _scenario = wasmio_wasm::registry::isolate();
        let engine = QueryEngine::new(Arc::new(PanickingDriver));
        let err = engine
            .query(json!({
                "_tag": "insert",
                "value": { "table": "event", "field": "data", "data": {} }
            }))
            .await
            .unwrap_err();
        assert!(err.is_wasm_panic());
        assert_eq!(err.message(), "unreachable");

        let err = engine
            .execute(Query::Select(SelectQuery::new("event", "data")))
            .await
            .unwrap_err();
        assert!(err.message().contains("poisoned"));
    }
}
