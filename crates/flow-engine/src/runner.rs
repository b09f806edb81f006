//! Flow runner: drives module execution in topological order
//!
//! The runner asks the scheduler for an order and, for each module, marks
//! it `running`, hands it to a `ModuleExecutor`, and reports the terminal
//! status back to the store. The store lock is only held while mutating;
//! it is released while the executor does its (possibly long) work, so the
//! UI can keep editing the space mid-run.
//!
//! There is no cancellation of in-flight work. `RunControl::stop` only
//! prevents further modules from being scheduled.
//!
//! # Example
//!
//! ```ignore
//! let store: SharedStore = Arc::new(Mutex::new(GraphStore::new("s", "Launch kit")));
//! let runner = FlowRunner::new(MyExecutor::default());
//! let summary = runner.run_flow(&store, &RunControl::new()).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::store::GraphStore;
use crate::types::{Module, ModuleId, ModuleStatus, ModuleUpdate, Payload};

/// A store shared between the UI and a runner
pub type SharedStore = Arc<Mutex<GraphStore>>;

/// Per-module business logic, opaque to the engine
///
/// Implementations call AI providers, scan the filesystem, drive a
/// browser, etc. The store lock is not held while they run.
#[async_trait]
pub trait ModuleExecutor: Send + Sync {
    /// Execute a module
    ///
    /// # Arguments
    /// * `module` - Snapshot of the module, already marked running
    /// * `upstream` - Values delivered by incoming connections, keyed by input port
    ///
    /// # Returns
    /// The terminal status and results. An `Err` is recorded as `error`.
    async fn execute(&self, module: &Module, upstream: Payload) -> Result<ModuleOutcome>;
}

/// Terminal report of one module execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutcome {
    pub status: ModuleStatus,
    #[serde(default)]
    pub outputs: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModuleOutcome {
    pub fn done(outputs: Payload) -> Self {
        Self {
            status: ModuleStatus::Done,
            outputs,
            message: None,
        }
    }

    pub fn warning(outputs: Payload, message: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::Warning,
            outputs,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::Error,
            outputs: Payload::new(),
            message: Some(message.into()),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            status: ModuleStatus::FatalError,
            outputs: Payload::new(),
            message: Some(message.into()),
        }
    }

    fn into_update(self) -> ModuleUpdate {
        if !self.status.is_terminal() {
            return ModuleUpdate::status(ModuleStatus::Error)
                .with_error(format!("executor reported non-terminal status '{}'", self.status));
        }
        let update = ModuleUpdate::status(self.status).with_outputs(self.outputs);
        match self.message {
            Some(message) => update.with_error(message),
            None => update.without_error(),
        }
    }
}

/// Stop flag shared between a run and whoever may stop it
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stopped: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress scheduling of any further module in this run
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// What happened to a single module in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepResult {
    /// The executor ran and reported this terminal status
    Executed { status: ModuleStatus },
    /// An upstream module has no usable result
    #[serde(rename_all = "camelCase")]
    Blocked { waiting_on: Vec<ModuleId> },
    /// The module was deleted before or during its execution
    Vanished,
}

/// Summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    /// Modules that finished `done` or `warning`
    pub completed: Vec<ModuleId>,
    /// Modules that ran without a usable result: `error`, `fatal_error`,
    /// or `invalid` when an upstream went stale mid-execution
    pub failed: Vec<ModuleId>,
    /// Modules not executed (blocked upstream, deleted, or after a stop)
    pub skipped: Vec<ModuleId>,
    pub stopped: bool,
    pub execution_time_ms: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.stopped
    }
}

/// Runs modules of a shared store through an executor
pub struct FlowRunner<E: ModuleExecutor> {
    executor: E,
    run_id: String,
}

impl<E: ModuleExecutor> FlowRunner<E> {
    /// Create a new runner
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Set the run ID
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run every module of the space in topological order
    pub async fn run_flow(&self, store: &SharedStore, control: &RunControl) -> Result<RunSummary> {
        let order = store.lock().await.execution_order()?;
        self.run_order(store, order, control).await
    }

    /// Run `module_id` and everything downstream of it
    pub async fn run_from(&self, store: &SharedStore, module_id: &str, control: &RunControl) -> Result<RunSummary> {
        let order = store.lock().await.execution_order_from(module_id)?;
        self.run_order(store, order, control).await
    }

    /// Run a single module with whatever its upstream currently provides
    pub async fn run_module(&self, store: &SharedStore, module_id: &str) -> Result<StepResult> {
        self.step(store, module_id).await
    }

    async fn run_order(&self, store: &SharedStore, order: Vec<ModuleId>, control: &RunControl) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            ..RunSummary::default()
        };
        log::info!("Run '{}' started with {} module(s)", self.run_id, order.len());

        let mut remaining = order.into_iter();
        while let Some(id) = remaining.next() {
            if control.is_stopped() {
                log::info!("Run '{}' stopped before '{}'", self.run_id, id);
                summary.stopped = true;
                summary.skipped.push(id);
                summary.skipped.extend(remaining.by_ref());
                break;
            }

            match self.step(store, &id).await? {
                StepResult::Executed { status } if status.has_usable_result() => summary.completed.push(id),
                StepResult::Executed { .. } => summary.failed.push(id),
                StepResult::Blocked { waiting_on } => {
                    log::debug!("Skipping '{}', waiting on {:?}", id, waiting_on);
                    summary.skipped.push(id);
                }
                StepResult::Vanished => summary.skipped.push(id),
            }
        }

        summary.execution_time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Run '{}' finished: {} completed, {} failed, {} skipped in {}ms",
            self.run_id,
            summary.completed.len(),
            summary.failed.len(),
            summary.skipped.len(),
            summary.execution_time_ms
        );
        Ok(summary)
    }

    async fn step(&self, store: &SharedStore, id: &str) -> Result<StepResult> {
        let (module, upstream) = {
            let mut guard = store.lock().await;
            if guard.module(id).is_none() {
                return Ok(StepResult::Vanished);
            }

            let waiting_on: Vec<ModuleId> = guard
                .space()
                .dependencies(id)
                .into_iter()
                .filter(|dep| !guard.module(dep).is_some_and(|m| m.status.has_usable_result()))
                .collect();
            if !waiting_on.is_empty() {
                return Ok(StepResult::Blocked { waiting_on });
            }

            let upstream = guard.upstream_values(id)?;
            guard.update_module(id, ModuleUpdate::status(ModuleStatus::Running).without_error())?;
            let module = guard
                .module(id)
                .cloned()
                .ok_or_else(|| EngineError::ModuleNotFound(id.to_string()))?;
            (module, upstream)
        };

        log::debug!("Executing {:?} module '{}'", module.kind, id);
        let update = match self.executor.execute(&module, upstream).await {
            Ok(outcome) => outcome.into_update(),
            Err(e) => ModuleUpdate::status(ModuleStatus::Error).with_error(e.to_string()),
        };

        let mut guard = store.lock().await;
        match guard.update_module(id, update) {
            Ok(_) => {}
            Err(EngineError::ModuleNotFound(_)) => {
                log::warn!("Module '{}' was deleted while running; result dropped", id);
                return Ok(StepResult::Vanished);
            }
            Err(e) => return Err(e),
        }
        let status = guard
            .module(id)
            .map(|m| m.status)
            .ok_or_else(|| EngineError::ModuleNotFound(id.to_string()))?;
        Ok(StepResult::Executed { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleKind;
    use crate::validation::ConnectionProposal;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    /// Echoes the module id into every declared result key, failing for
    /// the ids it is told to fail
    #[derive(Default)]
    struct EchoExecutor {
        fail: HashSet<String>,
        calls: StdMutex<Vec<(String, Payload)>>,
        stop_after: Option<(String, RunControl)>,
    }

    impl EchoExecutor {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail: ids.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl ModuleExecutor for EchoExecutor {
        async fn execute(&self, module: &Module, upstream: Payload) -> Result<ModuleOutcome> {
            assert_eq!(module.status, ModuleStatus::Running);
            self.calls.lock().unwrap().push((module.id.clone(), upstream));
            if let Some((id, control)) = &self.stop_after {
                if *id == module.id {
                    control.stop();
                }
            }
            if self.fail.contains(&module.id) {
                return Err(EngineError::failed(format!("{} exploded", module.id)));
            }
            let outputs = module
                .kind
                .descriptor()
                .result_keys
                .into_iter()
                .map(|key| (key, json!(module.id)))
                .collect();
            Ok(ModuleOutcome::done(outputs))
        }
    }

    type StoreEdit = Box<dyn Fn(&mut GraphStore) + Send + Sync>;

    /// Echoes like `EchoExecutor`, but first applies an edit to the shared
    /// store while a given module is executing
    struct EditingExecutor {
        store: SharedStore,
        edits: Vec<(String, StoreEdit)>,
    }

    #[async_trait]
    impl ModuleExecutor for EditingExecutor {
        async fn execute(&self, module: &Module, upstream: Payload) -> Result<ModuleOutcome> {
            for (id, edit) in &self.edits {
                if *id == module.id {
                    let mut guard = self
                        .store
                        .try_lock()
                        .expect("store locked while an executor runs");
                    edit(&mut guard);
                }
            }
            EchoExecutor::default().execute(module, upstream).await
        }
    }

    fn editing(store: &SharedStore, id: &str, edit: impl Fn(&mut GraphStore) + Send + Sync + 'static) -> EditingExecutor {
        let edit: StoreEdit = Box::new(edit);
        EditingExecutor {
            store: store.clone(),
            edits: vec![(id.to_string(), edit)],
        }
    }

    /// a -> b -> c -> d built through the validated API, then reset
    fn chain_store() -> SharedStore {
        let mut store = GraphStore::new("space", "Chain");
        for id in ["d", "b", "a", "c"] {
            store
                .add_module_with_id(id, ModuleKind::MetadataGenerator, (0.0, 0.0))
                .unwrap();
            store.update_module(id, ModuleUpdate::status(ModuleStatus::Done)).unwrap();
        }
        for (source, target) in [("a", "b"), ("b", "c"), ("c", "d")] {
            store
                .add_connection(&ConnectionProposal::new(source, "metadata", target, "source"))
                .unwrap();
        }
        for id in ["a", "b", "c", "d"] {
            store.reset_module(id).unwrap();
        }
        Arc::new(Mutex::new(store))
    }

    fn status_of(store: &SharedStore, id: &str) -> ModuleStatus {
        store.try_lock().unwrap().module(id).unwrap().status
    }

    #[tokio::test]
    async fn test_run_flow_in_dependency_order() {
        let store = chain_store();
        let runner = FlowRunner::new(EchoExecutor::default()).with_run_id("run-1");

        let summary = runner.run_flow(&store, &RunControl::new()).await.unwrap();

        assert_eq!(summary.run_id, "run-1");
        assert_eq!(summary.completed, vec!["a", "b", "c", "d"]);
        assert!(summary.is_success());
        assert_eq!(runner.executor.calls(), vec!["a", "b", "c", "d"]);

        let guard = store.lock().await;
        assert_eq!(guard.module("d").unwrap().status, ModuleStatus::Done);
        assert_eq!(guard.module("d").unwrap().outputs["metadata"], json!("d"));
    }

    #[tokio::test]
    async fn test_upstream_values_delivered() {
        let store = chain_store();
        let runner = FlowRunner::new(EchoExecutor::default());
        runner.run_flow(&store, &RunControl::new()).await.unwrap();

        let calls = runner.executor.calls.lock().unwrap();
        let (id, upstream) = &calls[1];
        assert_eq!(id, "b");
        assert_eq!(upstream["source"], json!("a"));
        assert!(calls[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let store = chain_store();
        let runner = FlowRunner::new(EchoExecutor::failing(&["b"]));

        let summary = runner.run_flow(&store, &RunControl::new()).await.unwrap();

        assert_eq!(summary.completed, vec!["a"]);
        assert_eq!(summary.failed, vec!["b"]);
        assert_eq!(summary.skipped, vec!["c", "d"]);
        assert!(!summary.is_success());

        let guard = store.lock().await;
        let b = guard.module("b").unwrap();
        assert_eq!(b.status, ModuleStatus::Error);
        assert_eq!(b.error_message.as_deref(), Some("Execution failed: b exploded"));
        assert_eq!(guard.module("c").unwrap().status, ModuleStatus::Invalid);
    }

    #[tokio::test]
    async fn test_stop_suppresses_further_scheduling() {
        let store = chain_store();
        let control = RunControl::new();
        let executor = EchoExecutor {
            stop_after: Some(("b".to_string(), control.clone())),
            ..EchoExecutor::default()
        };
        let runner = FlowRunner::new(executor);

        let summary = runner.run_flow(&store, &control).await.unwrap();

        // b was already in flight and still reports its result
        assert_eq!(summary.completed, vec!["a", "b"]);
        assert_eq!(summary.skipped, vec!["c", "d"]);
        assert!(summary.stopped);
        assert_eq!(runner.executor.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_run_from_module() {
        let store = chain_store();
        let runner = FlowRunner::new(EchoExecutor::default());
        runner.run_flow(&store, &RunControl::new()).await.unwrap();
        store.lock().await.reset_module("c").unwrap();

        let summary = runner.run_from(&store, "c", &RunControl::new()).await.unwrap();
        assert_eq!(summary.completed, vec!["c", "d"]);
    }

    #[test]
    fn test_run_module_blocked_by_upstream() {
        let store = chain_store();
        let runner = FlowRunner::new(EchoExecutor::default());

        let result = tokio_test::block_on(runner.run_module(&store, "b")).unwrap();
        assert_eq!(
            result,
            StepResult::Blocked {
                waiting_on: vec!["a".to_string()]
            }
        );
        assert_eq!(status_of(&store, "b"), ModuleStatus::Idle);

        let result = tokio_test::block_on(runner.run_module(&store, "a")).unwrap();
        assert_eq!(result, StepResult::Executed { status: ModuleStatus::Done });
        assert_eq!(status_of(&store, "a"), ModuleStatus::Done);

        let result = tokio_test::block_on(runner.run_module(&store, "missing")).unwrap();
        assert_eq!(result, StepResult::Vanished);
    }

    #[tokio::test]
    async fn test_store_editable_while_module_executes() {
        let store = chain_store();
        let runner = FlowRunner::new(editing(&store, "b", |store| {
            store
                .update_module("b", ModuleUpdate::default().with_name("Renamed"))
                .unwrap();
            store
                .add_module_with_id("x", ModuleKind::ProjectAnalyzer, (0.0, 0.0))
                .unwrap();
        }));

        let summary = runner.run_flow(&store, &RunControl::new()).await.unwrap();

        assert_eq!(summary.completed, vec!["a", "b", "c", "d"]);
        let guard = store.lock().await;
        let b = guard.module("b").unwrap();
        assert_eq!(b.status, ModuleStatus::Done);
        assert_eq!(b.name, "Renamed");
        assert_eq!(b.outputs["metadata"], json!("b"));
        assert_eq!(guard.module("x").unwrap().status, ModuleStatus::Idle);
    }

    #[tokio::test]
    async fn test_module_deleted_while_executing_vanishes() {
        let store = chain_store();
        let runner = FlowRunner::new(editing(&store, "b", |store| {
            store.delete_module("b").unwrap();
        }));

        let summary = runner.run_flow(&store, &RunControl::new()).await.unwrap();

        // c lost its only upstream with b, so nothing blocks it any more
        assert_eq!(summary.completed, vec!["a", "c", "d"]);
        assert_eq!(summary.skipped, vec!["b"]);
        assert!(store.lock().await.module("b").is_none());
    }

    #[tokio::test]
    async fn test_run_module_deleted_while_executing() {
        let store = chain_store();
        let runner = FlowRunner::new(editing(&store, "a", |store| {
            store.delete_module("a").unwrap();
        }));

        let result = runner.run_module(&store, "a").await.unwrap();
        assert_eq!(result, StepResult::Vanished);
    }

    #[tokio::test]
    async fn test_upstream_reset_while_executing_lands_invalid() {
        let store = chain_store();
        let runner = FlowRunner::new(editing(&store, "b", |store| {
            store.reset_module("a").unwrap();
        }));

        let summary = runner.run_flow(&store, &RunControl::new()).await.unwrap();

        assert_eq!(summary.completed, vec!["a"]);
        assert_eq!(summary.failed, vec!["b"]);
        assert_eq!(summary.skipped, vec!["c", "d"]);
        let guard = store.lock().await;
        assert_eq!(guard.module("b").unwrap().status, ModuleStatus::Invalid);
        assert!(!guard.is_deferred("b"));
    }

    #[test]
    fn test_non_terminal_outcome_is_an_error() {
        let outcome = ModuleOutcome {
            status: ModuleStatus::Idle,
            outputs: Payload::new(),
            message: None,
        };
        let update = outcome.into_update();
        assert_eq!(update.status, Some(ModuleStatus::Error));
        assert!(update.error_message.flatten().unwrap().contains("non-terminal"));
    }
}
