//! The graph store: the mutable owner of one space
//!
//! Every change to a space goes through a `GraphStore`. Connections are
//! inserted only after the validator accepts them, status regressions
//! invalidate downstream modules, port `connected` flags are kept in sync,
//! and subscribers are notified after each successful mutation.
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{GraphStore, ModuleKind, ModuleStatus, ModuleUpdate};
//! use flow_engine::validation::ConnectionProposal;
//!
//! let mut store = GraphStore::new("space-1", "Launch kit");
//! let analyzer = store.add_module(ModuleKind::ProjectAnalyzer, (0.0, 0.0));
//! let names = store.add_module(ModuleKind::NameGenerator, (200.0, 0.0));
//!
//! store.update_module(&analyzer.id, ModuleUpdate::status(ModuleStatus::Done))?;
//! store.add_connection(&ConnectionProposal::new(&analyzer.id, "analysis", &names.id, "analysis"))?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::ModuleKind;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result, ValidationError};
use crate::events::{EventError, EventSink, SpaceEvent};
use crate::invalidation::{invalidate_downstream, status_regresses, Invalidation};
use crate::scheduler;
use crate::space::Space;
use crate::types::{Connection, Module, ModuleId, ModuleStatus, ModuleUpdate, Payload};
use crate::undo::UndoStack;
use crate::validation::{validate_connection, ConnectionProposal};

/// Mutable container for one space
pub struct GraphStore {
    space: Space,
    config: EngineConfig,
    subscribers: Vec<Arc<dyn EventSink>>,
    history: Option<UndoStack>,
    /// Modules that were running when an upstream result went stale
    deferred: HashSet<ModuleId>,
}

impl GraphStore {
    /// Create a store owning a new empty space
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::build(Space::new(id, name), EngineConfig::default())
    }

    /// Create a store owning a new empty space, with explicit config
    pub fn with_config(id: impl Into<String>, name: impl Into<String>, config: EngineConfig) -> Self {
        Self::build(Space::new(id, name), config)
    }

    /// Create a store from an existing space, checking its invariants
    pub fn from_space(space: Space, config: EngineConfig) -> Result<Self> {
        check_invariants(&space)?;
        let mut space = space;
        space.refresh_connected_flags();
        Ok(Self::build(space, config))
    }

    fn build(space: Space, config: EngineConfig) -> Self {
        let history = config
            .history_enabled()
            .then(|| UndoStack::with_level(config.history_depth, config.compression_level));
        let mut store = Self {
            space,
            config,
            subscribers: Vec::new(),
            history,
            deferred: HashSet::new(),
        };
        store.record("initial");
        store
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The current space
    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Find a module by ID
    pub fn module(&self, id: &str) -> Option<&Module> {
        self.space.find_module(id)
    }

    /// Find a connection by ID
    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.space.find_connection(id)
    }

    /// Whether a module's next successful report will land as `invalid`
    pub fn is_deferred(&self, id: &str) -> bool {
        self.deferred.contains(id)
    }

    /// Register an observer notified after every mutation
    ///
    /// A sink that reports `EventError::Disconnected` is dropped.
    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.subscribers.push(sink);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Create an idle module of `kind` with a generated id
    pub fn add_module(&mut self, kind: ModuleKind, position: (f64, f64)) -> Module {
        let id = self.config.new_id("module");
        self.insert_module(Module::new(id, kind, position))
    }

    /// Create an idle module of `kind` with an explicit id
    pub fn add_module_with_id(
        &mut self,
        id: impl Into<String>,
        kind: ModuleKind,
        position: (f64, f64),
    ) -> Result<Module> {
        let id = id.into();
        if self.space.find_module(&id).is_some() {
            return Err(EngineError::DuplicateModuleId(id));
        }
        Ok(self.insert_module(Module::new(id, kind, position)))
    }

    fn insert_module(&mut self, module: Module) -> Module {
        log::debug!("Adding {:?} module '{}'", module.kind, module.id);
        self.space.modules.push(module.clone());
        self.record(format!("add module '{}'", module.id));
        self.emit(SpaceEvent::ModuleAdded {
            space_id: self.space.id.clone(),
            module_id: module.id.clone(),
        });
        module
    }

    /// Merge `update` into a module
    ///
    /// A status regression (see `status_regresses`) invalidates every
    /// descendant of the module. Returns what was invalidated.
    pub fn update_module(&mut self, id: &str, update: ModuleUpdate) -> Result<Invalidation> {
        let deferred = self.deferred.contains(id);
        let Some(module) = self.space.find_module_mut(id) else {
            log::warn!("Ignoring update for unknown module '{}'", id);
            return Err(EngineError::ModuleNotFound(id.to_string()));
        };

        let from = module.status;
        module.apply(update);

        if deferred && module.status != ModuleStatus::Running {
            if module.status.has_usable_result() {
                log::debug!("Module '{}' finished on stale inputs, marking invalid", id);
                module.status = ModuleStatus::Invalid;
            }
            self.deferred.remove(id);
        }

        let to = module.status;
        self.emit(SpaceEvent::ModuleUpdated {
            space_id: self.space.id.clone(),
            module_id: id.to_string(),
            status: to,
        });

        if status_regresses(from, to) {
            log::debug!("Module '{}' regressed {} -> {}", id, from, to);
            Ok(self.propagate(id))
        } else {
            Ok(Invalidation::default())
        }
    }

    /// Return a module to `idle`, clearing its outputs, and invalidate
    /// everything downstream of it
    pub fn reset_module(&mut self, id: &str) -> Result<Invalidation> {
        self.reset_one(id)?;
        Ok(self.propagate(id))
    }

    /// Return a module and all of its descendants to `idle`, clearing
    /// their outputs
    ///
    /// Running descendants are left running and deferred. Returns the ids
    /// that were reset, starting with `id`.
    pub fn reset_from_module(&mut self, id: &str) -> Result<Vec<ModuleId>> {
        self.reset_one(id)?;
        let mut reset = vec![id.to_string()];

        for descendant in self.space.descendants(id) {
            let running = self
                .space
                .find_module(&descendant)
                .is_some_and(|m| m.status == ModuleStatus::Running);
            if running {
                self.deferred.insert(descendant);
                continue;
            }
            self.reset_one(&descendant)?;
            reset.push(descendant);
        }

        Ok(reset)
    }

    fn reset_one(&mut self, id: &str) -> Result<()> {
        let module = self
            .space
            .find_module_mut(id)
            .ok_or_else(|| EngineError::ModuleNotFound(id.to_string()))?;
        module.status = ModuleStatus::Idle;
        module.outputs.clear();
        module.error_message = None;
        self.deferred.remove(id);
        self.emit(SpaceEvent::ModuleUpdated {
            space_id: self.space.id.clone(),
            module_id: id.to_string(),
            status: ModuleStatus::Idle,
        });
        Ok(())
    }

    /// Delete a module and every connection touching it
    ///
    /// Returns the removed connections. Remaining modules keep their
    /// status; a deletion is not treated as an upstream failure.
    pub fn delete_module(&mut self, id: &str) -> Result<Vec<Connection>> {
        let Some(position) = self.space.modules.iter().position(|m| m.id == id) else {
            log::warn!("Ignoring delete for unknown module '{}'", id);
            return Err(EngineError::ModuleNotFound(id.to_string()));
        };
        self.space.modules.remove(position);
        self.deferred.remove(id);

        let (removed, kept): (Vec<Connection>, Vec<Connection>) = std::mem::take(&mut self.space.connections)
            .into_iter()
            .partition(|c| c.touches(id));
        self.space.connections = kept;
        for connection in &removed {
            self.sync_port_flags(connection);
        }

        log::debug!(
            "Deleted module '{}' and {} connection(s)",
            id,
            removed.len()
        );
        self.record(format!("delete module '{}'", id));
        self.emit(SpaceEvent::ModuleDeleted {
            space_id: self.space.id.clone(),
            module_id: id.to_string(),
            removed_connections: removed.iter().map(|c| c.id.clone()).collect(),
        });
        Ok(removed)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Validate and insert a connection
    ///
    /// The space is only modified when the validator accepts the proposal.
    /// Proposing an edge that already exists returns the existing one.
    pub fn add_connection(&mut self, proposal: &ConnectionProposal) -> std::result::Result<Connection, ValidationError> {
        let id = self.config.new_id("connection");
        let connection = validate_connection(&self.space, proposal, id).map_err(|e| {
            log::warn!("Rejected connection {:?}: {}", proposal, e);
            e
        })?;

        if let Some(existing) = self.space.connections.iter().find(|c| proposal.matches(c)) {
            return Ok(existing.clone());
        }

        log::debug!(
            "Connecting {}.{} -> {}.{} ({})",
            connection.source_module_id,
            connection.source_port_id,
            connection.target_module_id,
            connection.target_port_id,
            connection.data_type
        );
        self.space.connections.push(connection.clone());
        self.sync_port_flags(&connection);
        self.record(format!(
            "connect {}.{} -> {}.{}",
            connection.source_module_id,
            connection.source_port_id,
            connection.target_module_id,
            connection.target_port_id
        ));
        self.emit(SpaceEvent::ConnectionAdded {
            space_id: self.space.id.clone(),
            connection: connection.clone(),
        });
        Ok(connection)
    }

    /// Remove a connection
    ///
    /// Returns the removed connection, or None if the id is unknown. Does
    /// not invalidate anything.
    pub fn delete_connection(&mut self, id: &str) -> Option<Connection> {
        let position = self.space.connections.iter().position(|c| c.id == id)?;
        let connection = self.space.connections.remove(position);
        self.sync_port_flags(&connection);

        log::debug!("Deleted connection '{}'", id);
        self.record(format!("delete connection '{}'", id));
        self.emit(SpaceEvent::ConnectionDeleted {
            space_id: self.space.id.clone(),
            connection_id: id.to_string(),
        });
        Some(connection)
    }

    /// Values delivered to a module's input ports by its incoming
    /// connections, keyed by input port id
    ///
    /// A port wired to several connections always receives a JSON array,
    /// in connection order, whichever of its sources currently have a
    /// value. Sources without a value are skipped; a port none of whose
    /// sources has a value is absent.
    pub fn upstream_values(&self, id: &str) -> Result<Payload> {
        if self.space.find_module(id).is_none() {
            return Err(EngineError::ModuleNotFound(id.to_string()));
        }

        // (port, wired connection count, available values)
        let mut grouped: Vec<(String, usize, Vec<serde_json::Value>)> = Vec::new();
        for connection in self.space.incoming(id) {
            let value = self
                .space
                .find_module(&connection.source_module_id)
                .and_then(|m| m.outputs.get(&connection.source_port_id))
                .cloned();
            let index = match grouped.iter().position(|(port, ..)| *port == connection.target_port_id) {
                Some(index) => index,
                None => {
                    grouped.push((connection.target_port_id.clone(), 0, Vec::new()));
                    grouped.len() - 1
                }
            };
            let (_, wired, values) = &mut grouped[index];
            *wired += 1;
            values.extend(value);
        }

        Ok(grouped
            .into_iter()
            .filter(|(_, _, values)| !values.is_empty())
            .map(|(port, wired, mut values)| {
                let value = if wired == 1 {
                    values.remove(0)
                } else {
                    serde_json::Value::Array(values)
                };
                (port, value)
            })
            .collect())
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Execution order for a "run all"
    pub fn execution_order(&self) -> Result<Vec<ModuleId>> {
        scheduler::topological_order(&self.space)
    }

    /// Execution order for `id` and everything downstream of it
    pub fn execution_order_from(&self, id: &str) -> Result<Vec<ModuleId>> {
        scheduler::order_from(&self.space, id)
    }

    // =========================================================================
    // Snapshot and history
    // =========================================================================

    /// Serializable copy of the current space
    pub fn snapshot(&self) -> Space {
        self.space.clone()
    }

    /// Replace the current space
    ///
    /// Fails without modifying anything if the space breaks a structural
    /// invariant (dangling references, a cycle, an incompatible edge).
    pub fn restore(&mut self, space: Space) -> Result<()> {
        check_invariants(&space)?;
        self.deferred.clear();
        self.replace(space);
        self.record("restore");
        Ok(())
    }

    /// Step back to the previous structural state
    ///
    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(step) = self.history.as_mut().and_then(|h| h.undo()) else {
            return Ok(false);
        };
        let mut space = step?;
        self.carry_runtime_state(&mut space);
        self.replace(space);
        Ok(true)
    }

    /// Re-apply an undone structural state
    pub fn redo(&mut self) -> Result<bool> {
        let Some(step) = self.history.as_mut().and_then(|h| h.redo()) else {
            return Ok(false);
        };
        let mut space = step?;
        self.carry_runtime_state(&mut space);
        self.replace(space);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.as_ref().is_some_and(|h| h.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.history.as_ref().is_some_and(|h| h.can_redo())
    }

    /// Description of the edit `undo` would revert, e.g. "delete module 'b'"
    pub fn undo_edit(&self) -> Option<&str> {
        self.history.as_ref().and_then(|h| h.undo_edit())
    }

    /// Description of the edit `redo` would re-apply
    pub fn redo_edit(&self) -> Option<&str> {
        self.history.as_ref().and_then(|h| h.redo_edit())
    }

    /// History only covers structure; modules that still exist keep their
    /// current status, results and configuration
    fn carry_runtime_state(&self, space: &mut Space) {
        for module in &mut space.modules {
            if let Some(current) = self.space.find_module(&module.id) {
                module.status = current.status;
                module.inputs = current.inputs.clone();
                module.outputs = current.outputs.clone();
                module.error_message = current.error_message.clone();
                module.name = current.name.clone();
            }
        }
    }

    fn replace(&mut self, mut space: Space) {
        space.refresh_connected_flags();
        log::info!(
            "Restored space '{}' ({} modules, {} connections)",
            space.id,
            space.modules.len(),
            space.connections.len()
        );
        self.space = space;
        let space = &self.space;
        self.deferred.retain(|id| space.find_module(id).is_some());
        self.emit(SpaceEvent::SpaceRestored {
            space_id: self.space.id.clone(),
            module_count: self.space.modules.len(),
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn propagate(&mut self, id: &str) -> Invalidation {
        let invalidation = invalidate_downstream(&mut self.space, id);
        self.deferred.extend(invalidation.deferred.iter().cloned());
        if !invalidation.invalidated.is_empty() {
            self.emit(SpaceEvent::ModulesInvalidated {
                space_id: self.space.id.clone(),
                source_module_id: id.to_string(),
                module_ids: invalidation.invalidated.clone(),
            });
        }
        invalidation
    }

    /// Recompute `connected` on both endpoints of a connection
    fn sync_port_flags(&mut self, connection: &Connection) {
        let endpoints = [
            (&connection.source_module_id, &connection.source_port_id),
            (&connection.target_module_id, &connection.target_port_id),
        ];
        for (module_id, port_id) in endpoints {
            let connected = self.space.is_port_connected(module_id, port_id);
            if let Some(module) = self.space.find_module_mut(module_id) {
                for port in module.ports.iter_mut().filter(|p| p.id == *port_id) {
                    port.connected = connected;
                }
            }
        }
    }

    fn record(&mut self, edit: impl Into<String>) {
        if let Some(history) = self.history.as_mut() {
            if let Err(e) = history.record(&self.space, edit) {
                log::warn!("Failed to record undo snapshot: {}", e);
            }
        }
    }

    fn emit(&mut self, event: SpaceEvent) {
        self.subscribers.retain(|sink| match sink.send(event.clone()) {
            Ok(()) => true,
            Err(EventError::Disconnected) => {
                log::debug!("Dropping disconnected subscriber of space '{}'", event.space_id());
                false
            }
            Err(e) => {
                log::warn!("Failed to deliver space event: {}", e);
                true
            }
        });
    }
}

/// Check references, acyclicity, and that each edge's data type is the
/// one its source produces and its target accepts
fn check_invariants(space: &Space) -> Result<()> {
    space.check_references()?;
    scheduler::topological_order(space)?;

    for connection in &space.connections {
        let source_type = space
            .find_module(&connection.source_module_id)
            .and_then(|m| m.ports.find_output(&connection.source_port_id))
            .and_then(|p| p.data_type);
        if source_type != Some(connection.data_type) {
            return Err(EngineError::invariant(format!(
                "connection '{}' carries {} but its source port produces {}",
                connection.id,
                connection.data_type,
                source_type.map_or_else(|| "nothing".to_string(), |t| t.to_string())
            )));
        }

        let accepted = space
            .find_module(&connection.target_module_id)
            .and_then(|m| m.ports.find_input(&connection.target_port_id))
            .is_some_and(|p| p.accepts(connection.data_type));
        if !accepted {
            return Err(EngineError::invariant(format!(
                "connection '{}' carries {} into a port that does not accept it",
                connection.id, connection.data_type
            )));
        }
    }

    Ok(())
}
