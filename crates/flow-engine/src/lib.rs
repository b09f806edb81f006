//! Flow Engine - dataflow graph engine for module pipelines
//!
//! A space holds modules (project analyzer, name generator, logo
//! generator, ...) wired output-to-input by typed connections. This crate
//! owns the rules of that graph:
//!
//! - Connection validation with a fixed check order and cycle detection
//! - Transitive invalidation when an upstream result regresses
//! - Topological scheduling for "run all"
//! - A `GraphStore` with change events, snapshot/restore and undo/redo
//! - An async `FlowRunner` that drives opaque per-module executors
//!
//! # Architecture
//!
//! Per-module business logic (AI providers, filesystem scans, browser
//! automation) lives outside the engine behind `ModuleExecutor`. The engine
//! only sees statuses and opaque result payloads.
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{ConnectionProposal, GraphStore, ModuleKind, ModuleStatus, ModuleUpdate};
//!
//! let mut store = GraphStore::new("space-1", "Launch kit");
//! let analyzer = store.add_module(ModuleKind::ProjectAnalyzer, (0.0, 0.0));
//! let logo = store.add_module(ModuleKind::LogoGenerator, (200.0, 0.0));
//!
//! store.update_module(&analyzer.id, ModuleUpdate::status(ModuleStatus::Done))?;
//! store.add_connection(&ConnectionProposal::new(&analyzer.id, "analysis", &logo.id, "brief"))?;
//! let order = store.execution_order()?;
//! ```

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod invalidation;
pub mod runner;
pub mod scheduler;
pub mod space;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::SpaceBuilder;
pub use catalog::{ModuleDescriptor, ModuleKind};
pub use config::EngineConfig;
pub use error::{EngineError, Result, ValidationError, ValidationErrorKind};
pub use events::{ChannelSink, EventError, EventLog, EventSink, SpaceEvent};
pub use invalidation::Invalidation;
pub use runner::{FlowRunner, ModuleExecutor, ModuleOutcome, RunControl, RunSummary, SharedStore};
pub use space::Space;
pub use store::GraphStore;
pub use types::{Connection, DataType, Module, ModuleStatus, ModuleUpdate, Port, PortDirection};
pub use undo::UndoStack;
pub use validation::ConnectionProposal;
