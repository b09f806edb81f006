//! Core types for module graphs
//!
//! These types define the pieces a space is made of: modules, their typed
//! ports, and the connections wiring an output port to an input port.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ModuleKind;

/// Unique identifier for a module
pub type ModuleId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Unique identifier for a port (within its module)
pub type PortId = String;

/// Opaque named payload values (module configuration or results)
pub type Payload = HashMap<String, serde_json::Value>;

/// The kind of payload carried across a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Json,
    Text,
    Image,
    Audio,
    Video,
    /// Heterogeneous bundle of the other kinds
    Mixed,
}

impl DataType {
    /// Every data type, in declaration order
    pub const ALL: [DataType; 6] = [
        DataType::Json,
        DataType::Text,
        DataType::Image,
        DataType::Audio,
        DataType::Video,
        DataType::Mixed,
    ];
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Json => "json",
            DataType::Text => "text",
            DataType::Image => "image",
            DataType::Audio => "audio",
            DataType::Video => "video",
            DataType::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A typed attachment point on a module
///
/// Output ports carry one `data_type`; input ports carry the set of
/// `accepted_types`. `connected` is maintained by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Identifier, unique within the module
    pub id: PortId,
    /// Input or output
    pub direction: PortDirection,
    /// Human-readable label
    pub label: String,
    /// Data type produced (output ports only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Data types accepted (input ports only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted_types: Vec<DataType>,
    /// Whether at least one connection references this port
    #[serde(default)]
    pub connected: bool,
}

impl Port {
    /// Create an output port producing `data_type`
    pub fn output(id: impl Into<String>, label: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            label: label.into(),
            data_type: Some(data_type),
            accepted_types: Vec::new(),
            connected: false,
        }
    }

    /// Create an input port accepting `accepted_types`
    pub fn input(id: impl Into<String>, label: impl Into<String>, accepted_types: &[DataType]) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            label: label.into(),
            data_type: None,
            accepted_types: accepted_types.to_vec(),
            connected: false,
        }
    }

    /// Check if this input port accepts the given data type
    pub fn accepts(&self, data_type: DataType) -> bool {
        self.accepted_types.contains(&data_type)
    }
}

/// Input and output ports of a module, fixed at creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePorts {
    pub input: Vec<Port>,
    pub output: Vec<Port>,
}

impl ModulePorts {
    pub fn find_input(&self, port_id: &str) -> Option<&Port> {
        self.input.iter().find(|p| p.id == port_id)
    }

    pub fn find_output(&self, port_id: &str) -> Option<&Port> {
        self.output.iter().find(|p| p.id == port_id)
    }

    /// Iterate over every port, inputs first
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.input.iter_mut().chain(self.output.iter_mut())
    }
}

/// Lifecycle status of a module
///
/// `idle -> running -> {done, warning, error, fatal_error}`, reset back to
/// `idle`. `invalid` is only ever applied by upstream invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    #[default]
    Idle,
    Running,
    Warning,
    Done,
    Error,
    FatalError,
    Invalid,
}

impl ModuleStatus {
    /// Terminal statuses an execution can report
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Done | ModuleStatus::Warning | ModuleStatus::Error | ModuleStatus::FatalError
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ModuleStatus::Error | ModuleStatus::FatalError)
    }

    /// Whether downstream modules may consume this module's outputs
    pub fn has_usable_result(&self) -> bool {
        matches!(self, ModuleStatus::Done | ModuleStatus::Warning)
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModuleStatus::Idle => "idle",
            ModuleStatus::Running => "running",
            ModuleStatus::Warning => "warning",
            ModuleStatus::Done => "done",
            ModuleStatus::Error => "error",
            ModuleStatus::FatalError => "fatal_error",
            ModuleStatus::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// A node in the space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Unique identifier within the space
    pub id: ModuleId,
    /// Module kind (fixes the port layout)
    pub kind: ModuleKind,
    /// Display name
    pub name: String,
    /// Current lifecycle status
    pub status: ModuleStatus,
    /// Named configuration values, opaque to the engine
    #[serde(default)]
    pub inputs: Payload,
    /// Named result values, opaque to the engine
    #[serde(default)]
    pub outputs: Payload,
    /// Port layout
    pub ports: ModulePorts,
    /// Position on the canvas (x, y)
    pub position: (f64, f64),
    /// Message from the last failed execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Module {
    /// Create an idle module with the port layout of `kind`
    pub fn new(id: impl Into<String>, kind: ModuleKind, position: (f64, f64)) -> Self {
        let descriptor = kind.descriptor();
        Self {
            id: id.into(),
            kind,
            name: descriptor.label.to_string(),
            status: ModuleStatus::Idle,
            inputs: Payload::new(),
            outputs: Payload::new(),
            ports: descriptor.ports(),
            position,
            error_message: None,
        }
    }

    /// Merge the fields present in `update` into this module
    pub fn apply(&mut self, update: ModuleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(inputs) = update.inputs {
            self.inputs.extend(inputs);
        }
        if let Some(outputs) = update.outputs {
            self.outputs.extend(outputs);
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(error_message) = update.error_message {
            self.error_message = error_message;
        }
    }
}

/// Partial update merged into a module by `GraphStore::update_module`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUpdate {
    pub name: Option<String>,
    pub status: Option<ModuleStatus>,
    /// Merged key by key into the module's inputs
    pub inputs: Option<Payload>,
    /// Merged key by key into the module's outputs
    pub outputs: Option<Payload>,
    pub position: Option<(f64, f64)>,
    /// `Some(None)` clears the message
    pub error_message: Option<Option<String>>,
}

impl ModuleUpdate {
    /// An update that only changes the status
    pub fn status(status: ModuleStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Payload) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: Payload) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.get_or_insert_with(Payload::new).insert(key.into(), value);
        self
    }

    pub fn with_position(mut self, position: (f64, f64)) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn without_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }
}

/// A validated directed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_module_id: ModuleId,
    pub source_port_id: PortId,
    pub target_module_id: ModuleId,
    pub target_port_id: PortId,
    /// Copied from the source port at creation time
    pub data_type: DataType,
}

impl Connection {
    /// Whether this connection starts or ends at `module_id`
    pub fn touches(&self, module_id: &str) -> bool {
        self.source_module_id == module_id || self.target_module_id == module_id
    }
}
