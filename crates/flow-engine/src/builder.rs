//! Fluent builder for spaces
//!
//! Builds a `Space` directly, without running the connection validator.
//! Useful for seeding a store through `GraphStore::restore`, and in tests.

use crate::catalog::ModuleKind;
use crate::space::Space;
use crate::types::{Connection, DataType, Module, ModuleStatus};

/// Fluent builder for constructing spaces
///
/// # Example
///
/// ```ignore
/// let space = SpaceBuilder::new("space-1", "Launch kit")
///     .add_module("analyzer", ModuleKind::ProjectAnalyzer, (0.0, 0.0))
///     .with_status(ModuleStatus::Done)
///     .add_module("names", ModuleKind::NameGenerator, (200.0, 0.0))
///     .connect("analyzer", "analysis", "names", "analysis")
///     .build();
/// ```
pub struct SpaceBuilder {
    id: String,
    name: String,
    modules: Vec<Module>,
    edges: Vec<(String, String, String, String, Option<String>)>,
}

impl SpaceBuilder {
    /// Create a new space builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            modules: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add an idle module
    pub fn add_module(mut self, id: impl Into<String>, kind: ModuleKind, position: (f64, f64)) -> Self {
        self.modules.push(Module::new(id, kind, position));
        self
    }

    /// Set the status of the most recently added module
    pub fn with_status(mut self, status: ModuleStatus) -> Self {
        if let Some(module) = self.modules.last_mut() {
            module.status = status;
        }
        self
    }

    /// Set a result value on the most recently added module
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(module) = self.modules.last_mut() {
            module.outputs.insert(key.into(), value);
        }
        self
    }

    /// Set a configuration value on the most recently added module
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(module) = self.modules.last_mut() {
            module.inputs.insert(key.into(), value);
        }
        self
    }

    /// Connect two ports (auto-generates the connection ID)
    pub fn connect(
        mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edges
            .push((source.into(), source_port.into(), target.into(), target_port.into(), None));
        self
    }

    /// Connect two ports with an explicit connection ID
    pub fn connect_with_id(
        mut self,
        connection_id: impl Into<String>,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        self.edges.push((
            source.into(),
            source_port.into(),
            target.into(),
            target_port.into(),
            Some(connection_id.into()),
        ));
        self
    }

    /// Build the space without validation
    ///
    /// Connection data types are copied from the source port; an
    /// unresolvable source port falls back to `mixed`.
    pub fn build(self) -> Space {
        let mut space = Space::new(self.id, self.name);
        space.modules = self.modules;

        for (index, (source, source_port, target, target_port, id)) in self.edges.into_iter().enumerate() {
            let data_type = space
                .find_module(&source)
                .and_then(|m| m.ports.find_output(&source_port))
                .and_then(|p| p.data_type)
                .unwrap_or(DataType::Mixed);
            space.connections.push(Connection {
                id: id.unwrap_or_else(|| format!("conn-{}", index + 1)),
                source_module_id: source,
                source_port_id: source_port,
                target_module_id: target,
                target_port_id: target_port,
                data_type,
            });
        }

        space.refresh_connected_flags();
        space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_space_builder_basic() {
        let space = SpaceBuilder::new("s-1", "Launch kit")
            .add_module("analyzer", ModuleKind::ProjectAnalyzer, (0.0, 0.0))
            .with_status(ModuleStatus::Done)
            .with_input("projectPath", json!("/tmp/app"))
            .with_output("analysis", json!({"stack": "rust"}))
            .add_module("logo", ModuleKind::LogoGenerator, (200.0, 0.0))
            .connect("analyzer", "analysis", "logo", "brief")
            .build();

        assert_eq!(space.id, "s-1");
        assert_eq!(space.modules.len(), 2);
        assert_eq!(space.connections.len(), 1);
        assert_eq!(space.connections[0].id, "conn-1");
        assert_eq!(space.connections[0].data_type, DataType::Json);
        assert_eq!(space.modules[0].status, ModuleStatus::Done);
        assert_eq!(space.modules[0].inputs["projectPath"], json!("/tmp/app"));
        assert!(space.modules[1].ports.input[0].connected);
    }

    #[test]
    fn test_space_builder_explicit_connection_id() {
        let space = SpaceBuilder::new("s", "Test")
            .add_module("a", ModuleKind::MetadataGenerator, (0.0, 0.0))
            .add_module("b", ModuleKind::MetadataGenerator, (100.0, 0.0))
            .connect_with_id("wire", "a", "metadata", "b", "source")
            .build();

        assert_eq!(space.connections[0].id, "wire");
    }
}
