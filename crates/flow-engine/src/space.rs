//! The space: one workspace's complete graph
//!
//! A `Space` is also the serialized snapshot format. It is a plain
//! `{ id, name, modules, connections }` structure that round-trips through
//! JSON without losing ids, statuses or port shapes.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{Connection, Module, ModuleId};

/// A complete module graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    /// Unique identifier for this space
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Modules, in insertion order
    pub modules: Vec<Module>,
    /// Connections, in insertion order
    pub connections: Vec<Connection>,
}

impl Space {
    /// Create a new empty space
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            modules: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Find a module by ID
    pub fn find_module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Find a module by ID (mutable)
    pub fn find_module_mut(&mut self, id: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id == id)
    }

    /// Find a connection by ID
    pub fn find_connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Get connections coming into a module
    pub fn incoming<'a>(&'a self, module_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target_module_id == module_id)
    }

    /// Get connections going out of a module
    pub fn outgoing<'a>(&'a self, module_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_module_id == module_id)
    }

    /// IDs of modules this module reads from (upstream), deduplicated
    pub fn dependencies(&self, module_id: &str) -> Vec<ModuleId> {
        let mut seen = HashSet::new();
        self.incoming(module_id)
            .filter(|c| seen.insert(c.source_module_id.as_str()))
            .map(|c| c.source_module_id.clone())
            .collect()
    }

    /// IDs of modules reading from this module (downstream), deduplicated
    pub fn dependents(&self, module_id: &str) -> Vec<ModuleId> {
        let mut seen = HashSet::new();
        self.outgoing(module_id)
            .filter(|c| seen.insert(c.target_module_id.as_str()))
            .map(|c| c.target_module_id.clone())
            .collect()
    }

    /// Every module reachable from `module_id` over outgoing connections,
    /// in breadth-first order, excluding `module_id` itself
    pub fn descendants(&self, module_id: &str) -> Vec<ModuleId> {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(module_id);
        let mut queue: VecDeque<&str> = VecDeque::from([module_id]);
        let mut order = Vec::new();

        while let Some(current) = queue.pop_front() {
            for connection in self.outgoing(current) {
                let next = connection.target_module_id.as_str();
                if visited.insert(next) {
                    order.push(next.to_string());
                    queue.push_back(next);
                }
            }
        }

        order
    }

    /// Whether any connection references the given port
    pub fn is_port_connected(&self, module_id: &str, port_id: &str) -> bool {
        self.connections.iter().any(|c| {
            (c.source_module_id == module_id && c.source_port_id == port_id)
                || (c.target_module_id == module_id && c.target_port_id == port_id)
        })
    }

    /// Recompute every port's `connected` flag from the connection set
    pub fn refresh_connected_flags(&mut self) {
        let referenced: HashSet<(String, String)> = self
            .connections
            .iter()
            .flat_map(|c| {
                [
                    (c.source_module_id.clone(), c.source_port_id.clone()),
                    (c.target_module_id.clone(), c.target_port_id.clone()),
                ]
            })
            .collect();

        for module in &mut self.modules {
            let module_id = module.id.clone();
            for port in module.ports.iter_mut() {
                port.connected = referenced.contains(&(module_id.clone(), port.id.clone()));
            }
        }
    }

    /// Check that every connection resolves to existing modules and to
    /// ports of the correct direction, and that module ids are unique
    pub fn check_references(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for module in &self.modules {
            if !ids.insert(module.id.as_str()) {
                return Err(EngineError::invariant(format!(
                    "module id '{}' appears more than once",
                    module.id
                )));
            }
        }

        for connection in &self.connections {
            let source = self.find_module(&connection.source_module_id).ok_or_else(|| {
                EngineError::invariant(format!(
                    "connection '{}' references unknown source module '{}'",
                    connection.id, connection.source_module_id
                ))
            })?;
            if source.ports.find_output(&connection.source_port_id).is_none() {
                return Err(EngineError::invariant(format!(
                    "connection '{}' references unknown output port '{}' on '{}'",
                    connection.id, connection.source_port_id, source.id
                )));
            }

            let target = self.find_module(&connection.target_module_id).ok_or_else(|| {
                EngineError::invariant(format!(
                    "connection '{}' references unknown target module '{}'",
                    connection.id, connection.target_module_id
                ))
            })?;
            if target.ports.find_input(&connection.target_port_id).is_none() {
                return Err(EngineError::invariant(format!(
                    "connection '{}' references unknown input port '{}' on '{}'",
                    connection.id, connection.target_port_id, target.id
                )));
            }
        }

        Ok(())
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
