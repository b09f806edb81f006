//! Connection validation and cycle detection
//!
//! `validate_connection` decides whether a proposed edge may be added to a
//! space. Checks run in a fixed order and the first failure wins, so the
//! user sees the most specific reason (e.g. "source not finished" rather
//! than a type mismatch on a module that has no result yet).

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationErrorKind};
use crate::space::Space;
use crate::types::{Connection, ModuleId, ModuleStatus, PortId};

/// A proposed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProposal {
    pub source_module_id: ModuleId,
    pub source_port_id: PortId,
    pub target_module_id: ModuleId,
    pub target_port_id: PortId,
}

impl ConnectionProposal {
    pub fn new(
        source_module_id: impl Into<String>,
        source_port_id: impl Into<String>,
        target_module_id: impl Into<String>,
        target_port_id: impl Into<String>,
    ) -> Self {
        Self {
            source_module_id: source_module_id.into(),
            source_port_id: source_port_id.into(),
            target_module_id: target_module_id.into(),
            target_port_id: target_port_id.into(),
        }
    }

    /// Whether an existing connection has the same four endpoints
    pub fn matches(&self, connection: &Connection) -> bool {
        connection.source_module_id == self.source_module_id
            && connection.source_port_id == self.source_port_id
            && connection.target_module_id == self.target_module_id
            && connection.target_port_id == self.target_port_id
    }
}

/// Validate a proposed connection against the current space
///
/// On success, returns the would-be connection with the given id and the
/// source port's data type. The space is not modified.
pub fn validate_connection(
    space: &Space,
    proposal: &ConnectionProposal,
    connection_id: impl Into<String>,
) -> Result<Connection, ValidationError> {
    let source = space.find_module(&proposal.source_module_id);
    let target = space.find_module(&proposal.target_module_id);
    let (source, target) = match (source, target) {
        (Some(source), Some(target)) => (source, target),
        (None, _) => {
            return Err(ValidationError::new(
                ValidationErrorKind::ModuleNotFound,
                format!("Source module '{}' does not exist", proposal.source_module_id),
            ))
        }
        (_, None) => {
            return Err(ValidationError::new(
                ValidationErrorKind::ModuleNotFound,
                format!("Target module '{}' does not exist", proposal.target_module_id),
            ))
        }
    };

    if source.status != ModuleStatus::Done {
        return Err(ValidationError::new(
            ValidationErrorKind::ModuleNotDone,
            format!(
                "'{}' has not produced a result yet (status: {}); run it before connecting",
                source.name, source.status
            ),
        ));
    }

    let Some(data_type) = source
        .ports
        .find_output(&proposal.source_port_id)
        .and_then(|port| port.data_type)
    else {
        return Err(ValidationError::new(
            ValidationErrorKind::EmptyOutput,
            format!(
                "Output '{}' of '{}' has nothing to offer",
                proposal.source_port_id, source.name
            ),
        ));
    };

    let Some(target_port) = target.ports.find_input(&proposal.target_port_id) else {
        return Err(ValidationError::new(
            ValidationErrorKind::PortNotFound,
            format!(
                "'{}' has no input named '{}'",
                target.name, proposal.target_port_id
            ),
        ));
    };

    if !target_port.accepts(data_type) {
        let accepted: Vec<String> = target_port.accepted_types.iter().map(|t| t.to_string()).collect();
        return Err(ValidationError::new(
            ValidationErrorKind::TypeMismatch,
            format!(
                "Input '{}' accepts [{}] but '{}' produces {}",
                target_port.label,
                accepted.join(", "),
                proposal.source_port_id,
                data_type
            ),
        ));
    }

    if target.status == ModuleStatus::Running {
        return Err(ValidationError::new(
            ValidationErrorKind::ModuleRunning,
            format!("'{}' is running; wait for it to finish", target.name),
        ));
    }

    if would_create_cycle(&space.connections, &source.id, &target.id) {
        return Err(ValidationError::new(
            ValidationErrorKind::CircularDependency,
            format!(
                "Connecting '{}' to '{}' would create a circular dependency",
                source.name, target.name
            ),
        ));
    }

    Ok(Connection {
        id: connection_id.into(),
        source_module_id: source.id.clone(),
        source_port_id: proposal.source_port_id.clone(),
        target_module_id: target.id.clone(),
        target_port_id: proposal.target_port_id.clone(),
        data_type,
    })
}

/// Check whether adding `source -> target` would close a cycle
///
/// Breadth-first search from `target` over existing outgoing connections;
/// the edge is rejected iff `source` is reachable. A self-loop always is.
pub fn would_create_cycle(connections: &[Connection], source: &str, target: &str) -> bool {
    if source == target {
        return true;
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(target);
    queue.push_back(target);

    while let Some(current) = queue.pop_front() {
        for connection in connections.iter().filter(|c| c.source_module_id == current) {
            let next = connection.target_module_id.as_str();
            if next == source {
                return true;
            }
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    false
}
