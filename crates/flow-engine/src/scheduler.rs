//! Topological scheduling
//!
//! Orders modules for a "run all" so that every connection's source comes
//! before its target. Uses Kahn's algorithm; ties are broken by module
//! insertion order, and successors are released in connection order, so
//! the result depends only on the space's contents.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{EngineError, Result};
use crate::space::Space;
use crate::types::ModuleId;

/// Compute the execution order of every module in the space
///
/// Fails with `GraphCycle` if some modules could not be ordered, rather
/// than silently dropping them.
pub fn topological_order(space: &Space) -> Result<Vec<ModuleId>> {
    let all: Vec<&str> = space.modules.iter().map(|m| m.id.as_str()).collect();
    order_subset(space, &all)
}

/// Compute the execution order of `module_id` and all of its descendants
pub fn order_from(space: &Space, module_id: &str) -> Result<Vec<ModuleId>> {
    if space.find_module(module_id).is_none() {
        return Err(EngineError::ModuleNotFound(module_id.to_string()));
    }
    let mut members: HashSet<String> = space.descendants(module_id).into_iter().collect();
    members.insert(module_id.to_string());

    // Keep insertion order for deterministic tie-breaking
    let subset: Vec<&str> = space
        .modules
        .iter()
        .map(|m| m.id.as_str())
        .filter(|id| members.contains(*id))
        .collect();
    order_subset(space, &subset)
}

/// Kahn's algorithm over the modules in `subset` and the connections
/// between them
fn order_subset(space: &Space, subset: &[&str]) -> Result<Vec<ModuleId>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for &id in subset {
        in_degree.insert(id, 0);
        adjacency.insert(id, Vec::new());
    }

    for connection in &space.connections {
        let source = connection.source_module_id.as_str();
        let target = connection.target_module_id.as_str();
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            if space.find_module(source).is_none() || space.find_module(target).is_none() {
                return Err(EngineError::invariant(format!(
                    "connection '{}' references a module that does not exist",
                    connection.id
                )));
            }
            continue;
        }
        if let Some(successors) = adjacency.get_mut(source) {
            successors.push(target);
        }
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = subset
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut order: Vec<ModuleId> = Vec::with_capacity(subset.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());

        if let Some(successors) = adjacency.get(id) {
            for &successor in successors {
                if let Some(degree) = in_degree.get_mut(successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(successor);
                    }
                }
            }
        }
    }

    if order.len() < subset.len() {
        let unscheduled: Vec<String> = subset
            .iter()
            .filter(|id| in_degree.get(*id).is_some_and(|d| *d > 0))
            .map(|id| id.to_string())
            .collect();
        log::warn!("Scheduling failed, cycle among {:?}", unscheduled);
        return Err(EngineError::GraphCycle { unscheduled });
    }

    log::debug!("Scheduled {} modules: {:?}", order.len(), order);
    Ok(order)
}
