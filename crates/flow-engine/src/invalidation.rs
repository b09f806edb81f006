//! Downstream invalidation
//!
//! When a module's result regresses (reset to idle, or a failure), every
//! module that transitively consumes it is marked `invalid`. Invalidation
//! is always transitive, whichever mutation triggered it. Stale modules
//! keep their outputs so the UI can still show the last result as outdated.

use serde::{Deserialize, Serialize};

use crate::space::Space;
use crate::types::{ModuleId, ModuleStatus};

/// Whether a status change makes downstream results stale
///
/// True when a module that had (or was producing) a result goes back to
/// `idle`, or when a module enters an error state from a non-error state.
pub fn status_regresses(from: ModuleStatus, to: ModuleStatus) -> bool {
    if from == to {
        return false;
    }
    match to {
        ModuleStatus::Idle => matches!(
            from,
            ModuleStatus::Done | ModuleStatus::Running | ModuleStatus::Warning
        ),
        ModuleStatus::Error | ModuleStatus::FatalError => !from.is_error(),
        _ => false,
    }
}

/// Outcome of an invalidation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invalidation {
    /// Modules whose status was set to `invalid`, in breadth-first order
    pub invalidated: Vec<ModuleId>,
    /// Running modules that were left alone; their next successful
    /// report must land as `invalid`
    pub deferred: Vec<ModuleId>,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        self.invalidated.is_empty() && self.deferred.is_empty()
    }
}

/// Mark every descendant of `module_id` as `invalid`
///
/// Breadth-first over outgoing connections. Running descendants are not
/// overwritten and are reported as deferred; the sweep still continues
/// through them. Already-invalid modules are not reported again.
pub fn invalidate_downstream(space: &mut Space, module_id: &str) -> Invalidation {
    let mut result = Invalidation::default();

    for descendant in space.descendants(module_id) {
        let Some(module) = space.find_module_mut(&descendant) else {
            continue;
        };
        match module.status {
            ModuleStatus::Running => result.deferred.push(descendant),
            ModuleStatus::Invalid => {}
            _ => {
                module.status = ModuleStatus::Invalid;
                result.invalidated.push(descendant);
            }
        }
    }

    if !result.is_empty() {
        log::debug!(
            "Invalidated downstream of '{}': {:?} (deferred: {:?})",
            module_id,
            result.invalidated,
            result.deferred
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SpaceBuilder;
    use crate::catalog::ModuleKind;
    use serde_json::json;

    fn chain() -> Space {
        // a -> b -> c -> d, all done
        let mut builder = SpaceBuilder::new("s", "Chain");
        for id in ["a", "b", "c", "d"] {
            builder = builder
                .add_module(id, ModuleKind::MetadataGenerator, (0.0, 0.0))
                .with_status(ModuleStatus::Done)
                .with_output("metadata", json!({ "from": id }));
        }
        builder
            .connect("a", "metadata", "b", "source")
            .connect("b", "metadata", "c", "source")
            .connect("c", "metadata", "d", "source")
            .build()
    }

    fn status(space: &Space, id: &str) -> ModuleStatus {
        space.find_module(id).unwrap().status
    }

    #[test]
    fn test_status_regresses() {
        use ModuleStatus::*;
        assert!(status_regresses(Done, Idle));
        assert!(status_regresses(Running, Idle));
        assert!(status_regresses(Warning, Idle));
        assert!(status_regresses(Done, Error));
        assert!(status_regresses(Running, FatalError));
        assert!(status_regresses(Idle, Error));
        assert!(status_regresses(Invalid, Error));

        assert!(!status_regresses(Error, FatalError));
        assert!(!status_regresses(FatalError, Error));
        assert!(!status_regresses(Error, Idle));
        assert!(!status_regresses(Invalid, Idle));
        assert!(!status_regresses(Idle, Running));
        assert!(!status_regresses(Running, Done));
        assert!(!status_regresses(Done, Done));
    }

    #[test]
    fn test_transitive_invalidation() {
        let mut space = chain();
        let result = invalidate_downstream(&mut space, "b");

        assert_eq!(result.invalidated, vec!["c", "d"]);
        assert!(result.deferred.is_empty());
        assert_eq!(status(&space, "a"), ModuleStatus::Done);
        assert_eq!(status(&space, "b"), ModuleStatus::Done);
        assert_eq!(status(&space, "c"), ModuleStatus::Invalid);
        assert_eq!(status(&space, "d"), ModuleStatus::Invalid);
    }

    #[test]
    fn test_invalidation_keeps_outputs() {
        let mut space = chain();
        invalidate_downstream(&mut space, "a");
        let d = space.find_module("d").unwrap();
        assert_eq!(d.outputs["metadata"], json!({ "from": "d" }));
    }

    #[test]
    fn test_running_descendant_is_deferred() {
        let mut space = chain();
        space.find_module_mut("c").unwrap().status = ModuleStatus::Running;

        let result = invalidate_downstream(&mut space, "a");

        assert_eq!(result.invalidated, vec!["b", "d"]);
        assert_eq!(result.deferred, vec!["c"]);
        assert_eq!(status(&space, "c"), ModuleStatus::Running);
        assert_eq!(status(&space, "d"), ModuleStatus::Invalid);
    }

    #[test]
    fn test_already_invalid_not_reported() {
        let mut space = chain();
        invalidate_downstream(&mut space, "b");
        let again = invalidate_downstream(&mut space, "a");
        assert_eq!(again.invalidated, vec!["b"]);
    }

    #[test]
    fn test_leaf_has_nothing_to_invalidate() {
        let mut space = chain();
        assert!(invalidate_downstream(&mut space, "d").is_empty());
    }
}
