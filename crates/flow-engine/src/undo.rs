//! Undo/redo history of a space
//!
//! Each structural edit (module added or deleted, connection added or
//! deleted, restore) is recorded as a compressed snapshot of the whole
//! space, tagged with a short description of the edit that produced it.
//! zstd keeps a deep history cheap: a space is mostly repetitive JSON
//! (port layouts, ids).

use std::collections::VecDeque;

use crate::error::{EngineError, Result};
use crate::space::Space;

/// One recorded structural state
struct Entry {
    /// Edit that produced this state, e.g. "add connection"
    edit: String,
    /// zstd-compressed JSON of the space
    snapshot: Vec<u8>,
}

/// Bounded history of structural edits
pub struct UndoStack {
    entries: VecDeque<Entry>,
    /// Index of the entry matching the live space
    current: usize,
    max_entries: usize,
    level: i32,
}

impl UndoStack {
    /// Create a history keeping at most `max_entries` states, compressed
    /// at zstd `level`
    pub fn with_level(max_entries: usize, level: i32) -> Self {
        Self {
            entries: VecDeque::new(),
            current: 0,
            max_entries: max_entries.max(1),
            level,
        }
    }

    /// Record the state produced by `edit`
    ///
    /// Drops any redo history. A state identical to the current one is
    /// not recorded; returns whether an entry was added.
    pub fn record(&mut self, space: &Space, edit: impl Into<String>) -> Result<bool> {
        let json = serde_json::to_vec(space)?;
        let snapshot = zstd::encode_all(&json[..], self.level)
            .map_err(|e| EngineError::Compression(e.to_string()))?;

        if self.entries.get(self.current).is_some_and(|e| e.snapshot == snapshot) {
            return Ok(false);
        }

        self.entries.truncate(self.current + 1);
        self.entries.push_back(Entry {
            edit: edit.into(),
            snapshot,
        });
        self.current = self.entries.len() - 1;

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
            self.current = self.current.saturating_sub(1);
        }
        Ok(true)
    }

    /// Step back one edit, returning the state before it
    pub fn undo(&mut self) -> Option<Result<Space>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.decompress(self.current))
    }

    /// Re-apply the next undone edit, returning the state after it
    pub fn redo(&mut self) -> Option<Result<Space>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.decompress(self.current))
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.entries.len()
    }

    /// Description of the edit `undo` would revert
    pub fn undo_edit(&self) -> Option<&str> {
        self.can_undo().then(|| self.entries[self.current].edit.as_str())
    }

    /// Description of the edit `redo` would re-apply
    pub fn redo_edit(&self) -> Option<&str> {
        self.can_redo().then(|| self.entries[self.current + 1].edit.as_str())
    }

    fn decompress(&self, index: usize) -> Result<Space> {
        let json = zstd::decode_all(&self.entries[index].snapshot[..])
            .map_err(|e| EngineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModuleKind;
    use crate::types::Module;

    fn space_with(ids: &[&str]) -> Space {
        let mut space = Space::new("s", "History");
        for id in ids {
            space
                .modules
                .push(Module::new(*id, ModuleKind::ProjectAnalyzer, (0.0, 0.0)));
        }
        space
    }

    fn ids(space: &Space) -> Vec<String> {
        space.modules.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_undo_walks_back_through_edits() {
        let mut stack = UndoStack::with_level(10, 3);
        stack.record(&space_with(&[]), "initial").unwrap();
        stack.record(&space_with(&["a"]), "add module").unwrap();
        stack.record(&space_with(&["a", "b"]), "add module").unwrap();

        assert_eq!(ids(&stack.undo().unwrap().unwrap()), vec!["a"]);
        assert_eq!(ids(&stack.undo().unwrap().unwrap()), Vec::<String>::new());
        assert!(stack.undo().is_none());
        assert_eq!(ids(&stack.redo().unwrap().unwrap()), vec!["a"]);
    }

    #[test]
    fn test_new_edit_drops_redo_history() {
        let mut stack = UndoStack::with_level(10, 3);
        stack.record(&space_with(&[]), "initial").unwrap();
        stack.record(&space_with(&["a"]), "add module").unwrap();
        stack.undo();

        stack.record(&space_with(&["b"]), "add module").unwrap();
        assert!(!stack.can_redo());
        assert_eq!(ids(&stack.undo().unwrap().unwrap()), Vec::<String>::new());
        assert_eq!(ids(&stack.redo().unwrap().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_unchanged_state_not_recorded() {
        let mut stack = UndoStack::with_level(10, 3);
        assert!(stack.record(&space_with(&["a"]), "initial").unwrap());
        assert!(!stack.record(&space_with(&["a"]), "restore").unwrap());
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_oldest_states_evicted() {
        let mut stack = UndoStack::with_level(3, 1);
        let all = ["a", "b", "c", "d", "e"];
        for n in 0..all.len() {
            stack.record(&space_with(&all[..=n]), "add module").unwrap();
        }

        assert_eq!(ids(&stack.undo().unwrap().unwrap()).len(), 4);
        assert_eq!(ids(&stack.undo().unwrap().unwrap()).len(), 3);
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_edit_descriptions() {
        let mut stack = UndoStack::with_level(10, 3);
        stack.record(&space_with(&[]), "initial").unwrap();
        stack.record(&space_with(&["a"]), "add module 'a'").unwrap();
        assert_eq!(stack.undo_edit(), Some("add module 'a'"));
        assert_eq!(stack.redo_edit(), None);

        stack.undo();
        assert_eq!(stack.undo_edit(), None);
        assert_eq!(stack.redo_edit(), Some("add module 'a'"));
    }
}
