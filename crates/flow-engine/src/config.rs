//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default number of undo snapshots kept per store
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Default zstd level for undo snapshots
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Tunables for a `GraphStore`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Undo snapshots to keep; 0 disables undo/redo
    pub history_depth: usize,
    /// zstd level for undo snapshots
    pub compression_level: i32,
    /// Prefix for generated module and connection ids
    pub id_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            id_prefix: String::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Configuration with undo/redo disabled
    pub fn without_history() -> Self {
        Self {
            history_depth: 0,
            ..Self::default()
        }
    }

    pub fn history_enabled(&self) -> bool {
        self.history_depth > 0
    }

    /// Generate a fresh id of the given kind, e.g. `module-<uuid>`
    pub fn new_id(&self, kind: &str) -> String {
        format!("{}{}-{}", self.id_prefix, kind, uuid::Uuid::new_v4())
    }
}
