//! Configuration options for an editing session.

use serde::{Deserialize, Serialize};

/// Compatibility level assumed when a model does not declare one.
pub const DEFAULT_COMPATIBILITY_LEVEL: u32 = 1200;

/// Minimum compatibility level for object level security, detail rows
/// expressions and the other 1400-era table properties.
pub const OBJECT_LEVEL_SECURITY_LEVEL: u32 = 1400;

/// Number of undo batches kept before the oldest is discarded.
pub const DEFAULT_UNDO_DEPTH: usize = 100;

/// Options controlling change propagation in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Rewrite dependent expressions when a referenced object is renamed.
    pub auto_fixup: bool,

    /// Consult the governance gate before creating objects.
    pub use_governance: bool,

    /// Capability level of the loaded model.
    pub compatibility_level: u32,

    /// Maximum number of undo batches retained.
    pub undo_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_fixup: true,
            use_governance: false,
            compatibility_level: DEFAULT_COMPATIBILITY_LEVEL,
            undo_depth: DEFAULT_UNDO_DEPTH,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_fixup(mut self, enable: bool) -> Self {
        self.auto_fixup = enable;
        self
    }

    pub fn with_governance(mut self, enable: bool) -> Self {
        self.use_governance = enable;
        self
    }

    pub fn with_compatibility_level(mut self, level: u32) -> Self {
        self.compatibility_level = level;
        self
    }

    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth.max(1);
        self
    }

    pub fn supports_object_level_security(&self) -> bool {
        self.compatibility_level >= OBJECT_LEVEL_SECURITY_LEVEL
    }
}
