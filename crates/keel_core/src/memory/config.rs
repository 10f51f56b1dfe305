//! # Memory Configuration
//!
//! Loaded once at startup, either built in code or parsed from TOML:
//!
//! ```toml
//! mode = "tracked"
//! report_leaks_on_shutdown = true
//! log_allocations = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// How the manager treats each allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Record size, alignment, file and line of every live allocation.
    Tracked,
    /// Forward straight to the system allocator. No bookkeeping.
    Passthrough,
}

/// Configuration for a [`MemoryManager`](crate::MemoryManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Tracking mode.
    pub mode: TrackingMode,
    /// Log every outstanding allocation when the manager shuts down.
    pub report_leaks_on_shutdown: bool,
    /// Emit a trace event per tracked allocation and free.
    pub log_allocations: bool,
}

impl MemoryConfig {
    /// Debug builds: everything tracked, leaks reported.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            mode: TrackingMode::Tracked,
            report_leaks_on_shutdown: true,
            log_allocations: false,
        }
    }

    /// Release builds: straight to the system allocator.
    #[must_use]
    pub const fn release() -> Self {
        Self {
            mode: TrackingMode::Passthrough,
            report_leaks_on_shutdown: false,
            log_allocations: false,
        }
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the text is not valid TOML
    /// or a key has the wrong type.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        toml::from_str(text).map_err(|err| MemoryError::InvalidConfig(err.to_string()))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::debug()
        } else {
            Self::release()
        }
    }
}
