//! Engine configuration

use memory_manager::HeapConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors from parsing an [`EngineConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has mistyped fields.
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the engine cannot run with.
    #[error("invalid engine configuration: {field} {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Tuning for one engine instance
///
/// # Example
///
/// ```
/// use interpreter::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "max_call_depth": 64, "heap": { "gc_enabled": false } }"#).unwrap();
/// assert_eq!(config.max_call_depth, 64);
/// assert!(!config.heap.gc_enabled);
/// assert_eq!(config.inline_context_budget, EngineConfig::default().inline_context_budget);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Managed heap settings
    pub heap: HeapConfig,
    /// Deepest script call nesting before a RangeError
    pub max_call_depth: usize,
    /// Largest locals + arguments count for a call context kept off the heap
    pub inline_context_budget: usize,
    /// Call the debugger hooks when one is attached
    pub debug_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            heap: HeapConfig::default(),
            max_call_depth: 256,
            inline_context_budget: 32,
            debug_mode: false,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_call_depth",
                reason: "must be at least 1",
            });
        }
        if self.heap.initial_chunk_bytes == 0 || self.heap.max_chunk_bytes < self.heap.initial_chunk_bytes {
            return Err(ConfigError::Invalid {
                field: "heap",
                reason: "chunk sizes must be non-zero and max >= initial",
            });
        }
        Ok(())
    }
}
