//! Engine configuration.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Tunables shared by the compiler and the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of script calls before a `RangeError`
    pub max_call_depth: usize,
    /// Native stack a single run may consume before calls fail with a `RangeError`
    pub max_native_stack_bytes: usize,
    /// Let calls whose arguments already sit in consecutive registers skip the copy
    pub direct_register_fast_path: bool,
    /// Install the `Proxy` global
    pub enable_proxy: bool,
    /// Upper bound on prototype-chain walks (guards against cycles through proxies)
    pub max_prototype_chain_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_native_stack_bytes: 1 << 20,
            direct_register_fast_path: true,
            enable_proxy: true,
            max_prototype_chain_depth: 10_000,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::InternalError(format!("invalid engine config: {}", e)))
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InternalError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// The process-wide default, read once from `KESTREL_CONFIG` if that points at a file.
    pub fn process_default() -> &'static EngineConfig {
        static DEFAULT: OnceLock<EngineConfig> = OnceLock::new();
        DEFAULT.get_or_init(|| match std::env::var_os("KESTREL_CONFIG") {
            Some(path) => match Self::load(Path::new(&path)) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(%err, "ignoring KESTREL_CONFIG");
                    Self::default()
                }
            },
            None => Self::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, 256);
        assert_eq!(config.max_native_stack_bytes, 1 << 20);
        assert!(config.direct_register_fast_path);
        assert!(config.enable_proxy);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_call_depth": 16 }"#).unwrap();
        assert_eq!(config.max_call_depth, 16);
        assert!(config.enable_proxy);
        assert_eq!(config.max_prototype_chain_depth, 10_000);
    }

    #[test]
    fn test_invalid_json() {
        let err = EngineConfig::from_json("{ nope").unwrap_err();
        assert!(err.to_string().starts_with("InternalError: invalid engine config"));
    }
}
