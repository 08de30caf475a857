//! file: core/src/config.rs
//! description: compiler configuration.
//!
//! `CompileConfig` controls IR dumping, optimization and inlining limits.
//! It can be built in code, read from a JSON file, and overlaid with
//! `TILANG_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Level, TilangErrorExt};
use crate::ir::value::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Print each kernel's AST before lowering.
    pub print_preprocessed_ir: bool,
    /// Print each kernel's IR after lowering.
    pub print_ir: bool,
    /// Run the constant-folding pass on lowered IR.
    pub optimize: bool,
    /// Maximum nesting of inline function calls before lowering gives up.
    pub max_inline_depth: usize,
    /// Type of integer literals once they become runtime values.
    pub default_int: DataType,
    /// Type of float literals and of integer true-division results.
    pub default_float: DataType,
    /// Log every executed IR op at `trace` level.
    pub trace_execution: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            print_preprocessed_ir: false,
            print_ir: false,
            optimize: true,
            max_inline_depth: 64,
            default_int: DataType::I32,
            default_float: DataType::F32,
            trace_execution: false,
        }
    }
}

impl CompileConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, Box<dyn TilangErrorExt>> {
        let config: CompileConfig = serde_json::from_str(raw).map_err(|e| ConfigError {
            message: format!("parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn TilangErrorExt>> {
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError {
            message: format!("read config {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `TILANG_PRINT_IR`, `TILANG_OPTIMIZE` and `TILANG_MAX_INLINE_DEPTH`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TILANG_PRINT_IR") {
            self.print_ir = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("TILANG_OPTIMIZE") {
            self.optimize = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("TILANG_MAX_INLINE_DEPTH") {
            match v.parse::<usize>() {
                Ok(depth) if depth > 0 => self.max_inline_depth = depth,
                _ => log::warn!("ignoring invalid TILANG_MAX_INLINE_DEPTH={:?}", v),
            }
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_int.is_int() {
            return Err(ConfigError {
                message: format!("default_int must be an integer type, got {}", self.default_int),
            });
        }
        if !self.default_float.is_float() {
            return Err(ConfigError {
                message: format!("default_float must be a float type, got {}", self.default_float),
            });
        }
        if self.max_inline_depth == 0 {
            return Err(ConfigError {
                message: "max_inline_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl TilangErrorExt for ConfigError {
    fn level(&self) -> Level {
        Level::Error
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn issuer(&self) -> String {
        "tilang.config".to_string()
    }

    fn span(&self) -> Option<crate::location::Span> {
        None
    }

    fn location(&self) -> Option<crate::location::Location> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CompileConfig::from_json_str(r#"{ "print_ir": true, "max_inline_depth": 8 }"#)
            .expect("config should parse");
        assert!(config.print_ir);
        assert_eq!(config.max_inline_depth, 8);
        assert_eq!(config.default_int, DataType::I32);
        assert!(config.optimize);
    }

    #[test]
    fn rejects_float_default_int() {
        let err = CompileConfig::from_json_str(r#"{ "default_int": "f32" }"#).unwrap_err();
        assert!(err.message().contains("default_int"));
    }
}
