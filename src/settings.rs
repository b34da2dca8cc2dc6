//! Shading Settings
//!
//! Configuration shared by the preprocessor, the compiler and the variant
//! factory.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_shading::ShaderSettings;
//!
//! // Defaults: GLSL 330 core, 100 includes, binaries enabled
//! let settings = ShaderSettings::default();
//!
//! // From a JSON file; missing fields fall back to their defaults
//! let settings = ShaderSettings::from_file("shading.json")?;
//!
//! let settings = ShaderSettings {
//!     glsl_version: "450".into(),
//!     extensions: vec!["GL_ARB_shading_language_420pack".into()],
//!     ..Default::default()
//! };
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Default cap on `#pragma include` expansions per top-level source.
pub const DEFAULT_MAX_INCLUDES: usize = 100;

/// Global shading configuration.
///
/// | Field | Consumer | Default |
/// |-------|----------|---------|
/// | `max_includes` | [`IncludePreprocessor`](crate::shader::IncludePreprocessor) | 100 |
/// | `glsl_version` | [`ShaderCompiler`](crate::shader::ShaderCompiler) preamble | `"330 core"` |
/// | `extensions` | [`ShaderCompiler`](crate::shader::ShaderCompiler) preamble | none |
/// | `use_program_binaries` | [`VariantFactory`](crate::variant::VariantFactory) | `true` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    /// Maximum number of include expansions per top-level source. Guarantees
    /// termination when include files form a cycle.
    pub max_includes: usize,

    /// Version string placed after `#version` in the stage preamble.
    pub glsl_version: String,

    /// Extensions enabled in the stage preamble (`#extension NAME : enable`).
    pub extensions: Vec<String>,

    /// Whether compiled variants try (and refresh) cached program binaries.
    pub use_program_binaries: bool,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            max_includes: DEFAULT_MAX_INCLUDES,
            glsl_version: "330 core".to_string(),
            extensions: Vec::new(),
            use_program_binaries: true,
        }
    }
}

impl ShaderSettings {
    /// Parses settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
