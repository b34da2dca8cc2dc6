//! Error Types
//!
//! This module defines the error types used throughout the shading pipeline.
//!
//! # Overview
//!
//! The main error type [`ShaderError`] covers every recoverable failure mode:
//! - Stage compilation and program link failures ([`CompileError`])
//! - Malformed uniform schemas ([`SchemaError`])
//! - Invalid shader definitions and static parameters ([`DefinitionError`])
//! - Configuration and binary cache I/O
//!
//! Include directive problems are *not* errors at this level: the
//! preprocessor substitutes a `#error` line and the device compiler reports
//! it through the normal stage log.
//!
//! Programming errors (requesting a uniform with the wrong type, writing an
//! undeclared material parameter) panic instead of returning an error.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, ShaderError>`.
//!
//! ```rust,ignore
//! use myth_shading::errors::{ShaderError, Result};
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::shader::ShaderStage;

/// The main error type for the shading pipeline.
#[derive(Error, Debug)]
pub enum ShaderError {
    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// A stage failed to compile or the program failed to link.
    #[error(transparent)]
    Compile(#[from] CompileError),

    // ========================================================================
    // Schema & Definition Errors
    // ========================================================================
    /// The uniform schema is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The shader definition or a static parameter set is invalid.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parse error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Failure of a [`ShaderCompiler`](crate::shader::ShaderCompiler) job.
///
/// Every variant carries the driver log verbatim. No GPU object survives a
/// failed job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A single stage failed to compile.
    #[error("{stage} shader compilation failed:\n{log}")]
    Stage {
        /// The failing stage.
        stage: ShaderStage,
        /// Compiler log text.
        log: String,
    },

    /// All stages compiled but the program failed to link.
    #[error("program link failed:\n{log}")]
    Link {
        /// Linker log text.
        log: String,
    },

    /// Every stage source was empty.
    #[error("no shader stage has any source")]
    NoStages,
}

/// A malformed uniform schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A uniform or field refers to a struct that was never declared.
    #[error("uniform `{uniform}` refers to undeclared struct `{struct_name}`")]
    UnknownStruct {
        /// Uniform or field path.
        uniform: String,
        /// The missing struct type.
        struct_name: String,
    },

    /// A struct contains itself, directly or through other structs.
    #[error("struct `{struct_name}` recursively contains itself (via `{path}`)")]
    RecursiveStruct {
        /// The struct entered twice.
        struct_name: String,
        /// Field path where the cycle closed.
        path: String,
    },

    /// The same uniform, struct, or field name was declared twice.
    #[error("`{0}` is declared more than once")]
    Duplicate(String),

    /// An array was declared with zero elements.
    #[error("`{0}` is declared as an empty array")]
    EmptyArray(String),
}

/// An invalid shader definition or static parameter assignment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Two static parameters share a name.
    #[error("static parameter `{0}` is declared more than once")]
    DuplicateStaticParam(String),

    /// A static parameter's default is outside its domain.
    #[error("static parameter `{name}` has an invalid default `{value}`")]
    InvalidDefault {
        /// Parameter name.
        name: String,
        /// Offending default.
        value: String,
    },

    /// An assignment names a parameter the definition does not declare.
    #[error("shader `{shader}` has no static parameter `{name}`")]
    UnknownStaticParam {
        /// Definition name.
        shader: String,
        /// Unknown parameter.
        name: String,
    },

    /// An assignment is outside the parameter's domain.
    #[error("`{value}` is not a valid value for static parameter `{name}`")]
    InvalidStaticValue {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// The definition has no stage code at all.
    #[error("shader `{0}` defines no stage code")]
    NoStageCode(String),
}

/// Alias for `Result<T, ShaderError>`.
pub type Result<T> = std::result::Result<T, ShaderError>;
