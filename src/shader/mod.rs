//! Shader Source Pipeline
//!
//! Source text → [`IncludePreprocessor`] → [`ShaderCompiler`] → program object.
//!
//! - [`stage`]: stage kinds and per-stage source buffers
//! - [`preprocessor`]: `#pragma include` resolution with `#line` mapping
//! - [`loader`]: include file providers
//! - [`compiler`]: compile/link jobs with binary fast path
//! - [`binary_cache`]: persisted program binaries

pub mod binary_cache;
pub mod compiler;
pub mod loader;
pub mod preprocessor;
pub mod stage;

pub use binary_cache::ProgramBinaryCache;
pub use compiler::{CompileScratch, CompiledProgram, ScratchGuard, ScratchPool, ShaderCompiler};
pub use loader::{DirectoryLoader, EmbeddedLoader, IncludeLoader, MemoryLoader};
pub use preprocessor::{IncludeFrame, IncludePreprocessor, IncludeRecord, PreprocessReport};
pub use stage::{ShaderStage, ShaderStages};
