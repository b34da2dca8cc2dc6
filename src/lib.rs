//! # Myth Shading
//!
//! GLSL shader plumbing for the Myth engine: include preprocessing, program
//! compilation, typed uniform access, and variant-based materials.
//!
//! ## Pipeline
//!
//! ```text
//! ShaderDefinition ──► VariantFactory ──► IncludePreprocessor ──► ShaderCompiler
//!                                                                      │
//!       Material ──► CompiledVariant ◄── UniformRegistry (name → location)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use myth_shading::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! let definition = ShaderDefinition::from_file("shaders/unlit.json")?;
//! let factory = Arc::new(VariantFactory::new(
//!     device,
//!     definition,
//!     Arc::new(EmbeddedLoader),
//!     &ShaderSettings::default(),
//! ));
//!
//! let mut material = Material::new(factory);
//! material.set_param("u_Color", Vec3::new(1.0, 0.0, 0.0));
//! material.activate();
//! ```

pub mod device;
pub mod errors;
pub mod material;
pub mod settings;
pub mod shader;
pub mod uniforms;
pub mod utils;
pub mod variant;

pub use device::{GraphicsDevice, HeadlessDevice, ProgramBinary, ProgramHandle, UniformHandle};
pub use errors::{CompileError, DefinitionError, Result, SchemaError, ShaderError};
pub use material::{Material, MaterialParam};
pub use settings::ShaderSettings;
pub use shader::{
    DirectoryLoader, EmbeddedLoader, IncludeLoader, IncludePreprocessor, MemoryLoader,
    ProgramBinaryCache, ShaderCompiler, ShaderStage, ShaderStages,
};
pub use uniforms::{TextureHandle, UniformData, UniformRegistry, UniformType, UniformValue};
pub use utils::interner;
pub use variant::{
    CompiledVariant, ShaderDefinition, StaticParameterSet, StaticValue, UniformCheck,
    VariantFactory,
};

/// Common imports.
pub mod prelude {
    pub use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

    pub use crate::device::{GraphicsDevice, HeadlessDevice};
    pub use crate::material::Material;
    pub use crate::settings::ShaderSettings;
    pub use crate::shader::{
        DirectoryLoader, EmbeddedLoader, IncludeLoader, MemoryLoader, ShaderStage,
    };
    pub use crate::uniforms::{TextureHandle, UniformDecl, UniformType, UniformValue};
    pub use crate::variant::{
        CompiledVariant, ShaderDefinition, StaticParameterSet, UniformCheck, VariantFactory,
    };
}
