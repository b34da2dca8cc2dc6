//! Shader Variants
//!
//! One [`ShaderDefinition`] compiles into many programs, one per assignment
//! of its static parameters.
//!
//! - [`static_params`]: parameter declarations and the cache-key set
//! - [`definition`]: the logical shader and its source generation
//! - [`compiled`]: one linked program with typed uniform access
//! - [`factory`]: compile-on-demand cache of variants

pub mod compiled;
pub mod definition;
pub mod factory;
pub mod static_params;

pub use compiled::{CompiledVariant, UniformCheck};
pub use definition::{
    FIRST_INCLUDE_INDEX, SHARED_SOURCE_INDEX, STAGE_SOURCE_INDEX, ShaderDefinition,
    ShaderDefinitionBuilder, ShaderDesc, StaticParamDesc, StructDesc, UniformDesc,
};
pub use factory::{ErrorCallback, VariantFactory};
pub use static_params::{StaticParamDecl, StaticParamKind, StaticParameterSet, StaticValue};
