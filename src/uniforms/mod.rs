//! Uniform Schema & Values
//!
//! - [`types`]: uniform types, the closed [`UniformValue`] sum and its storage
//! - [`registry`]: declared uniform schema and per-program location tables

pub mod registry;
pub mod types;

pub use registry::{
    StructDecl, UniformDecl, UniformKind, UniformLeaf, UniformRegistry, UniformRegistryBuilder,
    UniformSlot, UniformTable,
};
pub use types::{StoredValue, TextureHandle, UniformData, UniformType, UniformValue};
