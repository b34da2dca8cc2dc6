//! Uniform Registry
//!
//! The typed schema of a shader's uniforms: primitive uniforms, struct
//! uniforms, and arrays of either. The registry is the single source of
//! truth for what a shader declares:
//!
//! - [`UniformRegistry::emit_glsl`] writes the GLSL declarations
//! - [`UniformRegistry::visit_all`] enumerates atomic (leaf) uniforms
//! - [`UniformRegistry::resolve`] maps every leaf to a location in a linked
//!   program, producing a [`UniformTable`]
//!
//! # Leaf naming
//!
//! | Declaration | Leaves |
//! |-------------|--------|
//! | `uniform vec3 u_Color;` | `u_Color` |
//! | `uniform float u_W[4];` | `u_W` (array of 4), or `u_W[0]`..`u_W[3]` |
//! | `uniform Light u_Sun;` | `u_Sun.color`, `u_Sun.power` |
//! | `uniform Light u_Lights[2];` | `u_Lights[0].color`, ..., `u_Lights[1].power` |
//!
//! A leaf whose location query fails is *optimized out*: declared, but
//! discarded by the driver. That is different from not being declared at
//! all, and the distinction is kept all the way to
//! [`CompiledVariant`](crate::variant::CompiledVariant).

use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::types::UniformType;
use crate::device::{GraphicsDevice, ProgramHandle, UniformHandle};
use crate::errors::SchemaError;

// ─── Declarations ─────────────────────────────────────────────────────────────

/// Type of a declared uniform or struct field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Primitive(UniformType),
    Struct(String),
}

impl UniformKind {
    #[must_use]
    pub fn glsl_name(&self) -> &str {
        match self {
            Self::Primitive(ty) => ty.glsl_name(),
            Self::Struct(name) => name,
        }
    }
}

/// A uniform or struct field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
    pub array_len: Option<u32>,
}

impl UniformDecl {
    #[must_use]
    pub fn primitive(name: impl Into<String>, ty: UniformType) -> Self {
        Self {
            name: name.into(),
            kind: UniformKind::Primitive(ty),
            array_len: None,
        }
    }

    #[must_use]
    pub fn structure(name: impl Into<String>, struct_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: UniformKind::Struct(struct_name.into()),
            array_len: None,
        }
    }

    /// Makes this declaration an array of `len` elements.
    #[must_use]
    pub fn array(mut self, len: u32) -> Self {
        self.array_len = Some(len);
        self
    }

    fn write_glsl(&self, out: &mut String) {
        let _ = write!(out, "{} {}", self.kind.glsl_name(), self.name);
        if let Some(len) = self.array_len {
            let _ = write!(out, "[{len}]");
        }
    }
}

/// A named struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<UniformDecl>,
}

impl StructDecl {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = UniformDecl>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().collect(),
        }
    }
}

// ─── UniformRegistry ──────────────────────────────────────────────────────────

/// One atomic uniform produced by expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLeaf {
    pub name: String,
    pub ty: UniformType,
    /// Element count of a primitive array leaf.
    pub array_len: Option<u32>,
}

/// Validated uniform schema. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct UniformRegistry {
    structs: Vec<StructDecl>,
    struct_index: FxHashMap<String, usize>,
    uniforms: Vec<UniformDecl>,
    leaves: Vec<UniformLeaf>,
}

impl UniformRegistry {
    #[must_use]
    pub fn builder() -> UniformRegistryBuilder {
        UniformRegistryBuilder::default()
    }

    /// Validates and indexes a schema.
    ///
    /// Rejects duplicate names, empty arrays, references to undeclared
    /// structs, and structs that contain themselves.
    pub fn new(structs: Vec<StructDecl>, uniforms: Vec<UniformDecl>) -> Result<Self, SchemaError> {
        let mut struct_index = FxHashMap::default();
        for (index, decl) in structs.iter().enumerate() {
            if struct_index.insert(decl.name.clone(), index).is_some() {
                return Err(SchemaError::Duplicate(decl.name.clone()));
            }
            let mut fields = FxHashSet::default();
            for field in &decl.fields {
                if !fields.insert(field.name.as_str()) {
                    return Err(SchemaError::Duplicate(format!("{}.{}", decl.name, field.name)));
                }
            }
        }

        let mut names = FxHashSet::default();
        for decl in &uniforms {
            if !names.insert(decl.name.as_str()) {
                return Err(SchemaError::Duplicate(decl.name.clone()));
            }
        }

        let mut registry = Self {
            structs,
            struct_index,
            uniforms,
            leaves: Vec::new(),
        };

        // Structs no uniform uses are still emitted, so they must be sound too.
        for decl in &registry.structs {
            let probe = UniformDecl::structure(&decl.name, &decl.name);
            registry.visit_decl(&probe, false, &mut |_| {})?;
        }

        let mut leaves = Vec::new();
        registry.visit_all(false, |leaf| leaves.push(leaf.clone()))?;
        registry.leaves = leaves;
        Ok(registry)
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }

    #[inline]
    #[must_use]
    pub fn structs(&self) -> &[StructDecl] {
        &self.structs
    }

    #[must_use]
    pub fn struct_decl(&self, name: &str) -> Option<&StructDecl> {
        self.struct_index.get(name).map(|&i| &self.structs[i])
    }

    /// Atomic uniforms with primitive arrays collapsed, in declaration order.
    #[inline]
    #[must_use]
    pub fn leaves(&self) -> &[UniformLeaf] {
        &self.leaves
    }

    /// Visits every atomic uniform.
    ///
    /// Struct arrays always expand per element. Primitive arrays expand per
    /// element only when `include_array_elements` is set; otherwise they are
    /// visited once with their length.
    pub fn visit_all<F>(&self, include_array_elements: bool, mut f: F) -> Result<(), SchemaError>
    where
        F: FnMut(&UniformLeaf),
    {
        for decl in &self.uniforms {
            self.visit_decl(decl, include_array_elements, &mut f)?;
        }
        Ok(())
    }

    fn visit_decl(
        &self,
        decl: &UniformDecl,
        include_array_elements: bool,
        f: &mut dyn FnMut(&UniformLeaf),
    ) -> Result<(), SchemaError> {
        let mut leaf = UniformLeaf {
            name: String::new(),
            ty: UniformType::Float,
            array_len: None,
        };
        let mut expanding = SmallVec::<[&str; 8]>::new();
        self.expand(decl, &mut leaf, include_array_elements, &mut expanding, f)
    }

    /// Expands `decl` below the prefix held in `leaf.name`. `expanding` holds
    /// the struct types currently being expanded.
    fn expand<'s>(
        &'s self,
        decl: &UniformDecl,
        leaf: &mut UniformLeaf,
        include_array_elements: bool,
        expanding: &mut SmallVec<[&'s str; 8]>,
        f: &mut dyn FnMut(&UniformLeaf),
    ) -> Result<(), SchemaError> {
        if decl.array_len == Some(0) {
            return Err(SchemaError::EmptyArray(join(&leaf.name, &decl.name)));
        }

        let prefix_len = leaf.name.len();
        if prefix_len > 0 {
            leaf.name.push('.');
        }
        leaf.name.push_str(&decl.name);

        let result = match &decl.kind {
            UniformKind::Primitive(ty) => {
                leaf.ty = *ty;
                match decl.array_len {
                    Some(len) if include_array_elements => {
                        let base_len = leaf.name.len();
                        leaf.array_len = None;
                        for index in 0..len {
                            let _ = write!(leaf.name, "[{index}]");
                            f(leaf);
                            leaf.name.truncate(base_len);
                        }
                    }
                    array_len => {
                        leaf.array_len = array_len;
                        f(leaf);
                        leaf.array_len = None;
                    }
                }
                Ok(())
            }
            UniformKind::Struct(struct_name) => {
                self.expand_struct(struct_name, decl, leaf, include_array_elements, expanding, f)
            }
        };

        leaf.name.truncate(prefix_len);
        result
    }

    fn expand_struct<'s>(
        &'s self,
        struct_name: &str,
        decl: &UniformDecl,
        leaf: &mut UniformLeaf,
        include_array_elements: bool,
        expanding: &mut SmallVec<[&'s str; 8]>,
        f: &mut dyn FnMut(&UniformLeaf),
    ) -> Result<(), SchemaError> {
        let Some(def) = self.struct_decl(struct_name) else {
            return Err(SchemaError::UnknownStruct {
                uniform: leaf.name.clone(),
                struct_name: struct_name.to_string(),
            });
        };
        if expanding.contains(&def.name.as_str()) {
            return Err(SchemaError::RecursiveStruct {
                struct_name: def.name.clone(),
                path: leaf.name.clone(),
            });
        }

        expanding.push(&def.name);
        let base_len = leaf.name.len();
        let elements = decl.array_len.unwrap_or(1);
        for index in 0..elements {
            if decl.array_len.is_some() {
                let _ = write!(leaf.name, "[{index}]");
            }
            for field in &def.fields {
                self.expand(field, leaf, include_array_elements, expanding, f)?;
            }
            leaf.name.truncate(base_len);
        }
        expanding.pop();
        Ok(())
    }

    /// Writes struct definitions (dependencies first) followed by the
    /// uniform declarations.
    pub fn emit_glsl(&self, out: &mut String) {
        let mut emitted = FxHashSet::default();
        for decl in &self.structs {
            self.emit_struct(decl, out, &mut emitted);
        }
        for decl in &self.uniforms {
            out.push_str("uniform ");
            decl.write_glsl(out);
            out.push_str(";\n");
        }
    }

    fn emit_struct<'s>(
        &'s self,
        decl: &'s StructDecl,
        out: &mut String,
        emitted: &mut FxHashSet<&'s str>,
    ) {
        if !emitted.insert(&decl.name) {
            return;
        }
        for field in &decl.fields {
            if let UniformKind::Struct(name) = &field.kind
                && let Some(dependency) = self.struct_decl(name)
            {
                self.emit_struct(dependency, out, emitted);
            }
        }

        let _ = writeln!(out, "struct {} {{", decl.name);
        for field in &decl.fields {
            out.push_str("    ");
            field.write_glsl(out);
            out.push_str(";\n");
        }
        out.push_str("};\n");
    }

    /// Resolves every leaf against a linked program.
    #[must_use]
    pub fn resolve(&self, device: &dyn GraphicsDevice, program: ProgramHandle) -> UniformTable {
        let mut table = UniformTable::default();
        for leaf in &self.leaves {
            let handle = device.uniform_location(program, &leaf.name).or_else(|| {
                leaf.array_len
                    .and_then(|_| device.uniform_location(program, &format!("{}[0]", leaf.name)))
            });
            table.insert(
                leaf.name.clone(),
                UniformSlot {
                    ty: leaf.ty,
                    array_len: leaf.array_len,
                    handle,
                },
            );
        }
        table
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Incremental construction of a [`UniformRegistry`].
#[derive(Debug, Clone, Default)]
pub struct UniformRegistryBuilder {
    structs: Vec<StructDecl>,
    uniforms: Vec<UniformDecl>,
}

impl UniformRegistryBuilder {
    #[must_use]
    pub fn struct_decl(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = UniformDecl>,
    ) -> Self {
        self.structs.push(StructDecl::new(name, fields));
        self
    }

    #[must_use]
    pub fn uniform(mut self, decl: UniformDecl) -> Self {
        self.uniforms.push(decl);
        self
    }

    pub fn build(self) -> Result<UniformRegistry, SchemaError> {
        UniformRegistry::new(self.structs, self.uniforms)
    }
}

// ─── UniformTable ─────────────────────────────────────────────────────────────

/// A resolved leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub ty: UniformType,
    /// Element count for primitive arrays.
    pub array_len: Option<u32>,
    /// Location of the leaf (of element 0 for arrays); `None` when the driver
    /// optimized it out.
    pub handle: Option<UniformHandle>,
}

impl UniformSlot {
    /// Number of consecutive locations the leaf occupies.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.array_len.unwrap_or(1)
    }

    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.array_len.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

/// Leaf name → resolved slot for one linked program. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    slots: FxHashMap<String, UniformSlot>,
}

impl UniformTable {
    fn insert(&mut self, name: String, slot: UniformSlot) {
        self.slots.insert(name, slot);
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UniformSlot> {
        self.slots.get(name)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of leaves with a real location.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_active()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformSlot)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_registry() -> UniformRegistry {
        UniformRegistry::builder()
            .struct_decl(
                "Light",
                [
                    UniformDecl::primitive("color", UniformType::Vec3),
                    UniformDecl::primitive("power", UniformType::Float),
                ],
            )
            .uniform(UniformDecl::primitive("u_Weights", UniformType::Float).array(3))
            .uniform(UniformDecl::structure("u_Lights", "Light").array(2))
            .build()
            .unwrap()
    }

    #[test]
    fn visit_collapses_primitive_arrays_only_on_request() {
        let registry = light_registry();

        let mut collapsed = Vec::new();
        registry
            .visit_all(false, |leaf| collapsed.push((leaf.name.clone(), leaf.array_len)))
            .unwrap();
        assert_eq!(
            collapsed,
            [
                ("u_Weights".to_string(), Some(3)),
                ("u_Lights[0].color".to_string(), None),
                ("u_Lights[0].power".to_string(), None),
                ("u_Lights[1].color".to_string(), None),
                ("u_Lights[1].power".to_string(), None),
            ]
        );

        let mut expanded = Vec::new();
        registry
            .visit_all(true, |leaf| expanded.push(leaf.name.clone()))
            .unwrap();
        assert_eq!(&expanded[..3], ["u_Weights[0]", "u_Weights[1]", "u_Weights[2]"]);
        assert_eq!(expanded.len(), 7);
    }

    #[test]
    fn recursive_structs_are_rejected() {
        let err = UniformRegistry::builder()
            .struct_decl("A", [UniformDecl::structure("b", "B")])
            .struct_decl("B", [UniformDecl::structure("a", "A")])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::RecursiveStruct { .. }), "{err}");
    }

    #[test]
    fn unknown_struct_is_rejected() {
        let err = UniformRegistry::builder()
            .uniform(UniformDecl::structure("u_X", "Missing"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownStruct {
                uniform: "u_X".into(),
                struct_name: "Missing".into()
            }
        );
    }

    #[test]
    fn duplicates_and_empty_arrays_are_rejected() {
        let dup = UniformRegistry::builder()
            .uniform(UniformDecl::primitive("u_A", UniformType::Float))
            .uniform(UniformDecl::primitive("u_A", UniformType::Vec2))
            .build();
        assert_eq!(dup.unwrap_err(), SchemaError::Duplicate("u_A".into()));

        let empty = UniformRegistry::builder()
            .uniform(UniformDecl::primitive("u_A", UniformType::Float).array(0))
            .build();
        assert_eq!(empty.unwrap_err(), SchemaError::EmptyArray("u_A".into()));
    }

    #[test]
    fn emitted_structs_precede_their_users() {
        let registry = UniformRegistry::builder()
            .struct_decl("Outer", [UniformDecl::structure("inner", "Inner")])
            .struct_decl("Inner", [UniformDecl::primitive("v", UniformType::Vec4)])
            .uniform(UniformDecl::structure("u_O", "Outer"))
            .build()
            .unwrap();

        let mut glsl = String::new();
        registry.emit_glsl(&mut glsl);
        assert_eq!(
            glsl,
            "struct Inner {\n    vec4 v;\n};\n\
             struct Outer {\n    Inner inner;\n};\n\
             uniform Outer u_O;\n"
        );
    }
}
