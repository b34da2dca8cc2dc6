//! Shader Definitions
//!
//! A [`ShaderDefinition`] is one logical shader: its static parameters, its
//! uniform schema, code shared by every stage, and per-stage code. Variants
//! are generated from it by substituting a [`StaticParameterSet`].
//!
//! # Generated source layout
//!
//! ```text
//! #define FRAGMENT_SHADER 1        ← stage marker
//! #define SHADOW_OFF 0             ← static parameters
//! ...
//! struct Light { ... };            ← uniform schema
//! uniform Light u_Lights[4];
//! #line 1 1                        ← shared code, source-string 1
//! ...
//! #line 1 2                        ← stage code, source-string 2
//! ...
//! ```
//!
//! Included files are numbered from [`FIRST_INCLUDE_INDEX`] on, so every
//! line of a compiler log maps back to its origin.
//!
//! # JSON
//!
//! ```json
//! {
//!   "name": "unlit",
//!   "static_params": [
//!     { "kind": "enum", "name": "SHADOW", "options": ["OFF", "PCF"], "default": "OFF" },
//!     { "kind": "int", "name": "LIGHT_COUNT", "min": 0, "max": 4, "default": 1 }
//!   ],
//!   "structs": [{ "name": "Light", "fields": [{ "name": "color", "type": "vec3" }] }],
//!   "uniforms": [{ "name": "u_Lights", "type": "Light", "array": 4 }],
//!   "shared": "...",
//!   "vertex": "...",
//!   "fragment": "..."
//! }
//! ```

use std::fmt::Write as _;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use super::static_params::{StaticParamDecl, StaticParamKind, StaticParameterSet, StaticValue};
use crate::errors::{DefinitionError, Result};
use crate::shader::{ShaderStage, ShaderStages};
use crate::uniforms::{StructDecl, UniformDecl, UniformRegistry, UniformType};
use crate::utils::interner;

/// Source-string index of the shared code.
pub const SHARED_SOURCE_INDEX: u32 = 1;
/// Source-string index of the stage code.
pub const STAGE_SOURCE_INDEX: u32 = 2;
/// Source-string index of the first included file.
pub const FIRST_INCLUDE_INDEX: u32 = 3;

// ─── Descriptions (serde) ─────────────────────────────────────────────────────

/// Serialized form of a static parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaticParamDesc {
    Int {
        name: String,
        min: i64,
        max: i64,
        default: i64,
    },
    Enum {
        name: String,
        options: Vec<String>,
        default: String,
    },
}

impl StaticParamDesc {
    fn to_decl(&self) -> std::result::Result<StaticParamDecl, DefinitionError> {
        match self {
            Self::Int {
                name,
                min,
                max,
                default,
            } => StaticParamDecl::int(name, *min, *max, *default),
            Self::Enum {
                name,
                options,
                default,
            } => {
                let options: Vec<&str> = options.iter().map(String::as_str).collect();
                StaticParamDecl::enumeration(name, &options, default)
            }
        }
    }
}

/// Serialized form of a uniform or struct field. `type` is a GLSL type name
/// or the name of a declared struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<u32>,
}

impl UniformDesc {
    fn to_decl(&self) -> UniformDecl {
        let decl = match UniformType::from_glsl(&self.ty) {
            Some(ty) => UniformDecl::primitive(&self.name, ty),
            None => UniformDecl::structure(&self.name, &self.ty),
        };
        match self.array {
            Some(len) => decl.array(len),
            None => decl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDesc {
    pub name: String,
    pub fields: Vec<UniformDesc>,
}

/// Serialized form of a whole [`ShaderDefinition`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderDesc {
    pub name: String,
    pub static_params: Vec<StaticParamDesc>,
    pub structs: Vec<StructDesc>,
    pub uniforms: Vec<UniformDesc>,
    pub shared: String,
    pub vertex: String,
    pub geometry: String,
    pub fragment: String,
}

// ─── ShaderDefinition ─────────────────────────────────────────────────────────

/// A validated logical shader. See the module docs.
#[derive(Debug, Clone)]
pub struct ShaderDefinition {
    name: String,
    params: Vec<StaticParamDecl>,
    registry: UniformRegistry,
    shared: String,
    stages: ShaderStages,
    fingerprint: u64,
}

impl ShaderDefinition {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ShaderDefinitionBuilder {
        ShaderDefinitionBuilder {
            name: name.into(),
            ..ShaderDefinitionBuilder::default()
        }
    }

    /// Validates a definition.
    pub fn new(
        name: impl Into<String>,
        params: Vec<StaticParamDecl>,
        registry: UniformRegistry,
        shared: impl Into<String>,
        stages: ShaderStages,
    ) -> Result<Self> {
        let name = name.into();

        let mut seen = FxHashSet::default();
        for param in &params {
            if !seen.insert(param.symbol()) {
                return Err(DefinitionError::DuplicateStaticParam(param.name().to_string()).into());
            }
        }
        if stages.present().next().is_none() {
            return Err(DefinitionError::NoStageCode(name).into());
        }

        let mut definition = Self {
            name,
            params,
            registry,
            shared: shared.into(),
            stages,
            fingerprint: 0,
        };
        definition.fingerprint = definition.compute_fingerprint();
        Ok(definition)
    }

    pub fn from_desc(desc: &ShaderDesc) -> Result<Self> {
        let params = desc
            .static_params
            .iter()
            .map(StaticParamDesc::to_decl)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let structs = desc
            .structs
            .iter()
            .map(|s| StructDecl::new(&s.name, s.fields.iter().map(UniformDesc::to_decl)))
            .collect();
        let uniforms = desc.uniforms.iter().map(UniformDesc::to_decl).collect();
        let registry = UniformRegistry::new(structs, uniforms)?;

        let stages = ShaderStages::new()
            .with(ShaderStage::Vertex, desc.vertex.as_str())
            .with(ShaderStage::Geometry, desc.geometry.as_str())
            .with(ShaderStage::Fragment, desc.fragment.as_str());

        Self::new(&desc.name, params, registry, &desc.shared, stages)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let desc: ShaderDesc = serde_json::from_str(json)?;
        Self::from_desc(&desc)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn static_params(&self) -> &[StaticParamDecl] {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &UniformRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn shared_code(&self) -> &str {
        &self.shared
    }

    #[inline]
    #[must_use]
    pub fn stage_code(&self, stage: ShaderStage) -> &str {
        &self.stages[stage]
    }

    /// Stable hash of everything that affects generated source.
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.name.as_bytes());
        for param in &self.params {
            hasher.update(&[0xFF]);
            hasher.update(param.name().as_bytes());
            match param.kind() {
                StaticParamKind::Int { min, max } => {
                    hasher.update(&min.to_le_bytes());
                    hasher.update(&max.to_le_bytes());
                }
                StaticParamKind::Enum { options } => {
                    for &option in options {
                        hasher.update(interner::resolve(option).as_bytes());
                        hasher.update(&[0]);
                    }
                }
            }
        }

        let mut declarations = String::new();
        self.registry.emit_glsl(&mut declarations);
        hasher.update(declarations.as_bytes());
        hasher.update(&[0xFF]);
        hasher.update(self.shared.as_bytes());
        for stage in ShaderStage::ALL {
            hasher.update(&[0xFF]);
            hasher.update(self.stages[stage].as_bytes());
        }
        hasher.digest()
    }

    /// The parameter set with every default applied.
    #[must_use]
    pub fn default_params(&self) -> StaticParameterSet {
        let mut set = StaticParameterSet::new();
        for param in &self.params {
            set.push(param.symbol(), param.default_value());
        }
        set
    }

    /// Brings `params` into canonical form: every declared parameter in
    /// schema order, unassigned ones at their default.
    ///
    /// Fails on names the definition does not declare and on values outside
    /// a parameter's domain.
    pub fn canonicalize(
        &self,
        params: &StaticParameterSet,
    ) -> std::result::Result<StaticParameterSet, DefinitionError> {
        let mut canonical = StaticParameterSet::new();
        for param in &self.params {
            let value = params
                .iter()
                .find(|(name, _)| *name == param.symbol())
                .map_or(param.default_value(), |&(_, v)| v);
            if !param.accepts(value) {
                return Err(DefinitionError::InvalidStaticValue {
                    name: param.name().to_string(),
                    value: value.to_string(),
                });
            }
            canonical.push(param.symbol(), value);
        }

        if let Some(&(name, _)) = params
            .iter()
            .find(|(name, _)| !self.params.iter().any(|p| p.symbol() == *name))
        {
            return Err(DefinitionError::UnknownStaticParam {
                shader: self.name.clone(),
                name: interner::resolve(name).to_string(),
            });
        }
        Ok(canonical)
    }

    /// Cache key of a variant's program binary.
    #[must_use]
    pub fn variant_key(&self, params: &StaticParameterSet) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(&self.fingerprint.to_le_bytes());
        hasher.update(&params.fingerprint().to_le_bytes());
        hasher.digest()
    }

    /// Writes the generated source of `stage` for `params`. Nothing is
    /// written for a stage without code.
    pub fn write_stage_source(
        &self,
        stage: ShaderStage,
        params: &StaticParameterSet,
        out: &mut String,
    ) {
        let code = &self.stages[stage];
        if code.is_empty() {
            return;
        }

        let _ = writeln!(out, "#define {} 1", stage.marker());
        for param in &self.params {
            let value = params.get(param.name()).unwrap_or(param.default_value());
            param.write_defines(value, out);
        }
        self.registry.emit_glsl(out);

        let _ = writeln!(out, "#line 1 {SHARED_SOURCE_INDEX}");
        push_block(out, &self.shared);
        let _ = writeln!(out, "#line 1 {STAGE_SOURCE_INDEX}");
        push_block(out, code);
    }

    /// Fills `stages` with the generated source of every stage.
    pub fn write_sources(&self, params: &StaticParameterSet, stages: &mut ShaderStages) {
        for stage in ShaderStage::ALL {
            let out = &mut stages[stage];
            out.clear();
            self.write_stage_source(stage, params, out);
        }
    }

    /// Looks up a static parameter's value in `params`, falling back to its
    /// default.
    #[must_use]
    pub fn param_value(&self, params: &StaticParameterSet, name: &str) -> Option<StaticValue> {
        let decl = self.params.iter().find(|p| p.name() == name)?;
        Some(params.get(name).unwrap_or(decl.default_value()))
    }
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}

/// Incremental construction of a [`ShaderDefinition`].
#[derive(Debug, Clone, Default)]
pub struct ShaderDefinitionBuilder {
    name: String,
    params: Vec<StaticParamDesc>,
    structs: Vec<StructDecl>,
    uniforms: Vec<UniformDecl>,
    shared: String,
    stages: ShaderStages,
}

impl ShaderDefinitionBuilder {
    #[must_use]
    pub fn int_param(mut self, name: &str, min: i64, max: i64, default: i64) -> Self {
        self.params.push(StaticParamDesc::Int {
            name: name.to_string(),
            min,
            max,
            default,
        });
        self
    }

    #[must_use]
    pub fn enum_param(mut self, name: &str, options: &[&str], default: &str) -> Self {
        self.params.push(StaticParamDesc::Enum {
            name: name.to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            default: default.to_string(),
        });
        self
    }

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

    /// Shorthand for a non-array primitive uniform.
    #[must_use]
    pub fn primitive(self, name: &str, ty: UniformType) -> Self {
        self.uniform(UniformDecl::primitive(name, ty))
    }

    #[must_use]
    pub fn shared_code(mut self, code: impl Into<String>) -> Self {
        self.shared = code.into();
        self
    }

    #[must_use]
    pub fn stage_code(mut self, stage: ShaderStage, code: impl Into<String>) -> Self {
        self.stages[stage] = code.into();
        self
    }

    pub fn build(self) -> Result<ShaderDefinition> {
        let params = self
            .params
            .iter()
            .map(StaticParamDesc::to_decl)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let registry = UniformRegistry::new(self.structs, self.uniforms)?;
        ShaderDefinition::new(self.name, params, registry, self.shared, self.stages)
    }
}
