//! Static Parameters
//!
//! Compile-time switches of a shader definition. Each distinct assignment
//! produces its own program ("variant"), selected through `#define`s in the
//! generated source.
//!
//! # Architecture
//!
//! Names and enum options are interned [`Symbol`]s, so a
//! [`StaticParameterSet`] compares and hashes as a short list of integers.
//! Entries keep the order of the declaring schema, never insertion order, so
//! two sets with the same assignments are always equal and hash identically.
//!
//! | Kind | GLSL |
//! |------|------|
//! | Int `COUNT` = 4 | `#define COUNT 4` |
//! | Enum `MODE` ∈ {OFF, PCF} = PCF | `#define MODE_OFF 0`, `#define MODE_PCF 1`, `#define MODE MODE_PCF` |
//!
//! ```rust,ignore
//! let mut params = definition.default_params();
//! params.set_enum("SHADOW_MODE", "PCF");
//! params.set_int("LIGHT_COUNT", 4);
//! let variant = factory.get_variant(&params);
//! ```

use std::fmt::{self, Write as _};

use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::DefinitionError;
use crate::utils::interner::{self, Symbol};

// ─── StaticValue ──────────────────────────────────────────────────────────────

/// Value of one static parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticValue {
    Int(i64),
    Enum(Symbol),
}

impl StaticValue {
    /// Interns `option` as an enum value.
    #[must_use]
    pub fn option(option: &str) -> Self {
        Self::Enum(interner::intern(option))
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::Enum(_) => None,
        }
    }

    #[must_use]
    pub fn as_option(&self) -> Option<&'static str> {
        match *self {
            Self::Enum(sym) => Some(interner::resolve(sym)),
            Self::Int(_) => None,
        }
    }
}

impl From<i64> for StaticValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for StaticValue {
    fn from(option: &str) -> Self {
        Self::option(option)
    }
}

impl fmt::Display for StaticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Enum(sym) => f.write_str(interner::resolve(sym)),
        }
    }
}

// ─── StaticParamDecl ──────────────────────────────────────────────────────────

/// Domain of a static parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticParamKind {
    /// Inclusive integer range.
    Int { min: i64, max: i64 },
    /// One of a fixed list of option names.
    Enum { options: SmallVec<[Symbol; 4]> },
}

/// Declaration of one static parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticParamDecl {
    name: Symbol,
    kind: StaticParamKind,
    default: StaticValue,
}

impl StaticParamDecl {
    /// Integer parameter in `min..=max`.
    pub fn int(name: &str, min: i64, max: i64, default: i64) -> Result<Self, DefinitionError> {
        Self::new(
            name,
            StaticParamKind::Int { min, max },
            StaticValue::Int(default),
        )
    }

    /// Enumerated parameter.
    pub fn enumeration(
        name: &str,
        options: &[&str],
        default: &str,
    ) -> Result<Self, DefinitionError> {
        let options = options.iter().map(|o| interner::intern(o)).collect();
        Self::new(
            name,
            StaticParamKind::Enum { options },
            StaticValue::option(default),
        )
    }

    fn new(name: &str, kind: StaticParamKind, default: StaticValue) -> Result<Self, DefinitionError> {
        let decl = Self {
            name: interner::intern(name),
            kind,
            default,
        };
        if decl.accepts(default) {
            Ok(decl)
        } else {
            Err(DefinitionError::InvalidDefault {
                name: name.to_string(),
                value: default.to_string(),
            })
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        interner::resolve(self.name)
    }

    #[inline]
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &StaticParamKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn default_value(&self) -> StaticValue {
        self.default
    }

    /// Whether `value` lies in the parameter's domain.
    #[must_use]
    pub fn accepts(&self, value: StaticValue) -> bool {
        match (&self.kind, value) {
            (StaticParamKind::Int { min, max }, StaticValue::Int(v)) => (*min..=*max).contains(&v),
            (StaticParamKind::Enum { options }, StaticValue::Enum(sym)) => options.contains(&sym),
            _ => false,
        }
    }

    /// Writes the `#define` lines selecting `value`.
    pub fn write_defines(&self, value: StaticValue, out: &mut String) {
        let name = self.name();
        match (&self.kind, value) {
            (StaticParamKind::Enum { options }, StaticValue::Enum(selected)) => {
                for (index, &option) in options.iter().enumerate() {
                    let _ = writeln!(out, "#define {name}_{} {index}", interner::resolve(option));
                }
                let _ = writeln!(out, "#define {name} {name}_{}", interner::resolve(selected));
            }
            _ => {
                let _ = writeln!(out, "#define {name} {value}");
            }
        }
    }
}

// ─── StaticParameterSet ───────────────────────────────────────────────────────

/// A complete assignment of static parameters, in schema order.
///
/// Obtained from [`ShaderDefinition::default_params`](super::ShaderDefinition::default_params);
/// values are changed in place. Domain checks happen when a variant is
/// requested, not on assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StaticParameterSet {
    entries: SmallVec<[(Symbol, StaticValue); 4]>,
}

impl StaticParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: Symbol, value: StaticValue) {
        self.entries.push((name, value));
    }

    /// Assigns an existing parameter. Returns `false` if the set has no
    /// parameter called `name`.
    pub fn set(&mut self, name: &str, value: StaticValue) -> bool {
        let Some(sym) = interner::get(name) else {
            return false;
        };
        match self.entries.iter_mut().find(|(k, _)| *k == sym) {
            Some(entry) => {
                entry.1 = value;
                true
            }
            None => false,
        }
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> bool {
        self.set(name, StaticValue::Int(value))
    }

    pub fn set_enum(&mut self, name: &str, option: &str) -> bool {
        self.set(name, StaticValue::option(option))
    }

    /// Chained form of [`set`](Self::set); unknown names are ignored.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<StaticValue>) -> Self {
        self.set(name, value.into());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<StaticValue> {
        let sym = interner::get(name)?;
        self.entries
            .iter()
            .find(|(k, _)| *k == sym)
            .map(|&(_, v)| v)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, StaticValue)> {
        self.entries.iter()
    }

    /// Hash of the assignment that is stable across processes (symbols are
    /// hashed by their text).
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for &(name, value) in &self.entries {
            hasher.update(interner::resolve(name).as_bytes());
            match value {
                StaticValue::Int(v) => {
                    hasher.update(&[0]);
                    hasher.update(&v.to_le_bytes());
                }
                StaticValue::Enum(sym) => {
                    hasher.update(&[1]);
                    hasher.update(interner::resolve(sym).as_bytes());
                }
            }
            hasher.update(&[0xFF]);
        }
        hasher.digest()
    }
}

impl fmt::Display for StaticParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, &(name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={value}", interner::resolve(name))?;
        }
        f.write_str("}")
    }
}
