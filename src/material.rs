//! Materials
//!
//! A [`Material`] is the user-facing set of uniform values for one
//! [`ShaderDefinition`](crate::variant::ShaderDefinition). Values live in the
//! material itself and are pushed into whichever [`CompiledVariant`] is
//! current, so switching variants (e.g. toggling a static parameter) keeps
//! the visual state.
//!
//! # Write path
//!
//! 1. The name is checked against the declared uniform schema (panics if
//!    absent: the calling code is out of sync with the shader)
//! 2. The value is written through to the current variant
//! 3. The value is mirrored into the material's own store
//!
//! Array parameters grow on demand. Writing element 5 of an array nobody
//! touched yet backfills elements 0..5 from the current variant, so every
//! stored element always holds a defined value.
//!
//! ```rust,ignore
//! let mut material = Material::new(factory);
//! material.set_param("u_Color", Vec3::new(1.0, 0.0, 0.0));
//! material.set_param_at("u_Weights", 2, 0.5_f32);
//! material.set_static_param("SHADOW", "PCF"); // new variant, same values
//! ```

use std::sync::Arc;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::uniforms::{UniformData, UniformType, UniformValue};
use crate::variant::{
    CompiledVariant, StaticParameterSet, StaticValue, UniformCheck, VariantFactory,
};

/// A stored material parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialParam {
    Value(UniformValue),
    /// Array elements written so far, from index 0.
    Array(Vec<UniformValue>),
}

impl MaterialParam {
    /// Stored value of element `index` (0 for non-arrays).
    #[must_use]
    pub fn element(&self, index: u32) -> Option<UniformValue> {
        match self {
            Self::Value(value) => (index == 0).then_some(*value),
            Self::Array(values) => values.get(index as usize).copied(),
        }
    }
}

/// Variant-independent uniform values bound to a [`VariantFactory`].
#[derive(Debug)]
pub struct Material {
    factory: Arc<VariantFactory>,
    static_params: StaticParameterSet,
    variant: Option<Arc<CompiledVariant>>,
    params: FxHashMap<String, MaterialParam>,
    active: bool,
    version: u64,
}

impl Material {
    /// Creates a material using the factory's default variant.
    #[must_use]
    pub fn new(factory: Arc<VariantFactory>) -> Self {
        let static_params = factory.default_params();
        Self::with_static_params(factory, static_params)
    }

    #[must_use]
    pub fn with_static_params(
        factory: Arc<VariantFactory>,
        static_params: StaticParameterSet,
    ) -> Self {
        let variant = factory.get_variant(&static_params);
        Self {
            factory,
            static_params,
            variant,
            params: FxHashMap::default(),
            active: false,
            version: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn factory(&self) -> &Arc<VariantFactory> {
        &self.factory
    }

    /// Current variant; `None` while no program could be built for the
    /// current static parameters.
    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<&Arc<CompiledVariant>> {
        self.variant.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn static_params(&self) -> &StaticParameterSet {
        &self.static_params
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Incremented by every parameter write.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Raw stored parameter.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&MaterialParam> {
        self.params.get(name)
    }

    /// Binds the current variant for drawing. Later variant switches bind the
    /// new variant immediately.
    pub fn activate(&mut self) {
        self.active = true;
        if let Some(variant) = &self.variant {
            variant.activate();
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    // ─── Parameters ──────────────────────────────────────────────────────────

    /// Sets a parameter (element 0 of an array).
    ///
    /// # Panics
    ///
    /// If the shader declares no uniform `name`, or `value` has the wrong type.
    pub fn set_param(&mut self, name: &str, value: impl Into<UniformValue>) {
        self.set_param_at(name, 0, value);
    }

    /// Sets one element of an array parameter.
    ///
    /// # Panics
    ///
    /// If the shader declares no uniform `name`, `value` has the wrong type,
    /// or `index` is past the declared length.
    pub fn set_param_at(&mut self, name: &str, index: u32, value: impl Into<UniformValue>) {
        let value = value.into();
        let (ty, array_len) = self.declared(name);
        assert!(
            value.matches(ty),
            "material parameter `{name}` has type {ty}, written with {}",
            value.kind_name()
        );

        let Some(len) = array_len else {
            assert!(index == 0, "material parameter `{name}` is not an array");
            if let Some(variant) = &self.variant {
                variant.set_value(name, value);
            }
            self.params.insert(name.to_string(), MaterialParam::Value(value));
            self.version = self.version.wrapping_add(1);
            return;
        };
        assert!(
            index < len,
            "index {index} out of bounds for material parameter `{name}` of length {len}"
        );

        let mut values = match self.params.remove(name) {
            Some(MaterialParam::Array(values)) => values,
            _ => Vec::new(),
        };

        // Backfill skipped elements before the write lands.
        let variant = self.variant.as_deref();
        while values.len() <= index as usize {
            let filled = values.len() as u32;
            let current = variant
                .and_then(|v| v.element_value(name, filled))
                .filter(|v| v.matches(ty))
                .unwrap_or_else(|| UniformValue::zero(ty));
            values.push(current);
        }
        values[index as usize] = value;

        if let Some(variant) = variant {
            variant.set_element_value(name, index, value);
        }
        self.params.insert(name.to_string(), MaterialParam::Array(values));
        self.version = self.version.wrapping_add(1);
    }

    /// Sets the leading elements of an array parameter.
    pub fn set_param_array<T: UniformData>(&mut self, name: &str, values: &[T]) {
        for (index, value) in (0..).zip(values) {
            self.set_param_at(name, index, value.into_value());
        }
    }

    /// Reads a parameter (element 0 of an array).
    ///
    /// # Panics
    ///
    /// If the parameter has no value, or `T` is not its type.
    #[must_use]
    pub fn get_param<T: UniformData>(&self, name: &str) -> T {
        self.try_get_param(name)
            .unwrap_or_else(|| panic!("material has no value for parameter `{name}`"))
    }

    /// Reads a parameter, or `None` if it has no value.
    ///
    /// # Panics
    ///
    /// If `T` is not the parameter's type.
    #[must_use]
    pub fn try_get_param<T: UniformData>(&self, name: &str) -> Option<T> {
        self.try_get_param_at(name, 0)
    }

    /// Reads one element. The material's own store is consulted first, then
    /// the live value of the current variant.
    ///
    /// # Panics
    ///
    /// If `T` is not the parameter's type.
    #[must_use]
    pub fn try_get_param_at<T: UniformData>(&self, name: &str, index: u32) -> Option<T> {
        let value = self
            .params
            .get(name)
            .and_then(|param| param.element(index))
            .or_else(|| {
                let variant = self.variant.as_ref()?;
                match variant.check_uniform(name) {
                    UniformCheck::Exists(_) => variant.element_value(name, index),
                    UniformCheck::Missing | UniformCheck::OptimizedOut => None,
                }
            })?;
        Some(T::from_value(value).unwrap_or_else(|| {
            panic!(
                "material parameter `{name}` holds {}, read as {}",
                value.kind_name(),
                T::NAME
            )
        }))
    }

    // ─── Variants ────────────────────────────────────────────────────────────

    /// Switches to `variant` and re-applies every stored parameter that the
    /// new variant declares with the same type. Others are skipped.
    pub fn change_variant(&mut self, variant: Arc<CompiledVariant>) {
        if self.active {
            variant.activate();
        }

        let mut pushed = 0_usize;
        for (name, param) in &self.params {
            match param {
                MaterialParam::Value(value) => {
                    if variant.accepts(name, value) {
                        variant.set_value(name, *value);
                        pushed += 1;
                    }
                }
                MaterialParam::Array(values) => {
                    let Some(first) = values.first() else {
                        continue;
                    };
                    if !variant.accepts(name, first) {
                        continue;
                    }
                    for (index, value) in (0..).zip(values) {
                        if !variant.set_element_value(name, index, *value) {
                            break;
                        }
                    }
                    pushed += 1;
                }
            }
        }
        debug!(
            "Material switched to variant {} ({pushed} parameters re-applied)",
            variant.params()
        );

        self.static_params = variant.params().clone();
        self.variant = Some(variant);
    }

    /// Changes one static parameter and switches to the matching variant.
    ///
    /// Returns `false` if `name` is not a static parameter, the value is
    /// outside its domain, or no variant could be built. Rejected values
    /// leave the material untouched. A failed build keeps the values, and
    /// the material has no variant until a buildable assignment is chosen.
    pub fn set_static_param(&mut self, name: &str, value: impl Into<StaticValue>) -> bool {
        let mut params = self.static_params.clone();
        if !params.set(name, value.into()) {
            return false;
        }
        if let Err(e) = self.factory.definition().canonicalize(&params) {
            warn!("Material keeps variant {}: {e}", self.static_params);
            return false;
        }
        if let Some(current) = &self.variant
            && current.params() == &params
        {
            return true;
        }

        match self.factory.get_variant(&params) {
            Some(variant) => {
                self.change_variant(variant);
                true
            }
            None => {
                self.static_params = params;
                self.variant = None;
                false
            }
        }
    }

    /// Declared type and array length of a schema leaf.
    fn declared(&self, name: &str) -> (UniformType, Option<u32>) {
        let definition = self.factory.definition();
        definition
            .registry()
            .leaves()
            .iter()
            .find(|leaf| leaf.name == name)
            .map(|leaf| (leaf.ty, leaf.array_len))
            .unwrap_or_else(|| {
                panic!(
                    "shader '{}' declares no uniform `{name}`",
                    definition.name()
                )
            })
    }
}
