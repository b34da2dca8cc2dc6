//! Compiled Variants
//!
//! A [`CompiledVariant`] owns one linked program, the location table
//! resolved for it, and the last value written to every live location.
//!
//! # Uniform lookup
//!
//! Every accessor starts with [`CompiledVariant::check_uniform`]:
//!
//! | Result | Getter | Setter |
//! |--------|--------|--------|
//! | [`UniformCheck::Missing`] | `None` | `false` |
//! | [`UniformCheck::OptimizedOut`] | caller's default | `true`, no effect |
//! | [`UniformCheck::Exists`] | stored value | `true`, uploaded |
//!
//! Requesting a uniform as the wrong Rust type panics: the schema and the
//! calling code disagree, and no runtime fallback can fix that.
//!
//! # Arrays
//!
//! Primitive array leaves occupy consecutive locations. Element `i` is
//! addressed as `base.offset(i)`, never by looking up `name[i]`.

use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::static_params::StaticParameterSet;
use crate::device::{GraphicsDevice, ProgramHandle, UniformHandle};
use crate::uniforms::{
    StoredValue, UniformData, UniformRegistry, UniformSlot, UniformTable, UniformType,
    UniformValue,
};

/// Three-way result of a uniform name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformCheck {
    /// The schema never declared the name.
    Missing,
    /// Declared, but the driver discarded it.
    OptimizedOut,
    /// Live at the given location.
    Exists(UniformHandle),
}

/// One linked program plus its uniform state. See the module docs.
#[derive(Debug)]
pub struct CompiledVariant {
    device: Arc<dyn GraphicsDevice>,
    program: ProgramHandle,
    params: StaticParameterSet,
    table: UniformTable,
    values: RwLock<FxHashMap<UniformHandle, StoredValue>>,
}

impl CompiledVariant {
    /// Takes ownership of a linked `program` and resolves `registry` against
    /// it. Every live location starts at zero, matching a freshly linked
    /// program.
    #[must_use]
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        program: ProgramHandle,
        params: StaticParameterSet,
        registry: &UniformRegistry,
    ) -> Self {
        let table = registry.resolve(device.as_ref(), program);

        let mut values = FxHashMap::default();
        for (_, slot) in table.iter() {
            if let Some(base) = slot.handle {
                for index in 0..slot.len() {
                    values.insert(base.offset(index), StoredValue::zero(slot.ty));
                }
            }
        }
        trace!(
            "Variant {params} of {program:?}: {} uniforms, {} active",
            table.len(),
            table.active_count()
        );

        Self {
            device,
            program,
            params,
            table,
            values: RwLock::new(values),
        }
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &StaticParameterSet {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn table(&self) -> &UniformTable {
        &self.table
    }

    /// Binds the program for subsequent draws. Stored values are already
    /// current on the device and are not uploaded again.
    pub fn activate(&self) {
        self.device.use_program(self.program);
    }

    #[must_use]
    pub fn check_uniform(&self, name: &str) -> UniformCheck {
        match self.table.get(name) {
            None => UniformCheck::Missing,
            Some(UniformSlot { handle: None, .. }) => UniformCheck::OptimizedOut,
            Some(UniformSlot {
                handle: Some(handle),
                ..
            }) => UniformCheck::Exists(*handle),
        }
    }

    /// Declared type and length of a uniform, whether or not it is live.
    #[inline]
    #[must_use]
    pub fn uniform_info(&self, name: &str) -> Option<UniformSlot> {
        self.table.get(name).copied()
    }

    /// Whether `value` can be written to `name`.
    #[must_use]
    pub fn accepts(&self, name: &str, value: &UniformValue) -> bool {
        self.table.get(name).is_some_and(|slot| value.matches(slot.ty))
    }

    // ─── Typed access ────────────────────────────────────────────────────────

    /// Reads a uniform (element 0 of an array).
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type of `name`.
    #[must_use]
    pub fn get_uniform<T: UniformData>(&self, name: &str, default: T) -> Option<T> {
        self.get_uniform_element(name, 0, default)
    }

    /// Writes a uniform (element 0 of an array). Returns `false` only when
    /// the name is not declared.
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type of `name`.
    pub fn set_uniform<T: UniformData>(&self, name: &str, value: T) -> bool {
        self.set_uniform_element(name, 0, value)
    }

    /// Reads one array element.
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type or `index` is out of bounds.
    #[must_use]
    pub fn get_uniform_element<T: UniformData>(
        &self,
        name: &str,
        index: u32,
        default: T,
    ) -> Option<T> {
        let slot = self.table.get(name)?;
        assert_type::<T>(name, slot);
        assert_index(name, slot, index);
        let Some(base) = slot.handle else {
            return Some(default);
        };
        Some(T::from_value(self.read(base.offset(index), slot.ty)).unwrap_or(default))
    }

    /// Writes one array element.
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type or `index` is out of bounds.
    pub fn set_uniform_element<T: UniformData>(&self, name: &str, index: u32, value: T) -> bool {
        let Some(slot) = self.table.get(name) else {
            return false;
        };
        assert_type::<T>(name, slot);
        assert_index(name, slot, index);
        if let Some(base) = slot.handle {
            self.write(base.offset(index), value.into_value());
        }
        true
    }

    /// Reads every element of an array uniform. An optimized-out array reads
    /// as `default` repeated.
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type of `name`.
    #[must_use]
    pub fn get_uniform_array<T: UniformData>(&self, name: &str, default: T) -> Option<Vec<T>> {
        let slot = self.table.get(name)?;
        assert_type::<T>(name, slot);
        let Some(base) = slot.handle else {
            return Some(vec![default; slot.len() as usize]);
        };

        let values = self.values.read();
        let out = (0..slot.len())
            .map(|index| {
                values
                    .get(&base.offset(index))
                    .and_then(|stored| T::from_value(stored.load(slot.ty)))
                    .unwrap_or(default)
            })
            .collect();
        Some(out)
    }

    /// Writes the leading elements of an array uniform from `values`.
    ///
    /// # Panics
    ///
    /// If `T` is not the declared type, or `values` is longer than the array.
    pub fn set_uniform_array<T: UniformData>(&self, name: &str, values: &[T]) -> bool {
        let Some(slot) = self.table.get(name) else {
            return false;
        };
        assert_type::<T>(name, slot);
        assert!(
            values.len() <= slot.len() as usize,
            "uniform `{name}` holds {} elements, {} given",
            slot.len(),
            values.len()
        );
        if let Some(base) = slot.handle {
            for (index, value) in (0..).zip(values) {
                self.write(base.offset(index), value.into_value());
            }
        }
        true
    }

    // ─── Dynamic access ──────────────────────────────────────────────────────

    /// Current value of a uniform (element 0 of an array). Optimized-out
    /// uniforms read as zero.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<UniformValue> {
        self.element_value(name, 0)
    }

    /// Current value of one element; `None` when the name is not declared or
    /// `index` is past the end.
    #[must_use]
    pub fn element_value(&self, name: &str, index: u32) -> Option<UniformValue> {
        let slot = self.table.get(name)?;
        if index >= slot.len() {
            return None;
        }
        Some(match slot.handle {
            Some(base) => self.read(base.offset(index), slot.ty),
            None => UniformValue::zero(slot.ty),
        })
    }

    /// Writes a dynamically typed value (element 0 of an array).
    ///
    /// # Panics
    ///
    /// If the value does not match the declared type.
    pub fn set_value(&self, name: &str, value: UniformValue) -> bool {
        self.set_element_value(name, 0, value)
    }

    /// Writes one element of a dynamically typed value. Returns `false` when
    /// the name is not declared or `index` is past the end.
    ///
    /// # Panics
    ///
    /// If the value does not match the declared type.
    pub fn set_element_value(&self, name: &str, index: u32, value: UniformValue) -> bool {
        let Some(slot) = self.table.get(name) else {
            return false;
        };
        assert!(
            value.matches(slot.ty),
            "uniform `{name}` has type {}, written with {}",
            slot.ty,
            value.kind_name()
        );
        if index >= slot.len() {
            return false;
        }
        if let Some(base) = slot.handle {
            self.write(base.offset(index), value);
        }
        true
    }

    // ─── Storage ─────────────────────────────────────────────────────────────

    fn read(&self, handle: UniformHandle, ty: UniformType) -> UniformValue {
        self.values
            .read()
            .get(&handle)
            .map_or_else(|| UniformValue::zero(ty), |stored| stored.load(ty))
    }

    fn write(&self, handle: UniformHandle, value: UniformValue) {
        self.values.write().insert(handle, StoredValue::store(value));
        self.device.set_uniform(self.program, handle, &value);
    }
}

impl Drop for CompiledVariant {
    fn drop(&mut self) {
        self.device.delete_program(self.program);
    }
}

fn assert_type<T: UniformData>(name: &str, slot: &UniformSlot) {
    assert!(
        T::accepts(slot.ty),
        "uniform `{name}` has type {}, accessed as {}",
        slot.ty,
        T::NAME
    );
}

fn assert_index(name: &str, slot: &UniformSlot, index: u32) {
    assert!(
        index < slot.len(),
        "index {index} out of bounds for uniform `{name}` of length {}",
        slot.len()
    );
}
