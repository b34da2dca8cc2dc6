//! Variant Factory
//!
//! Compiles and caches one [`CompiledVariant`] per distinct
//! [`StaticParameterSet`] of a [`ShaderDefinition`].
//!
//! # Lookup
//!
//! 1. The requested set is canonicalized (schema order, defaults filled in)
//! 2. The cache slot for the canonical set is found or created
//! 3. The first caller of a new slot compiles; concurrent callers for the same
//!    set block on that single compilation instead of racing it
//!
//! A failed compilation is cached as "no variant" and reported once through
//! the error callback. It is not retried until the entry is evicted.
//!
//! # Scratch buffers
//!
//! Each compilation borrows a [`CompileScratch`] from the factory's
//! [`ScratchPool`]. Worker threads that compile repeatedly can hold their own
//! and call [`VariantFactory::get_variant_with`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::compiled::CompiledVariant;
use super::definition::{FIRST_INCLUDE_INDEX, ShaderDefinition};
use super::static_params::StaticParameterSet;
use crate::device::GraphicsDevice;
use crate::errors::{Result, ShaderError};
use crate::settings::ShaderSettings;
use crate::shader::{
    CompileScratch, IncludeLoader, IncludePreprocessor, PreprocessReport, ProgramBinaryCache,
    ScratchPool, ShaderCompiler, ShaderStage, ShaderStages,
};

/// Called with the factory, the requested parameters and the failure.
///
/// A compilation failure is reported once, after its cache entry is settled,
/// so the callback may request variants, including the failed set (which
/// then yields `None` without another report). Parameter sets rejected by
/// the definition are reported on every request; requesting the same set
/// again from the callback recurses.
pub type ErrorCallback =
    Box<dyn Fn(&VariantFactory, &StaticParameterSet, &ShaderError) + Send + Sync>;

type VariantSlot = Arc<OnceLock<Option<Arc<CompiledVariant>>>>;

/// Per-definition variant cache. See the module docs.
pub struct VariantFactory {
    device: Arc<dyn GraphicsDevice>,
    definition: ShaderDefinition,
    compiler: ShaderCompiler,
    loader: Arc<dyn IncludeLoader>,
    use_program_binaries: bool,
    variants: Mutex<FxHashMap<StaticParameterSet, VariantSlot>>,
    binaries: Arc<ProgramBinaryCache>,
    scratch: ScratchPool,
    on_error: Option<ErrorCallback>,
}

impl fmt::Debug for VariantFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantFactory")
            .field("definition", &self.definition.name())
            .field("variants", &self.variants.lock().len())
            .field("binaries", &self.binaries.len())
            .field("use_program_binaries", &self.use_program_binaries)
            .finish_non_exhaustive()
    }
}

impl VariantFactory {
    #[must_use]
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        definition: ShaderDefinition,
        loader: Arc<dyn IncludeLoader>,
        settings: &ShaderSettings,
    ) -> Self {
        let preprocessor =
            IncludePreprocessor::from_settings(settings).with_first_file_index(FIRST_INCLUDE_INDEX);
        Self {
            device,
            definition,
            compiler: ShaderCompiler::new(settings).with_preprocessor(preprocessor),
            loader,
            use_program_binaries: settings.use_program_binaries,
            variants: Mutex::new(FxHashMap::default()),
            binaries: Arc::new(ProgramBinaryCache::new()),
            scratch: ScratchPool::new(),
            on_error: None,
        }
    }

    /// Shares a binary cache, e.g. one loaded from disk or used by other
    /// factories.
    #[must_use]
    pub fn with_binary_cache(mut self, binaries: Arc<ProgramBinaryCache>) -> Self {
        self.binaries = binaries;
        self
    }

    #[must_use]
    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&VariantFactory, &StaticParameterSet, &ShaderError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    #[inline]
    #[must_use]
    pub fn definition(&self) -> &ShaderDefinition {
        &self.definition
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn compiler(&self) -> &ShaderCompiler {
        &self.compiler
    }

    #[inline]
    #[must_use]
    pub fn binaries(&self) -> &Arc<ProgramBinaryCache> {
        &self.binaries
    }

    #[must_use]
    pub fn default_params(&self) -> StaticParameterSet {
        self.definition.default_params()
    }

    /// Returns the variant for `params`, compiling it on first request.
    ///
    /// `None` means no usable program exists for this set; the failure has
    /// already been reported.
    pub fn get_variant(&self, params: &StaticParameterSet) -> Option<Arc<CompiledVariant>> {
        self.lookup(params, |key| {
            let mut scratch = self.scratch.acquire();
            self.compile_variant(key, &mut scratch)
        })
    }

    /// Like [`get_variant`](Self::get_variant), compiling with the caller's
    /// scratch buffers.
    pub fn get_variant_with(
        &self,
        params: &StaticParameterSet,
        scratch: &mut CompileScratch,
    ) -> Option<Arc<CompiledVariant>> {
        self.lookup(params, |key| self.compile_variant(key, scratch))
    }

    fn lookup<F>(&self, params: &StaticParameterSet, compile: F) -> Option<Arc<CompiledVariant>>
    where
        F: FnOnce(&StaticParameterSet) -> Result<CompiledVariant>,
    {
        let key = match self.definition.canonicalize(params) {
            Ok(key) => key,
            Err(e) => {
                self.report(params, &e.into());
                return None;
            }
        };

        let slot = self.slot(&key);
        if let Some(cached) = slot.get() {
            trace!("Variant cache hit: {} {key}", self.definition.name());
            return cached.clone();
        }

        let mut failure = None;
        let variant = slot
            .get_or_init(|| match compile(&key) {
                Ok(variant) => {
                    info!(
                        "Compiled shader '{}' variant {key} as {:?}",
                        self.definition.name(),
                        variant.program()
                    );
                    Some(Arc::new(variant))
                }
                Err(e) => {
                    failure = Some(e);
                    None
                }
            })
            .clone();

        // Reported once the slot is settled, so the callback may request variants.
        if let Some(e) = failure {
            self.report(&key, &e);
        }
        variant
    }

    fn slot(&self, key: &StaticParameterSet) -> VariantSlot {
        let mut variants = self.variants.lock();
        if let Some(slot) = variants.get(key) {
            return Arc::clone(slot);
        }
        let slot = VariantSlot::default();
        variants.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    fn report(&self, params: &StaticParameterSet, e: &ShaderError) {
        error!(
            "Shader '{}' variant {params} is unavailable: {e}",
            self.definition.name()
        );
        if let Some(callback) = &self.on_error {
            callback(self, params, e);
        }
    }

    fn compile_variant(
        &self,
        key: &StaticParameterSet,
        scratch: &mut CompileScratch,
    ) -> Result<CompiledVariant> {
        scratch.reset();
        for (stage, report) in self.prepare_sources(key, &mut scratch.stages) {
            if !report.is_clean() {
                warn!(
                    "Shader '{}' {stage} stage: {} include directive(s) could not be resolved",
                    self.definition.name(),
                    report.errors
                );
            }
        }

        let program = if self.use_program_binaries {
            let binary_key = self.definition.variant_key(key);
            scratch.binary = self.binaries.get(binary_key);
            let compiled = self.compiler.compile_cached(
                self.device.as_ref(),
                &mut scratch.stages,
                &mut scratch.binary,
            )?;
            if compiled.binary_updated
                && let Some(binary) = scratch.binary.take()
            {
                debug!("Stored program binary {binary_key:016x}");
                self.binaries.insert(binary_key, binary);
            }
            compiled.program
        } else {
            self.compiler.compile(self.device.as_ref(), &mut scratch.stages)?
        };

        Ok(CompiledVariant::new(
            Arc::clone(&self.device),
            program,
            key.clone(),
            self.definition.registry(),
        ))
    }

    /// Writes the generated, include-resolved source of every stage of
    /// `params` into `stages`.
    pub fn prepare_sources(
        &self,
        params: &StaticParameterSet,
        stages: &mut ShaderStages,
    ) -> SmallVec<[(ShaderStage, PreprocessReport); 3]> {
        self.definition.write_sources(params, stages);
        self.compiler.preprocess(stages, self.loader.as_ref())
    }

    /// Drops the cached entry for `params`, successful or failed. The next
    /// request compiles again. Returns whether an entry existed.
    pub fn evict(&self, params: &StaticParameterSet) -> bool {
        let Ok(key) = self.definition.canonicalize(params) else {
            return false;
        };
        self.variants.lock().remove(&key).is_some()
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.variants.lock().clear();
    }

    /// Number of cached, successfully compiled variants.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants
            .lock()
            .values()
            .filter(|slot| slot.get().is_some_and(Option::is_some))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::device::HeadlessDevice;
    use crate::shader::MemoryLoader;
    use crate::uniforms::UniformType;

    fn factory(fragment: &str) -> (Arc<HeadlessDevice>, VariantFactory) {
        let device = Arc::new(HeadlessDevice::new());
        let definition = ShaderDefinition::builder("test")
            .int_param("COUNT", 1, 4, 1)
            .primitive("u_Color", UniformType::Vec3)
            .stage_code(ShaderStage::Vertex, "void main() { gl_Position = vec4(0.0); }")
            .stage_code(ShaderStage::Fragment, fragment)
            .build()
            .unwrap();
        let factory = VariantFactory::new(
            device.clone(),
            definition,
            Arc::new(MemoryLoader::new()),
            &ShaderSettings::default(),
        );
        (device, factory)
    }

    #[test]
    fn variants_are_cached_per_parameter_set() {
        let (_device, factory) = factory("void main() { gl_FragColor = vec4(u_Color, COUNT); }");
        let defaults = factory.default_params();

        let a = factory.get_variant(&defaults).unwrap();
        let b = factory.get_variant(&StaticParameterSet::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = factory.get_variant(&defaults.clone().with("COUNT", 3_i64)).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.variant_count(), 2);
    }

    #[test]
    fn failures_are_reported_once_and_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (_device, factory) = factory("#error broken shader\nvoid main() {}");
        let factory = factory.with_error_callback(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let params = factory.default_params();
        assert!(factory.get_variant(&params).is_none());
        assert!(factory.get_variant(&params).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(factory.evict(&params));
        assert!(factory.get_variant(&params).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn binaries_are_stored_and_reused() {
        let (device, factory) = factory("void main() { gl_FragColor = vec4(u_Color, 1.0); }");
        let params = factory.default_params();

        let first = factory.get_variant(&params).unwrap();
        assert_eq!(factory.binaries().len(), 1);
        drop(first);
        factory.clear();

        let _second = factory.get_variant(&params).unwrap();
        assert_eq!(device.stats().binaries_loaded, 1);
    }
}
