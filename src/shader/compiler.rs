//! Shader Compiler
//!
//! Turns per-stage GLSL into a linked program object.
//!
//! ## Pipeline
//!
//! 1. *(optional)* load a cached [`ProgramBinary`]; if the driver accepts it
//!    the job ends here
//! 2. prepend the version/extension preamble to every present stage
//! 3. compile each stage; the first failure aborts the job
//! 4. attach, link, then detach and delete the stage objects
//! 5. *(binary path only)* extract a fresh binary for the caller's cache
//!
//! Every failure tears down all stage and program objects the job created
//! and reports the driver log; there is never a half-built program.

use std::ops::{Deref, DerefMut};

use log::debug;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::loader::IncludeLoader;
use super::preprocessor::{IncludePreprocessor, PreprocessReport};
use super::stage::{ShaderStage, ShaderStages};
use crate::device::{GraphicsDevice, ProgramBinary, ProgramHandle, StageHandle};
use crate::errors::CompileError;
use crate::settings::ShaderSettings;

/// Result of a successful [`ShaderCompiler::compile_cached`] job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledProgram {
    pub program: ProgramHandle,
    /// The binary slot was filled with a fresh binary.
    pub binary_updated: bool,
}

// ─── CompileJob ───────────────────────────────────────────────────────────────

/// GPU objects of one in-flight compilation. Dropping an unfinished job
/// deletes all of them.
struct CompileJob<'a> {
    device: &'a dyn GraphicsDevice,
    program: ProgramHandle,
    stages: SmallVec<[StageHandle; 3]>,
    finished: bool,
}

impl<'a> CompileJob<'a> {
    fn new(device: &'a dyn GraphicsDevice) -> Self {
        Self {
            device,
            program: device.create_program(),
            stages: SmallVec::new(),
            finished: false,
        }
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<(), CompileError> {
        let handle = self.device.create_stage(stage);
        self.stages.push(handle);
        if self.device.compile_stage(handle, source) {
            Ok(())
        } else {
            Err(CompileError::Stage {
                stage,
                log: self.device.stage_log(handle),
            })
        }
    }

    fn link(mut self) -> Result<ProgramHandle, CompileError> {
        for &stage in &self.stages {
            self.device.attach_stage(self.program, stage);
        }
        if !self.device.link_program(self.program) {
            return Err(CompileError::Link {
                log: self.device.program_log(self.program),
            });
        }

        // Detached stages can be freed without touching the linked executable.
        for &stage in &self.stages {
            self.device.detach_stage(self.program, stage);
            self.device.delete_stage(stage);
        }
        self.finished = true;
        Ok(self.program)
    }
}

impl Drop for CompileJob<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for &stage in &self.stages {
            self.device.detach_stage(self.program, stage);
            self.device.delete_stage(stage);
        }
        self.device.delete_program(self.program);
    }
}

// ─── ShaderCompiler ───────────────────────────────────────────────────────────

/// Compiles [`ShaderStages`] into program objects. See the module docs.
#[derive(Debug, Clone)]
pub struct ShaderCompiler {
    preamble: String,
    preprocessor: IncludePreprocessor,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new(&ShaderSettings::default())
    }
}

impl ShaderCompiler {
    #[must_use]
    pub fn new(settings: &ShaderSettings) -> Self {
        let mut preamble = format!("#version {}\n", settings.glsl_version);
        for extension in &settings.extensions {
            preamble.push_str("#extension ");
            preamble.push_str(extension);
            preamble.push_str(" : enable\n");
        }
        preamble.push_str("#line 1 0\n");

        Self {
            preamble,
            preprocessor: IncludePreprocessor::from_settings(settings),
        }
    }

    /// Replaces the include preprocessor used by [`preprocess`](Self::preprocess).
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: IncludePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Text prepended to every stage that lacks a `#version` line.
    #[inline]
    #[must_use]
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    #[inline]
    #[must_use]
    pub fn preprocessor(&self) -> &IncludePreprocessor {
        &self.preprocessor
    }

    /// Prepends the preamble unless the source already starts with `#version`.
    pub fn apply_preamble(&self, source: &mut String) {
        let has_version = source
            .trim_start()
            .strip_prefix('#')
            .is_some_and(|rest| rest.trim_start_matches([' ', '\t']).starts_with("version"));
        if !has_version {
            source.insert_str(0, &self.preamble);
        }
    }

    /// Resolves includes in every present stage.
    pub fn preprocess(
        &self,
        stages: &mut ShaderStages,
        loader: &dyn IncludeLoader,
    ) -> SmallVec<[(ShaderStage, PreprocessReport); 3]> {
        let mut reports = SmallVec::new();
        for stage in ShaderStage::ALL {
            if stages.is_present(stage) {
                let report = self.preprocessor.process(&mut stages[stage], loader);
                reports.push((stage, report));
            }
        }
        reports
    }

    /// Compiles and links from source.
    pub fn compile(
        &self,
        device: &dyn GraphicsDevice,
        stages: &mut ShaderStages,
    ) -> Result<ProgramHandle, CompileError> {
        if stages.present().next().is_none() {
            return Err(CompileError::NoStages);
        }

        let mut job = CompileJob::new(device);
        for stage in ShaderStage::ALL {
            if !stages.is_present(stage) {
                continue;
            }
            self.apply_preamble(&mut stages[stage]);
            job.compile_stage(stage, &stages[stage])?;
        }
        job.link()
    }

    /// Compiles with a binary cache slot.
    ///
    /// A binary in `binary` is tried first. If the slot is empty or the driver
    /// rejects it, the program is built from source and the slot receives the
    /// new binary, reported through [`CompiledProgram::binary_updated`].
    pub fn compile_cached(
        &self,
        device: &dyn GraphicsDevice,
        stages: &mut ShaderStages,
        binary: &mut Option<ProgramBinary>,
    ) -> Result<CompiledProgram, CompileError> {
        if let Some(cached) = binary.as_ref() {
            let program = device.create_program();
            if device.load_program_binary(program, cached) && device.link_status(program) {
                debug!("Loaded program {program:?} from cached binary");
                return Ok(CompiledProgram {
                    program,
                    binary_updated: false,
                });
            }
            debug!(
                "Cached program binary rejected, recompiling from source: {}",
                device.program_log(program).trim_end()
            );
            device.delete_program(program);
        }

        let program = self.compile(device, stages)?;
        let fresh = device.program_binary(program);
        let binary_updated = fresh.is_some();
        if fresh.is_some() {
            *binary = fresh;
        }

        Ok(CompiledProgram {
            program,
            binary_updated,
        })
    }
}

// ─── Scratch ──────────────────────────────────────────────────────────────────

/// Reusable buffers for one compilation at a time.
///
/// A worker thread can own one for its whole life; otherwise borrow one from
/// a [`ScratchPool`].
#[derive(Debug, Default)]
pub struct CompileScratch {
    pub stages: ShaderStages,
    pub binary: Option<ProgramBinary>,
}

impl CompileScratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the buffers, keeping their allocations.
    pub fn reset(&mut self) {
        self.stages.clear();
        self.binary = None;
    }
}

/// Pool of [`CompileScratch`] buffers shared by concurrent compilations.
#[derive(Debug, Default)]
pub struct ScratchPool {
    free: Mutex<Vec<CompileScratch>>,
}

impl ScratchPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a scratch buffer, creating one if the pool is empty. It returns
    /// to the pool when the guard drops.
    pub fn acquire(&self) -> ScratchGuard<'_> {
        let scratch = self.free.lock().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            scratch,
        }
    }

    /// Buffers currently idle in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

/// Exclusive use of one pooled [`CompileScratch`].
#[derive(Debug)]
pub struct ScratchGuard<'a> {
    pool: &'a ScratchPool,
    scratch: CompileScratch,
}

impl Deref for ScratchGuard<'_> {
    type Target = CompileScratch;

    fn deref(&self) -> &CompileScratch {
        &self.scratch
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut CompileScratch {
        &mut self.scratch
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.reset();
        self.pool.free.lock().push(scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_lists_extensions() {
        let settings = ShaderSettings {
            glsl_version: "450".into(),
            extensions: vec!["GL_EXT_a".into(), "GL_EXT_b".into()],
            ..Default::default()
        };
        let compiler = ShaderCompiler::new(&settings);
        assert_eq!(
            compiler.preamble(),
            "#version 450\n#extension GL_EXT_a : enable\n#extension GL_EXT_b : enable\n#line 1 0\n"
        );
    }

    #[test]
    fn preamble_is_applied_once() {
        let compiler = ShaderCompiler::default();
        let mut source = "void main() {}\n".to_string();
        compiler.apply_preamble(&mut source);
        let once = source.clone();
        compiler.apply_preamble(&mut source);
        assert_eq!(source, once);
        assert!(source.starts_with("#version 330 core\n"));
    }

    #[test]
    fn scratch_returns_to_pool_cleared() {
        let pool = ScratchPool::new();
        {
            let mut scratch = pool.acquire();
            scratch.stages[ShaderStage::Vertex].push_str("void main() {}");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        let scratch = pool.acquire();
        assert!(!scratch.stages.is_present(ShaderStage::Vertex));
    }
}
