//! Headless Graphics Device
//!
//! A complete software [`GraphicsDevice`]: stages are compiled by a miniature
//! GLSL front end, programs are linked with real location assignment, and
//! uniform uploads are recorded so they can be inspected.
//!
//! # Driver behaviour
//!
//! | Concern | Behaviour |
//! |---------|-----------|
//! | Dead uniforms | A uniform no stage references is optimized out: it gets no location |
//! | Locations | Assigned sequentially at link; array elements are contiguous |
//! | Struct uniforms | Expanded to one location per leaf field (`u_Light.color`, `u_Lights[1].color`) |
//! | Stage deletion | Deferred while the stage is attached, as in GL |
//! | Binaries | JSON image of the linked stage sources, tagged with the driver string; another driver rejects it |
//!
//! ```rust,ignore
//! let device = HeadlessDevice::new();
//! let program = ShaderCompiler::default().compile(&device, &mut stages)?.program;
//! let loc = device.uniform_location(program, "u_Color").unwrap();
//! device.set_uniform(program, loc, &UniformValue::Vec3(Vec3::X));
//! assert_eq!(device.uniform_value(program, loc), Some(UniformValue::Vec3(Vec3::X)));
//! ```

mod glsl;

use std::sync::Arc;

use log::{trace, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use self::glsl::{Declarator, StageAnalysis};
use super::{GraphicsDevice, ProgramBinary, ProgramHandle, StageHandle, UniformHandle};
use crate::shader::ShaderStage;
use crate::uniforms::{UniformType, UniformValue};

/// Format tag of headless program binaries.
pub const BINARY_FORMAT: u32 = 0x4D59_5448;

/// Driver string of a default-constructed device.
pub const DEFAULT_DRIVER: &str = "myth-headless 1.0";

/// Object and traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Stage objects not yet deleted.
    pub live_stages: usize,
    /// Program objects not yet deleted.
    pub live_programs: usize,
    /// Source compilations performed (binaries excluded).
    pub stages_compiled: usize,
    /// Successful links from source.
    pub programs_linked: usize,
    pub binaries_loaded: usize,
    pub binaries_rejected: usize,
    /// Accepted `set_uniform` calls.
    pub uniform_uploads: usize,
    /// `set_uniform` calls with a bad location or mismatched type.
    pub invalid_uploads: usize,
}

// ─── Objects ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StageObject {
    kind: ShaderStage,
    source: String,
    analysis: Option<Arc<StageAnalysis>>,
    log: String,
    delete_pending: bool,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<StageHandle>,
    linked: Option<Arc<LinkedProgram>>,
    log: String,
    values: FxHashMap<UniformHandle, UniformValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BinaryImage {
    driver: String,
    stages: Vec<(ShaderStage, String)>,
}

/// An atomic uniform as the linker lays it out.
#[derive(Debug, PartialEq)]
struct Leaf {
    name: String,
    ty: UniformType,
    count: u32,
    array: bool,
}

fn collect_leaves(
    prefix: &str,
    ty: &str,
    array_len: Option<u32>,
    structs: &FxHashMap<String, Vec<Declarator>>,
    out: &mut Vec<Leaf>,
) {
    if let Some(ty) = UniformType::from_glsl(ty) {
        out.push(Leaf {
            name: prefix.to_string(),
            ty,
            count: array_len.unwrap_or(1),
            array: array_len.is_some(),
        });
        return;
    }

    let Some(fields) = structs.get(ty) else {
        return;
    };
    match array_len {
        None => {
            for field in fields {
                let name = format!("{prefix}.{}", field.name);
                collect_leaves(&name, &field.ty, field.array_len, structs, out);
            }
        }
        Some(len) => {
            for index in 0..len {
                for field in fields {
                    let name = format!("{prefix}[{index}].{}", field.name);
                    collect_leaves(&name, &field.ty, field.array_len, structs, out);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct LinkedProgram {
    slots: Vec<UniformType>,
    locations: FxHashMap<String, u32>,
    arrays: FxHashMap<String, (u32, u32)>,
    sources: Vec<(ShaderStage, String)>,
}

impl LinkedProgram {
    fn link(stages: &[(ShaderStage, Arc<StageAnalysis>, String)]) -> Result<Self, String> {
        if !stages.iter().any(|(kind, ..)| *kind == ShaderStage::Vertex) {
            return Err("ERROR: Linking failed, no vertex shader attached.\n".to_string());
        }
        for (kind, analysis, _) in stages {
            if stages.iter().filter(|(k, ..)| k == kind).count() > 1 {
                return Err(format!("ERROR: Multiple {kind} shaders attached.\n"));
            }
            if !analysis.has_main {
                return Err(format!(
                    "ERROR: {kind} shader does not contain a 'main' function.\n"
                ));
            }
        }

        // Declaration order of first appearance; activity is the union over stages.
        let mut merged: Vec<(Vec<Leaf>, bool)> = Vec::new();
        let mut by_name: FxHashMap<&str, usize> = FxHashMap::default();
        for (_, analysis, _) in stages {
            for decl in &analysis.uniforms {
                let mut leaves = Vec::new();
                collect_leaves(
                    &decl.name,
                    &decl.ty,
                    decl.array_len,
                    &analysis.structs,
                    &mut leaves,
                );
                let active = analysis.referenced.contains(&decl.name);

                if let Some(&index) = by_name.get(decl.name.as_str()) {
                    let entry = &mut merged[index];
                    if entry.0 != leaves {
                        return Err(format!(
                            "ERROR: Uniform '{}' differs between shader stages.\n",
                            decl.name
                        ));
                    }
                    entry.1 |= active;
                } else {
                    by_name.insert(&decl.name, merged.len());
                    merged.push((leaves, active));
                }
            }
        }

        let mut linked = Self {
            sources: stages
                .iter()
                .map(|(kind, _, source)| (*kind, source.clone()))
                .collect(),
            ..Self::default()
        };
        for leaf in merged
            .into_iter()
            .filter(|(_, active)| *active)
            .flat_map(|(leaves, _)| leaves)
        {
            let base = linked.slots.len() as u32;
            linked
                .slots
                .extend(std::iter::repeat_n(leaf.ty, leaf.count as usize));
            if leaf.array {
                linked.locations.insert(format!("{}[0]", leaf.name), base);
                linked.arrays.insert(leaf.name.clone(), (base, leaf.count));
            }
            linked.locations.insert(leaf.name, base);
        }

        Ok(linked)
    }

    fn location(&self, name: &str) -> Option<u32> {
        if let Some(&loc) = self.locations.get(name) {
            return Some(loc);
        }
        let inner = name.strip_suffix(']')?;
        let open = inner.rfind('[')?;
        let index: u32 = inner[open + 1..].parse().ok()?;
        let &(base, len) = self.arrays.get(&inner[..open])?;
        (index < len).then_some(base + index)
    }
}

// ─── Device ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u32,
    stages: FxHashMap<StageHandle, StageObject>,
    programs: FxHashMap<ProgramHandle, ProgramObject>,
    bound: Option<ProgramHandle>,
    stats: DeviceStats,
}

impl DeviceState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn is_attached(&self, stage: StageHandle) -> bool {
        self.programs.values().any(|p| p.attached.contains(&stage))
    }

    fn collect_pending(&mut self, stage: StageHandle) {
        let pending = self.stages.get(&stage).is_some_and(|s| s.delete_pending);
        if pending && !self.is_attached(stage) {
            self.stages.remove(&stage);
        }
    }
}

/// Software graphics device. See the module docs.
#[derive(Debug)]
pub struct HeadlessDevice {
    driver: String,
    state: Mutex<DeviceState>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_driver(DEFAULT_DRIVER)
    }

    /// A device reporting a specific driver string. Binaries produced by a
    /// device with a different driver string are rejected.
    #[must_use]
    pub fn with_driver(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            state: Mutex::new(DeviceState::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        let state = self.state.lock();
        DeviceStats {
            live_stages: state.stages.len(),
            live_programs: state.programs.len(),
            ..state.stats
        }
    }

    /// Program made current by the last [`GraphicsDevice::use_program`].
    #[must_use]
    pub fn bound_program(&self) -> Option<ProgramHandle> {
        self.state.lock().bound
    }

    /// Whether `program` names a live program object.
    #[must_use]
    pub fn is_program(&self, program: ProgramHandle) -> bool {
        self.state.lock().programs.contains_key(&program)
    }

    /// Value a draw with `program` would see at `location`: the last upload,
    /// or zero if nothing was uploaded. `None` for invalid locations.
    #[must_use]
    pub fn uniform_value(
        &self,
        program: ProgramHandle,
        location: UniformHandle,
    ) -> Option<UniformValue> {
        let state = self.state.lock();
        let object = state.programs.get(&program)?;
        let ty = *object.linked.as_ref()?.slots.get(location.0 as usize)?;
        Some(
            object
                .values
                .get(&location)
                .copied()
                .unwrap_or_else(|| UniformValue::zero(ty)),
        )
    }

    /// Names of the active atomic uniforms, sorted by location.
    #[must_use]
    pub fn active_uniforms(&self, program: ProgramHandle) -> Vec<String> {
        let state = self.state.lock();
        let Some(linked) = state.programs.get(&program).and_then(|p| p.linked.as_ref()) else {
            return Vec::new();
        };
        let mut names: Vec<_> = linked
            .locations
            .iter()
            .filter(|(name, _)| !name.ends_with("[0]") || !linked.arrays.contains_key(&name[..name.len() - 3]))
            .map(|(name, &loc)| (loc, name.clone()))
            .collect();
        names.sort();
        names.into_iter().map(|(_, name)| name).collect()
    }

    fn link_stages(
        &self,
        state: &DeviceState,
        program: ProgramHandle,
    ) -> Result<LinkedProgram, String> {
        let object = state
            .programs
            .get(&program)
            .ok_or_else(|| "ERROR: Invalid program object.\n".to_string())?;

        let mut stages = Vec::with_capacity(object.attached.len());
        for handle in &object.attached {
            let stage = state
                .stages
                .get(handle)
                .ok_or_else(|| "ERROR: Invalid shader object attached.\n".to_string())?;
            let analysis = stage.analysis.clone().ok_or_else(|| {
                format!(
                    "ERROR: Linking with uncompiled/unsuccessfully compiled {} shader.\n",
                    stage.kind
                )
            })?;
            stages.push((stage.kind, analysis, stage.source.clone()));
        }
        stages.sort_by_key(|(kind, ..)| *kind);
        LinkedProgram::link(&stages)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_stage(&self, stage: ShaderStage) -> StageHandle {
        let mut state = self.state.lock();
        let handle = StageHandle(state.next_id());
        state.stages.insert(
            handle,
            StageObject {
                kind: stage,
                source: String::new(),
                analysis: None,
                log: String::new(),
                delete_pending: false,
            },
        );
        handle
    }

    fn compile_stage(&self, stage: StageHandle, source: &str) -> bool {
        let mut state = self.state.lock();
        state.stats.stages_compiled += 1;
        let Some(object) = state.stages.get_mut(&stage) else {
            warn!("compile_stage on unknown stage {stage:?}");
            return false;
        };

        object.source = source.to_string();
        match glsl::analyze(source) {
            Ok(analysis) => {
                trace!(
                    "Compiled {} stage {stage:?}: {} uniforms",
                    object.kind,
                    analysis.uniforms.len()
                );
                object.analysis = Some(Arc::new(analysis));
                object.log.clear();
                true
            }
            Err(log) => {
                object.analysis = None;
                object.log = log;
                false
            }
        }
    }

    fn stage_log(&self, stage: StageHandle) -> String {
        self.state
            .lock()
            .stages
            .get(&stage)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_stage(&self, stage: StageHandle) {
        let mut state = self.state.lock();
        if let Some(object) = state.stages.get_mut(&stage) {
            object.delete_pending = true;
        }
        state.collect_pending(stage);
    }

    fn create_program(&self) -> ProgramHandle {
        let mut state = self.state.lock();
        let handle = ProgramHandle(state.next_id());
        state.programs.insert(handle, ProgramObject::default());
        handle
    }

    fn attach_stage(&self, program: ProgramHandle, stage: StageHandle) {
        let mut state = self.state.lock();
        if !state.stages.contains_key(&stage) {
            warn!("attach_stage with unknown stage {stage:?}");
            return;
        }
        if let Some(object) = state.programs.get_mut(&program)
            && !object.attached.contains(&stage)
        {
            object.attached.push(stage);
        }
    }

    fn detach_stage(&self, program: ProgramHandle, stage: StageHandle) {
        let mut state = self.state.lock();
        if let Some(object) = state.programs.get_mut(&program) {
            object.attached.retain(|&s| s != stage);
        }
        state.collect_pending(stage);
    }

    fn link_program(&self, program: ProgramHandle) -> bool {
        let mut state = self.state.lock();
        let result = self.link_stages(&state, program);
        let Some(object) = state.programs.get_mut(&program) else {
            return false;
        };
        object.values.clear();

        match result {
            Ok(linked) => {
                object.linked = Some(Arc::new(linked));
                object.log.clear();
                state.stats.programs_linked += 1;
                true
            }
            Err(log) => {
                object.linked = None;
                object.log = log;
                false
            }
        }
    }

    fn link_status(&self, program: ProgramHandle) -> bool {
        self.state
            .lock()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked.is_some())
    }

    fn program_log(&self, program: ProgramHandle) -> String {
        self.state
            .lock()
            .programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&self, program: ProgramHandle) {
        let mut state = self.state.lock();
        let Some(object) = state.programs.remove(&program) else {
            return;
        };
        if state.bound == Some(program) {
            state.bound = None;
        }
        for stage in object.attached {
            state.collect_pending(stage);
        }
    }

    fn load_program_binary(&self, program: ProgramHandle, binary: &ProgramBinary) -> bool {
        let image = (binary.format == BINARY_FORMAT)
            .then(|| serde_json::from_slice::<BinaryImage>(&binary.bytes).ok())
            .flatten()
            .filter(|image| image.driver == self.driver);

        let linked = image.and_then(|image| {
            let mut stages = Vec::with_capacity(image.stages.len());
            for (kind, source) in image.stages {
                let analysis = glsl::analyze(&source).ok()?;
                stages.push((kind, Arc::new(analysis), source));
            }
            LinkedProgram::link(&stages).ok()
        });

        let mut state = self.state.lock();
        let accepted = linked.is_some();
        if accepted {
            state.stats.binaries_loaded += 1;
        } else {
            state.stats.binaries_rejected += 1;
        }

        let Some(object) = state.programs.get_mut(&program) else {
            return false;
        };
        object.values.clear();
        object.linked = linked.map(Arc::new);
        object.log = if accepted {
            String::new()
        } else {
            "ERROR: Program binary is not compatible with this driver.\n".to_string()
        };
        accepted
    }

    fn program_binary(&self, program: ProgramHandle) -> Option<ProgramBinary> {
        let state = self.state.lock();
        let linked = state.programs.get(&program)?.linked.as_ref()?;
        let image = BinaryImage {
            driver: self.driver.clone(),
            stages: linked.sources.clone(),
        };
        let bytes = serde_json::to_vec(&image).ok()?;
        Some(ProgramBinary::new(BINARY_FORMAT, bytes))
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformHandle> {
        let state = self.state.lock();
        let linked = state.programs.get(&program)?.linked.as_ref()?;
        linked.location(name).map(UniformHandle)
    }

    fn set_uniform(&self, program: ProgramHandle, location: UniformHandle, value: &UniformValue) {
        let mut state = self.state.lock();
        let slot = state
            .programs
            .get(&program)
            .and_then(|p| p.linked.as_ref())
            .and_then(|linked| linked.slots.get(location.0 as usize).copied());

        match slot {
            Some(ty) if value.matches(ty) => {
                if let Some(object) = state.programs.get_mut(&program) {
                    object.values.insert(location, *value);
                }
                state.stats.uniform_uploads += 1;
            }
            Some(ty) => {
                warn!(
                    "set_uniform: {} value written to {ty} at {location} of {program:?}",
                    value.kind_name()
                );
                state.stats.invalid_uploads += 1;
            }
            None => {
                warn!("set_uniform: invalid {location} for {program:?}");
                state.stats.invalid_uploads += 1;
            }
        }
    }

    fn use_program(&self, program: ProgramHandle) {
        let mut state = self.state.lock();
        if program.is_null() {
            state.bound = None;
        } else if state
            .programs
            .get(&program)
            .is_some_and(|p| p.linked.is_some())
        {
            state.bound = Some(program);
        } else {
            warn!("use_program: {program:?} is not a linked program");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "uniform mat4 u_Mvp;\nvoid main() { gl_Position = u_Mvp * vec4(0.0); }\n";
    const FS: &str = "struct Light { vec3 color; float power[2]; };\n\
                      uniform Light u_Lights[2];\n\
                      uniform float u_Unused;\n\
                      void main() { gl_FragColor = vec4(u_Lights[0].color, 1.0); }\n";

    fn link(device: &HeadlessDevice, sources: &[(ShaderStage, &str)]) -> ProgramHandle {
        let program = device.create_program();
        for &(kind, source) in sources {
            let stage = device.create_stage(kind);
            assert!(device.compile_stage(stage, source), "{}", device.stage_log(stage));
            device.attach_stage(program, stage);
        }
        assert!(device.link_program(program), "{}", device.program_log(program));
        program
    }

    #[test]
    fn struct_arrays_expand_to_contiguous_leaves() {
        let device = HeadlessDevice::new();
        let program = link(&device, &[(ShaderStage::Vertex, VS), (ShaderStage::Fragment, FS)]);

        assert_eq!(device.uniform_location(program, "u_Mvp"), Some(UniformHandle(0)));
        assert_eq!(
            device.uniform_location(program, "u_Lights[0].color"),
            Some(UniformHandle(1))
        );
        assert_eq!(
            device.uniform_location(program, "u_Lights[0].power[1]"),
            Some(UniformHandle(3))
        );
        assert_eq!(
            device.uniform_location(program, "u_Lights[1].color"),
            Some(UniformHandle(4))
        );
        assert_eq!(device.uniform_location(program, "u_Lights[0].power[2]"), None);
        assert_eq!(device.uniform_location(program, "u_Unused"), None);
    }

    #[test]
    fn mismatched_uniform_types_fail_to_link() {
        let device = HeadlessDevice::new();
        let program = device.create_program();
        for (kind, source) in [
            (ShaderStage::Vertex, "uniform vec3 u_X;\nvoid main() { u_X; }\n"),
            (ShaderStage::Fragment, "uniform vec4 u_X;\nvoid main() { u_X; }\n"),
        ] {
            let stage = device.create_stage(kind);
            assert!(device.compile_stage(stage, source));
            device.attach_stage(program, stage);
        }
        assert!(!device.link_program(program));
        assert!(device.program_log(program).contains("u_X"));
    }

    #[test]
    fn deleting_an_attached_stage_is_deferred() {
        let device = HeadlessDevice::new();
        let program = link(&device, &[(ShaderStage::Vertex, VS)]);
        assert_eq!(device.stats().live_stages, 1);

        let stage = device.state.lock().programs[&program].attached[0];
        device.delete_stage(stage);
        assert_eq!(device.stats().live_stages, 1);

        device.detach_stage(program, stage);
        assert_eq!(device.stats().live_stages, 0);
        assert!(device.link_status(program));
    }

    #[test]
    fn binaries_are_driver_specific() {
        let device = HeadlessDevice::new();
        let program = link(&device, &[(ShaderStage::Vertex, VS)]);
        let binary = device.program_binary(program).unwrap();

        let fresh = device.create_program();
        assert!(device.load_program_binary(fresh, &binary));
        assert_eq!(device.uniform_location(fresh, "u_Mvp"), Some(UniformHandle(0)));

        let other = HeadlessDevice::with_driver("other 2.0");
        let foreign = other.create_program();
        assert!(!other.load_program_binary(foreign, &binary));
        assert!(!other.link_status(foreign));
        assert_eq!(other.stats().binaries_rejected, 1);
    }

    #[test]
    fn uploads_are_type_checked() {
        let device = HeadlessDevice::new();
        let program = link(&device, &[(ShaderStage::Vertex, VS)]);
        let loc = UniformHandle(0);

        device.set_uniform(program, loc, &UniformValue::Float(1.0));
        assert_eq!(device.stats().invalid_uploads, 1);
        assert_eq!(device.uniform_value(program, loc), Some(UniformValue::zero(UniformType::Mat4)));

        device.set_uniform(program, loc, &UniformValue::Mat4(glam::Mat4::IDENTITY));
        assert_eq!(
            device.uniform_value(program, loc),
            Some(UniformValue::Mat4(glam::Mat4::IDENTITY))
        );
    }
}
