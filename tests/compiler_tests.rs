//! ShaderCompiler tests
//!
//! Tests for:
//! - Source compilation and GPU object cleanup
//! - Stage and link failures with their driver logs
//! - Include diagnostics surfacing in the stage log
//! - The binary cache path and its source fallback

use myth_shading::device::{GraphicsDevice, HeadlessDevice};
use myth_shading::errors::CompileError;
use myth_shading::settings::ShaderSettings;
use myth_shading::shader::{
    MemoryLoader, ProgramBinaryCache, ShaderCompiler, ShaderStage, ShaderStages,
};

// ============================================================================
// Helpers
// ============================================================================

const VERTEX: &str = "uniform mat4 u_Mvp;\nvoid main() { gl_Position = u_Mvp * vec4(0.0); }\n";
const FRAGMENT: &str = "uniform vec3 u_Color;\nvoid main() { gl_FragColor = vec4(u_Color, 1.0); }\n";

fn stages() -> ShaderStages {
    ShaderStages::from_vertex_fragment(VERTEX, FRAGMENT)
}

// ============================================================================
// Source Compilation
// ============================================================================

#[test]
fn compile_links_and_frees_stage_objects() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();

    let program = compiler.compile(&device, &mut stages())?;

    assert!(device.link_status(program));
    assert!(device.uniform_location(program, "u_Mvp").is_some());
    assert!(device.uniform_location(program, "u_Color").is_some());

    let stats = device.stats();
    assert_eq!(stats.live_stages, 0);
    assert_eq!(stats.live_programs, 1);
    assert_eq!(stats.stages_compiled, 2);
    assert_eq!(stats.programs_linked, 1);
    Ok(())
}

#[test]
fn preamble_is_prepended_once() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();

    let mut sources = stages();
    compiler.compile(&device, &mut sources)?;
    assert!(sources[ShaderStage::Vertex].starts_with("#version 330 core\n#line 1 0\n"));

    let before = sources[ShaderStage::Vertex].clone();
    compiler.compile(&device, &mut sources)?;
    assert_eq!(sources[ShaderStage::Vertex], before);
    Ok(())
}

#[test]
fn extensions_appear_in_preamble() {
    let settings = ShaderSettings {
        glsl_version: "300 es".to_string(),
        extensions: vec!["GL_OES_standard_derivatives".to_string()],
        ..ShaderSettings::default()
    };
    let compiler = ShaderCompiler::new(&settings);
    assert_eq!(
        compiler.preamble(),
        "#version 300 es\n#extension GL_OES_standard_derivatives : enable\n#line 1 0\n"
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn stage_failure_reports_log_and_cleans_up() {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();
    let mut sources = ShaderStages::from_vertex_fragment(VERTEX, "#error bad fragment\nvoid main() {}\n");

    let err = compiler.compile(&device, &mut sources).unwrap_err();
    match &err {
        CompileError::Stage { stage, log } => {
            assert_eq!(*stage, ShaderStage::Fragment);
            assert!(log.contains("ERROR: 0:1: '#error' : bad fragment"), "{log}");
            assert!(log.contains("1 compilation errors.  No code generated."), "{log}");
        }
        other => panic!("expected a stage error, got {other:?}"),
    }

    let stats = device.stats();
    assert_eq!(stats.live_stages, 0);
    assert_eq!(stats.live_programs, 0);
}

#[test]
fn link_failure_reports_log_and_cleans_up() {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();
    let mut sources = ShaderStages::new().with(ShaderStage::Fragment, FRAGMENT);

    let err = compiler.compile(&device, &mut sources).unwrap_err();
    assert!(matches!(&err, CompileError::Link { log } if log.contains("no vertex shader")));

    let stats = device.stats();
    assert_eq!(stats.live_stages, 0);
    assert_eq!(stats.live_programs, 0);
}

#[test]
fn empty_stage_set_is_rejected() {
    let device = HeadlessDevice::new();
    let err = ShaderCompiler::default()
        .compile(&device, &mut ShaderStages::new())
        .unwrap_err();
    assert_eq!(err, CompileError::NoStages);
    assert_eq!(device.stats().live_programs, 0);
}

#[test]
fn unresolved_include_fails_with_its_location() {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();
    let mut sources = ShaderStages::from_vertex_fragment(
        VERTEX,
        "float a;\n#pragma include \"nope\"\nvoid main() {}\n",
    );

    let reports = compiler.preprocess(&mut sources, &MemoryLoader::new());
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].0, ShaderStage::Fragment);
    assert_eq!(reports[1].1.errors, 1);

    let err = compiler.compile(&device, &mut sources).unwrap_err();
    let CompileError::Stage { log, .. } = err else {
        panic!("expected a stage error");
    };
    assert!(
        log.contains("ERROR: 0:2: '#error' : failed to load include file \"nope\""),
        "{log}"
    );
}

// ============================================================================
// Program Binaries
// ============================================================================

#[test]
fn cached_binary_skips_source_compilation() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let compiler = ShaderCompiler::default();

    let mut binary = None;
    let first = compiler.compile_cached(&device, &mut stages(), &mut binary)?;
    assert!(first.binary_updated);
    assert!(binary.is_some());

    let compiled_before = device.stats().stages_compiled;
    let second = compiler.compile_cached(&device, &mut stages(), &mut binary)?;
    assert!(!second.binary_updated);
    assert_ne!(first.program, second.program);
    assert_eq!(device.stats().stages_compiled, compiled_before);
    assert_eq!(device.stats().binaries_loaded, 1);
    assert!(device.uniform_location(second.program, "u_Color").is_some());
    Ok(())
}

#[test]
fn rejected_binary_falls_back_to_source() -> anyhow::Result<()> {
    let compiler = ShaderCompiler::default();

    let mut binary = None;
    compiler.compile_cached(&HeadlessDevice::new(), &mut stages(), &mut binary)?;
    let stale = binary.clone();

    let other = HeadlessDevice::with_driver("other driver");
    let compiled = compiler.compile_cached(&other, &mut stages(), &mut binary)?;

    assert!(compiled.binary_updated);
    assert_ne!(binary, stale);
    let stats = other.stats();
    assert_eq!(stats.binaries_rejected, 1);
    assert_eq!(stats.live_programs, 1);
    assert_eq!(stats.programs_linked, 1);
    Ok(())
}

#[test]
fn binary_cache_persists_to_disk() -> anyhow::Result<()> {
    let device = HeadlessDevice::new();
    let mut binary = None;
    ShaderCompiler::default().compile_cached(&device, &mut stages(), &mut binary)?;

    let cache = ProgramBinaryCache::new();
    let Some(binary) = binary else {
        anyhow::bail!("no binary produced");
    };
    cache.insert(0xfeed, binary.clone());

    let path = std::env::temp_dir().join(format!("myth_shading_binaries_{}.json", std::process::id()));
    cache.save(&path)?;
    let loaded = ProgramBinaryCache::load(&path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get(0xfeed), Some(binary));
    Ok(())
}
