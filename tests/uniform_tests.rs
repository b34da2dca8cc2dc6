//! Uniform Tests
//!
//! Tests for:
//! - Registry resolution against a linked program
//! - Struct arrays, primitive arrays and optimized-out uniforms
//! - Typed and dynamic access through CompiledVariant

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3};
use myth_shading::device::{GraphicsDevice, HeadlessDevice};
use myth_shading::shader::{ShaderCompiler, ShaderStages};
use myth_shading::uniforms::{
    TextureHandle, UniformDecl, UniformRegistry, UniformType, UniformValue,
};
use myth_shading::variant::{CompiledVariant, StaticParameterSet, UniformCheck};

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> UniformRegistry {
    UniformRegistry::builder()
        .struct_decl(
            "Light",
            [
                UniformDecl::primitive("color", UniformType::Vec3),
                UniformDecl::primitive("power", UniformType::Float).array(2),
            ],
        )
        .uniform(UniformDecl::structure("u_Lights", "Light").array(2))
        .uniform(UniformDecl::primitive("u_Mvp", UniformType::Mat4))
        .uniform(UniformDecl::primitive("u_Normal", UniformType::Mat3))
        .uniform(UniformDecl::primitive("u_Unused", UniformType::Float))
        .uniform(UniformDecl::primitive("u_Albedo", UniformType::Sampler2D))
        .build()
        .unwrap()
}

/// Links a program whose stages reference every uniform except `u_Unused`.
fn link(device: &Arc<HeadlessDevice>, registry: &UniformRegistry) -> CompiledVariant {
    let mut declarations = String::new();
    registry.emit_glsl(&mut declarations);

    let vertex = format!(
        "{declarations}void main() {{ gl_Position = u_Mvp * vec4(u_Normal * vec3(1.0), 1.0); }}\n"
    );
    let fragment = format!(
        "{declarations}void main() {{\n\
         gl_FragColor = texture(u_Albedo, vec2(0.0)) * vec4(u_Lights[0].color, u_Lights[1].power[1]);\n\
         }}\n"
    );

    let mut stages = ShaderStages::from_vertex_fragment(vertex, fragment);
    let program = ShaderCompiler::default()
        .compile(device.as_ref(), &mut stages)
        .unwrap();
    CompiledVariant::new(device.clone(), program, StaticParameterSet::new(), registry)
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn struct_array_leaves_resolve_to_contiguous_locations() {
    let device = Arc::new(HeadlessDevice::new());
    let registry = registry();
    let variant = link(&device, &registry);
    let table = variant.table();

    // 2 lights x (color + power array) + 4 primitives
    assert_eq!(table.len(), 8);
    assert_eq!(table.active_count(), 7);

    let color0 = table.get("u_Lights[0].color").unwrap().handle.unwrap();
    let power0 = table.get("u_Lights[0].power").unwrap();
    let color1 = table.get("u_Lights[1].color").unwrap().handle.unwrap();

    assert_eq!(power0.len(), 2);
    assert_eq!(power0.handle, Some(color0.offset(1)));
    assert_eq!(color1, color0.offset(3));
    assert_eq!(
        device.uniform_location(variant.program(), "u_Lights[1].power[1]"),
        Some(color1.offset(2))
    );
}

#[test]
fn uniform_checks_distinguish_missing_and_optimized_out() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());

    assert_eq!(variant.check_uniform("u_Nope"), UniformCheck::Missing);
    assert_eq!(variant.check_uniform("u_Unused"), UniformCheck::OptimizedOut);
    assert!(matches!(variant.check_uniform("u_Mvp"), UniformCheck::Exists(_)));

    let info = variant.uniform_info("u_Unused").unwrap();
    assert_eq!(info.ty, UniformType::Float);
    assert!(!info.is_active());
}

// ============================================================================
// Typed Access
// ============================================================================

#[test]
fn writes_reach_the_device() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());
    let mvp = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

    assert!(variant.set_uniform("u_Mvp", mvp));
    assert_eq!(variant.get_uniform("u_Mvp", Mat4::IDENTITY), Some(mvp));

    let UniformCheck::Exists(location) = variant.check_uniform("u_Mvp") else {
        panic!("u_Mvp should be live");
    };
    assert_eq!(
        device.uniform_value(variant.program(), location),
        Some(UniformValue::Mat4(mvp))
    );
    assert_eq!(device.stats().invalid_uploads, 0);
}

#[test]
fn fresh_variants_read_zero() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());

    assert_eq!(variant.get_uniform("u_Normal", Mat3::IDENTITY), Some(Mat3::ZERO));
    assert_eq!(
        variant.get_uniform_array("u_Lights[0].power", 1.0_f32),
        Some(vec![0.0, 0.0])
    );
    assert_eq!(device.stats().uniform_uploads, 0);
}

#[test]
fn mat3_and_textures_round_trip() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());
    let normal = Mat3::from_cols(Vec3::X, Vec3::Z, Vec3::Y);

    assert!(variant.set_uniform("u_Normal", normal));
    assert!(variant.set_uniform("u_Albedo", TextureHandle::new(4)));

    assert_eq!(variant.get_uniform("u_Normal", Mat3::IDENTITY), Some(normal));
    assert_eq!(
        variant.get_uniform("u_Albedo", TextureHandle::NULL),
        Some(TextureHandle::new(4))
    );
}

#[test]
fn array_elements_use_consecutive_locations() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());

    assert!(variant.set_uniform_element("u_Lights[1].power", 1, 2.5_f32));
    assert_eq!(
        variant.get_uniform_array("u_Lights[1].power", 0.0_f32),
        Some(vec![0.0, 2.5])
    );

    let base = variant.uniform_info("u_Lights[1].power").unwrap().handle.unwrap();
    assert_eq!(
        device.uniform_value(variant.program(), base.offset(1)),
        Some(UniformValue::Float(2.5))
    );
}

#[test]
fn optimized_out_uniforms_accept_writes_silently() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());

    assert!(variant.set_uniform("u_Unused", 3.0_f32));
    assert_eq!(variant.get_uniform("u_Unused", 7.0_f32), Some(7.0));
    assert_eq!(variant.value("u_Unused"), Some(UniformValue::Float(0.0)));
    assert_eq!(device.stats().uniform_uploads, 0);
}

#[test]
fn missing_uniforms_report_absence() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());

    assert!(!variant.set_uniform("u_Nope", 1.0_f32));
    assert_eq!(variant.get_uniform("u_Nope", 1.0_f32), None);
    assert_eq!(variant.value("u_Nope"), None);
}

#[test]
#[should_panic(expected = "accessed as")]
fn wrong_rust_type_panics() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());
    variant.set_uniform("u_Mvp", 1.0_f32);
}

// ============================================================================
// Dynamic Access
// ============================================================================

#[test]
fn dynamic_values_respect_bounds() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());
    let red = UniformValue::Vec3(Vec3::X);

    assert!(variant.accepts("u_Lights[0].color", &red));
    assert!(!variant.accepts("u_Lights[0].power", &red));

    assert!(variant.set_value("u_Lights[0].color", red));
    assert_eq!(variant.value("u_Lights[0].color"), Some(red));

    assert!(!variant.set_element_value("u_Lights[0].power", 2, UniformValue::Float(1.0)));
    assert_eq!(variant.element_value("u_Lights[0].power", 2), None);
}

#[test]
fn dropping_a_variant_deletes_its_program() {
    let device = Arc::new(HeadlessDevice::new());
    let variant = link(&device, &registry());
    let program = variant.program();

    variant.activate();
    assert_eq!(device.bound_program(), Some(program));

    drop(variant);
    assert!(!device.is_program(program));
    assert_eq!(device.bound_program(), None);
    assert_eq!(device.stats().live_programs, 0);
}
