//! Material Tests
//!
//! Tests for:
//! - Parameter writes, reads and write-through to the current variant
//! - Sparse array parameters
//! - Value preservation across static parameter changes
//! - Schema violations

use std::sync::Arc;

use glam::Vec3;

use myth_shading::device::HeadlessDevice;
use myth_shading::material::{Material, MaterialParam};
use myth_shading::settings::ShaderSettings;
use myth_shading::shader::{MemoryLoader, ShaderStage};
use myth_shading::uniforms::{TextureHandle, UniformDecl, UniformType, UniformValue};
use myth_shading::variant::{ShaderDefinition, StaticValue, UniformCheck, VariantFactory};

// ============================================================================
// Helpers
// ============================================================================

const FRAGMENT: &str = "void main() {\n\
                        \x20   vec4 c = vec4(u_Color, 1.0);\n\
                        #if SHADOW == SHADOW_PCF\n\
                        \x20   c *= texture(u_Shadow, vec2(0.0));\n\
                        #endif\n\
                        \x20   gl_FragColor = c;\n\
                        }\n";

fn setup() -> (Arc<HeadlessDevice>, Arc<VariantFactory>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let device = Arc::new(HeadlessDevice::new());
    let definition = ShaderDefinition::builder("lit")
        .enum_param("SHADOW", &["OFF", "PCF"], "OFF")
        .int_param("TAPS", 1, 4, 1)
        .primitive("u_Color", UniformType::Vec3)
        .primitive("u_Shadow", UniformType::Sampler2D)
        .primitive("u_Scale", UniformType::Float)
        .uniform(UniformDecl::primitive("u_Weights", UniformType::Float).array(4))
        .stage_code(
            ShaderStage::Vertex,
            "#if TAPS == 3\n#error three taps are unsupported\n#endif\n\
             void main() { gl_Position = vec4(u_Weights[0] * float(TAPS)); }\n",
        )
        .stage_code(ShaderStage::Fragment, FRAGMENT)
        .build()
        .unwrap();

    let factory = VariantFactory::new(
        device.clone(),
        definition,
        Arc::new(MemoryLoader::new()),
        &ShaderSettings::default(),
    );
    (device, Arc::new(factory))
}

fn device_value(device: &HeadlessDevice, material: &Material, name: &str) -> Option<UniformValue> {
    let variant = material.variant()?;
    match variant.check_uniform(name) {
        UniformCheck::Exists(location) => device.uniform_value(variant.program(), location),
        UniformCheck::Missing | UniformCheck::OptimizedOut => None,
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn params_write_through_to_the_variant() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);
    let red = Vec3::new(1.0, 0.0, 0.0);

    material.set_param("u_Color", red);

    assert_eq!(material.get_param::<Vec3>("u_Color"), red);
    assert_eq!(material.param("u_Color"), Some(&MaterialParam::Value(UniformValue::Vec3(red))));
    assert_eq!(
        device_value(&device, &material, "u_Color"),
        Some(UniformValue::Vec3(red))
    );
    assert_eq!(material.version(), 1);
}

#[test]
fn reads_fall_back_to_live_variant_values() {
    let (_device, factory) = setup();
    let material = Material::new(factory);

    assert_eq!(material.try_get_param::<Vec3>("u_Color"), Some(Vec3::ZERO));
    assert_eq!(material.try_get_param::<f32>("u_Scale"), None);
    assert_eq!(material.try_get_param::<TextureHandle>("u_Shadow"), None);
}

#[test]
fn sparse_array_writes_backfill_earlier_elements() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);

    material.set_param_at("u_Weights", 2, 0.5_f32);

    assert_eq!(
        material.param("u_Weights"),
        Some(&MaterialParam::Array(vec![
            UniformValue::Float(0.0),
            UniformValue::Float(0.0),
            UniformValue::Float(0.5),
        ]))
    );
    assert_eq!(material.try_get_param_at::<f32>("u_Weights", 2), Some(0.5));
    assert_eq!(material.try_get_param_at::<f32>("u_Weights", 3), Some(0.0));

    let variant = material.variant().unwrap();
    assert_eq!(
        variant.get_uniform_array("u_Weights", 1.0_f32),
        Some(vec![0.0, 0.0, 0.5, 0.0])
    );
    assert_eq!(device.stats().uniform_uploads, 1);
}

#[test]
fn array_params_can_be_set_in_bulk() {
    let (_device, factory) = setup();
    let mut material = Material::new(factory);

    material.set_param_array("u_Weights", &[1.0_f32, 2.0, 3.0]);

    assert_eq!(material.try_get_param_at::<f32>("u_Weights", 1), Some(2.0));
    assert_eq!(material.version(), 3);
    assert_eq!(
        material.variant().unwrap().get_uniform_array("u_Weights", 0.0_f32),
        Some(vec![1.0, 2.0, 3.0, 0.0])
    );
}

#[test]
#[should_panic(expected = "declares no uniform `u_Missing`")]
fn undeclared_params_panic() {
    let (_device, factory) = setup();
    Material::new(factory).set_param("u_Missing", 1.0_f32);
}

#[test]
#[should_panic(expected = "written with")]
fn mistyped_params_panic() {
    let (_device, factory) = setup();
    Material::new(factory).set_param("u_Color", 1.0_f32);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn out_of_range_elements_panic() {
    let (_device, factory) = setup();
    Material::new(factory).set_param_at("u_Weights", 4, 1.0_f32);
}

#[test]
#[should_panic(expected = "no value for parameter")]
fn reading_an_unset_optimized_out_param_panics() {
    let (_device, factory) = setup();
    let _: f32 = Material::new(factory).get_param("u_Scale");
}

// ============================================================================
// Variant Switching
// ============================================================================

#[test]
fn values_survive_static_param_changes() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);
    let blue = Vec3::new(0.0, 0.0, 1.0);

    material.set_param("u_Color", blue);
    material.set_param("u_Shadow", TextureHandle::new(3));
    material.set_param_at("u_Weights", 1, 0.75_f32);
    let before = material.variant().unwrap().program();

    assert!(material.set_static_param("SHADOW", "PCF"));

    let variant = material.variant().unwrap();
    assert_ne!(variant.program(), before);
    assert_eq!(material.static_params().get("SHADOW"), Some(StaticValue::option("PCF")));
    assert_eq!(
        device_value(&device, &material, "u_Color"),
        Some(UniformValue::Vec3(blue))
    );
    assert_eq!(
        device_value(&device, &material, "u_Shadow"),
        Some(UniformValue::Texture(TextureHandle::new(3)))
    );
    assert_eq!(
        variant.get_uniform_element("u_Weights", 1, 0.0_f32),
        Some(0.75)
    );
    assert_eq!(material.get_param::<TextureHandle>("u_Shadow"), TextureHandle::new(3));
}

#[test]
fn active_materials_bind_the_new_variant() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);

    material.activate();
    let first = material.variant().unwrap().program();
    assert_eq!(device.bound_program(), Some(first));

    assert!(material.set_static_param("TAPS", 2_i64));
    let second = material.variant().unwrap().program();
    assert_ne!(first, second);
    assert_eq!(device.bound_program(), Some(second));
}

#[test]
fn unchanged_static_params_keep_the_variant() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);
    let program = material.variant().unwrap().program();

    assert!(material.set_static_param("SHADOW", "OFF"));
    assert_eq!(material.variant().unwrap().program(), program);
    assert_eq!(device.stats().programs_linked, 1);
}

#[test]
fn unknown_static_params_are_refused() {
    let (_device, factory) = setup();
    let mut material = Material::new(factory);

    assert!(!material.set_static_param("BLOOM", 1_i64));
    assert!(material.variant().is_some());
}

#[test]
fn out_of_domain_values_keep_the_current_variant() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);
    let program = material.variant().unwrap().program();

    assert!(!material.set_static_param("TAPS", 99_i64));
    assert!(!material.set_static_param("SHADOW", "PCSS"));

    assert_eq!(material.variant().unwrap().program(), program);
    assert_eq!(material.static_params().get("TAPS"), Some(StaticValue::Int(1)));
    assert_eq!(device.stats().programs_linked, 1);
}

#[test]
fn failed_variants_keep_values_until_recovery() {
    let (device, factory) = setup();
    let mut material = Material::new(factory);
    let green = Vec3::new(0.0, 1.0, 0.0);

    assert!(!material.set_static_param("TAPS", 3_i64));
    assert!(material.variant().is_none());
    assert_eq!(material.static_params().get("TAPS"), Some(StaticValue::Int(3)));

    material.set_param("u_Color", green);
    assert_eq!(material.get_param::<Vec3>("u_Color"), green);

    assert!(material.set_static_param("TAPS", 2_i64));
    assert_eq!(
        device_value(&device, &material, "u_Color"),
        Some(UniformValue::Vec3(green))
    );
}

#[test]
fn materials_share_cached_variants() {
    let (_device, factory) = setup();
    let a = Material::new(Arc::clone(&factory));
    let b = Material::with_static_params(Arc::clone(&factory), factory.default_params());

    assert!(Arc::ptr_eq(a.variant().unwrap(), b.variant().unwrap()));
    assert_eq!(factory.variant_count(), 1);
}
