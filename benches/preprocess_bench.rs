//! Preprocessing and variant generation benchmarks.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use myth_shading::device::HeadlessDevice;
use myth_shading::settings::ShaderSettings;
use myth_shading::shader::{EmbeddedLoader, IncludePreprocessor, MemoryLoader, ShaderStage};
use myth_shading::uniforms::UniformType;
use myth_shading::variant::{ShaderDefinition, VariantFactory};

fn plain_source() -> String {
    let mut source = String::new();
    for i in 0..500 {
        source.push_str(&format!("float value_{i} = {i}.0; // #pragma include \"x\"\n"));
    }
    source
}

fn included_source() -> (String, MemoryLoader) {
    let mut loader = MemoryLoader::new();
    let mut source = String::new();
    for i in 0..50 {
        loader.insert(format!("chunk_{i}"), format!("float chunk_{i}() {{ return {i}.0; }}\n"));
        source.push_str(&format!("#pragma include \"chunk_{i}\"\n"));
    }
    (source, loader)
}

fn bench_preprocess(c: &mut Criterion) {
    let preprocessor = IncludePreprocessor::new();

    let plain = plain_source();
    c.bench_function("preprocess_no_includes", |b| {
        b.iter(|| {
            let mut text = plain.clone();
            black_box(preprocessor.process(&mut text, &MemoryLoader::new()));
        });
    });

    let (source, loader) = included_source();
    c.bench_function("preprocess_50_includes", |b| {
        b.iter(|| {
            let mut text = source.clone();
            black_box(preprocessor.process(&mut text, &loader));
        });
    });

    c.bench_function("preprocess_embedded_chunks", |b| {
        b.iter(|| {
            let mut text = "#pragma include \"lighting\"\nvoid main() {}\n".to_string();
            black_box(preprocessor.process(&mut text, &EmbeddedLoader));
        });
    });
}

fn bench_variants(c: &mut Criterion) {
    let definition = ShaderDefinition::builder("bench")
        .enum_param("SHADOW", &["OFF", "PCF", "PCSS"], "OFF")
        .int_param("LIGHTS", 1, 8, 1)
        .primitive("u_Color", UniformType::Vec3)
        .shared_code("#pragma include \"lighting\"\n")
        .stage_code(ShaderStage::Vertex, "void main() { gl_Position = vec4(0.0); }\n")
        .stage_code(
            ShaderStage::Fragment,
            "void main() { gl_FragColor = vec4(u_Color * float(LIGHTS), 1.0); }\n",
        )
        .build()
        .expect("valid definition");

    let factory = VariantFactory::new(
        Arc::new(HeadlessDevice::new()),
        definition,
        Arc::new(EmbeddedLoader),
        &ShaderSettings::default(),
    );
    let params = factory.default_params();
    factory.get_variant(&params);

    c.bench_function("variant_cache_hit", |b| {
        b.iter(|| black_box(factory.get_variant(black_box(&params))));
    });

    c.bench_function("variant_compile", |b| {
        b.iter(|| {
            factory.clear();
            black_box(factory.get_variant(&params.clone().with("SHADOW", "PCSS")))
        });
    });
}

criterion_group!(benches, bench_preprocess, bench_variants);
criterion_main!(benches);
