//! Build script for segblur-wgpu crate
//!
//! Parses and validates every WGSL shader used by the pipeline with naga and
//! generates a `shaders.rs` module that embeds them, so a broken shader fails
//! the build instead of the first rendered frame.

use std::path::{Path, PathBuf};

/// Shader constants to generate, as (constant name, path relative to the crate root)
const SHADERS: &[(&str, &str)] = &[
    ("DOWNSCALE_RGBA8", "shaders/downscale_rgba8.wgsl"),
    ("DOWNSCALE_F16", "shaders/downscale_f16.wgsl"),
    ("COMPOSITOR", "shaders/compositor.wgsl"),
];

/// Parses and validates a WGSL shader, panicking with a readable diagnostic on failure
fn validate_wgsl(path: &Path, source: &str) {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(e) => panic!("Failed to parse WGSL shader {}:\n{}", path.display(), e.emit_to_string(source)),
    };

    // Device features are negotiated at runtime, so validate against every capability
    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    if let Err(e) = validator.validate(&module) {
        panic!("Failed to validate WGSL shader {}:\n{}", path.display(), e.emit_to_string(source));
    }
}

/// Generates the shaders.rs module embedding all validated shaders
fn write_code() {
    let crate_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    let mut code = String::new();
    code.push_str("// This file is generated by the build script.\n\n");

    for (id, relative_path) in SHADERS {
        let path = crate_dir.join(relative_path);
        println!("cargo::rerun-if-changed={}", path.display());

        let source = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read shader {}: {e}", path.display()));
        validate_wgsl(&path, &source);

        code.push_str(&format!("pub const {id}: &str = include_str!({:?});\n", path.display().to_string()));
    }

    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR not set");
    let output_path = PathBuf::from(out_dir).join("shaders.rs");
    std::fs::write(output_path, code).expect("Failed to write shaders.rs");
}

fn main() {
    write_code();
}
