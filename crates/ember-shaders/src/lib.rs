//! Shaders for the Ember render passes.
//!
//! GLSL sources live in `shaders/` and are compiled with shaderc when the
//! crate is built. The SPIR-V lands in [`shader_dir`] as
//! `<program>.vert.spv` and `<program>.frag.spv`.

use std::path::Path;

/// Programs compiled by the build script.
pub const PROGRAMS: [&str; 3] = ["shadow", "mesh", "point_light"];

/// Directory holding the compiled SPIR-V.
pub fn shader_dir() -> &'static Path {
    Path::new(env!("OUT_DIR"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::shader::{load_spirv, shader_path, SPIRV_MAGIC};
    use ember_gpu::ShaderStage;

    #[test]
    fn every_program_compiles_both_stages() {
        for program in PROGRAMS {
            for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
                let path = shader_path(shader_dir(), program, stage);
                let code = load_spirv(&path).unwrap();
                assert_eq!(code[0], SPIRV_MAGIC, "{}", path.display());
            }
        }
    }
}
