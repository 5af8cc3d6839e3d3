//! SPIR-V loading.

use crate::error::{GpuError, Result};
use ash::vk;
use std::path::{Path, PathBuf};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage, used to build `<name>.<stage>.spv` file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// File-name suffix of compiled shaders for this stage.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert.spv",
            Self::Fragment => "frag.spv",
        }
    }

    /// Vulkan stage flag.
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Path of a compiled shader, e.g. `shaders/simple.vert.spv`.
pub fn shader_path(dir: &Path, name: &str, stage: ShaderStage) -> PathBuf {
    dir.join(format!("{name}.{}", stage.extension()))
}

/// Convert raw SPIR-V bytes into little-endian words.
///
/// `path` is only used for error messages.
pub fn bytes_to_spirv(bytes: &[u8], path: &Path) -> Result<Vec<u32>> {
    let fail = |reason: &str| GpuError::ShaderLoad {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() % 4 != 0 {
        return Err(fail("length is not a multiple of 4"));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(_) => Err(fail("missing SPIR-V magic number")),
        None => Err(fail("file is empty")),
    }
}

/// Read a compiled shader from disk.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| GpuError::ShaderLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    bytes_to_spirv(&bytes, path)
}

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| GpuError::ShaderCompilation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_words() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 42]);
        let words = bytes_to_spirv(&bytes, Path::new("test.spv")).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 42]);
    }

    #[test]
    fn rejects_truncated_module() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 7]);
        bytes.pop();
        let err = bytes_to_spirv(&bytes, Path::new("broken.spv")).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { ref path, .. } if path == "broken.spv"));
    }

    #[test]
    fn rejects_wrong_magic_and_empty() {
        let bytes = module_bytes(&[0xdead_beef]);
        assert!(bytes_to_spirv(&bytes, Path::new("x.spv")).is_err());
        assert!(bytes_to_spirv(&[], Path::new("x.spv")).is_err());
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = load_spirv(Path::new("does/not/exist.vert.spv")).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { .. }));
    }

    #[test]
    fn shader_paths() {
        assert_eq!(
            shader_path(Path::new("shaders"), "point_light", ShaderStage::Fragment),
            Path::new("shaders").join("point_light.frag.spv")
        );
        assert_eq!(ShaderStage::Vertex.extension(), "vert.spv");
    }
}
