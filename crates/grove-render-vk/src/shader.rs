// SPDX-License-Identifier: CEPL-1.0
use crate::error::{RenderError, RenderResult, ResourceStage, VkResultExt};
use ash::vk;
use grove_render::ShaderStage;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) struct StageInfo {
    pub stage: ShaderStage,
    pub kind: shaderc::ShaderKind,
    pub flags: vk::ShaderStageFlags,
    pub extension: &'static str,
}

pub(crate) static STAGES: [StageInfo; 2] = [
    StageInfo {
        stage: ShaderStage::Vertex,
        kind: shaderc::ShaderKind::Vertex,
        flags: vk::ShaderStageFlags::VERTEX,
        extension: "vert",
    },
    StageInfo {
        stage: ShaderStage::Fragment,
        kind: shaderc::ShaderKind::Fragment,
        flags: vk::ShaderStageFlags::FRAGMENT,
        extension: "frag",
    },
];

pub(crate) fn stage_info(stage: ShaderStage) -> &'static StageInfo {
    match stage {
        ShaderStage::Vertex => &STAGES[0],
        ShaderStage::Fragment => &STAGES[1],
    }
}

pub fn vk_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    stage_info(stage).flags
}

/// Guesses the stage from a `.vert` / `.frag` file extension.
pub fn stage_from_path(path: &Path) -> Option<ShaderStage> {
    let ext = path.extension()?.to_str()?;
    STAGES.iter().find(|s| s.extension == ext).map(|s| s.stage)
}

/// Compiles GLSL to SPIR-V words. Debug builds skip optimisation.
pub fn compile_glsl(source: &str, stage: ShaderStage, name: &str) -> RenderResult<Vec<u32>> {
    let fail = |message: String| RenderError::ShaderCompilationFailed { stage, message };

    let compiler = shaderc::Compiler::new().map_err(|e| fail(format!("shaderc: {e}")))?;
    let mut opts = shaderc::CompileOptions::new().map_err(|e| fail(format!("shaderc: {e}")))?;

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(if cfg!(debug_assertions) {
        shaderc::OptimizationLevel::Zero
    } else {
        shaderc::OptimizationLevel::Performance
    });

    let artifact = compiler
        .compile_into_spirv(source, stage_info(stage).kind, name, "main", Some(&opts))
        .map_err(|e| fail(e.to_string()))?;
    if artifact.get_num_warnings() > 0 {
        debug!("{name}: {}", artifact.get_warning_messages());
    }
    Ok(artifact.as_binary().to_vec())
}

/// A compiled shader stage remembering where its source came from, so it can
/// be recompiled on demand.
pub struct ShaderModule {
    device: ash::Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
    source: PathBuf,
}

impl ShaderModule {
    /// # Safety
    /// Must be dropped before `device`.
    pub unsafe fn from_file(
        device: &ash::Device,
        path: &Path,
        stage: ShaderStage,
    ) -> RenderResult<Self> {
        let src = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        unsafe { Self::from_source(device, &src, stage, path) }
    }

    /// # Safety
    /// Must be dropped before `device`.
    pub unsafe fn from_source(
        device: &ash::Device,
        src: &str,
        stage: ShaderStage,
        name: &Path,
    ) -> RenderResult<Self> {
        let words = compile_glsl(src, stage, &name.to_string_lossy())?;
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: words.len() * 4,
            p_code: words.as_ptr(),
            ..Default::default()
        };
        let module = unsafe { device.create_shader_module(&ci, None) }
            .stage(ResourceStage::ShaderModule)?;
        debug!("{} shader {:?}: {} words", stage, name, words.len());

        Ok(Self {
            device: device.clone(),
            module,
            stage,
            source: name.to_path_buf(),
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn table_covers_every_stage_once() {
        for stage in ShaderStage::ALL {
            assert_eq!(stage_info(stage).stage, stage);
        }
        assert_eq!(vk_stage(ShaderStage::Vertex), vk::ShaderStageFlags::VERTEX);
        assert_eq!(vk_stage(ShaderStage::Fragment), vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn stage_from_extension() {
        assert_eq!(stage_from_path(Path::new("a/b.vert")), Some(ShaderStage::Vertex));
        assert_eq!(stage_from_path(Path::new("b.frag")), Some(ShaderStage::Fragment));
        assert_eq!(stage_from_path(Path::new("b.glsl")), None);
    }

    #[test]
    fn compiles_vertex_glsl() {
        let src = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";
        let words = compile_glsl(src, ShaderStage::Vertex, "t.vert").unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn syntax_errors_name_the_stage() {
        let err = compile_glsl("#version 450\nvoid main( {", ShaderStage::Fragment, "bad.frag")
            .unwrap_err();
        match err {
            RenderError::ShaderCompilationFailed { stage, message } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
