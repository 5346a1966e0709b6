use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lumen_cfg::{parse, ParsingContext};
use lumen_core::collections::hashmap::HashMap;
use lumen_core::log::{info, warn};
use parking_lot::RwLock;

use crate::extract::{
    descriptor_counts, extract_shader_data, merge_resource_bindings, ResourceBinding, ResourceKind, ShaderData,
    VertexInputLayout,
};
use crate::glsl::{emit_glsl, GlslOptions, GlslShader};
use crate::spirv::{compile_glsl_to_spirv, SpirvCompilerConfig, SpirvShader};
use crate::stage::ShaderStage;

/// Output for one stage of a shader file.
#[derive(Debug)]
pub struct CompiledStage {
    pub data: ShaderData,
    pub glsl: GlslShader,
    pub spirv: Option<SpirvShader>,
}

/// Every stage found in one `.cfg` shader file.
#[derive(Debug)]
pub struct CompiledShader {
    path: PathBuf,
    stages: HashMap<ShaderStage, CompiledStage>,
}

impl CompiledShader {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.contains_key(&stage)
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&CompiledStage> {
        self.stages.get(&stage)
    }

    pub fn glsl(&self, stage: ShaderStage) -> Option<&GlslShader> {
        self.stage(stage).map(|compiled| &compiled.glsl)
    }

    pub fn spirv(&self, stage: ShaderStage) -> Option<&SpirvShader> {
        self.stage(stage).and_then(|compiled| compiled.spirv.as_ref())
    }

    /// Bindings of all stages, merged by binding index.
    pub fn resource_bindings(&self) -> Vec<ResourceBinding> {
        let per_stage: Vec<Vec<ResourceBinding>> = ShaderStage::ALL
            .into_iter()
            .filter_map(|stage| Some(self.stage(stage)?.data.resource_bindings(stage)))
            .collect();
        let slices: Vec<&[ResourceBinding]> = per_stage.iter().map(Vec::as_slice).collect();
        merge_resource_bindings(&slices)
    }

    pub fn descriptor_counts(&self) -> HashMap<ResourceKind, u32> {
        descriptor_counts(&self.resource_bindings())
    }

    pub fn vertex_input_layout(&self) -> Option<VertexInputLayout> {
        self.stage(ShaderStage::Vertex).map(|compiled| compiled.data.vertex_input_layout())
    }
}

/// Loads `.cfg` shader files and caches the compiled result by path.
pub struct ShaderManager {
    options: GlslOptions,
    /// `None` stops at GLSL.
    spirv: Option<SpirvCompilerConfig>,
    shaders: RwLock<HashMap<PathBuf, Arc<CompiledShader>>>,
}

impl ShaderManager {
    pub fn new(options: GlslOptions, spirv: Option<SpirvCompilerConfig>) -> Self {
        Self {
            options,
            spirv,
            shaders: RwLock::new(HashMap::default()),
        }
    }

    pub fn get_or_compile(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledShader>> {
        let path = path.as_ref();
        if let Some(shader) = self.shaders.read().get(path) {
            return Ok(shader.clone());
        }

        let compiled = Arc::new(self.compile(path)?);
        let mut shaders = self.shaders.write();
        Ok(shaders.entry(path.to_path_buf()).or_insert(compiled).clone())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<CompiledShader>> {
        self.shaders.read().get(path.as_ref()).cloned()
    }

    /// Drop a cached shader so the next request recompiles it.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        self.shaders.write().remove(path.as_ref()).is_some()
    }

    pub fn len(&self) -> usize {
        self.shaders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[profiling::function]
    fn compile(&self, path: &Path) -> Result<CompiledShader> {
        let text = lumen_core::file::load_text(path)?;
        let mut context = ParsingContext::new(path.display().to_string());
        let document = parse(&text, &mut context)?;

        let mut stages: HashMap<ShaderStage, CompiledStage> = HashMap::default();
        for node in document.root_children() {
            let Some(name) = document.name(node) else { continue };
            let Some(stage) = ShaderStage::from_name(name.as_str()) else {
                warn!("{}: `{}` is not a shader stage, skipping", path.display(), name.as_str());
                continue;
            };
            if stages.contains_key(&stage) {
                warn!("{}: duplicate {} stage `{}`, keeping the first", path.display(), stage, name.as_str());
                continue;
            }

            let data = extract_shader_data(&document, node);
            let glsl = emit_glsl(&data, stage, &self.options);
            let spirv = match &self.spirv {
                Some(config) => {
                    let label = format!("{}.{}", path.display(), name.as_str());
                    let spirv = compile_glsl_to_spirv(&label, &glsl, config)
                        .with_context(|| format!("Failed to compile {} stage of {}", stage, path.display()))?;
                    Some(spirv)
                }
                None => None,
            };
            stages.insert(stage, CompiledStage { data, glsl, spirv });
        }

        if stages.is_empty() {
            bail!("{} contains no shader stages", path.display());
        }
        info!("Compiled {} ({} stages)", path.display(), stages.len());

        Ok(CompiledShader {
            path: path.to_path_buf(),
            stages,
        })
    }
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new(GlslOptions::default(), Some(SpirvCompilerConfig::default()))
    }
}
