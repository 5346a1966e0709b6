//! Shader descriptions written as Cfg documents, compiled to GLSL and then to SPIR-V.

pub mod extract;
pub mod glsl;
pub mod manager;
pub mod spirv;
pub mod stage;

pub use extract::{
    descriptor_counts, extract_shader_data, merge_resource_bindings, Buffer, BufferKind, Declaration, ResourceBinding,
    ResourceKind, Sampler, ShaderData, VertexFormat, VertexInputAttribute, VertexInputLayout,
};
pub use glsl::{compile_cfg_to_glsl, emit_glsl, GlslOptions, GlslOptionsBuilder, GlslShader};
pub use manager::{CompiledShader, CompiledStage, ShaderManager};
pub use spirv::{
    compile_cfg_to_glsl_and_spirv, compile_glsl_to_spirv, spirv_words_from_bytes, ShaderError, SpirvCompilerConfig,
    SpirvCompilerConfigBuilder, SpirvShader, SPIRV_MAGIC,
};
pub use stage::{ShaderStage, ShaderStages};
