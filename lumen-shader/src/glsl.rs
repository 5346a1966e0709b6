use std::fmt::Write;

use derive_builder::Builder;
use lumen_cfg::{Document, NodeHandle};
use lumen_core::log::warn;

use crate::extract::{extract_shader_data, Declaration, ShaderData};
use crate::stage::ShaderStage;

pub const DEFAULT_GLSL_VERSION: u32 = 450;
pub const DEFAULT_ENTRY_POINT: &str = "main";

fn default_extensions() -> Vec<String> {
    vec![
        "GL_ARB_separate_shader_objects".to_owned(),
        "GL_ARB_shading_language_420pack".to_owned(),
    ]
}

/// Preamble settings for emitted GLSL.
#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct GlslOptions {
    #[builder(default = "DEFAULT_GLSL_VERSION")]
    pub version: u32,
    /// Each entry is emitted as `#extension <name> : enable`.
    #[builder(default = "default_extensions()")]
    pub extensions: Vec<String>,
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_GLSL_VERSION,
            extensions: default_extensions(),
        }
    }
}

/// GLSL source for a single stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlslShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub code: String,
}

/// Extract `shader` from `document` and emit it as GLSL for `stage`.
#[profiling::function]
pub fn compile_cfg_to_glsl(
    document: &Document<'_>,
    shader: NodeHandle,
    stage: ShaderStage,
    options: &GlslOptions,
) -> GlslShader {
    let data = extract_shader_data(document, shader);
    emit_glsl(&data, stage, options)
}

/// Emit GLSL for already extracted shader data.
pub fn emit_glsl(data: &ShaderData, stage: ShaderStage, options: &GlslOptions) -> GlslShader {
    let mut code = String::new();

    // Writing into a String cannot fail.
    let _ = write!(code, "#version {}\n\n", options.version);
    for extension in &options.extensions {
        let _ = writeln!(code, "#extension {} : enable", extension);
    }

    if !data.samplers.is_empty() {
        code.push_str("\n\n");
        for sampler in &data.samplers {
            let _ = writeln!(
                code,
                "{}uniform sampler2D {};",
                layout_prefix("binding", sampler.binding),
                sampler.identifier
            );
        }
    }

    if !data.buffers.is_empty() {
        write_section_header(&mut code, "Buffers");
        for buffer in &data.buffers {
            let _ = writeln!(
                code,
                "{}{} {}\n{{",
                layout_prefix("binding", buffer.binding),
                buffer.kind.keyword(),
                buffer.identifier
            );
            for field in &buffer.declarations {
                if field.location.is_some() {
                    warn!("Ignoring layout spec `location` in buffer declaration.");
                }
                let _ = writeln!(code, "  {} {};", field.type_name, field.identifier);
            }
            code.push_str("};\n");
        }
    }

    write_interface(&mut code, "Input", "in", &data.inputs);
    write_interface(&mut code, "Output", "out", &data.outputs);

    if !data.code.is_empty() {
        write_section_header(&mut code, "Code");
        for line in &data.code {
            code.push_str(line);
            code.push('\n');
        }
    }

    GlslShader {
        stage,
        entry_point: data.entry_point.clone().unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_owned()),
        code,
    }
}

fn write_section_header(code: &mut String, title: &str) {
    let _ = write!(code, "\n\n//\n// {}\n//\n", title);
}

fn write_interface(code: &mut String, title: &str, qualifier: &str, declarations: &[Declaration]) {
    if declarations.is_empty() {
        return;
    }
    write_section_header(code, title);
    for declaration in declarations {
        let _ = writeln!(
            code,
            "{}{} {} {};",
            layout_prefix("location", declaration.location),
            qualifier,
            declaration.type_name,
            declaration.identifier
        );
    }
}

fn layout_prefix(qualifier: &str, index: Option<u32>) -> String {
    match index {
        Some(index) => format!("layout({} = {}) ", qualifier, index),
        None => String::new(),
    }
}
