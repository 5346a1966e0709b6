//! Typed view of a shader node: samplers, buffers, stage inputs and outputs and the code lines.

use lumen_cfg::{Document, Literal, NodeHandle};
use lumen_core::collections::hashmap::HashMap;
use lumen_core::log::{debug, error, warn};

use crate::stage::{ShaderStage, ShaderStages};

/// Type names accepted on declaration nodes.
pub const DECLARATION_TYPES: [&str; 7] = ["float", "int", "vec2", "vec3", "vec4", "mat4", "sampler2D"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub type_name: String,
    pub identifier: String,
    pub location: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Uniform,
    Storage,
}

impl BufferKind {
    pub fn from_keyword(keyword: &str) -> Option<BufferKind> {
        match keyword {
            "uniform" => Some(BufferKind::Uniform),
            "buffer" => Some(BufferKind::Storage),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            BufferKind::Uniform => "uniform",
            BufferKind::Storage => "buffer",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Buffer {
    pub kind: BufferKind,
    pub identifier: String,
    pub binding: Option<u32>,
    pub declarations: Vec<Declaration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sampler {
    pub identifier: String,
    pub binding: Option<u32>,
}

/// Everything the GLSL emitter needs from one shader node, in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderData {
    pub samplers: Vec<Sampler>,
    pub buffers: Vec<Buffer>,
    pub inputs: Vec<Declaration>,
    pub outputs: Vec<Declaration>,
    pub entry_point: Option<String>,
    pub code: Vec<String>,
}

/// Descriptor type a resource binds as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    CombinedImageSampler,
    UniformBuffer,
    StorageBuffer,
}

impl From<BufferKind> for ResourceKind {
    fn from(kind: BufferKind) -> Self {
        match kind {
            BufferKind::Uniform => ResourceKind::UniformBuffer,
            BufferKind::Storage => ResourceKind::StorageBuffer,
        }
    }
}

/// A single bound resource and the stages that reference it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceBinding {
    pub name: String,
    pub binding: u32,
    pub kind: ResourceKind,
    pub stages: ShaderStages,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
}

impl VertexFormat {
    pub fn from_type_name(type_name: &str) -> Option<VertexFormat> {
        match type_name {
            "float" => Some(VertexFormat::R32Sfloat),
            "vec2" => Some(VertexFormat::R32G32Sfloat),
            "vec3" => Some(VertexFormat::R32G32B32Sfloat),
            "vec4" => Some(VertexFormat::R32G32B32A32Sfloat),
            _ => None,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            VertexFormat::R32Sfloat => 4,
            VertexFormat::R32G32Sfloat => 8,
            VertexFormat::R32G32B32Sfloat => 12,
            VertexFormat::R32G32B32A32Sfloat => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Interleaved single-binding vertex layout derived from the stage inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexInputLayout {
    pub attributes: Vec<VertexInputAttribute>,
    pub stride: u32,
}

/// Walk the children of `shader` and collect its declarations.
///
/// Semantic errors are logged and the offending entry is dropped; extraction itself never fails.
#[profiling::function]
pub fn extract_shader_data(document: &Document<'_>, shader: NodeHandle) -> ShaderData {
    let shader_name = document.name(shader).map(|name| name.as_str()).unwrap_or_default();
    let mut data = ShaderData::default();

    for child in document.children(shader) {
        let Some(name) = document.name(child) else { continue };
        match name.as_str() {
            "sampler2D" => {
                if let Some(sampler) = extract_sampler(document, child) {
                    data.samplers.push(sampler);
                }
            }
            keyword @ ("uniform" | "buffer") => {
                if let Some(buffer) = extract_buffer(document, child, keyword) {
                    data.buffers.push(buffer);
                }
            }
            "Buffers" => {
                for entry in document.children(child) {
                    let keyword = document.name(entry).map(|name| name.as_str()).unwrap_or_default();
                    if let Some(buffer) = extract_buffer(document, entry, keyword) {
                        data.buffers.push(buffer);
                    }
                }
            }
            "Input" | "Output" | "Code" => {}
            other => debug!("{}: ignoring unknown node `{}`", shader_name, other),
        }
    }

    match document.find_child(shader, "Input") {
        Some(input) => data.inputs = extract_declarations(document, input, true),
        None => warn!("{}: no Input declarations", shader_name),
    }
    match document.find_child(shader, "Output") {
        Some(output) => data.outputs = extract_declarations(document, output, true),
        None => warn!("{}: no Output declarations", shader_name),
    }

    if let Some(code) = document.find_child(shader, "Code") {
        data.entry_point = document
            .attribute(code, "Entry")
            .and_then(|entry| entry.as_str())
            .map(str::to_owned);

        for line in document.children(code) {
            if !document.name(line).is_some_and(|name| name.is_empty()) {
                warn!("Ignoring named child in Code node.");
                continue;
            }
            data.code.extend(
                document
                    .values(line)
                    .iter()
                    .filter_map(|value| match value {
                        Literal::String(text) => Some((*text).to_owned()),
                        _ => None,
                    }),
            );
        }
    }

    data
}

fn extract_sampler(document: &Document<'_>, node: NodeHandle) -> Option<Sampler> {
    let Some(identifier) = first_string_value(document, node) else {
        error!("Sampler needs to have a name.");
        return None;
    };
    Some(Sampler {
        identifier: identifier.to_owned(),
        binding: index_attribute(document, node, "Binding"),
    })
}

fn extract_buffer(document: &Document<'_>, node: NodeHandle, keyword: &str) -> Option<Buffer> {
    let Some(kind) = BufferKind::from_keyword(keyword) else {
        error!("Unknown buffer type: {}", keyword);
        return None;
    };
    let Some(identifier) = first_string_value(document, node) else {
        error!("Buffer needs to have a name.");
        return None;
    };

    let declarations = extract_declarations(document, node, false);
    Some(Buffer {
        kind,
        identifier: identifier.to_owned(),
        binding: index_attribute(document, node, "Binding"),
        declarations,
    })
}

fn extract_declarations(document: &Document<'_>, parent: NodeHandle, allow_location: bool) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    for child in document.children(parent) {
        let type_name = document.name(child).map(|name| name.as_str()).unwrap_or_default();
        if !DECLARATION_TYPES.contains(&type_name) {
            error!("Invalid declaration type name: {}", type_name);
            continue;
        }
        let Some(identifier) = first_string_value(document, child) else {
            error!("Expected at least 1 value.");
            continue;
        };

        let mut location = index_attribute(document, child, "Location");
        if location.is_some() && !allow_location {
            warn!("Ignoring layout spec `location` in buffer declaration.");
            location = None;
        }

        declarations.push(Declaration {
            type_name: type_name.to_owned(),
            identifier: identifier.to_owned(),
            location,
        });
    }

    declarations
}

fn first_string_value<'a>(document: &Document<'a>, node: NodeHandle) -> Option<&'a str> {
    match document.values(node).first() {
        Some(Literal::String(text)) => Some(*text),
        _ => None,
    }
}

fn index_attribute(document: &Document<'_>, node: NodeHandle, name: &str) -> Option<u32> {
    let value = document.attribute(node, name)?;
    let index = value.to_number::<u32>();
    if index.is_none() {
        error!("{} must be a non-negative integer, got {:?}", name, value);
    }
    index
}

impl ShaderData {
    /// Bindings declared by this stage. Resources without a `Binding` attribute are not bound.
    pub fn resource_bindings(&self, stage: ShaderStage) -> Vec<ResourceBinding> {
        let samplers = self.samplers.iter().filter_map(|sampler| {
            Some(ResourceBinding {
                name: sampler.identifier.clone(),
                binding: sampler.binding?,
                kind: ResourceKind::CombinedImageSampler,
                stages: stage.into(),
            })
        });
        let buffers = self.buffers.iter().filter_map(|buffer| {
            Some(ResourceBinding {
                name: buffer.identifier.clone(),
                binding: buffer.binding?,
                kind: buffer.kind.into(),
                stages: stage.into(),
            })
        });
        samplers.chain(buffers).collect()
    }

    /// Vertex attributes for the stage inputs, ordered by location with tightly packed offsets.
    pub fn vertex_input_layout(&self) -> VertexInputLayout {
        let mut inputs: Vec<(u32, VertexFormat)> = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let Some(location) = input.location else {
                warn!("Vertex input `{}` has no location, skipping.", input.identifier);
                continue;
            };
            let Some(format) = VertexFormat::from_type_name(&input.type_name) else {
                warn!("Unsupported vertex input type `{}` for `{}`.", input.type_name, input.identifier);
                continue;
            };
            inputs.push((location, format));
        }
        inputs.sort_by_key(|(location, _)| *location);

        let mut layout = VertexInputLayout::default();
        for (location, format) in inputs {
            layout.attributes.push(VertexInputAttribute { location, format, offset: layout.stride });
            layout.stride += format.size();
        }
        layout
    }
}

/// Merge per-stage bindings into one list.
/// Combines stage flags for entries at the same binding; the first declaration names the entry.
pub fn merge_resource_bindings(stages: &[&[ResourceBinding]]) -> Vec<ResourceBinding> {
    let mut binding_map: HashMap<u32, ResourceBinding> = HashMap::default();

    for bindings in stages {
        for binding in bindings.iter() {
            if let Some(existing) = binding_map.get_mut(&binding.binding) {
                if existing.kind != binding.kind {
                    warn!(
                        "Binding {} is declared as {:?} and {:?}, keeping the first",
                        binding.binding, existing.kind, binding.kind
                    );
                }
                existing.stages |= binding.stages;
            } else {
                binding_map.insert(binding.binding, binding.clone());
            }
        }
    }

    let mut bindings: Vec<ResourceBinding> = binding_map.into_values().collect();
    bindings.sort_by_key(|binding| binding.binding);
    bindings
}

/// Number of descriptors of each kind, as needed to size a descriptor pool.
pub fn descriptor_counts(bindings: &[ResourceBinding]) -> HashMap<ResourceKind, u32> {
    let mut counts: HashMap<ResourceKind, u32> = HashMap::default();
    for binding in bindings {
        *counts.entry(binding.kind).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_cfg::{parse, ParsingContext};

    fn extract(text: &str) -> ShaderData {
        let document = parse(text, &mut ParsingContext::default()).unwrap();
        let shader = document.root_children().next().unwrap();
        extract_shader_data(&document, shader)
    }

    #[test]
    fn buffers_from_block_and_siblings_keep_document_order() {
        let data = extract(
            r#"VertexShader {
                uniform "First" Binding=0 { mat4 "Model" }
                Buffers {
                    buffer "Second" Binding=2 { vec4 "Data" }
                    texture "Bad"
                    uniform { float "Nameless" }
                }
                buffer "Third"
            }"#,
        );

        let names: Vec<_> = data.buffers.iter().map(|buffer| buffer.identifier.as_str()).collect();
        assert_eq!(names, ["First", "Second", "Third"]);
        assert_eq!(data.buffers[1].kind, BufferKind::Storage);
        assert_eq!(data.buffers[1].binding, Some(2));
        assert_eq!(data.buffers[2].binding, None);
        assert_eq!(
            data.buffers[0].declarations,
            [Declaration { type_name: "mat4".into(), identifier: "Model".into(), location: None }]
        );
    }

    #[test]
    fn invalid_declarations_are_dropped() {
        let data = extract(
            r#"FragmentShader {
                Input {
                    vec4 "Color" Location=0
                    dvec3 "Wide" Location=1
                    vec2 Location=2
                    vec2 "Uv" Location=3
                }
            }"#,
        );

        let names: Vec<_> = data.inputs.iter().map(|input| input.identifier.as_str()).collect();
        assert_eq!(names, ["Color", "Uv"]);
        assert!(data.outputs.is_empty());
    }

    #[test]
    fn buffer_field_location_is_ignored() {
        let data = extract(r#"VertexShader { uniform "Globals" { vec4 "Tint" Location=3 } }"#);
        assert_eq!(data.buffers[0].declarations[0].location, None);
    }

    #[test]
    fn code_lines_and_entry_point() {
        let data = extract(
            "VertexShader {\n  Code Entry=\"vs_main\" {\n    `void vs_main() {}`\n    Named \"skipped\"\n    \"// tail\"\n  }\n}",
        );

        assert_eq!(data.entry_point.as_deref(), Some("vs_main"));
        assert_eq!(data.code, ["void vs_main() {}", "// tail"]);
    }

    #[test]
    fn resource_bindings_merge_across_stages() {
        let vertex = extract(r#"VertexShader { uniform "Globals" Binding=0 { mat4 "M" } }"#);
        let fragment = extract(
            r#"FragmentShader {
                uniform "Globals" Binding=0 { mat4 "M" }
                sampler2D "Albedo" Binding=1
                sampler2D "Unbound"
                buffer "Lights" Binding=2 { vec4 "Position" }
            }"#,
        );

        let vertex_bindings = vertex.resource_bindings(ShaderStage::Vertex);
        let fragment_bindings = fragment.resource_bindings(ShaderStage::Fragment);
        let merged = merge_resource_bindings(&[&vertex_bindings, &fragment_bindings]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].name, "Globals");
        assert_eq!(merged[0].stages, ShaderStages::from(ShaderStage::Vertex) | ShaderStages::from(ShaderStage::Fragment));
        assert_eq!(merged[1].kind, ResourceKind::CombinedImageSampler);
        assert_eq!(merged[1].stages, ShaderStages::from(ShaderStage::Fragment));
        assert_eq!(merged[2].kind, ResourceKind::StorageBuffer);

        let counts = descriptor_counts(&merged);
        assert_eq!(counts.get(&ResourceKind::UniformBuffer), Some(&1));
        assert_eq!(counts.get(&ResourceKind::CombinedImageSampler), Some(&1));
        assert_eq!(counts.get(&ResourceKind::StorageBuffer), Some(&1));
    }

    #[test]
    fn vertex_layout_is_sorted_by_location() {
        let data = extract(
            r#"VertexShader {
                Input {
                    vec4 "Color" Location=1
                    vec3 "Position" Location=0
                    vec2 "Uv" Location=2
                    mat4 "Instance" Location=3
                }
            }"#,
        );

        let layout = data.vertex_input_layout();
        assert_eq!(
            layout.attributes,
            [
                VertexInputAttribute { location: 0, format: VertexFormat::R32G32B32Sfloat, offset: 0 },
                VertexInputAttribute { location: 1, format: VertexFormat::R32G32B32A32Sfloat, offset: 12 },
                VertexInputAttribute { location: 2, format: VertexFormat::R32G32Sfloat, offset: 28 },
            ]
        );
        assert_eq!(layout.stride, 36);
    }
}
