//! GLSL to SPIR-V through the external `glslangValidator`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use derive_builder::Builder;
use lumen_cfg::{Document, NodeHandle};
use lumen_core::log::debug;

use crate::glsl::{compile_cfg_to_glsl, GlslOptions, GlslShader};
use crate::stage::ShaderStage;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader compilation errors.
#[derive(Debug)]
pub enum ShaderError {
    CompilationFailed(String),
    InvalidSpirv(String),
    IoError(std::io::Error),
}

impl From<std::io::Error> for ShaderError {
    fn from(e: std::io::Error) -> Self {
        ShaderError::IoError(e)
    }
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderError::CompilationFailed(msg) => write!(f, "Shader compilation failed: {}", msg),
            ShaderError::InvalidSpirv(msg) => write!(f, "Invalid SPIR-V: {}", msg),
            ShaderError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ShaderError {}

/// SPIR-V module for a single stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpirvShader {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub words: Vec<u32>,
}

impl SpirvShader {
    /// Little-endian byte stream, as written to `.spv` files.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }
}

#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct SpirvCompilerConfig {
    #[builder(default = "glslang_validator_path()")]
    pub compiler: PathBuf,
    /// Where the GLSL input and SPIR-V output files are staged.
    #[builder(default = "default_intermediate_dir()")]
    pub intermediate_dir: PathBuf,
}

impl Default for SpirvCompilerConfig {
    fn default() -> Self {
        Self {
            compiler: glslang_validator_path(),
            intermediate_dir: default_intermediate_dir(),
        }
    }
}

fn default_intermediate_dir() -> PathBuf {
    PathBuf::from("target").join("shader_spv")
}

/// `GLSLANG_VALIDATOR` if set, then the Vulkan SDK, then whatever is on `PATH`.
pub fn glslang_validator_path() -> PathBuf {
    if let Ok(p) = std::env::var("GLSLANG_VALIDATOR") {
        return PathBuf::from(p);
    }
    if let Ok(sdk) = std::env::var("VULKAN_SDK") {
        let bin = if cfg!(windows) { "Bin" } else { "bin" };
        return PathBuf::from(sdk).join(bin).join(executable_name());
    }
    PathBuf::from(executable_name())
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "glslangValidator.exe" } else { "glslangValidator" }
}

fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Decode a little-endian SPIR-V byte stream into words.
pub fn spirv_words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::InvalidSpirv("SPIR-V must be 4-byte aligned".to_string()));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(ShaderError::InvalidSpirv(format!("bad magic number {:#010x}", other))),
        None => Err(ShaderError::InvalidSpirv("empty module".to_string())),
    }
}

/// Compile GLSL source to SPIR-V.
///
/// `name` only labels the intermediate files under the configured directory.
#[profiling::function]
pub fn compile_glsl_to_spirv(
    name: &str,
    glsl: &GlslShader,
    config: &SpirvCompilerConfig,
) -> Result<SpirvShader, ShaderError> {
    static INVOCATION: AtomicU64 = AtomicU64::new(0);

    std::fs::create_dir_all(&config.intermediate_dir)?;

    // Keep concurrent compiles of the same shader from sharing files.
    let stem = format!(
        "{}.{}.{}.{}",
        sanitize_filename(name),
        glsl.stage.glslang_stage(),
        std::process::id(),
        INVOCATION.fetch_add(1, Ordering::Relaxed),
    );
    let in_glsl = config.intermediate_dir.join(format!("{}.glsl", stem));
    let out_spv = config.intermediate_dir.join(format!("{}.spv", stem));
    std::fs::write(&in_glsl, &glsl.code)?;

    let result = run_compiler(&config.compiler, glsl, &in_glsl, &out_spv);
    let _ = std::fs::remove_file(&in_glsl);
    let _ = std::fs::remove_file(&out_spv);

    let words = result?;
    Ok(SpirvShader {
        stage: glsl.stage,
        entry_point: glsl.entry_point.clone(),
        words,
    })
}

fn run_compiler(compiler: &Path, glsl: &GlslShader, in_glsl: &Path, out_spv: &Path) -> Result<Vec<u32>, ShaderError> {
    let mut cmd = Command::new(compiler);
    cmd.arg("-V").arg("-S").arg(glsl.stage.glslang_stage());
    if !glsl.entry_point.is_empty() {
        cmd.arg("-e")
            .arg(&glsl.entry_point)
            .arg("--source-entrypoint")
            .arg(&glsl.entry_point);
    }
    cmd.arg("-o").arg(out_spv).arg(in_glsl);
    debug!("Running {:?}", cmd);

    let output = cmd.output().map_err(|e| {
        ShaderError::CompilationFailed(format!("failed to run {}: {}", compiler.display(), e))
    })?;
    if !output.status.success() {
        let mut msg = String::new();
        msg.push_str("glslangValidator failed\n");
        msg.push_str(&String::from_utf8_lossy(&output.stdout));
        msg.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ShaderError::CompilationFailed(msg));
    }

    spirv_words_from_bytes(&std::fs::read(out_spv)?)
}

/// Emit GLSL for `shader` and compile it to SPIR-V in one go.
pub fn compile_cfg_to_glsl_and_spirv(
    document: &Document<'_>,
    shader: NodeHandle,
    stage: ShaderStage,
    options: &GlslOptions,
    config: &SpirvCompilerConfig,
) -> Result<(GlslShader, SpirvShader), ShaderError> {
    let name = document.name(shader).map(|name| name.as_str()).unwrap_or_default();
    let glsl = compile_cfg_to_glsl(document, shader, stage, options);
    let spirv = compile_glsl_to_spirv(name, &glsl, config)?;
    Ok((glsl, spirv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_little_endian() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(spirv_words_from_bytes(&bytes).unwrap(), [SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_unaligned_or_foreign_bytes() {
        assert!(matches!(spirv_words_from_bytes(&[0x03, 0x02, 0x23]), Err(ShaderError::InvalidSpirv(_))));
        assert!(matches!(spirv_words_from_bytes(&[]), Err(ShaderError::InvalidSpirv(_))));
        assert!(matches!(
            spirv_words_from_bytes(&[0x07, 0x23, 0x02, 0x03]),
            Err(ShaderError::InvalidSpirv(_))
        ));
    }

    #[test]
    fn bytes_round_trip_through_words() {
        let shader = SpirvShader {
            stage: ShaderStage::Vertex,
            entry_point: "main".into(),
            words: vec![SPIRV_MAGIC, 0x0001_0300],
        };
        assert_eq!(spirv_words_from_bytes(&shader.to_bytes()).unwrap(), shader.words);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("shaders/basic shader.cfg"), "shaders_basic_shader.cfg");
    }

    #[test]
    fn missing_compiler_is_a_compilation_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SpirvCompilerConfigBuilder::default()
            .compiler(dir.path().join("no-such-compiler"))
            .intermediate_dir(dir.path().to_path_buf())
            .build()
            .unwrap();
        let glsl = GlslShader {
            stage: ShaderStage::Fragment,
            entry_point: "main".into(),
            code: "#version 450\nvoid main() {}\n".into(),
        };

        let error = compile_glsl_to_spirv("missing", &glsl, &config).unwrap_err();
        assert!(matches!(error, ShaderError::CompilationFailed(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
