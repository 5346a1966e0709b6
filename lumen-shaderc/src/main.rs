use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::anyhow;
use clap::Parser;
use log::{error, info, warn};

use lumen::cfg::{parse, Document, ParsingContext};
use lumen::core::cli::CommonArgs;
use lumen::shader::{
    compile_cfg_to_glsl, compile_glsl_to_spirv, GlslOptions, ShaderStage, SpirvCompilerConfig,
    SpirvCompilerConfigBuilder,
};

/// Compile a Cfg shader description to GLSL and SPIR-V.
///
/// Pass `-` as an output path to write to stdout.
#[derive(Parser, Debug)]
#[command(name = "lumen-shaderc", version)]
struct Args {
    /// The input config file to compile
    input: PathBuf,

    /// Vertex shader output file as GLSL code
    #[arg(long = "glsl-vert", value_name = "FILE")]
    glsl_vert: Option<PathBuf>,

    /// Vertex shader output file as SPIR-V bytecode
    #[arg(long = "spirv-vert", value_name = "FILE")]
    spirv_vert: Option<PathBuf>,

    /// Fragment shader output file as GLSL code
    #[arg(long = "glsl-frag", value_name = "FILE")]
    glsl_frag: Option<PathBuf>,

    /// Fragment shader output file as SPIR-V bytecode
    #[arg(long = "spirv-frag", value_name = "FILE")]
    spirv_frag: Option<PathBuf>,

    /// glslangValidator executable to use instead of the one found in the environment
    #[arg(long, value_name = "FILE")]
    glslang: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

struct StageOutputs<'a> {
    node_name: &'static str,
    stage: ShaderStage,
    glsl: Option<&'a Path>,
    spirv: Option<&'a Path>,
}

/// Failure carrying the process exit code it maps to.
struct Failure {
    code: u8,
    error: anyhow::Error,
}

impl Failure {
    const READ: u8 = 2;
    const PARSE: u8 = 3;
    const COMPILE: u8 = 4;

    fn new(code: u8, error: impl Into<anyhow::Error>) -> Self {
        Self { code, error: error.into() }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = lumen::initialize(args.common.level_filter()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{:#}", failure.error);
            ExitCode::from(failure.code)
        }
    }
}

fn run(args: &Args) -> Result<(), Failure> {
    let text = lumen::core::file::load_text(&args.input)
        .map_err(|e| Failure::new(Failure::READ, e.context("Failed to read file")))?;

    let mut context = ParsingContext::new(args.input.display().to_string());
    let document = parse(&text, &mut context)
        .map_err(|e| Failure::new(Failure::PARSE, anyhow::Error::new(e).context("Failed to parse cfg")))?;

    let config = compiler_config(args).map_err(|e| Failure::new(Failure::COMPILE, e))?;
    let options = GlslOptions::default();

    let stages = [
        StageOutputs {
            node_name: "VertexShader",
            stage: ShaderStage::Vertex,
            glsl: args.glsl_vert.as_deref(),
            spirv: args.spirv_vert.as_deref(),
        },
        StageOutputs {
            node_name: "FragmentShader",
            stage: ShaderStage::Fragment,
            glsl: args.glsl_frag.as_deref(),
            spirv: args.spirv_frag.as_deref(),
        },
    ];
    for outputs in &stages {
        compile_stage(&document, outputs, &options, &config)?;
    }

    Ok(())
}

fn compiler_config(args: &Args) -> anyhow::Result<SpirvCompilerConfig> {
    let Some(glslang) = &args.glslang else {
        return Ok(SpirvCompilerConfig::default());
    };
    SpirvCompilerConfigBuilder::default()
        .compiler(glslang.clone())
        .build()
        .map_err(|e| anyhow!(e))
}

#[profiling::function]
fn compile_stage(
    document: &Document<'_>,
    outputs: &StageOutputs<'_>,
    options: &GlslOptions,
    config: &SpirvCompilerConfig,
) -> Result<(), Failure> {
    let Some(node) = document.find_child(document.root(), outputs.node_name) else {
        if outputs.glsl.is_some() || outputs.spirv.is_some() {
            warn!("No {} node, skipping its outputs.", outputs.node_name);
        }
        return Ok(());
    };

    info!("Compiling {} from Cfg to GLSL", outputs.node_name);
    let glsl = compile_cfg_to_glsl(document, node, outputs.stage, options);
    if let Some(path) = outputs.glsl {
        write_output(path, glsl.code.as_bytes(), "glsl", outputs.stage);
    }

    // glslangValidator is only needed when someone asked for the bytecode.
    if let Some(path) = outputs.spirv {
        info!("Compiling {} from GLSL to SPIR-V", outputs.node_name);
        let spirv = compile_glsl_to_spirv(outputs.node_name, &glsl, config)
            .map_err(|e| Failure::new(Failure::COMPILE, e))?;
        write_output(path, &spirv.to_bytes(), "spv", outputs.stage);
    }

    Ok(())
}

/// Write failures are reported but do not fail the run.
fn write_output(path: &Path, content: &[u8], kind: &str, stage: ShaderStage) {
    let result = if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(content).and_then(|_| stdout.flush())
    } else {
        std::fs::write(path, content)
    };

    if let Err(e) = result {
        warn!("{}: Failed to write {} {} shader file: {}", path.display(), kind, stage, e);
    }
}
