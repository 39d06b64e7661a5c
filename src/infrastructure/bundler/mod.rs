//! In-process core module bundling built on oxc.
//!
//! The graph walk, module rewriting and runtime assembly live in the
//! submodules; this module runs the whole-bundle passes (target transpile,
//! minify, codegen with source maps) once per requested format.

pub mod graph;
pub mod linker;
pub mod lowering;
pub mod node_resolver;
pub mod polyfills;
pub mod runtime;
pub mod source_map;

pub use graph::ModuleGraph;
pub use lowering::{Lowering, TargetPlan};
pub use node_resolver::NodeResolver;

use crate::core::interfaces::ModuleBundler;
use crate::core::models::{BundleArtifact, BundleSpec, OutputFormat, SourceMapMode};
use crate::infrastructure::processors::minifier_options;
use crate::utils::{FlowError, Result, Timer};
use lowering::verify;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_ast::AstBuilder;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::Minifier;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::Transformer;
use runtime::AssembledBundle;
use std::path::{Path, PathBuf};

pub struct OxcBundler;

impl OxcBundler {
    pub fn new() -> Self {
        Self
    }

    /// Builds every requested format in memory. Any failure fails the whole
    /// call, so callers never see a partial set of artifacts.
    pub fn bundle_sync(spec: &BundleSpec) -> Result<Vec<BundleArtifact>> {
        let _timer = Timer::start(&format!("Bundling {}", spec.entry.display()));

        let plan = TargetPlan::new(&spec.targets)?;
        let graph = ModuleGraph::build(spec, plan.lowering())?;
        spec.formats
            .iter()
            .map(|&format| emit(spec, &plan, &graph, format))
            .collect()
    }
}

impl Default for OxcBundler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModuleBundler for OxcBundler {
    async fn bundle(&self, spec: &BundleSpec) -> Result<Vec<BundleArtifact>> {
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || Self::bundle_sync(&spec))
            .await
            .map_err(|e| FlowError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

fn emit(spec: &BundleSpec, plan: &TargetPlan, graph: &ModuleGraph, format: OutputFormat) -> Result<BundleArtifact> {
    let file_name = spec.output_file_name(format);
    let assembled = runtime::assemble(graph, format, &spec.library_name, plan.helpers());
    let (mut code, generated_map) = generate(spec, plan, graph, &assembled, format, &file_name)?;

    let mut source_map = None;
    if let Some(generated_map) = generated_map {
        let composed = source_map::compose(&generated_map, &assembled.origins, graph, &spec.root, &file_name)
            .map_err(|e| FlowError::bundle(&spec.entry, format!("source map composition failed: {}", e)))?;

        if !code.ends_with('\n') {
            code.push('\n');
        }
        match spec.source_map {
            SourceMapMode::Inline => code.push_str(&source_map::inline_comment(&composed)),
            SourceMapMode::File => {
                code.push_str(&source_map::file_comment(&file_name));
                source_map = Some(composed);
            }
            SourceMapMode::None => {}
        }
        code.push('\n');
    }

    Ok(BundleArtifact {
        file_name,
        format,
        code,
        source_map,
    })
}

/// Parses the assembled bundle, transpiles it for the targets, minifies it
/// when asked and prints it. The map, when requested, is relative to the
/// assembled text. ES5 bundles are checked twice: before minifying, where
/// spans still point into the assembled modules, and again on the printed
/// code.
fn generate(
    spec: &BundleSpec,
    plan: &TargetPlan,
    graph: &ModuleGraph,
    assembled: &AssembledBundle,
    format: OutputFormat,
    file_name: &str,
) -> Result<(String, Option<String>)> {
    let allocator = Allocator::default();
    let text = assembled.code.as_str();

    let parsed = Parser::new(&allocator, text, source_type(format)).parse();
    if !parsed.errors.is_empty() {
        let diagnostic = linker::render_diagnostics(Path::new(file_name), text, parsed.errors);
        return Err(FlowError::bundle(&spec.entry, diagnostic));
    }
    let mut program = parsed.program;

    if let Some(options) = plan.transform_options()? {
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let transformed = Transformer::new(&allocator, Path::new(file_name), &options)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            let diagnostic = linker::render_diagnostics(Path::new(file_name), text, transformed.errors);
            return Err(FlowError::bundle(&spec.entry, diagnostic));
        }
    }

    let es5 = plan.lowering() == Lowering::Es5;
    if es5 {
        ensure_es5(spec, plan, graph, assembled, &program)?;
    }

    let scoping = if spec.minify {
        Minifier::new(minifier_options(false))
            .minify(&allocator, &mut program)
            .scoping
    } else {
        None
    };
    if es5 {
        verify::restore_es5_forms(AstBuilder::new(&allocator), &mut program);
    }

    // The minified layout prints shorthand forms ES5 engines reject.
    let base = if spec.minify && !es5 {
        CodegenOptions::minify()
    } else {
        CodegenOptions::default()
    };
    let options = CodegenOptions {
        source_map_path: (spec.source_map != SourceMapMode::None).then(|| PathBuf::from(file_name)),
        ..base
    };

    let output = Codegen::new()
        .with_options(options)
        .with_scoping(scoping)
        .build(&program);
    if es5 {
        ensure_printed_es5(spec, plan, &output.code, format)?;
    }
    Ok((output.code, output.map.map(|map| map.to_json_string())))
}

fn source_type(format: OutputFormat) -> SourceType {
    match format {
        OutputFormat::Umd => SourceType::cjs(),
        OutputFormat::Esm => SourceType::mjs(),
    }
}

/// Rejects a transpiled bundle that still needs more than ES5 or calls a
/// helper the runtime lacks, naming the module line each construct came from.
fn ensure_es5(
    spec: &BundleSpec,
    plan: &TargetPlan,
    graph: &ModuleGraph,
    assembled: &AssembledBundle,
    program: &Program,
) -> Result<()> {
    let missing = verify::missing_helpers(program);
    if !missing.is_empty() {
        return Err(FlowError::config(format!(
            "targets {} need babelHelpers.{} which the bundle runtime does not provide",
            plan.targets().join(", "),
            missing.join(", babelHelpers.")
        )));
    }

    let violations = verify::newer_syntax(program);
    if violations.is_empty() {
        return Ok(());
    }
    let summary = verify::describe(&violations, |span| {
        let line = verify::line_of(&assembled.code, span.start);
        match assembled.origins.get(line - 1).copied().flatten() {
            Some((module, module_line)) => {
                let path = &graph.modules[module].path;
                let shown = path.strip_prefix(&spec.root).unwrap_or(path);
                format!("{}:{}", shown.display(), module_line + 1)
            }
            None => format!("bundle line {}", line),
        }
    });
    Err(FlowError::config(format!(
        "targets {} cannot be met: {}",
        plan.targets().join(", "),
        summary
    )))
}

/// Same check on the printed output, which the compressor may have changed.
fn ensure_printed_es5(spec: &BundleSpec, plan: &TargetPlan, code: &str, format: OutputFormat) -> Result<()> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, source_type(format)).parse();
    if !parsed.errors.is_empty() {
        let diagnostic = linker::render_diagnostics(Path::new(&spec.output_file_name(format)), code, parsed.errors);
        return Err(FlowError::bundle(&spec.entry, diagnostic));
    }
    let violations = verify::newer_syntax(&parsed.program);
    if violations.is_empty() {
        return Ok(());
    }
    Err(FlowError::config(format!(
        "targets {} cannot be met: {}",
        plan.targets().join(", "),
        verify::describe(&violations, |span| format!("output line {}", verify::line_of(code, span.start)))
    )))
}
