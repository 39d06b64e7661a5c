use crate::core::interfaces::ScriptMinifier;
use crate::utils::{FlowError, Result, Timer};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::es_target::ESTarget;

/// Minifier options shared by plugin scripts and the core bundle. The
/// compressor never introduces syntax newer than ES2015.
pub fn minifier_options(drop_console: bool) -> MinifierOptions {
    MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions {
            target: ESTarget::ES2015,
            drop_console,
            drop_debugger: drop_console,
            ..CompressOptions::default()
        }),
    }
}

/// JavaScript minification using oxc. Scripts are parsed in script mode so
/// top-level names, which plugins share as globals, are never mangled.
pub struct OxcMinifier {
    drop_console: bool,
}

impl OxcMinifier {
    pub fn new() -> Self {
        Self { drop_console: true }
    }

    pub fn minify(&self, source_code: &str, filename: &str) -> Result<String> {
        let allocator = Allocator::default();

        let parse_result = Parser::new(&allocator, source_code, SourceType::cjs()).parse();

        if !parse_result.errors.is_empty() {
            let errors: Vec<String> = parse_result
                .errors
                .iter()
                .map(|e| format!("Parse error: {}", e))
                .collect();
            return Err(FlowError::Minify {
                file: filename.to_string(),
                diagnostic: errors.join("\n"),
            });
        }

        let mut program = parse_result.program;
        let minified = Minifier::new(minifier_options(self.drop_console)).minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code;

        Ok(code)
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ScriptMinifier for OxcMinifier {
    async fn minify(&self, code: &str, file_name: &str) -> Result<String> {
        let _timer = Timer::start(&format!("Minifying {}", file_name));

        let code = code.to_string();
        let file_name = file_name.to_string();
        let drop_console = self.drop_console;

        // oxc is CPU-bound; keep it off the event loop.
        tokio::task::spawn_blocking(move || {
            OxcMinifier { drop_console }.minify(&code, &file_name)
        })
        .await
        .map_err(|e| FlowError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_minification() {
        let minifier = OxcMinifier::new();
        let source = r#"
            function hello(name) {
                const message = "Hello, " + name;
                console.log(message);
                return message;
            }
            window.hello = hello;
        "#;

        let minified = minifier.minify(source, "test.js").unwrap();
        assert!(minified.len() < source.len());
        assert!(!minified.contains("console.log"));
        assert!(minified.contains("hello"));
    }

    #[test]
    fn top_level_globals_survive() {
        let minifier = OxcMinifier::new();
        let source = "var jQuery = function (selector) { return selector; };\nwindow.$ = jQuery;\n";
        let minified = minifier.minify(source, "jquery.js").unwrap();
        assert!(minified.contains("jQuery"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let minifier = OxcMinifier::new();
        assert!(minifier.minify("function (", "broken.js").is_err());
    }
}
