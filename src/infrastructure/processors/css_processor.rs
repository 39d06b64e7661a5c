use crate::core::interfaces::CssOptimizer;
use crate::utils::{FlowError, Logger, Result, Timer};
use lightningcss::{
    printer::PrinterOptions,
    stylesheet::{MinifyOptions, ParserOptions as CssParserOptions, StyleSheet},
};

/// CSS optimization pass backed by lightningcss.
pub struct LightningCssProcessor;

impl LightningCssProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Parses, merges and prints `content` minified. Unparseable input falls
    /// back to line-level whitespace stripping.
    pub fn optimize_sync(content: &str, file_name: &str) -> String {
        let options = CssParserOptions {
            filename: file_name.to_string(),
            error_recovery: true,
            ..CssParserOptions::default()
        };

        let mut stylesheet = match StyleSheet::parse(content, options) {
            Ok(stylesheet) => stylesheet,
            Err(e) => {
                Logger::warn(&format!(
                    "CSS parse error in {} ({}), using fallback minification",
                    file_name, e
                ));
                return fallback_minify(content);
            }
        };

        if let Err(e) = stylesheet.minify(MinifyOptions::default()) {
            Logger::warn(&format!(
                "CSS optimization failed for {} ({}), using fallback minification",
                file_name, e
            ));
            return fallback_minify(content);
        }

        match stylesheet.to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        }) {
            Ok(result) => result.code,
            Err(e) => {
                Logger::warn(&format!(
                    "CSS printing failed for {} ({}), using fallback minification",
                    file_name, e
                ));
                fallback_minify(content)
            }
        }
    }
}

#[async_trait::async_trait]
impl CssOptimizer for LightningCssProcessor {
    async fn optimize(&self, css: &str, file_name: &str) -> Result<String> {
        let _timer = Timer::start(&format!("Optimizing CSS {}", file_name));

        let css = css.to_string();
        let file_name = file_name.to_string();
        tokio::task::spawn_blocking(move || Self::optimize_sync(&css, &file_name))
            .await
            .map_err(|e| FlowError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}

fn fallback_minify(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Default for LightningCssProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_css_optimization() {
        let processor = LightningCssProcessor::new();

        let css = r#"
        body {
            color: red;
            background: blue;
        }

        .container {
            margin: 0 auto;
        }
        "#;

        let result = processor.optimize(css, "test.css").await.unwrap();

        assert!(result.len() < css.len());
        assert!(result.contains("body{"));
        assert!(result.contains(".container{"));
        assert!(!result.contains('\n'));
    }

    #[test]
    fn selector_and_brace_are_joined() {
        let result = LightningCssProcessor::optimize_sync("a {color:red}\nb { color: blue }", "x.css");
        assert!(result.starts_with("a{color:red}"));
        assert!(result.contains("b{color:"));
        assert!(!result.contains("a {"));
    }

    #[test]
    fn fallback_strips_whitespace() {
        assert_eq!(fallback_minify("a {\n  color: red;\n}\n"), "a { color: red; }");
    }

    #[test]
    fn fallback_keeps_descendant_selectors_apart() {
        assert_eq!(fallback_minify("div\np {}\n"), "div p {}");
    }
}
