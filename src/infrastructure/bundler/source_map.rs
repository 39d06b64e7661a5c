use super::graph::ModuleGraph;
use super::runtime::LineOrigins;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sourcemap::{SourceMap, SourceMapBuilder};
use std::path::Path;

/// Maps the generated bundle back to the original module files.
///
/// `generated_map` maps output positions to positions in the assembled
/// bundle; the line origins take those on to the module sources. Columns
/// carry over unchanged, which is exact for every line except a module's
/// first, where the rewrite may have shifted them.
pub fn compose(
    generated_map: &str,
    origins: &LineOrigins,
    graph: &ModuleGraph,
    root: &Path,
    file_name: &str,
) -> Result<String, String> {
    let intermediate = SourceMap::from_slice(generated_map.as_bytes()).map_err(|e| e.to_string())?;

    let mut builder = SourceMapBuilder::new(Some(file_name));
    let mut source_ids: Vec<Option<u32>> = vec![None; graph.modules.len()];

    for token in intermediate.tokens() {
        let Some(Some((module, line))) = origins.get(token.get_src_line() as usize).copied() else {
            continue;
        };

        let source_id = match source_ids[module] {
            Some(id) => id,
            None => {
                let graph_module = &graph.modules[module];
                let display = graph_module
                    .path
                    .strip_prefix(root)
                    .unwrap_or(&graph_module.path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let id = builder.add_source(&display);
                builder.set_source_contents(id, Some(&graph_module.source));
                source_ids[module] = Some(id);
                id
            }
        };

        let name = token.get_name().map(|name| builder.add_name(name));
        builder.add_raw(
            token.get_dst_line(),
            token.get_dst_col(),
            line,
            token.get_src_col(),
            Some(source_id),
            name,
            false,
        );
    }

    let mut out = Vec::new();
    builder
        .into_sourcemap()
        .to_writer(&mut out)
        .map_err(|e| e.to_string())?;
    String::from_utf8(out).map_err(|e| e.to_string())
}

pub fn inline_comment(map_json: &str) -> String {
    format!(
        "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(map_json)
    )
}

pub fn file_comment(file_name: &str) -> String {
    format!("//# sourceMappingURL={}.map", file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_comment_is_a_base64_data_url() {
        let comment = inline_comment(r#"{"version":3}"#);
        let encoded = comment
            .strip_prefix("//# sourceMappingURL=data:application/json;charset=utf-8;base64,")
            .unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), br#"{"version":3}"#);
    }

    #[test]
    fn file_comment_names_the_sibling_map() {
        assert_eq!(
            file_comment("luckysheet.umd.js"),
            "//# sourceMappingURL=luckysheet.umd.js.map"
        );
    }
}
