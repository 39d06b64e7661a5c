//! Rewrites one source module into the body of a registry factory.
//!
//! Every rewrite keeps the module's line structure: removed statements leave
//! their newlines behind, so line `n` of the body is line `n` of the source.
//! Import requires and export getters go into a single header line; every
//! use of an imported name reads through its namespace object so bindings
//! stay live across cycles.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_diagnostics::{GraphicalReportHandler, GraphicalTheme, NamedSource, OxcDiagnostic};
use oxc_parser::Parser;
use oxc_semantic::{Semantic, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Esm,
    CommonJs,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `import` / `export ... from`: must resolve.
    Static,
    /// `require()`: left to the runtime when unresolved.
    Require,
    /// `import()`: inlined when resolved.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub specifier: String,
    pub kind: RequestKind,
}

#[derive(Debug, Clone)]
pub struct LinkedModule {
    pub kind: ModuleKind,
    /// Statements that run before the body; never contains a newline.
    pub header: String,
    pub body: String,
    pub requests: Vec<ModuleRequest>,
    /// Names this module exports through getters (ES modules only).
    pub exports: Vec<String>,
}

/// Parses and rewrites a module. The error is a rendered diagnostic.
pub fn link_module(path: &Path, source: &str) -> std::result::Result<LinkedModule, String> {
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str::<serde_json::Value>(source)
            .map_err(|e| format!("{}: invalid JSON: {}", path.display(), e))?;
        return Ok(LinkedModule {
            kind: ModuleKind::Json,
            header: String::new(),
            body: format!("module.exports = {};", source.trim_end()),
            requests: Vec::new(),
            exports: Vec::new(),
        });
    }

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();

    if parsed.errors.is_empty() {
        let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
        if has_module_syntax(&parsed.program) {
            return Ok(EsmRewriter::new(source, &semantic).rewrite(&parsed.program));
        }
        return Ok(wrap_commonjs(source, &semantic));
    }

    // Sloppy scripts (`with`, legacy octals, `arguments` games) only parse
    // outside of module mode.
    let script = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if script.errors.is_empty() {
        let semantic = SemanticBuilder::new().build(&script.program).semantic;
        return Ok(wrap_commonjs(source, &semantic));
    }

    Err(render_diagnostics(path, source, parsed.errors))
}

fn has_module_syntax(program: &Program) -> bool {
    program.body.iter().any(|statement| {
        matches!(
            statement,
            Statement::ImportDeclaration(_)
                | Statement::ExportAllDeclaration(_)
                | Statement::ExportDefaultDeclaration(_)
                | Statement::ExportNamedDeclaration(_)
        )
    })
}

fn wrap_commonjs(source: &str, semantic: &Semantic) -> LinkedModule {
    let mut edits = Vec::new();
    let mut requests = Vec::new();
    scan_calls(semantic, &mut edits, &mut requests);

    LinkedModule {
        kind: ModuleKind::CommonJs,
        header: String::new(),
        body: apply_edits(source, edits),
        requests,
        exports: Vec::new(),
    }
}

/// Renders parser diagnostics with their source excerpt, unmodified.
pub fn render_diagnostics(path: &Path, source: &str, errors: Vec<OxcDiagnostic>) -> String {
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    let name = path.display().to_string();

    errors
        .into_iter()
        .map(|error| {
            let report = error.with_source_code(NamedSource::new(name.clone(), source.to_string()));
            let mut rendered = String::new();
            match handler.render_report(&mut rendered, report.as_ref()) {
                Ok(()) => rendered,
                Err(_) => report.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            start: span.start as usize,
            end: span.end as usize,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: u32, text: impl Into<String>) -> Self {
        Self {
            start: at as usize,
            end: at as usize,
            replacement: text.into(),
        }
    }
}

/// Applies non-overlapping edits in source order. An edit that starts inside
/// an earlier one is dropped.
pub(crate) fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| (edit.start, edit.end));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Finds `require("x")` calls on the global `require` and rewrites every
/// `import(...)` to the runtime's `__dynamicImport(...)`. Strings and
/// comments that merely look like calls are not touched.
fn scan_calls(semantic: &Semantic, edits: &mut Vec<Edit>, requests: &mut Vec<ModuleRequest>) {
    let scoping = semantic.scoping();

    for node in semantic.nodes().iter() {
        match node.kind() {
            AstKind::ImportExpression(import) => {
                edits.push(Edit {
                    start: import.span.start as usize,
                    end: import.span.start as usize + "import".len(),
                    replacement: "__dynamicImport".to_string(),
                });
                if let Expression::StringLiteral(specifier) = &import.source {
                    push_request(requests, specifier.value.as_str(), RequestKind::Dynamic);
                }
            }
            AstKind::CallExpression(call) => {
                let Expression::Identifier(callee) = &call.callee else {
                    continue;
                };
                let is_global = callee
                    .reference_id
                    .get()
                    .map_or(true, |id| scoping.get_reference(id).symbol_id().is_none());
                if callee.name != "require" || !is_global || call.arguments.len() != 1 {
                    continue;
                }
                if let Some(Argument::StringLiteral(specifier)) = call.arguments.first() {
                    push_request(requests, specifier.value.as_str(), RequestKind::Require);
                }
            }
            _ => {}
        }
    }
}

fn push_request(requests: &mut Vec<ModuleRequest>, specifier: &str, kind: RequestKind) {
    let exists = requests
        .iter()
        .any(|request| request.specifier == specifier && request.kind == kind);
    if !exists {
        requests.push(ModuleRequest {
            specifier: specifier.to_string(),
            kind,
        });
    }
}

/// JSON string literals are valid JavaScript string literals.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

struct EsmRewriter<'s, 'a> {
    source: &'s str,
    semantic: &'s Semantic<'a>,
    edits: Vec<Edit>,
    requests: Vec<ModuleRequest>,
    namespaces: Vec<(String, String)>,
    imports: Vec<String>,
    /// Local import name → the expression every use is rewritten to.
    live: Vec<(String, String)>,
    getters: Vec<(String, String)>,
    stars: Vec<String>,
}

impl<'s, 'a> EsmRewriter<'s, 'a> {
    fn new(source: &'s str, semantic: &'s Semantic<'a>) -> Self {
        Self {
            source,
            semantic,
            edits: Vec::new(),
            requests: Vec::new(),
            namespaces: Vec::new(),
            imports: Vec::new(),
            live: Vec::new(),
            getters: Vec::new(),
            stars: Vec::new(),
        }
    }

    fn rewrite(mut self, program: &Program) -> LinkedModule {
        // Imports are hoisted, so `export { x }` may precede `import { x }`.
        for statement in &program.body {
            if let Statement::ImportDeclaration(decl) = statement {
                self.import_declaration(decl);
            }
        }

        for statement in &program.body {
            match statement {
                Statement::ExportNamedDeclaration(decl) => self.export_named(decl),
                Statement::ExportDefaultDeclaration(decl) => self.export_default(decl),
                Statement::ExportAllDeclaration(decl) => {
                    let namespace = self.namespace(decl.source.value.as_str());
                    match &decl.exported {
                        Some(exported) => self.getter(exported.name().as_str(), namespace),
                        None => self
                            .stars
                            .push(format!("__exportStar(exports, {});", namespace)),
                    }
                    self.blank(decl.span);
                }
                _ => {}
            }
        }

        let mut requests = std::mem::take(&mut self.requests);
        scan_calls(self.semantic, &mut self.edits, &mut requests);

        // Getters first so a cyclic importer already sees this module's shape.
        let getters = self
            .getters
            .iter()
            .map(|(name, value)| format!("{}: function () {{ return {}; }}", js_string(name), value))
            .collect::<Vec<_>>()
            .join(", ");
        let mut header = vec![
            "\"use strict\";".to_string(),
            format!("__export(exports, {{{}}});", getters),
        ];
        header.extend(self.imports);
        header.extend(self.stars);

        LinkedModule {
            kind: ModuleKind::Esm,
            header: header.join(" "),
            body: apply_edits(self.source, self.edits),
            requests,
            exports: self.getters.into_iter().map(|(name, _)| name).collect(),
        }
    }

    fn import_declaration(&mut self, decl: &ImportDeclaration) {
        let namespace = self.namespace(decl.source.value.as_str());
        if let Some(specifiers) = &decl.specifiers {
            for specifier in specifiers {
                match specifier {
                    ImportDeclarationSpecifier::ImportSpecifier(named) => {
                        let value = member(&namespace, named.imported.name().as_str());
                        self.live_binding(&named.local, value);
                    }
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(default_import) => {
                        let value = member(&namespace, "default");
                        self.live_binding(&default_import.local, value);
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(all) => {
                        self.live_binding(&all.local, namespace.clone());
                    }
                }
            }
        }
        self.blank(decl.span);
    }

    /// Points every reference to an imported name at its namespace member.
    /// Calls keep an undefined receiver and shorthand properties keep their
    /// key.
    fn live_binding(&mut self, local: &BindingIdentifier, value: String) {
        if let Some(symbol_id) = local.symbol_id.get() {
            self.rewrite_references(symbol_id, &value);
        }
        self.live.push((local.name.to_string(), value));
    }

    fn rewrite_references(&mut self, symbol_id: SymbolId, value: &str) {
        let scoping = self.semantic.scoping();
        let nodes = self.semantic.nodes();

        for reference in scoping.get_resolved_references(symbol_id) {
            let node_id = reference.node_id();
            let AstKind::IdentifierReference(ident) = nodes.kind(node_id) else {
                continue;
            };
            let replacement = match nodes.parent_kind(node_id) {
                AstKind::ExportSpecifier(_) => continue,
                AstKind::CallExpression(call) if call.callee.span() == ident.span => {
                    format!("(0, {})", value)
                }
                AstKind::TaggedTemplateExpression(tagged) if tagged.tag.span() == ident.span => {
                    format!("(0, {})", value)
                }
                AstKind::ObjectProperty(property) if property.shorthand => {
                    format!("{}: {}", ident.name, value)
                }
                AstKind::AssignmentTargetPropertyIdentifier(_) => format!("{}: {}", ident.name, value),
                _ => value.to_string(),
            };
            self.edits.push(Edit::new(ident.span, replacement));
        }
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration) {
        if let Some(source) = &decl.source {
            let namespace = self.namespace(source.value.as_str());
            for specifier in &decl.specifiers {
                let value = member(&namespace, specifier.local.name().as_str());
                self.getter(specifier.exported.name().as_str(), value);
            }
            self.blank(decl.span);
            return;
        }

        if let Some(declaration) = &decl.declaration {
            self.strip(decl.span.start, declaration.span().start, "");
            for name in declared_names(declaration) {
                self.getter(&name, name.clone());
            }
            return;
        }

        for specifier in &decl.specifiers {
            let local = specifier.local.name().to_string();
            let value = self
                .live
                .iter()
                .find(|(name, _)| *name == local)
                .map(|(_, value)| value.clone())
                .unwrap_or(local);
            self.getter(specifier.exported.name().as_str(), value);
        }
        self.blank(decl.span);
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration) {
        let named = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                func.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                class.id.as_ref().map(|id| id.name.to_string())
            }
            _ => None,
        };

        let declaration_span = decl.declaration.span();
        match named {
            Some(name) => {
                self.strip(decl.span.start, declaration_span.start, "");
                self.getter("default", name);
            }
            None => {
                self.strip(decl.span.start, declaration_span.start, "var __default = ");
                let is_declaration = matches!(
                    decl.declaration,
                    ExportDefaultDeclarationKind::FunctionDeclaration(_)
                        | ExportDefaultDeclarationKind::ClassDeclaration(_)
                );
                if is_declaration {
                    self.edits.push(Edit::insert(declaration_span.end, ";"));
                }
                self.getter("default", "__default".to_string());
            }
        }
    }

    /// One `require` per distinct specifier, in first-import order.
    fn namespace(&mut self, specifier: &str) -> String {
        if let Some((_, name)) = self.namespaces.iter().find(|(seen, _)| seen == specifier) {
            return name.clone();
        }
        let name = format!("__import{}", self.namespaces.len());
        self.imports.push(format!(
            "var {} = __toESM(require({}));",
            name,
            js_string(specifier)
        ));
        push_request(&mut self.requests, specifier, RequestKind::Static);
        self.namespaces.push((specifier.to_string(), name.clone()));
        name
    }

    fn getter(&mut self, exported: &str, value: String) {
        if let Some(existing) = self.getters.iter_mut().find(|(name, _)| name == exported) {
            existing.1 = value;
        } else {
            self.getters.push((exported.to_string(), value));
        }
    }

    fn blank(&mut self, span: Span) {
        let newlines = self.source[span.start as usize..span.end as usize].matches('\n').count();
        self.edits.push(Edit::new(span, "\n".repeat(newlines)));
    }

    fn strip(&mut self, start: u32, end: u32, replacement: &str) {
        let newlines = self.source[start as usize..end as usize].matches('\n').count();
        self.edits.push(Edit::new(
            Span::new(start, end),
            format!("{}{}", replacement, "\n".repeat(newlines)),
        ));
    }
}

fn member(namespace: &str, name: &str) -> String {
    format!("{}[{}]", namespace, js_string(name))
}

/// Names bound by an exported declaration, destructuring included.
fn declared_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(variables) => {
            for declarator in &variables.declarations {
                pattern_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => names.extend(func.id.iter().map(|id| id.name.to_string())),
        Declaration::ClassDeclaration(class) => names.extend(class.id.iter().map(|id| id.name.to_string())),
        _ => {}
    }
    names
}

fn pattern_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::AssignmentPattern(assignment) => pattern_names(&assignment.left, names),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                pattern_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                pattern_names(element, names);
            }
            if let Some(rest) = &array.rest {
                pattern_names(&rest.argument, names);
            }
        }
    }
}
