use super::edits::{Accepted, Group};
use crate::utils::{FlowError, Result};
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_semantic::{NodeId, Semantic, SymbolId};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// One parse of the module being lowered.
pub(super) struct Pass<'s, 'a> {
    pub path: &'s Path,
    pub source: &'s str,
    pub semantic: &'s Semantic<'a>,
    pub names: Names,
    pub lexical: Lexical,
    /// Block-scoped bindings that closures capture inside a loop.
    pub captured: HashSet<SymbolId>,
    groups: Vec<Group>,
}

impl<'s, 'a> Pass<'s, 'a> {
    pub fn new(path: &'s Path, source: &'s str, semantic: &'s Semantic<'a>) -> Self {
        Self {
            path,
            source,
            semantic,
            names: Names::new(semantic),
            lexical: Lexical::new(semantic),
            captured: HashSet::new(),
            groups: Vec::new(),
        }
    }

    pub fn text(&self, span: Span) -> &'s str {
        &self.source[span.start as usize..span.end as usize]
    }

    pub fn slice(&self, start: u32, end: u32) -> &'s str {
        &self.source[start as usize..end as usize]
    }

    pub fn push(&mut self, group: Group) {
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    /// Applies every group that does not collide with an earlier one.
    /// Returns `None` once nothing is left to lower.
    pub fn finish(self) -> Option<String> {
        let mut accepted = Accepted::default();
        for group in self.groups {
            accepted.offer(group, self.source);
        }
        if accepted.is_empty() {
            None
        } else {
            Some(accepted.apply(self.source))
        }
    }

    pub fn unsupported(&self, span: Span, what: &str) -> FlowError {
        FlowError::config(format!(
            "{}:{}: {} cannot be lowered to ES5",
            self.path.display(),
            line_of(self.source, span.start),
            what
        ))
    }

    pub fn fail<T>(&self, span: Span, what: &str) -> Result<T> {
        Err(self.unsupported(span, what))
    }

    /// Where a `var` for `node` goes: the start of the nearest function
    /// body with braces, or of the program.
    pub fn hoist_point(&self, node: NodeId) -> u32 {
        let nodes = self.semantic.nodes();
        for ancestor in nodes.ancestors(node) {
            match ancestor.kind() {
                AstKind::Function(function) => {
                    if let Some(body) = &function.body {
                        return body_start(body);
                    }
                }
                AstKind::ArrowFunctionExpression(arrow) if !arrow.expression => {
                    return body_start(&arrow.body);
                }
                AstKind::Program(program) => {
                    return program
                        .directives
                        .last()
                        .map_or(program.span.start, |directive| directive.span.end);
                }
                _ => {}
            }
        }
        0
    }

    /// Source text of `start..end` with `edits` applied; edits must not
    /// overlap.
    pub fn copy(&self, start: u32, end: u32, mut edits: Vec<(u32, u32, String)>) -> String {
        edits.sort_by_key(|(from, to, _)| (*from, *to));
        let mut out = String::new();
        let mut cursor = start;
        for (from, to, text) in edits {
            if from < cursor || to > end {
                continue;
            }
            out.push_str(self.slice(cursor, from));
            out.push_str(&text);
            cursor = to;
        }
        out.push_str(self.slice(cursor, end));
        out
    }

    /// Whether a block-scoped binding must get a new name once it is a
    /// `var`. Bindings at the top of a function keep theirs, which also
    /// keeps the module's export getters pointing at them.
    pub fn needs_rename(&self, symbol: SymbolId) -> bool {
        let scoping = self.semantic.scoping();
        let scope = scoping.symbol_scope_id(symbol);
        !scoping.scope_flags(scope).intersects(ScopeFlags::Var) && self.names.is_shared(scoping.symbol_name(symbol))
    }
}

pub(super) fn body_start(body: &FunctionBody) -> u32 {
    body.directives
        .last()
        .map_or(body.span.start + 1, |directive| directive.span.end)
}

pub(super) fn line_of(text: &str, offset: u32) -> usize {
    super::verify::line_of(text, offset)
}

/// Names already used anywhere in the module.
pub(super) struct Names {
    taken: HashSet<String>,
    counts: HashMap<String, usize>,
}

impl Names {
    fn new(semantic: &Semantic) -> Self {
        let scoping = semantic.scoping();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for name in scoping.symbol_names() {
            *counts.entry(name.to_string()).or_default() += 1;
        }
        for name in scoping.root_unresolved_references().keys() {
            *counts.entry(name.to_string()).or_default() += 1;
        }
        Self {
            taken: counts.keys().cloned().collect(),
            counts,
        }
    }

    /// `_base`, `_base2`, ... whichever is free first.
    pub fn fresh(&mut self, base: &str) -> String {
        let base: String = base
            .trim_start_matches('_')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        let base = if base.is_empty() { "ref".to_string() } else { base };

        let mut candidate = format!("_{}", base);
        let mut counter = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("_{}{}", base, counter);
            counter += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    /// Whether more than one binding, or a global, goes by `name`.
    pub fn is_shared(&self, name: &str) -> bool {
        self.counts.get(name).copied().unwrap_or(0) > 1
    }
}

/// Arrows that read `this`, `arguments` or `super` of their surroundings.
#[derive(Default)]
pub(super) struct Lexical {
    this: HashSet<u32>,
    arguments: HashMap<u32, Vec<Span>>,
}

impl Lexical {
    fn new(semantic: &Semantic) -> Self {
        let mut lexical = Self::default();
        let nodes = semantic.nodes();
        let scoping = semantic.scoping();

        for node in nodes.iter() {
            let arguments = match node.kind() {
                AstKind::ThisExpression(_) | AstKind::Super(_) => false,
                AstKind::IdentifierReference(reference) if reference.name == "arguments" => {
                    let resolved = reference
                        .reference_id
                        .get()
                        .and_then(|id| scoping.get_reference(id).symbol_id());
                    if resolved.is_some() {
                        continue;
                    }
                    true
                }
                _ => continue,
            };

            for ancestor in nodes.ancestors(node.id()) {
                match ancestor.kind() {
                    AstKind::ArrowFunctionExpression(arrow) => {
                        if arguments {
                            lexical
                                .arguments
                                .entry(arrow.span.start)
                                .or_default()
                                .push(node.kind().span());
                        } else {
                            lexical.this.insert(arrow.span.start);
                        }
                    }
                    AstKind::Function(_)
                    | AstKind::StaticBlock(_)
                    | AstKind::PropertyDefinition(_)
                    | AstKind::AccessorProperty(_) => break,
                    _ => {}
                }
            }
        }
        lexical
    }

    pub fn arrow_uses_this(&self, arrow: &ArrowFunctionExpression) -> bool {
        self.this.contains(&arrow.span.start)
    }

    /// Every `arguments` the arrow reads from its enclosing function.
    pub fn arrow_arguments(&self, arrow: &ArrowFunctionExpression) -> &[Span] {
        self.arguments
            .get(&arrow.span.start)
            .map_or(&[], |spans| spans.as_slice())
    }

    /// Whether `this` or `super` is read anywhere inside `span` on behalf of
    /// the code around it.
    pub fn this_inside(&self, semantic: &Semantic, span: Span) -> bool {
        let nodes = semantic.nodes();
        nodes.iter().any(|node| {
            let kind = node.kind();
            if !matches!(kind, AstKind::ThisExpression(_) | AstKind::Super(_)) {
                return false;
            }
            let at = kind.span();
            if at.start < span.start || at.end > span.end {
                return false;
            }
            for ancestor in nodes.ancestors(node.id()) {
                let ancestor_span = ancestor.kind().span();
                if ancestor_span.start < span.start || ancestor_span.end > span.end {
                    return true;
                }
                if matches!(
                    ancestor.kind(),
                    AstKind::Function(_)
                        | AstKind::StaticBlock(_)
                        | AstKind::PropertyDefinition(_)
                        | AstKind::AccessorProperty(_)
                ) {
                    return false;
                }
            }
            true
        })
    }
}

/// `babelHelpers`-free ES5 string literal.
pub(super) fn es5_string(value: &str) -> String {
    crate::infrastructure::bundler::linker::js_string(value)
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// The text to use after `obj` to read `key`: `.name` or `[expr]`.
pub(super) fn member_access(pass: &Pass, key: &PropertyKey, computed: bool) -> String {
    match key {
        PropertyKey::StaticIdentifier(id) if !computed => format!(".{}", id.name),
        PropertyKey::PrivateIdentifier(id) => format!(".#{}", id.name),
        _ => format!("[{}]", pass.text(key.span())),
    }
}

/// A key as a value: `"name"` for identifiers, the literal or the
/// expression otherwise.
pub(super) fn key_value(pass: &Pass, key: &PropertyKey, computed: bool) -> String {
    match key {
        PropertyKey::StaticIdentifier(id) if !computed => es5_string(&id.name),
        _ => pass.text(key.span()).to_string(),
    }
}

/// The property name a non-computed key stands for.
pub(super) fn key_name(key: &PropertyKey) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(literal) => Some(literal.value.to_string()),
        PropertyKey::NumericLiteral(literal) => Some(number_name(literal.value)),
        _ => None,
    }
}

pub(super) fn number_name(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
