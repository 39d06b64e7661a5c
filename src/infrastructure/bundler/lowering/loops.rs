//! `for...of` becomes an indexed loop over `babelHelpers.toArray`. A loop
//! whose block-scoped bindings are captured by closures gets its body moved
//! into a function, so each iteration keeps its own copy.

use super::context::Pass;
use super::edits::{Group, PAD};
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_semantic::{NodeId, SymbolId};
use oxc_span::{GetSpan, Span};
use oxc_syntax::symbol::SymbolFlags;
use std::collections::BTreeMap;

pub(super) fn collect_for_of(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    for node in semantic.nodes().iter() {
        let AstKind::ForOfStatement(statement) = node.kind() else {
            continue;
        };
        if statement.r#await {
            return pass.fail(statement.span, "for await");
        }

        let index = pass.names.fresh("i");
        let array = pass.names.fresh("arr");
        let item = format!("{}[{}]", array, index);
        let binding = match &statement.left {
            ForStatementLeft::VariableDeclaration(declaration) => {
                let keyword = match declaration.kind {
                    VariableDeclarationKind::Var => "var",
                    VariableDeclarationKind::Let => "let",
                    VariableDeclarationKind::Const => "const",
                    _ => return pass.fail(declaration.span, "using declarations"),
                };
                let Some(declarator) = declaration.declarations.first() else {
                    continue;
                };
                format!("{} {} = {};", keyword, pass.text(declarator.id.span()), item)
            }
            left => format!("({} = {});", pass.text(left.span()), item),
        };

        let head = format!(
            "for (var {0} = 0, {1} = babelHelpers.toArray({2}); {0} < {1}.length; {0}++) ",
            index,
            array,
            pass.text(statement.right.span())
        );

        let mut group = Group::new();
        match &statement.body {
            Statement::BlockStatement(block) => {
                group.replace(statement.span.start, block.span.start + 1, format!("{}{{{} {}", head, PAD, binding));
            }
            body => {
                group.replace(statement.span.start, body.span().start, format!("{}{{{} {} ", head, PAD, binding));
                group.close(statement.span, " }");
            }
        }
        pass.push(group);
    }
    Ok(())
}

/// Finds loops whose `let`/`const` bindings are read from a closure and
/// wraps their bodies. Records the captured bindings so block scoping
/// leaves them for a later pass.
pub(super) fn collect_captured(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    let scoping = semantic.scoping();
    let nodes = semantic.nodes();
    let mut loops: BTreeMap<u32, NodeId> = BTreeMap::new();

    for symbol in scoping.symbol_ids() {
        let flags = scoping.symbol_flags(symbol);
        if !flags.intersects(SymbolFlags::BlockScopedVariable | SymbolFlags::ConstVariable)
            || flags.contains(SymbolFlags::Class)
        {
            continue;
        }
        let Some(owner) = innermost_loop(pass, scoping.symbol_declaration(symbol)) else {
            continue;
        };
        let captured = scoping
            .get_resolved_references(symbol)
            .any(|reference| crosses_function(pass, reference.node_id(), owner));
        if captured {
            pass.captured.insert(symbol);
            loops.insert(nodes.kind(owner).span().start, owner);
        }
    }

    for owner in loops.into_values() {
        if let Some(group) = wrap(pass, owner)? {
            pass.push(group);
        }
    }
    Ok(())
}

fn is_loop(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::ForStatement(_)
            | AstKind::ForInStatement(_)
            | AstKind::ForOfStatement(_)
            | AstKind::WhileStatement(_)
            | AstKind::DoWhileStatement(_)
    )
}

fn is_function_boundary(kind: &AstKind) -> bool {
    matches!(
        kind,
        AstKind::Function(_)
            | AstKind::ArrowFunctionExpression(_)
            | AstKind::StaticBlock(_)
            | AstKind::PropertyDefinition(_)
    )
}

/// The loop a declaration belongs to, within its own function.
pub(super) fn innermost_loop(pass: &Pass, node: NodeId) -> Option<NodeId> {
    for ancestor in pass.semantic.nodes().ancestors(node) {
        let kind = ancestor.kind();
        if is_loop(&kind) {
            return Some(ancestor.id());
        }
        if is_function_boundary(&kind) {
            return None;
        }
    }
    None
}

/// Whether a function sits between `node` and `owner`.
fn crosses_function(pass: &Pass, node: NodeId, owner: NodeId) -> bool {
    for ancestor in pass.semantic.nodes().ancestors(node) {
        if ancestor.id() == owner {
            return false;
        }
        if is_function_boundary(&ancestor.kind()) {
            return true;
        }
    }
    false
}

/// Whether a function (or, with `arrows`, an arrow) sits between `node`
/// and the loop.
fn shielded(pass: &Pass, node: NodeId, owner: NodeId, arrows: bool) -> bool {
    for ancestor in pass.semantic.nodes().ancestors(node) {
        if ancestor.id() == owner {
            return false;
        }
        match ancestor.kind() {
            AstKind::ArrowFunctionExpression(_) if !arrows => {}
            kind if is_function_boundary(&kind) => return true,
            _ => {}
        }
    }
    false
}

/// The loop or switch an unlabeled `break`/`continue` leaves.
fn jump_target(pass: &Pass, node: NodeId, is_break: bool) -> Option<NodeId> {
    for ancestor in pass.semantic.nodes().ancestors(node) {
        let kind = ancestor.kind();
        if is_loop(&kind) || (is_break && matches!(kind, AstKind::SwitchStatement(_))) {
            return Some(ancestor.id());
        }
        if is_function_boundary(&kind) {
            return None;
        }
    }
    None
}

fn inside(span: Span, outer: Span) -> bool {
    span.start >= outer.start && span.end <= outer.end
}

struct Head<'a> {
    declaration: Option<&'a VariableDeclaration<'a>>,
    symbols: Vec<(SymbolId, String)>,
}

fn head_bindings<'a>(pass: &Pass, declaration: Option<&'a VariableDeclaration<'a>>) -> Result<Option<Head<'a>>> {
    let Some(declaration) = declaration.filter(|declaration| declaration.kind.is_lexical()) else {
        return Ok(Some(Head {
            declaration: None,
            symbols: Vec::new(),
        }));
    };
    let mut symbols = Vec::new();
    for declarator in &declaration.declarations {
        let BindingPatternKind::BindingIdentifier(id) = &declarator.id.kind else {
            if declarator.init.is_none() {
                return pass.fail(declarator.span, "destructuring in a for-in head");
            }
            return Ok(None);
        };
        if let Some(symbol) = id.symbol_id.get() {
            symbols.push((symbol, id.name.to_string()));
        }
    }
    Ok(Some(Head {
        declaration: Some(declaration),
        symbols,
    }))
}

fn wrap(pass: &mut Pass, owner: NodeId) -> Result<Option<Group>> {
    let semantic = pass.semantic;
    let nodes = semantic.nodes();
    let scoping = semantic.scoping();

    let (span, body, declaration, do_while) = match nodes.kind(owner) {
        AstKind::ForStatement(statement) => {
            let declaration = match &statement.init {
                Some(ForStatementInit::VariableDeclaration(declaration)) => Some(&**declaration),
                _ => None,
            };
            (statement.span, &statement.body, declaration, false)
        }
        AstKind::ForInStatement(statement) => {
            let declaration = match &statement.left {
                ForStatementLeft::VariableDeclaration(declaration) => Some(&**declaration),
                _ => None,
            };
            (statement.span, &statement.body, declaration, false)
        }
        AstKind::WhileStatement(statement) => (statement.span, &statement.body, None, false),
        AstKind::DoWhileStatement(statement) => (statement.span, &statement.body, None, true),
        _ => return Ok(None),
    };
    let Some(head) = head_bindings(pass, declaration)? else {
        return Ok(None);
    };
    let body_span = body.span();

    for (symbol, name) in &head.symbols {
        let written = scoping.get_resolved_references(*symbol).any(|reference| {
            reference.is_write() && inside(nodes.kind(reference.node_id()).span(), body_span)
        });
        if written {
            return pass.fail(body_span, &format!("assigning '{}' inside a loop whose bindings are captured", name));
        }
    }

    for symbol in scoping.symbol_ids() {
        let flags = scoping.symbol_flags(symbol);
        if !flags.intersects(SymbolFlags::FunctionScopedVariable | SymbolFlags::Function) {
            continue;
        }
        if !inside(scoping.symbol_span(symbol), body_span) {
            continue;
        }
        let escapes = scoping
            .get_resolved_references(symbol)
            .any(|reference| !inside(nodes.kind(reference.node_id()).span(), body_span));
        if escapes {
            return pass.fail(
                scoping.symbol_span(symbol),
                "a var declared in a loop whose bindings are captured, used after the loop,",
            );
        }
    }

    let mut group = Group::new();
    let mut breaks = false;
    let mut returns = false;

    for node in nodes.iter() {
        let kind = node.kind();
        let at = kind.span();
        if !inside(at, body_span) {
            continue;
        }
        match kind {
            AstKind::YieldExpression(_) | AstKind::AwaitExpression(_) if !shielded(pass, node.id(), owner, true) => {
                return pass.fail(at, "yield or await in a loop whose bindings are captured");
            }
            AstKind::IdentifierReference(reference)
                if reference.name == "arguments"
                    && reference
                        .reference_id
                        .get()
                        .and_then(|id| scoping.get_reference(id).symbol_id())
                        .is_none()
                    && !shielded(pass, node.id(), owner, false) =>
            {
                return pass.fail(at, "arguments in a loop whose bindings are captured");
            }
            AstKind::ContinueStatement(statement) => {
                if let Some(label) = &statement.label {
                    if !label_inside(pass, node.id(), &label.name, body_span) {
                        return pass.fail(at, "a labeled continue out of a loop whose bindings are captured");
                    }
                } else if jump_target(pass, node.id(), false) == Some(owner) {
                    group.replace_span(at, "return;");
                }
            }
            AstKind::BreakStatement(statement) => {
                if let Some(label) = &statement.label {
                    if !label_inside(pass, node.id(), &label.name, body_span) {
                        return pass.fail(at, "a labeled break out of a loop whose bindings are captured");
                    }
                } else if jump_target(pass, node.id(), true) == Some(owner) {
                    breaks = true;
                    group.replace_span(at, "return \"break\";");
                }
            }
            AstKind::ReturnStatement(statement) if !shielded(pass, node.id(), owner, true) => {
                returns = true;
                match &statement.argument {
                    Some(argument) => {
                        let value = argument.span();
                        group.replace(at.start, value.start, "return { v: (");
                        group.replace(value.end, at.end, ") };");
                    }
                    None => group.replace_span(at, "return { v: void 0 };"),
                }
            }
            _ => {}
        }
    }

    // The header becomes `var` and may need renaming in the enclosing function.
    let mut header_edits = Vec::new();
    let mut arguments = Vec::new();
    let mut parameters = Vec::new();
    if let Some(declaration) = head.declaration {
        let keyword = if declaration.kind == VariableDeclarationKind::Const { 5 } else { 3 };
        header_edits.push((declaration.span.start, declaration.span.start + keyword, "var".to_string()));
    }
    for (symbol, name) in &head.symbols {
        parameters.push(name.clone());
        if !pass.needs_rename(*symbol) {
            arguments.push(name.clone());
            continue;
        }
        let renamed = pass.names.fresh(name);
        let binding = scoping.symbol_span(*symbol);
        header_edits.push((binding.start, binding.end, renamed.clone()));
        for reference in scoping.get_resolved_references(*symbol) {
            let at = nodes.kind(reference.node_id()).span();
            if at.end <= body_span.start && at.start >= span.start {
                header_edits.push((at.start, at.end, renamed.clone()));
            }
        }
        arguments.push(renamed);
    }

    let function = pass.names.fresh("loop");
    let call = if pass.lexical.this_inside(semantic, body_span) {
        let mut call_arguments = vec!["this".to_string()];
        call_arguments.extend(arguments);
        format!("{}.call({})", function, call_arguments.join(", "))
    } else {
        format!("{}({})", function, arguments.join(", "))
    };
    let dispatch = if breaks || returns {
        let result = pass.names.fresh("ret");
        let mut text = format!("var {} = {};", result, call);
        if breaks {
            text.push_str(&format!(" if ({} === \"break\") break;", result));
        }
        if returns {
            text.push_str(&format!(" if (typeof {0} === \"object\") return {0}.v;", result));
        }
        text
    } else {
        format!("{};", call)
    };

    let block = matches!(body, Statement::BlockStatement(_));
    let open = format!(
        "{{ var {} = function ({}) {}{}",
        function,
        parameters.join(", "),
        PAD,
        if block { "" } else { "{ " }
    );
    let shut = if block { "" } else { " }" };

    if do_while {
        group.replace(span.start, body_span.start, open);
        group.replace(
            body_span.end,
            span.end,
            format!("{}; do {{ {} }}{} }}", shut, dispatch, pass.slice(body_span.end, span.end)),
        );
    } else {
        let header = pass.copy(span.start, body_span.start, header_edits);
        group.replace(span.start, body_span.start, open);
        group.close(span, format!("{}; {}{{ {} }} }}", shut, header, dispatch));
    }
    Ok(Some(group))
}

/// Whether the statement labeled `name` around `node` is inside `body`.
fn label_inside(pass: &Pass, node: NodeId, name: &str, body: Span) -> bool {
    pass.semantic.nodes().ancestors(node).any(|ancestor| match ancestor.kind() {
        AstKind::LabeledStatement(labeled) => labeled.label.name == name && inside(labeled.span, body),
        _ => false,
    })
}
