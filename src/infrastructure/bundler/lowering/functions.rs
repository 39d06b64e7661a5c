//! Arrow functions become function expressions; defaults, patterns and rest
//! parameters move into the function body.

use super::context::Pass;
use super::edits::{Group, PAD};
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_semantic::NodeId;
use oxc_span::GetSpan;

pub(super) fn collect(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    for node in semantic.nodes().iter() {
        match node.kind() {
            AstKind::ArrowFunctionExpression(arrow) => {
                let group = lower_arrow(pass, node.id(), arrow);
                pass.push(group);
            }
            AstKind::Function(function) => {
                if let Some(body) = &function.body {
                    if !is_simple(&function.params) {
                        let group = lower_params(pass, &function.params, body);
                        pass.push(group);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_simple(params: &FormalParameters) -> bool {
    params.rest.is_none()
        && params
            .items
            .iter()
            .all(|item| matches!(item.pattern.kind, BindingPatternKind::BindingIdentifier(_)))
}

/// ES5 parameter list plus the statements that recreate what it dropped.
pub(super) struct Params {
    pub list: String,
    pub prologue: String,
}

pub(super) fn params(pass: &mut Pass, params: &FormalParameters) -> Params {
    let mut list = Vec::new();
    let mut prologue = Vec::new();

    for item in &params.items {
        match &item.pattern.kind {
            BindingPatternKind::BindingIdentifier(id) => list.push(id.name.to_string()),
            BindingPatternKind::AssignmentPattern(pattern) => {
                let default = pass.text(pattern.right.span());
                if let BindingPatternKind::BindingIdentifier(id) = &pattern.left.kind {
                    list.push(id.name.to_string());
                    prologue.push(format!("if ({0} === void 0) {0} = {1};", id.name, default));
                } else {
                    let temp = pass.names.fresh("ref");
                    prologue.push(format!(
                        "var {} = {1} === void 0 ? ({2}) : {1};",
                        pass.text(pattern.left.span()),
                        temp,
                        default
                    ));
                    list.push(temp);
                }
            }
            _ => {
                let temp = pass.names.fresh("ref");
                prologue.push(format!("var {} = {};", pass.text(item.pattern.span()), temp));
                list.push(temp);
            }
        }
    }

    if let Some(rest) = &params.rest {
        prologue.push(format!(
            "var {} = [].slice.call(arguments, {});",
            pass.text(rest.argument.span()),
            params.items.len()
        ));
    }

    Params {
        list: list.join(", "),
        prologue: prologue.join(" "),
    }
}

fn lower_params(pass: &mut Pass, formal: &FormalParameters, body: &FunctionBody) -> Group {
    let lowered = params(pass, formal);
    let mut group = Group::new();
    group.replace(
        formal.span.start,
        body.span.start + 1,
        format!("({}) {{{} {}", lowered.list, PAD, lowered.prologue),
    );
    group
}

fn lower_arrow(pass: &mut Pass, node: NodeId, arrow: &ArrowFunctionExpression) -> Group {
    let mut group = Group::new();
    let lowered = params(pass, &arrow.params);

    let arguments = pass.lexical.arrow_arguments(arrow).to_vec();
    if !arguments.is_empty() {
        let name = pass.names.fresh("arguments");
        let at = outer_function_body(pass, node);
        group.hoist(at, format!("var {} = arguments;", name));
        for span in arguments {
            group.replace_span(span, name.clone());
        }
    }

    let bind = if pass.lexical.arrow_uses_this(arrow) { ".bind(this)" } else { "" };
    let keyword = if arrow.r#async { "async function" } else { "function" };
    let open = format!("({} ({}{}) {{ {}", keyword, PAD, lowered.list, lowered.prologue);

    if arrow.expression {
        let expression = match arrow.body.statements.first() {
            Some(Statement::ExpressionStatement(statement)) => statement.expression.span(),
            _ => arrow.body.span,
        };
        group.replace(arrow.span.start, expression.start, format!("{} return ", open));
        group.close(arrow.span, format!("; }}{})", bind));
    } else {
        group.replace(arrow.span.start, arrow.body.span.start + 1, open);
        group.close(arrow.span, format!("{})", bind));
    }
    group
}

/// Start of the nearest non-arrow function body (or the program), where a
/// copy of its `arguments` can live.
fn outer_function_body(pass: &Pass, node: NodeId) -> u32 {
    for ancestor in pass.semantic.nodes().ancestors(node) {
        match ancestor.kind() {
            AstKind::Function(function) => {
                if let Some(body) = &function.body {
                    return body
                        .directives
                        .last()
                        .map_or(body.span.start + 1, |directive| directive.span.end);
                }
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
