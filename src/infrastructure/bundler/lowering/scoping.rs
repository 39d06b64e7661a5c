//! `let` and `const` become `var`. A binding whose name is also used
//! elsewhere in the module is renamed so hoisting cannot merge the two.

use super::context::Pass;
use super::edits::Group;
use super::loops::innermost_loop;
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_span::GetSpan;

pub(super) fn collect(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    let nodes = semantic.nodes();
    let scoping = semantic.scoping();

    for node in nodes.iter() {
        let AstKind::VariableDeclaration(declaration) = node.kind() else {
            continue;
        };
        let keyword = match declaration.kind {
            VariableDeclarationKind::Let => 3,
            VariableDeclarationKind::Const => 5,
            VariableDeclarationKind::Var => continue,
            _ => return pass.fail(declaration.span, "using declarations"),
        };

        let parent = nodes.parent_kind(node.id());
        if matches!(parent, AstKind::ForOfStatement(_)) {
            continue;
        }
        let in_head = matches!(parent, AstKind::ForStatement(_) | AstKind::ForInStatement(_));

        let mut bindings = Vec::new();
        let mut pending = false;
        for declarator in &declaration.declarations {
            match &declarator.id.kind {
                BindingPatternKind::BindingIdentifier(id) => match id.symbol_id.get() {
                    Some(symbol) if pass.captured.contains(&symbol) => pending = true,
                    Some(symbol) => bindings.push((symbol, id, declarator)),
                    None => {}
                },
                _ => pending = true,
            }
        }
        if pending {
            continue;
        }

        let mut group = Group::new();
        group.replace(declaration.span.start, declaration.span.start + keyword, "var");

        // A `let` without a value starts every iteration undefined.
        let resets = !in_head && innermost_loop(pass, node.id()).is_some();

        for (symbol, id, declarator) in bindings {
            if resets && declarator.init.is_none() {
                group.replace(declarator.span.end, declarator.span.end, " = void 0");
            }
            if !pass.needs_rename(symbol) {
                continue;
            }
            let renamed = pass.names.fresh(&id.name);
            group.replace_span(id.span, renamed.clone());
            for reference in scoping.get_resolved_references(symbol) {
                let reference_node = reference.node_id();
                let at = nodes.kind(reference_node).span();
                match nodes.parent_kind(reference_node) {
                    AstKind::ObjectProperty(property) if property.shorthand => {
                        group.replace_span(property.span, format!("{}: {}", id.name, renamed));
                    }
                    _ => group.replace_span(at, renamed.clone()),
                }
            }
        }
        pass.push(group);
    }
    Ok(())
}
