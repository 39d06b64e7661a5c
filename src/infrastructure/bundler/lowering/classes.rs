//! Classes become constructor functions built inside an IIFE. Methods and
//! accessors are defined non-enumerable through `babelHelpers`, fields are
//! set from the constructor and statics run after every method exists.

use super::context::{body_start, key_name, key_value, member_access, Pass};
use super::edits::{Group, PAD};
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_semantic::NodeId;
use oxc_span::{GetSpan, Span};

pub(super) fn collect(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    for node in semantic.nodes().iter() {
        if let AstKind::Class(class) = node.kind() {
            let group = lower_class(pass, node.id(), class)?;
            pass.push(group);
        }
    }
    Ok(())
}

fn lower_class(pass: &mut Pass, id: NodeId, class: &Class) -> Result<Group> {
    if !class.decorators.is_empty() {
        return pass.fail(class.span, "class decorators");
    }
    let expression = class.r#type == ClassType::ClassExpression;
    let name = match &class.id {
        Some(binding) => binding.name.to_string(),
        None => pass.names.fresh("class"),
    };
    let parent = class
        .super_class
        .as_ref()
        .map(|super_class| pass.text(super_class.span()).to_string());
    let base = parent.as_ref().map(|_| pass.names.fresh("super"));

    let mut group = Group::new();
    let mut constructor = None;
    let mut fields = Vec::new();
    let mut statics = Vec::new();

    for element in &class.body.body {
        match element {
            ClassElement::MethodDefinition(method) => {
                if !method.decorators.is_empty() {
                    return pass.fail(method.span, "method decorators");
                }
                if matches!(method.key, PropertyKey::PrivateIdentifier(_)) {
                    return pass.fail(method.span, "private methods");
                }
                if method.kind == MethodDefinitionKind::Constructor {
                    constructor = Some(method);
                    continue;
                }
                let target = if method.r#static { name.clone() } else { format!("{}.prototype", name) };
                let key = key_value(pass, &method.key, method.computed);
                let open = match method.kind {
                    MethodDefinitionKind::Get => format!("babelHelpers.classAccessor({}, {}, \"get\", function ", target, key),
                    MethodDefinitionKind::Set => format!("babelHelpers.classAccessor({}, {}, \"set\", function ", target, key),
                    _ => format!(
                        "babelHelpers.classMethod({}, {}, {}{} ",
                        target,
                        key,
                        if method.value.r#async { "async function" } else { "function" },
                        if method.value.generator { "*" } else { "" }
                    ),
                };
                group.replace(method.span.start, method.value.params.span.start, open);
                group.close(method.span, ");");
            }
            ClassElement::PropertyDefinition(property) => {
                if !property.decorators.is_empty() {
                    return pass.fail(property.span, "field decorators");
                }
                if matches!(property.key, PropertyKey::PrivateIdentifier(_)) {
                    return pass.fail(property.span, "private fields");
                }
                if property.computed {
                    return pass.fail(property.span, "computed field names");
                }
                let access = member_access(pass, &property.key, false);
                if property.r#static {
                    let value = match &property.value {
                        Some(value) if pass.lexical.this_inside(pass.semantic, value.span()) => {
                            format!("function () {{ return {}; }}.call({})", pass.text(value.span()), name)
                        }
                        Some(value) => pass.text(value.span()).to_string(),
                        None => "void 0".to_string(),
                    };
                    statics.push(format!("{}{} = {};", name, access, value));
                    group.replace_span(property.span, "");
                    continue;
                }
                match &property.value {
                    Some(value) => {
                        let key = key_name(&property.key).unwrap_or_default();
                        let init = pass.names.fresh(&format!("init_{}", key));
                        group.replace(
                            property.span.start,
                            value.span().start,
                            format!("function {}() {{ return ", init),
                        );
                        group.replace(value.span().end, property.span.end, "; }");
                        fields.push(format!("this{} = {}.call(this);", access, init));
                    }
                    None => {
                        group.replace_span(property.span, "");
                        fields.push(format!("this{} = void 0;", access));
                    }
                }
            }
            ClassElement::StaticBlock(block) => {
                let text = pass.text(block.span);
                let body = text.find('{').map_or(text, |brace| &text[brace..]);
                statics.push(format!("(function () {}).call({});", body, name));
                group.replace_span(block.span, "");
            }
            ClassElement::AccessorProperty(property) => {
                return pass.fail(property.span, "accessor fields");
            }
            ClassElement::TSIndexSignature(_) => {}
        }
    }

    let fields = fields.join(" ");
    let mut head = format!("function ({}) {{{}", base.clone().unwrap_or_default(), PAD);
    if let Some(base) = &base {
        head.push_str(&format!(" babelHelpers.inherits({}, {});", name, base));
    }

    match constructor {
        Some(method) => {
            group.replace(method.span.start, method.value.params.span.start, format!("function {}", name));
            if let (false, Some(body)) = (fields.is_empty(), &method.value.body) {
                if base.is_some() {
                    let Some(at) = top_level_super_call(body) else {
                        return pass.fail(method.span, "class fields with a nested super() call");
                    };
                    group.hoist(at, format!("; {}", fields));
                } else {
                    group.hoist(body_start(body), format!(" {}", fields));
                }
            }
        }
        None => {
            let mut statements = Vec::new();
            if let Some(base) = &base {
                statements.push(format!("{}.apply(this, arguments);", base));
            }
            if !fields.is_empty() {
                statements.push(fields);
            }
            head.push_str(&format!(" function {}() {{ {} }}", name, statements.join(" ")));
        }
    }

    let head = if expression {
        format!("({}", head)
    } else {
        format!("let {} = {}", name, head)
    };
    let mut tail = String::new();
    for statement in &statics {
        tail.push_str(statement);
        tail.push(' ');
    }
    tail.push_str(&format!(
        "return {}; }}({}){}",
        name,
        parent.unwrap_or_default(),
        if expression { ")" } else { ";" }
    ));

    group.replace(class.span.start, class.body.span.start + 1, head);
    group.replace(class.body.span.end - 1, class.body.span.end, tail);

    lower_super(pass, id, class, base.as_deref(), &mut group)?;
    Ok(group)
}

/// End of the `super(...)` statement at the top of a constructor body.
fn top_level_super_call(body: &FunctionBody) -> Option<u32> {
    body.statements.iter().find_map(|statement| match statement {
        Statement::ExpressionStatement(statement) => match &statement.expression {
            Expression::CallExpression(call) if matches!(call.callee, Expression::Super(_)) => Some(statement.span.end),
            _ => None,
        },
        _ => None,
    })
}

/// Rewrites `super(...)`, `super.x` and `super.x(...)` that belong to
/// `class`.
fn lower_super(pass: &Pass, class_id: NodeId, class: &Class, base: Option<&str>, group: &mut Group) -> Result<()> {
    let nodes = pass.semantic.nodes();
    for node in nodes.iter() {
        let AstKind::Super(keyword) = node.kind() else {
            continue;
        };
        if keyword.span.start < class.span.start || keyword.span.end > class.span.end {
            continue;
        }

        let mut is_static = None;
        let mut owner = None;
        for ancestor in nodes.ancestors(node.id()) {
            match ancestor.kind() {
                AstKind::MethodDefinition(method) => {
                    is_static.get_or_insert(method.r#static);
                }
                AstKind::PropertyDefinition(property) => {
                    is_static.get_or_insert(property.r#static);
                }
                AstKind::StaticBlock(_) => {
                    is_static.get_or_insert(true);
                }
                AstKind::ObjectProperty(property) if property.method && is_static.is_none() => break,
                AstKind::Class(_) => {
                    owner = Some(ancestor.id());
                    break;
                }
                _ => {}
            }
        }
        if owner != Some(class_id) {
            continue;
        }
        let Some(base) = base else {
            return pass.fail(keyword.span, "super in a class without extends");
        };

        let parent_id = nodes.parent_id(node.id());
        match nodes.kind(parent_id) {
            AstKind::CallExpression(call) => {
                call_with_this(pass, group, call, keyword.span, format!("{}.call", base), base)?;
            }
            AstKind::StaticMemberExpression(_) | AstKind::ComputedMemberExpression(_) => {
                let object = if is_static == Some(true) {
                    base.to_string()
                } else {
                    format!("{}.prototype", base)
                };
                let member = nodes.kind(parent_id).span();
                match nodes.parent_kind(parent_id) {
                    AstKind::CallExpression(call) if call.callee.span() == member => {
                        group.replace_span(keyword.span, object);
                        if call.arguments.iter().any(|argument| matches!(argument, Argument::SpreadElement(_))) {
                            return pass.fail(call.span, "super method calls with spread arguments");
                        }
                        group.hoist(member.end, ".call");
                        insert_this(pass, group, call);
                    }
                    _ => group.replace_span(keyword.span, object),
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// `super(a, b)` → `_super.call(this, a, b)`, `super(...args)` →
/// `_super.apply(this, args)`.
fn call_with_this(
    pass: &Pass,
    group: &mut Group,
    call: &CallExpression,
    callee: Span,
    replacement: String,
    base: &str,
) -> Result<()> {
    let spreads = call
        .arguments
        .iter()
        .filter(|argument| matches!(argument, Argument::SpreadElement(_)))
        .count();
    match (spreads, &call.arguments[..]) {
        (0, _) => {
            group.replace_span(callee, replacement);
            insert_this(pass, group, call);
        }
        (1, [Argument::SpreadElement(spread)]) => {
            group.replace(callee.start, spread.span.start, format!("{}.apply(this, ", base));
            group.replace(spread.span.start, spread.argument.span().start, "");
        }
        _ => return pass.fail(call.span, "super() with spread arguments mixed with others"),
    }
    Ok(())
}

/// Adds `this` as the first argument of `call`.
fn insert_this(pass: &Pass, group: &mut Group, call: &CallExpression) {
    let callee_end = call.callee.span().end;
    let Some(offset) = pass.slice(callee_end, call.span.end).find('(') else {
        return;
    };
    let at = callee_end + offset as u32 + 1;
    let text = if call.arguments.is_empty() { "this" } else { "this, " };
    group.hoist(at, text);
}
