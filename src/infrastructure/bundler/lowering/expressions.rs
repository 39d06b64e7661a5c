//! Spread, ES2015 object literal forms, template literals and the newer
//! numeric and string literal spellings.

use super::context::{es5_string, key_value, number_name, Pass};
use super::edits::{Group, PAD};
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_span::{GetSpan, Span};

/// One element of an array literal or argument list.
struct Element {
    span: Span,
    /// The spread argument, for `...x`.
    spread: Option<Span>,
}

/// Rewrites the elements between `region` into one array expression,
/// `[a].concat(babelHelpers.toConsumableArray(b), [c])`, with `prefix` and
/// `suffix` around it.
fn spread_array(group: &mut Group, elements: &[Element], region: Span, prefix: &str, suffix: &str) {
    let (Some(first), Some(last)) = (elements.first(), elements.last()) else {
        return;
    };
    let single = elements.len() == 1 && first.spread.is_some();

    let open = if single {
        ""
    } else if first.spread.is_some() {
        "[].concat("
    } else {
        "["
    };
    group.replace(region.start, first.span.start, format!("{}{}", prefix, open));

    // Index of the last element of the first run of plain items.
    let first_run_end = elements.iter().position(|element| element.spread.is_some());
    for (index, pair) in elements.windows(2).enumerate() {
        let (previous, next) = (&pair[0], &pair[1]);
        let glue = match (previous.spread.is_some(), next.spread.is_some()) {
            (false, false) => continue,
            (false, true) if first_run_end == Some(index + 1) => format!("].concat({}", PAD),
            (false, true) => format!("], {}", PAD),
            (true, false) => format!("), {}[", PAD),
            (true, true) => format!("), {}", PAD),
        };
        group.replace(previous.span.end, next.span.start, glue);
    }

    for element in elements {
        if let Some(argument) = element.spread {
            group.replace(element.span.start, argument.start, "babelHelpers.toConsumableArray(");
        }
    }

    let close = if single {
        ")"
    } else if last.spread.is_some() {
        "))"
    } else {
        "])"
    };
    group.replace(last.span.end, region.end, format!("{}{}", close, suffix));
}

fn argument_elements(arguments: &[Argument]) -> Vec<Element> {
    arguments
        .iter()
        .map(|argument| match argument {
            Argument::SpreadElement(spread) => Element {
                span: spread.span,
                spread: Some(spread.argument.span()),
            },
            other => Element {
                span: other.span(),
                spread: None,
            },
        })
        .collect()
}

fn has_spread(arguments: &[Argument]) -> bool {
    arguments
        .iter()
        .any(|argument| matches!(argument, Argument::SpreadElement(_)))
}

pub(super) fn collect_spread(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    for node in semantic.nodes().iter() {
        let mut group = Group::new();
        match node.kind() {
            AstKind::ArrayExpression(array) => {
                if !array
                    .elements
                    .iter()
                    .any(|element| matches!(element, ArrayExpressionElement::SpreadElement(_)))
                {
                    continue;
                }
                let mut elements = Vec::new();
                for element in &array.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(item) => elements.push(Element {
                            span: item.span,
                            spread: Some(item.argument.span()),
                        }),
                        ArrayExpressionElement::Elision(_) => {
                            return pass.fail(array.span, "an array literal with both holes and spread");
                        }
                        other => elements.push(Element {
                            span: other.span(),
                            spread: None,
                        }),
                    }
                }
                spread_array(&mut group, &elements, array.span, "", "");
            }
            AstKind::CallExpression(call) => {
                if !has_spread(&call.arguments) || call.optional || matches!(call.callee, Expression::Super(_)) {
                    continue;
                }
                let receiver = match call.callee.without_parentheses() {
                    Expression::StaticMemberExpression(member) => Some(&member.object),
                    Expression::ComputedMemberExpression(member) => Some(&member.object),
                    _ => None,
                };
                let this = match receiver {
                    None => "void 0".to_string(),
                    Some(Expression::Super(_)) => continue,
                    Some(object @ (Expression::Identifier(_) | Expression::ThisExpression(_))) => {
                        pass.text(object.span()).to_string()
                    }
                    Some(object) => {
                        let temp = pass.names.fresh("obj");
                        group.hoist(pass.hoist_point(node.id()), format!("var {};", temp));
                        group.open(object.span(), format!("({} = ", temp));
                        group.close(object.span(), ")");
                        temp
                    }
                };
                let region = Span::new(call.callee.span().end, call.span.end);
                spread_array(
                    &mut group,
                    &argument_elements(&call.arguments),
                    region,
                    &format!(".apply({}, ", this),
                    ")",
                );
            }
            AstKind::NewExpression(new) => {
                if !has_spread(&new.arguments) {
                    continue;
                }
                group.replace(new.span.start, new.callee.span().start, "new (Function.prototype.bind.apply(");
                let region = Span::new(new.callee.span().end, new.span.end);
                spread_array(
                    &mut group,
                    &argument_elements(&new.arguments),
                    region,
                    ", [null].concat(",
                    ")))()",
                );
            }
            _ => continue,
        }
        pass.push(group);
    }
    Ok(())
}

pub(super) fn collect_objects(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    for node in semantic.nodes().iter() {
        let AstKind::ObjectExpression(object) = node.kind() else {
            continue;
        };

        // Everything from the first computed key or spread on is built by
        // helper calls; what comes before stays a literal.
        let tail_start = object.properties.iter().position(|property| match property {
            ObjectPropertyKind::SpreadProperty(_) => true,
            ObjectPropertyKind::ObjectProperty(property) => property.computed,
        });

        for property in &object.properties[..tail_start.unwrap_or(object.properties.len())] {
            let ObjectPropertyKind::ObjectProperty(property) = property else {
                continue;
            };
            let mut group = Group::new();
            if property.shorthand {
                group.replace_span(property.span, format!("{0}: {0}", pass.text(property.key.span())));
            } else if property.method {
                if let Expression::FunctionExpression(function) = &property.value {
                    group.replace(
                        property.span.start,
                        function.params.span.start,
                        format!("{}: {} ", pass.text(property.key.span()), function_keyword(function)),
                    );
                }
            }
            pass.push(group);
        }

        let Some(tail_start) = tail_start else {
            continue;
        };
        let mut group = Group::new();
        let tail = &object.properties[tail_start..];

        let mut openers = String::new();
        for property in tail.iter().rev() {
            openers.push_str(match property {
                ObjectPropertyKind::SpreadProperty(_) => "babelHelpers.objectSpread2(",
                ObjectPropertyKind::ObjectProperty(_) => "babelHelpers.defineProperty(",
            });
        }
        group.open(object.span, openers);

        let mut previous_end = match tail_start {
            0 => object.span.start + 1,
            index => object.properties[index - 1].span().end,
        };
        for (index, property) in tail.iter().enumerate() {
            let separator = if index == 0 { format!("}}, {}", PAD) } else { format!("), {}", PAD) };
            match property {
                ObjectPropertyKind::SpreadProperty(spread) => {
                    group.replace(previous_end, spread.argument.span().start, separator);
                    previous_end = spread.span.end;
                }
                ObjectPropertyKind::ObjectProperty(property) => {
                    if property.kind != PropertyKind::Init {
                        return pass.fail(property.span, "getters and setters after a computed key");
                    }
                    let key = key_value(pass, &property.key, property.computed);
                    match &property.value {
                        Expression::FunctionExpression(function) if property.method => {
                            group.replace(
                                previous_end,
                                function.params.span.start,
                                format!("{}{}, {} ", separator, key, function_keyword(function)),
                            );
                        }
                        value => {
                            group.replace(previous_end, value.span().start, format!("{}{}, ", separator, key));
                        }
                    }
                    previous_end = property.span.end;
                }
            }
        }
        group.replace(previous_end, object.span.end, ")");
        pass.push(group);
    }
    Ok(())
}

fn function_keyword(function: &Function) -> &'static str {
    match (function.r#async, function.generator) {
        (false, false) => "function",
        (false, true) => "function*",
        (true, false) => "async function",
        (true, true) => "async function*",
    }
}

fn cooked(element: &TemplateElement) -> String {
    element
        .value
        .cooked
        .as_ref()
        .map_or_else(|| element.value.raw.to_string(), |cooked| cooked.to_string())
}

pub(super) fn collect_templates(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    let program_start = semantic.nodes().iter().find_map(|node| match node.kind() {
        AstKind::Program(program) => Some(
            program
                .directives
                .last()
                .map_or(program.span.start, |directive| directive.span.end),
        ),
        _ => None,
    });

    for node in semantic.nodes().iter() {
        let mut group = Group::new();
        match node.kind() {
            AstKind::TemplateLiteral(template) => {
                if matches!(semantic.nodes().parent_kind(node.id()), AstKind::TaggedTemplateExpression(_)) {
                    continue;
                }
                lower_template(&mut group, template);
            }
            AstKind::TaggedTemplateExpression(tagged) => {
                let quasi = &tagged.quasi;
                let name = pass.names.fresh("templateObject");
                group.hoist(program_start.unwrap_or(0), format!("var {};", name));

                let strings = quasi
                    .quasis
                    .iter()
                    .map(|element| match &element.value.cooked {
                        Some(cooked) => es5_string(cooked),
                        None => "void 0".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let raw = quasi
                    .quasis
                    .iter()
                    .map(|element| es5_string(&element.value.raw))
                    .collect::<Vec<_>>()
                    .join(", ");
                let object = format!(
                    "({0} || ({0} = babelHelpers.taggedTemplateLiteral([{1}], [{2}])))",
                    name, strings, raw
                );

                let expressions = &quasi.expressions;
                match (expressions.first(), expressions.last()) {
                    (Some(first), Some(last)) => {
                        group.replace(quasi.span.start, first.span().start, format!("({}, {}", object, PAD));
                        for pair in expressions.windows(2) {
                            group.replace(pair[0].span().end, pair[1].span().start, ", ");
                        }
                        group.replace(last.span().end, quasi.span.end, ")");
                    }
                    _ => group.replace_span(quasi.span, format!("({}{})", object, PAD)),
                }
            }
            _ => continue,
        }
        pass.push(group);
    }
    Ok(())
}

/// `` `a${b}c` `` → `"a".concat(b, "c")`.
fn lower_template(group: &mut Group, template: &TemplateLiteral) {
    let strings: Vec<String> = template.quasis.iter().map(cooked).collect();
    let expressions = &template.expressions;
    let (Some(first), Some(last)) = (expressions.first(), expressions.last()) else {
        let text = strings.first().map_or_else(|| "\"\"".to_string(), |string| es5_string(string));
        group.replace_span(template.span, format!("{}{}", text, PAD));
        return;
    };

    group.replace(
        template.span.start,
        first.span().start,
        format!("{}.concat({}", es5_string(&strings[0]), PAD),
    );
    for (index, pair) in expressions.windows(2).enumerate() {
        let glue = match strings.get(index + 1) {
            Some(string) if !string.is_empty() => format!(", {}, ", es5_string(string)),
            _ => ", ".to_string(),
        };
        group.replace(pair[0].span().end, pair[1].span().start, glue);
    }
    let end = match strings.last() {
        Some(string) if !string.is_empty() && strings.len() > expressions.len() => {
            format!(", {})", es5_string(string))
        }
        _ => ")".to_string(),
    };
    group.replace(last.span().end, template.span.end, end);

    for expression in expressions {
        if matches!(expression.without_parentheses(), Expression::SequenceExpression(_))
            && !matches!(expression, Expression::ParenthesizedExpression(_))
        {
            group.open(expression.span(), "(");
            group.close(expression.span(), ")");
        }
    }
}

pub(super) fn collect_literals(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    let nodes = semantic.nodes();
    for node in nodes.iter() {
        let mut group = Group::new();
        match node.kind() {
            AstKind::NumericLiteral(literal) => {
                let text = pass.text(literal.span);
                let lower = text.to_ascii_lowercase();
                if !(lower.starts_with("0b") || lower.starts_with("0o") || text.contains('_')) {
                    continue;
                }
                let value = number_name(literal.value);
                let value = if matches!(nodes.parent_kind(node.id()), AstKind::StaticMemberExpression(_)) {
                    format!("({})", value)
                } else {
                    value
                };
                group.replace_span(literal.span, value);
            }
            AstKind::StringLiteral(literal) => {
                if !pass.text(literal.span).contains("\\u{") {
                    continue;
                }
                group.replace_span(literal.span, es5_string(&literal.value));
            }
            _ => continue,
        }
        pass.push(group);
    }
    Ok(())
}
