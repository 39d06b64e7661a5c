//! ES5 output checks, plus the fixups for the ES2015 forms the compressor
//! and the printer introduce on their own.

use super::super::runtime::HELPER_NAMES;
use oxc_allocator::Vec as ArenaVec;
use oxc_ast::ast::*;
use oxc_ast::{AstBuilder, NONE};
use oxc_ast_visit::{walk, walk_mut, Visit, VisitMut};
use oxc_span::{GetSpan, Span};
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator};
use oxc_syntax::scope::ScopeFlags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub span: Span,
    pub feature: &'static str,
}

/// Every construct in `program` that an ES5 engine cannot parse.
pub fn newer_syntax(program: &Program) -> Vec<Violation> {
    let mut check = SyntaxCheck { found: Vec::new() };
    check.visit_program(program);
    check.found
}

struct SyntaxCheck {
    found: Vec<Violation>,
}

impl SyntaxCheck {
    fn flag(&mut self, span: Span, feature: &'static str) {
        self.found.push(Violation { span, feature });
    }
}

impl<'a> Visit<'a> for SyntaxCheck {
    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.flag(it.span, "arrow function");
        walk::walk_arrow_function_expression(self, it);
    }

    fn visit_class(&mut self, it: &Class<'a>) {
        self.flag(it.span, "class");
        walk::walk_class(self, it);
    }

    fn visit_template_literal(&mut self, it: &TemplateLiteral<'a>) {
        self.flag(it.span, "template literal");
        walk::walk_template_literal(self, it);
    }

    fn visit_tagged_template_expression(&mut self, it: &TaggedTemplateExpression<'a>) {
        self.flag(it.span, "tagged template");
        walk::walk_tagged_template_expression(self, it);
    }

    fn visit_variable_declaration(&mut self, it: &VariableDeclaration<'a>) {
        if it.kind != VariableDeclarationKind::Var {
            self.flag(it.span, "block-scoped declaration");
        }
        walk::walk_variable_declaration(self, it);
    }

    fn visit_for_of_statement(&mut self, it: &ForOfStatement<'a>) {
        self.flag(it.span, "for-of loop");
        walk::walk_for_of_statement(self, it);
    }

    fn visit_spread_element(&mut self, it: &SpreadElement<'a>) {
        self.flag(it.span, "spread");
        walk::walk_spread_element(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand {
            self.flag(it.span, "shorthand property");
        }
        if it.method {
            self.flag(it.span, "method shorthand");
        }
        if it.computed {
            self.flag(it.span, "computed property key");
        }
        walk::walk_object_property(self, it);
    }

    fn visit_binding_pattern(&mut self, it: &BindingPattern<'a>) {
        match &it.kind {
            BindingPatternKind::BindingIdentifier(_) => {}
            BindingPatternKind::AssignmentPattern(pattern) => self.flag(pattern.span, "default value"),
            BindingPatternKind::ObjectPattern(pattern) => self.flag(pattern.span, "destructuring"),
            BindingPatternKind::ArrayPattern(pattern) => self.flag(pattern.span, "destructuring"),
        }
        walk::walk_binding_pattern(self, it);
    }

    fn visit_binding_rest_element(&mut self, it: &BindingRestElement<'a>) {
        self.flag(it.span, "rest element");
        walk::walk_binding_rest_element(self, it);
    }

    fn visit_array_assignment_target(&mut self, it: &ArrayAssignmentTarget<'a>) {
        self.flag(it.span, "destructuring assignment");
        walk::walk_array_assignment_target(self, it);
    }

    fn visit_object_assignment_target(&mut self, it: &ObjectAssignmentTarget<'a>) {
        self.flag(it.span, "destructuring assignment");
        walk::walk_object_assignment_target(self, it);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        if it.generator {
            self.flag(it.span, "generator function");
        }
        if it.r#async {
            self.flag(it.span, "async function");
        }
        walk::walk_function(self, it, flags);
    }

    fn visit_super(&mut self, it: &Super) {
        self.flag(it.span, "super");
    }

    fn visit_meta_property(&mut self, it: &MetaProperty<'a>) {
        self.flag(it.span, "meta property");
        walk::walk_meta_property(self, it);
    }

    fn visit_binary_expression(&mut self, it: &BinaryExpression<'a>) {
        if it.operator == BinaryOperator::Exponential {
            self.flag(it.span, "exponentiation operator");
        }
        walk::walk_binary_expression(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        if matches!(
            it.operator,
            AssignmentOperator::Exponential
                | AssignmentOperator::LogicalAnd
                | AssignmentOperator::LogicalOr
                | AssignmentOperator::LogicalNullish
        ) {
            self.flag(it.span, "compound assignment operator");
        }
        walk::walk_assignment_expression(self, it);
    }

    fn visit_chain_expression(&mut self, it: &ChainExpression<'a>) {
        self.flag(it.span, "optional chaining");
        walk::walk_chain_expression(self, it);
    }

    fn visit_logical_expression(&mut self, it: &LogicalExpression<'a>) {
        if it.operator == LogicalOperator::Coalesce {
            self.flag(it.span, "nullish coalescing");
        }
        walk::walk_logical_expression(self, it);
    }

    fn visit_private_identifier(&mut self, it: &PrivateIdentifier<'a>) {
        self.flag(it.span, "private class member");
    }

    fn visit_big_int_literal(&mut self, it: &BigIntLiteral<'a>) {
        self.flag(it.span, "BigInt literal");
    }

    fn visit_numeric_literal(&mut self, it: &NumericLiteral<'a>) {
        if let Some(raw) = &it.raw {
            let lower = raw.to_ascii_lowercase();
            if lower.starts_with("0b") || lower.starts_with("0o") || raw.contains('_') {
                self.flag(it.span, "numeric literal form");
            }
        }
    }

    fn visit_string_literal(&mut self, it: &StringLiteral<'a>) {
        if it.raw.as_ref().is_some_and(|raw| raw.contains("\\u{")) {
            self.flag(it.span, "code point escape");
        }
    }

    fn visit_reg_exp_literal(&mut self, it: &RegExpLiteral<'a>) {
        let newer = RegExpFlags::S | RegExpFlags::U | RegExpFlags::Y | RegExpFlags::D | RegExpFlags::V;
        if it.regex.flags.intersects(newer) {
            self.flag(it.span, "regular expression flag");
        }
    }

    fn visit_catch_clause(&mut self, it: &CatchClause<'a>) {
        if it.param.is_none() {
            self.flag(it.span, "optional catch binding");
        }
        walk::walk_catch_clause(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        self.flag(it.span, "dynamic import()");
        walk::walk_import_expression(self, it);
    }
}

/// `babelHelpers.*` members the program calls that the runtime does not define.
pub fn missing_helpers(program: &Program) -> Vec<String> {
    let mut check = HelperCheck { missing: Vec::new() };
    check.visit_program(program);
    check.missing
}

struct HelperCheck {
    missing: Vec<String>,
}

impl<'a> Visit<'a> for HelperCheck {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(object) = &it.object {
            let name = it.property.name.as_str();
            if object.name == "babelHelpers"
                && !HELPER_NAMES.contains(&name)
                && !self.missing.iter().any(|missing| missing == name)
            {
                self.missing.push(name.to_string());
            }
        }
        walk::walk_static_member_expression(self, it);
    }
}

/// Undoes what the compressor and printer would turn into ES2015: template
/// literals become `"".concat(...)` calls and identifier keys whose value is
/// an identifier become string keys, which the printer never shortens.
pub fn restore_es5_forms<'a>(ast: AstBuilder<'a>, program: &mut Program<'a>) {
    Es5Forms { ast }.visit_program(program);
}

struct Es5Forms<'a> {
    ast: AstBuilder<'a>,
}

impl<'a> Es5Forms<'a> {
    fn concat(&self, template: &mut TemplateLiteral<'a>) -> Option<Expression<'a>> {
        let span = template.span;
        let mut cooked = Vec::with_capacity(template.quasis.len());
        for quasi in &template.quasis {
            cooked.push(quasi.value.cooked?);
        }

        let head = self.ast.expression_string_literal(span, cooked[0], None);
        let mut arguments: ArenaVec<'a, Argument<'a>> = self.ast.vec();
        let expressions = std::mem::replace(&mut template.expressions, self.ast.vec());
        for (expression, quasi) in expressions.into_iter().zip(cooked.iter().skip(1)) {
            arguments.push(Argument::from(expression));
            if !quasi.is_empty() {
                arguments.push(Argument::from(self.ast.expression_string_literal(span, *quasi, None)));
            }
        }
        if arguments.is_empty() {
            return Some(head);
        }

        let callee = Expression::from(self.ast.member_expression_static(
            span,
            head,
            self.ast.identifier_name(span, "concat"),
            false,
        ));
        Some(self.ast.expression_call(span, callee, NONE, arguments, false))
    }
}

impl<'a> VisitMut<'a> for Es5Forms<'a> {
    fn visit_expression(&mut self, it: &mut Expression<'a>) {
        walk_mut::walk_expression(self, it);
        if let Expression::TemplateLiteral(template) = it {
            if let Some(replacement) = self.concat(template) {
                *it = replacement;
            }
        }
    }

    fn visit_object_property(&mut self, it: &mut ObjectProperty<'a>) {
        walk_mut::walk_object_property(self, it);
        if it.computed || it.method || it.kind != PropertyKind::Init {
            return;
        }
        if let PropertyKey::StaticIdentifier(key) = &it.key {
            if matches!(it.value.without_parentheses(), Expression::Identifier(_)) {
                let literal = self.ast.alloc_string_literal(key.span, key.name, None);
                it.key = PropertyKey::StringLiteral(literal);
                it.shorthand = false;
            }
        }
    }
}

/// One-based line of `offset` in `text`.
pub fn line_of(text: &str, offset: u32) -> usize {
    let end = (offset as usize).min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

pub fn describe(violations: &[Violation], locate: impl Fn(Span) -> String) -> String {
    let mut lines = violations
        .iter()
        .take(5)
        .map(|violation| format!("{} at {}", violation.feature, locate(violation.span)))
        .collect::<Vec<_>>();
    if violations.len() > 5 {
        lines.push(format!("... and {} more", violations.len() - 5));
    }
    lines.join("; ")
}
