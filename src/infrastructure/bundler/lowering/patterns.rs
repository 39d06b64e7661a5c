//! Destructuring in declarations, assignments and catch clauses becomes a
//! list of plain assignments through temporaries.

use super::context::{es5_string, key_name, member_access, Pass};
use super::edits::{Group, PAD};
use crate::utils::Result;
use oxc_ast::ast::*;
use oxc_ast::AstKind;
use oxc_span::GetSpan;
use oxc_syntax::operator::AssignmentOperator;

pub(super) fn collect(pass: &mut Pass) -> Result<()> {
    let semantic = pass.semantic;
    let nodes = semantic.nodes();
    for node in nodes.iter() {
        match node.kind() {
            AstKind::VariableDeclarator(declarator) => {
                if matches!(declarator.id.kind, BindingPatternKind::BindingIdentifier(_)) {
                    continue;
                }
                let Some(init) = &declarator.init else { continue };
                let init = pass.text(init.span()).to_string();
                let mut flatten = Flatten::new(pass);
                flatten.declaration(&declarator.id, init)?;
                let text = flatten
                    .steps
                    .iter()
                    .map(|(target, value)| format!("{} = {}", target, value))
                    .collect::<Vec<_>>()
                    .join(&format!(",{} ", PAD));
                let mut group = Group::new();
                group.replace_span(declarator.span, text);
                pass.push(group);
            }
            AstKind::AssignmentExpression(assignment) => {
                if assignment.operator != AssignmentOperator::Assign || !assignment.left.is_assignment_target_pattern() {
                    continue;
                }
                let right = pass.text(assignment.right.span()).to_string();
                let mut flatten = Flatten::new(pass);
                let root = flatten.temp(right);
                flatten.target(&assignment.left, root.clone())?;
                let mut parts = flatten
                    .steps
                    .iter()
                    .map(|(target, value)| format!("{} = {}", target, value))
                    .collect::<Vec<_>>();
                parts.push(root);
                let temps = flatten.temps.join(", ");

                let mut group = Group::new();
                group.hoist(pass.hoist_point(node.id()), format!("var {};", temps));
                group.replace_span(assignment.span, format!("({})", parts.join(&format!(",{} ", PAD))));
                pass.push(group);
            }
            AstKind::CatchClause(clause) => {
                let Some(param) = &clause.param else { continue };
                if matches!(param.pattern.kind, BindingPatternKind::BindingIdentifier(_)) {
                    continue;
                }
                let name = pass.names.fresh("e");
                let mut group = Group::new();
                group.replace(
                    param.pattern.span().start,
                    clause.body.span.start + 1,
                    format!("{0}) {{{1} let {2} = {0};", name, PAD, pass.text(param.pattern.span())),
                );
                pass.push(group);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Flattens one pattern into `target = value` steps in evaluation order.
struct Flatten<'p, 's, 'a> {
    pass: &'p mut Pass<'s, 'a>,
    steps: Vec<(String, String)>,
    temps: Vec<String>,
}

impl<'p, 's, 'a> Flatten<'p, 's, 'a> {
    fn new(pass: &'p mut Pass<'s, 'a>) -> Self {
        Self {
            pass,
            steps: Vec::new(),
            temps: Vec::new(),
        }
    }

    fn temp(&mut self, value: String) -> String {
        let name = self.pass.names.fresh("ref");
        self.temps.push(name.clone());
        self.steps.push((name.clone(), value));
        name
    }

    /// A name holding `value`, so it can be read more than once.
    fn simple(&mut self, value: String) -> String {
        if self.temps.contains(&value) {
            value
        } else {
            self.temp(value)
        }
    }

    fn with_default(&mut self, value: String, default: &Expression) -> String {
        let name = self.simple(value);
        format!("{0} === void 0 ? ({1}) : {0}", name, self.pass.text(default.span()))
    }

    /// Key text for reading a property, and the key as a string for rest
    /// exclusion.
    fn key(&mut self, key: &PropertyKey, computed: bool, has_rest: bool) -> (String, String) {
        if computed && has_rest {
            let text = self.pass.text(key.span()).to_string();
            let name = self.temp(format!("babelHelpers.toPropertyKey({})", text));
            return (format!("[{}]", name), name);
        }
        let access = member_access(self.pass, key, computed);
        let excluded = match key_name(key) {
            Some(name) if !computed => es5_string(&name),
            _ => self.pass.text(key.span()).to_string(),
        };
        (access, excluded)
    }

    fn declaration(&mut self, pattern: &BindingPattern, init: String) -> Result<()> {
        match &pattern.kind {
            BindingPatternKind::ObjectPattern(_) => {
                let root = self.temp(init);
                self.binding(pattern, root)
            }
            _ => self.binding(pattern, init),
        }
    }

    fn binding(&mut self, pattern: &BindingPattern, value: String) -> Result<()> {
        match &pattern.kind {
            BindingPatternKind::BindingIdentifier(id) => {
                self.steps.push((id.name.to_string(), value));
            }
            BindingPatternKind::AssignmentPattern(assignment) => {
                let value = self.with_default(value, &assignment.right);
                self.binding(&assignment.left, value)?;
            }
            BindingPatternKind::ObjectPattern(object) => {
                let source = self.simple(value);
                if object.properties.is_empty() && object.rest.is_none() {
                    self.temp(format!("babelHelpers.objectDestructuringEmpty({})", source));
                    return Ok(());
                }
                let mut excluded = Vec::new();
                for property in &object.properties {
                    let (access, key) = self.key(&property.key, property.computed, object.rest.is_some());
                    excluded.push(key);
                    self.binding(&property.value, format!("{}{}", source, access))?;
                }
                if let Some(rest) = &object.rest {
                    self.binding(
                        &rest.argument,
                        format!("babelHelpers.objectWithoutProperties({}, [{}])", source, excluded.join(", ")),
                    )?;
                }
            }
            BindingPatternKind::ArrayPattern(array) => {
                let source = self.temp(format!("babelHelpers.toArray({})", value));
                for (index, element) in array.elements.iter().enumerate() {
                    if let Some(element) = element {
                        self.binding(element, format!("{}[{}]", source, index))?;
                    }
                }
                if let Some(rest) = &array.rest {
                    self.binding(&rest.argument, format!("{}.slice({})", source, array.elements.len()))?;
                }
            }
        }
        Ok(())
    }

    fn target(&mut self, target: &AssignmentTarget, value: String) -> Result<()> {
        match target {
            AssignmentTarget::ArrayAssignmentTarget(array) => {
                let source = self.temp(format!("babelHelpers.toArray({})", value));
                for (index, element) in array.elements.iter().enumerate() {
                    if let Some(element) = element {
                        self.maybe_default(element, format!("{}[{}]", source, index))?;
                    }
                }
                if let Some(rest) = &array.rest {
                    self.target(&rest.target, format!("{}.slice({})", source, array.elements.len()))?;
                }
            }
            AssignmentTarget::ObjectAssignmentTarget(object) => {
                let source = self.simple(value);
                if object.properties.is_empty() && object.rest.is_none() {
                    self.temp(format!("babelHelpers.objectDestructuringEmpty({})", source));
                    return Ok(());
                }
                let mut excluded = Vec::new();
                for property in &object.properties {
                    match property {
                        AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(shorthand) => {
                            let name = shorthand.binding.name.to_string();
                            excluded.push(es5_string(&name));
                            let mut read = format!("{}.{}", source, name);
                            if let Some(init) = &shorthand.init {
                                read = self.with_default(read, init);
                            }
                            self.steps.push((name, read));
                        }
                        AssignmentTargetProperty::AssignmentTargetPropertyProperty(property) => {
                            let (access, key) = self.key(&property.name, property.computed, object.rest.is_some());
                            excluded.push(key);
                            self.maybe_default(&property.binding, format!("{}{}", source, access))?;
                        }
                    }
                }
                if let Some(rest) = &object.rest {
                    self.target(
                        &rest.target,
                        format!("babelHelpers.objectWithoutProperties({}, [{}])", source, excluded.join(", ")),
                    )?;
                }
            }
            simple => {
                let text = self.pass.text(simple.span()).to_string();
                self.steps.push((text, value));
            }
        }
        Ok(())
    }

    fn maybe_default(&mut self, target: &AssignmentTargetMaybeDefault, value: String) -> Result<()> {
        match target {
            AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => {
                let value = self.with_default(value, &with_default.init);
                self.target(&with_default.binding, value)
            }
            other => match other.as_assignment_target() {
                Some(target) => self.target(target, value),
                None => Ok(()),
            },
        }
    }
}
