//! Source-level lowering of ES2015+ module bodies to ES5, for targets the
//! transformer alone cannot reach.
//!
//! Each pass parses the current text, collects edit groups for every
//! construct it can lower, applies the groups that do not collide and
//! starts over until a pass finds nothing left to do. Groups keep the line
//! count of the text they replace, so source maps stay line-accurate.

mod classes;
mod context;
mod edits;
mod expressions;
mod functions;
mod loops;
mod patterns;
mod scoping;
pub mod targets;
pub mod verify;

pub use targets::{Lowering, TargetPlan};

use crate::utils::{FlowError, Result};
use context::Pass;
use oxc_allocator::Allocator;
use oxc_parser::{ParseOptions, Parser};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use std::path::Path;

/// Passes after which a module that still changes is reported instead of
/// looping forever.
const MAX_PASSES: usize = 200;

/// Rewrites a linked module body so it only uses ES5 syntax, apart from
/// what the transformer lowers afterwards (optional chaining, `**`, regexp
/// flags and friends). Fails with a config error naming the construct when
/// something cannot be expressed in ES5.
pub fn lower_module(path: &Path, source: &str) -> Result<String> {
    let mut current = source.to_string();
    for _ in 0..MAX_PASSES {
        match lower_once(path, &current)? {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }
    Err(FlowError::config(format!(
        "{}: lowering to ES5 did not settle after {} passes",
        path.display(),
        MAX_PASSES
    )))
}

fn lower_once(path: &Path, source: &str) -> Result<Option<String>> {
    let allocator = Allocator::default();
    let options = ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    };
    let parsed = Parser::new(&allocator, source, SourceType::cjs())
        .with_options(options)
        .parse();
    if !parsed.errors.is_empty() {
        return Err(FlowError::config(format!(
            "cannot lower to ES5: {}",
            crate::infrastructure::bundler::linker::render_diagnostics(path, source, parsed.errors)
        )));
    }
    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;

    // Earlier collectors win when groups overlap; the rest wait a pass.
    let mut pass = Pass::new(path, source, &semantic);
    loops::collect_for_of(&mut pass)?;
    classes::collect(&mut pass)?;
    functions::collect(&mut pass)?;
    patterns::collect(&mut pass)?;
    expressions::collect_spread(&mut pass)?;
    expressions::collect_objects(&mut pass)?;
    expressions::collect_templates(&mut pass)?;
    expressions::collect_literals(&mut pass)?;
    loops::collect_captured(&mut pass)?;
    scoping::collect(&mut pass)?;
    Ok(pass.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(source: &str) -> String {
        lower_module(Path::new("/p/src/app.js"), source).unwrap()
    }

    fn assert_es5(code: &str) {
        let allocator = Allocator::default();
        let options = ParseOptions {
            allow_return_outside_function: true,
            ..ParseOptions::default()
        };
        let parsed = Parser::new(&allocator, code, SourceType::cjs()).with_options(options).parse();
        assert!(parsed.errors.is_empty(), "does not parse:\n{}", code);
        let found = verify::newer_syntax(&parsed.program);
        assert!(found.is_empty(), "{:?} left in:\n{}", found, code);
    }

    #[test]
    fn arrows_keep_this_and_arguments() {
        let out = lower(
            "function outer() {\n  const first = () => arguments[0];\n  return { run: (a, b = 1) => this.x + a + b, first };\n}\n",
        );
        assert_es5(&out);
        assert!(out.contains("var _arguments = arguments;"));
        assert!(out.contains(".bind(this)"));
        assert!(out.contains("if (b === void 0) b = 1;"));
    }

    #[test]
    fn classes_become_constructor_functions() {
        let out = lower(
            "class Animal {\n  constructor(name) { this.name = name; }\n  speak() { return this.name; }\n}\nclass Dog extends Animal {\n  sound = 'woof';\n  static kind = 'dog';\n  speak() { return super.speak() + this.sound; }\n  get loud() { return this.sound.toUpperCase(); }\n}\n",
        );
        assert_es5(&out);
        assert!(out.contains("babelHelpers.inherits(Dog, _super);"));
        assert!(out.contains("_super.prototype.speak.call(this)"));
        assert!(out.contains("babelHelpers.classAccessor(Dog.prototype, \"loud\", \"get\", function"));
        assert!(out.contains("Dog.kind = 'dog';"));
        assert!(out.contains("this.sound = _init_sound.call(this);"));
    }

    #[test]
    fn captured_loop_bindings_get_one_function_per_iteration() {
        let out = lower("var fns = [];\nfor (let i = 0; i < 3; i++) {\n  fns.push(() => i);\n}\n");
        assert_es5(&out);
        assert!(out.contains("var _loop = function (i)"));
        assert!(out.contains("for (var i = 0; i < 3; i++) { _loop(i); }"));
    }

    #[test]
    fn returns_and_breaks_leave_the_wrapped_loop() {
        let out = lower(
            "function find(items, later) {\n  for (const item of items) {\n    if (!item) break;\n    later(() => item);\n    if (item.hit) return item;\n  }\n}\n",
        );
        assert_es5(&out);
        assert!(out.contains("babelHelpers.toArray(items)"));
        assert!(out.contains("=== \"break\") break;"));
        assert!(out.contains(".v;"));
    }

    #[test]
    fn destructuring_and_templates() {
        let out = lower(
            "const { a, b: [c, ...d], ...rest } = obj;\nlet x, y;\n[x, y] = [y, x];\nconst label = `${a}-${c}:\n${d.length}`;\nconst key = 'k';\nconst o = { a, [key]: 1, ...rest, run() {} };\n",
        );
        assert_es5(&out);
        assert!(out.contains("babelHelpers.objectWithoutProperties("));
        assert!(out.contains(".concat("));
        assert!(out.contains("babelHelpers.defineProperty({"));
        assert!(out.contains("babelHelpers.objectSpread2("));
    }

    #[test]
    fn spread_calls_keep_their_receiver() {
        let out = lower("var args = [1, 2];\nMath.max(...args);\nget().push(0, ...args);\nnew Date(...args);\n");
        assert_es5(&out);
        assert!(out.contains("Math.max.apply(Math, babelHelpers.toConsumableArray(args))"));
        assert!(out.contains("(_obj = get()).push.apply(_obj, [0].concat("));
        assert!(out.contains("new (Function.prototype.bind.apply(Date, [null].concat("));
    }

    #[test]
    fn lines_stay_where_they_were() {
        let source = "const a = `one\ntwo`;\nclass A {\n  static b = 1;\n  m() {\n    return [...arguments];\n  }\n}\nfor (const x of [a]) {\n  console.log(x);\n}\nexport_marker();\n";
        let out = lower(source);
        assert_es5(&out);
        assert_eq!(out.lines().count(), source.lines().count(), "{}", out);
        let marker = out.lines().position(|line| line.contains("export_marker")).unwrap();
        assert_eq!(marker, 11);
    }

    #[test]
    fn block_scoped_names_that_collide_are_renamed() {
        let out = lower("var x = 1;\n{\n  let x = 2;\n  use({ x });\n}\nuse(x);\n");
        assert_es5(&out);
        assert!(out.contains("var _x = 2;"));
        assert!(out.contains("x: _x"));
        assert!(out.contains("use(x);"));
    }

    #[test]
    fn unlowerable_code_is_a_config_error() {
        let err = lower_module(Path::new("/p/src/app.js"), "let a = 1;\nclass A {\n  #secret = 1;\n}\n").unwrap_err();
        match err {
            FlowError::Config(message) => {
                assert!(message.contains("/p/src/app.js:3"), "{}", message);
                assert!(message.contains("private fields"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn es5_input_is_returned_unchanged() {
        let source = "var a = [1, 2];\nfunction f(x) { return x + a.length; }\n";
        assert_eq!(lower(source), source);
    }
}
