//! Assembles the module graph into one script: the module registry, the
//! loader and the format-specific wrapper.

use super::graph::ModuleGraph;
use super::linker::js_string;
use crate::core::models::OutputFormat;

/// Generated line → (module id, source line).
pub type LineOrigins = Vec<Option<(usize, u32)>>;

pub struct AssembledBundle {
    pub code: String,
    pub origins: LineOrigins,
}

const LOADER: &str = r#"var __cache = {};
function __load(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = (__cache[id] = { exports: {} });
  var def = __defs[id];
  def[1].call(module.exports, module, module.exports, __requireFrom(def[0]), __dynamicImportFrom(def[0]));
  return module.exports;
}
function __requireFrom(map) {
  return function (specifier) {
    if (Object.prototype.hasOwnProperty.call(map, specifier)) return __load(map[specifier]);
    if (typeof __externalRequire === "function") return __externalRequire(specifier);
    throw new Error("Cannot find module '" + specifier + "'");
  };
}
function __dynamicImportFrom(map) {
  var load = __requireFrom(map);
  return function (specifier) {
    return Promise.resolve().then(function () {
      return __toESM(load(specifier));
    });
  };
}
function __toESM(mod) {
  if (mod && mod.__esModule) return mod;
  var ns = { "default": mod };
  if (mod != null && (typeof mod === "object" || typeof mod === "function")) {
    for (var key in mod) {
      if (key !== "default" && Object.prototype.hasOwnProperty.call(mod, key)) ns[key] = mod[key];
    }
  }
  return ns;
}
function __export(target, getters) {
  Object.defineProperty(target, "__esModule", { value: true });
  for (var name in getters) {
    Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
  }
}
function __exportStar(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || Object.prototype.hasOwnProperty.call(target, key)) return;
    Object.defineProperty(target, key, {
      enumerable: true,
      get: function () {
        return source[key];
      }
    });
  });
}
function __unwrapEntry(ns) {
  if (ns && ns.__esModule) {
    var keys = Object.keys(ns);
    if (keys.length === 1 && keys[0] === "default") return ns["default"];
  }
  return ns;
}
var __defs = [];"#;

/// Helpers the lowered code and the transformer call through `babelHelpers`.
pub const HELPER_NAMES: &[&str] = &[
    "toPrimitive",
    "toPropertyKey",
    "defineProperty",
    "objectSpread2",
    "objectWithoutPropertiesLoose",
    "objectWithoutProperties",
    "objectDestructuringEmpty",
    "extends",
    "toArray",
    "toConsumableArray",
    "taggedTemplateLiteral",
    "inherits",
    "classMethod",
    "classAccessor",
];

const HELPERS: &str = r#"var babelHelpers = (function () {
  var helpers = {};
  var hasOwn = Object.prototype.hasOwnProperty;
  function ownKeys(object) {
    var keys = Object.keys(object);
    if (Object.getOwnPropertySymbols) {
      var symbols = Object.getOwnPropertySymbols(object);
      for (var i = 0; i < symbols.length; i++) {
        if (Object.prototype.propertyIsEnumerable.call(object, symbols[i])) keys.push(symbols[i]);
      }
    }
    return keys;
  }
  helpers.toPrimitive = function (input, hint) {
    if (typeof input !== "object" || input === null) return input;
    var prim = typeof Symbol === "function" && Symbol.toPrimitive ? input[Symbol.toPrimitive] : undefined;
    if (prim !== undefined) {
      var res = prim.call(input, hint || "default");
      if (typeof res !== "object") return res;
      throw new TypeError("@@toPrimitive must return a primitive value.");
    }
    return (hint === "string" ? String : Number)(input);
  };
  helpers.toPropertyKey = function (arg) {
    var key = helpers.toPrimitive(arg, "string");
    return typeof key === "symbol" ? key : String(key);
  };
  helpers.defineProperty = function (obj, key, value) {
    key = helpers.toPropertyKey(key);
    if (key in obj) {
      Object.defineProperty(obj, key, { value: value, enumerable: true, configurable: true, writable: true });
    } else {
      obj[key] = value;
    }
    return obj;
  };
  helpers.objectSpread2 = function (target) {
    for (var i = 1; i < arguments.length; i++) {
      var source = arguments[i] != null ? Object(arguments[i]) : {};
      var keys = ownKeys(source);
      for (var k = 0; k < keys.length; k++) helpers.defineProperty(target, keys[k], source[keys[k]]);
    }
    return target;
  };
  helpers.objectWithoutPropertiesLoose = function (source, excluded) {
    if (source == null) return {};
    var target = {};
    for (var key in source) {
      if (hasOwn.call(source, key) && excluded.indexOf(key) < 0) target[key] = source[key];
    }
    return target;
  };
  helpers.objectWithoutProperties = function (source, excluded) {
    if (source == null) return {};
    var target = helpers.objectWithoutPropertiesLoose(source, excluded);
    if (Object.getOwnPropertySymbols) {
      var symbols = Object.getOwnPropertySymbols(source);
      for (var i = 0; i < symbols.length; i++) {
        var key = symbols[i];
        if (excluded.indexOf(key) < 0 && Object.prototype.propertyIsEnumerable.call(source, key)) target[key] = source[key];
      }
    }
    return target;
  };
  helpers.objectDestructuringEmpty = function (obj) {
    if (obj == null) throw new TypeError("Cannot destructure " + obj);
  };
  helpers["extends"] = Object.assign || function (target) {
    for (var i = 1; i < arguments.length; i++) {
      var source = arguments[i];
      for (var key in source) {
        if (hasOwn.call(source, key)) target[key] = source[key];
      }
    }
    return target;
  };
  helpers.toArray = function (value) {
    if (Array.isArray(value)) return value;
    if (value == null) throw new TypeError("Invalid attempt to destructure non-iterable instance");
    if (typeof Symbol === "function" && Symbol.iterator && value[Symbol.iterator] != null) {
      var result = [];
      var iterator = value[Symbol.iterator]();
      var step;
      while (!(step = iterator.next()).done) result.push(step.value);
      return result;
    }
    if (typeof value === "string") return value.split("");
    if (typeof Map === "function" && value instanceof Map) {
      var entries = [];
      value.forEach(function (item, key) {
        entries.push([key, item]);
      });
      return entries;
    }
    if (typeof Set === "function" && value instanceof Set) {
      var items = [];
      value.forEach(function (item) {
        items.push(item);
      });
      return items;
    }
    if (typeof value.length !== "number") throw new TypeError(value + " is not iterable");
    return Array.prototype.slice.call(value);
  };
  helpers.toConsumableArray = function (value) {
    var items = helpers.toArray(value);
    return items === value ? items.slice() : items;
  };
  helpers.taggedTemplateLiteral = function (strings, raw) {
    if (!raw) raw = strings.slice(0);
    return Object.freeze(Object.defineProperties(strings, { raw: { value: Object.freeze(raw) } }));
  };
  helpers.inherits = function (subClass, superClass) {
    if (typeof superClass !== "function" && superClass !== null) {
      throw new TypeError("Super expression must either be null or a function");
    }
    subClass.prototype = Object.create(superClass && superClass.prototype, {
      constructor: { value: subClass, writable: true, configurable: true }
    });
    if (!superClass) return;
    if (Object.setPrototypeOf) {
      Object.setPrototypeOf(subClass, superClass);
    } else if ({ __proto__: [] } instanceof Array) {
      subClass.__proto__ = superClass;
    } else {
      for (var key in superClass) {
        if (hasOwn.call(superClass, key)) subClass[key] = superClass[key];
      }
    }
  };
  helpers.classMethod = function (target, key, fn) {
    Object.defineProperty(target, helpers.toPropertyKey(key), {
      value: fn,
      enumerable: false,
      writable: true,
      configurable: true
    });
  };
  helpers.classAccessor = function (target, key, kind, fn) {
    key = helpers.toPropertyKey(key);
    var existing = Object.getOwnPropertyDescriptor(target, key);
    var descriptor = { enumerable: false, configurable: true };
    if (existing && !("value" in existing)) {
      descriptor.get = existing.get;
      descriptor.set = existing.set;
    }
    descriptor[kind] = fn;
    Object.defineProperty(target, key, descriptor);
  };
  return helpers;
})();"#;

struct Writer {
    code: String,
    origins: LineOrigins,
}

impl Writer {
    fn line(&mut self, text: &str) {
        for line in text.lines() {
            self.code.push_str(line);
            self.code.push('\n');
            self.origins.push(None);
        }
    }

    fn body(&mut self, module: usize, body: &str) {
        for (number, line) in body.lines().enumerate() {
            self.code.push_str(line);
            self.code.push('\n');
            self.origins.push(Some((module, number as u32)));
        }
    }
}

/// Writes the bundle for `format`. Line `n` of each module body keeps the
/// origin `(module, n)` so the final source map can point back at it.
/// `helpers` adds the `babelHelpers` runtime that transformed code calls.
pub fn assemble(graph: &ModuleGraph, format: OutputFormat, library_name: &str, helpers: bool) -> AssembledBundle {
    let mut writer = Writer {
        code: String::new(),
        origins: Vec::new(),
    };

    match format {
        OutputFormat::Umd => writer.line(&umd_open(library_name)),
        OutputFormat::Esm => writer.line("var __entry = (function (__externalRequire) {"),
    }

    writer.line(LOADER);
    if helpers {
        writer.line(HELPERS);
    }

    for (id, module) in graph.modules.iter().enumerate() {
        let map = module
            .resolved
            .iter()
            .map(|(specifier, target)| format!("{}: {}", js_string(specifier), target))
            .collect::<Vec<_>>()
            .join(", ");
        writer.line(&format!(
            "__defs[{}] = [{{{}}}, function (module, exports, require, __dynamicImport) {{{}",
            id, map, module.linked.header
        ));
        writer.body(id, &module.linked.body);
        writer.line("}];");
    }

    for prelude in &graph.preludes {
        writer.line(&format!("__load({});", prelude));
    }

    match format {
        OutputFormat::Umd => {
            writer.line(&format!("return __unwrapEntry(__load({}));", graph.entry));
            writer.line("});");
        }
        OutputFormat::Esm => {
            writer.line(&format!("return __load({});", graph.entry));
            writer.line("})(undefined);");
            writer.line(&esm_exports(&graph.modules[graph.entry].linked.exports));
        }
    }

    AssembledBundle {
        code: writer.code,
        origins: writer.origins,
    }
}

fn umd_open(library_name: &str) -> String {
    format!(
        r#"(function (global, factory) {{
  typeof exports === "object" && typeof module !== "undefined"
    ? (module.exports = factory(typeof require === "function" ? require : undefined))
    : typeof define === "function" && define.amd
    ? define(["require"], factory)
    : ((global = typeof globalThis !== "undefined" ? globalThis : global || self), (global[{}] = factory()));
}})(this, function (__externalRequire) {{"#,
        js_string(library_name)
    )
}

/// Named ES exports for the entry's statically known export names.
fn esm_exports(names: &[String]) -> String {
    let mut lines = Vec::new();
    let mut named = Vec::new();

    for (i, name) in names.iter().enumerate() {
        if name == "default" {
            lines.push(r#"export default __entry["default"];"#.to_string());
        } else if is_identifier(name) {
            lines.push(format!("var __export{} = __entry[{}];", i, js_string(name)));
            named.push(format!("__export{} as {}", i, name));
        }
    }

    if !named.is_empty() {
        lines.push(format!("export {{ {} }};", named.join(", ")));
    }
    if names.is_empty() {
        lines.push("export default __entry;".to_string());
    }
    lines.join("\n")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bundler::graph::GraphModule;
    use crate::infrastructure::bundler::linker::link_module;
    use std::path::{Path, PathBuf};

    fn module(path: &str, source: &str, resolved: Vec<(String, usize)>) -> GraphModule {
        GraphModule {
            path: PathBuf::from(path),
            source: source.to_string(),
            linked: link_module(Path::new(path), source).unwrap(),
            resolved,
        }
    }

    fn graph() -> ModuleGraph {
        ModuleGraph {
            modules: vec![
                module(
                    "/p/src/index.js",
                    "import util from './util';\nexport const answer = util(21);\nexport default answer;\n",
                    vec![("./util".to_string(), 1)],
                ),
                module("/p/src/util.js", "module.exports = function (x) {\n  return x * 2;\n};\n", vec![]),
            ],
            entry: 0,
            preludes: vec![],
        }
    }

    #[test]
    fn umd_exposes_the_library_global() {
        let bundle = assemble(&graph(), OutputFormat::Umd, "luckysheet", false);
        assert!(bundle.code.contains(r#"global["luckysheet"] = factory()"#));
        assert!(bundle.code.contains(r#"__defs[0] = [{"./util": 1}, function"#));
        assert!(bundle.code.contains("return __unwrapEntry(__load(0));"));
        assert!(!bundle.code.contains("export "));
    }

    #[test]
    fn esm_has_no_umd_wrapper() {
        let bundle = assemble(&graph(), OutputFormat::Esm, "luckysheet", false);
        assert!(!bundle.code.contains("define.amd"));
        assert!(bundle.code.contains(r#"export default __entry["default"];"#));
        assert!(bundle.code.contains("export { __export0 as answer };"));
    }

    #[test]
    fn origins_point_at_module_lines() {
        let bundle = assemble(&graph(), OutputFormat::Umd, "lib", true);
        let lines: Vec<&str> = bundle.code.lines().collect();
        assert_eq!(lines.len(), bundle.origins.len());

        let (index, _) = lines
            .iter()
            .enumerate()
            .find(|(_, line)| line.contains("return x * 2;"))
            .unwrap();
        assert_eq!(bundle.origins[index], Some((1, 1)));
    }

    #[test]
    fn helpers_are_only_written_when_asked_for() {
        let without = assemble(&graph(), OutputFormat::Umd, "lib", false);
        assert!(!without.code.contains("babelHelpers"));

        let with = assemble(&graph(), OutputFormat::Umd, "lib", true);
        for name in HELPER_NAMES {
            let defined = format!("helpers.{} = ", name);
            let quoted = format!("helpers[\"{}\"] = ", name);
            assert!(with.code.contains(&defined) || with.code.contains(&quoted), "{}", name);
        }
    }
}
