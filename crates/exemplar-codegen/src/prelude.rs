//! Runtime helper prelude appended to host output.
//!
//! The rewrite passes lower `==`, declarative blocks, extensions and
//! overloaded classes to calls of a small set of helpers. Only the helpers
//! a module actually references (plus their dependencies) are appended, as
//! hoisted function declarations after the module body so that no line of
//! the module moves.

use exemplar_lexer::balance::{ident_at, is_ident_byte, is_ident_start_byte};
use exemplar_lexer::CodeMask;
use std::collections::BTreeSet;

/// One runtime helper.
#[derive(Debug, Clone, Copy)]
pub struct Helper {
    pub name: &'static str,
    /// Helpers this one calls. Internal helpers are never selected by name.
    pub deps: &'static [&'static str],
    /// `true` for helpers user code may call directly.
    pub public: bool,
    pub source: &'static str,
}

/// Every helper, dependencies before dependents.
pub const HELPERS: &[Helper] = &[
    Helper {
        name: "__deepEqual",
        deps: &[],
        public: false,
        source: r#"function __deepEqual(a, b) {
  if (typeof a === 'number' && typeof b === 'number') {
    if (Number.isNaN(a) || Number.isNaN(b)) return Number.isNaN(a) && Number.isNaN(b);
    if (a === b) return true;
    if (Number.isInteger(a) && Number.isInteger(b)) return false;
    return Math.abs(a - b) <= 1e-9 * Math.max(Math.abs(a), Math.abs(b));
  }
  if (a === b) return true;
  if (a === null || b === null || typeof a !== 'object' || typeof b !== 'object') return false;
  if (Array.isArray(a) !== Array.isArray(b)) return false;
  if (Array.isArray(a)) {
    if (a.length !== b.length) return false;
    for (let i = 0; i < a.length; i++) if (!__deepEqual(a[i], b[i])) return false;
    return true;
  }
  const ka = Object.keys(a);
  if (ka.length !== Object.keys(b).length) return false;
  for (const k of ka) {
    if (!Object.prototype.hasOwnProperty.call(b, k) || !__deepEqual(a[k], b[k])) return false;
  }
  return true;
}"#,
    },
    Helper {
        name: "__typeMatches",
        deps: &["__deepEqual"],
        public: false,
        source: r#"function __typeMatches(value, pattern) {
  if (pattern === undefined) return true;
  if (pattern === null) return value === null;
  if (pattern.__exemplarType === true) {
    if (Array.isArray(pattern.members)) {
      return pattern.members.some(m => m !== null && m !== undefined && m.__exemplarType === true
        ? __typeMatches(value, m)
        : __deepEqual(value, m));
    }
    return __typeMatches(value, pattern.example);
  }
  if (pattern instanceof RegExp) return typeof value === 'string' && pattern.test(value);
  if (Array.isArray(pattern)) {
    if (!Array.isArray(value)) return false;
    return pattern.length === 0 || value.every(v => __typeMatches(v, pattern[0]));
  }
  if (typeof pattern === 'object') {
    if (value === null || typeof value !== 'object' || Array.isArray(value)) return false;
    return Object.keys(pattern).every(k => pattern[k] === undefined || (k in value && __typeMatches(value[k], pattern[k])));
  }
  return value !== null && value !== undefined && typeof value === typeof pattern;
}"#,
    },
    Helper {
        name: "Is",
        deps: &["__deepEqual"],
        public: true,
        source: "function Is(a, b) { return __deepEqual(a, b); }",
    },
    Helper {
        name: "IsNot",
        deps: &["__deepEqual"],
        public: true,
        source: "function IsNot(a, b) { return !__deepEqual(a, b); }",
    },
    Helper {
        name: "Type",
        deps: &["__typeMatches"],
        public: true,
        source: r#"function Type(name, spec, description) {
  const keys = spec !== null && typeof spec === 'object' && !Array.isArray(spec) && spec.__exemplarType !== true
    ? Object.keys(spec)
    : [];
  const isSpec = keys.length > 0 && keys.every(k => k === 'example' || k === 'predicate' || k === 'description' || k === 'default');
  const t = { __exemplarType: true, name: name };
  t.description = isSpec && description === undefined ? spec.description : description;
  t.example = isSpec ? (spec.example !== undefined ? spec.example : spec.default) : spec;
  t.predicate = isSpec ? spec.predicate : undefined;
  t.check = function (value) {
    return __typeMatches(value, this) && (typeof this.predicate !== 'function' || !!this.predicate(value));
  };
  return t;
}"#,
    },
    Helper {
        name: "Union",
        deps: &["__typeMatches"],
        public: true,
        source: r#"function Union(name, description, members) {
  if (Array.isArray(description) && members === undefined) {
    members = description;
    description = undefined;
  }
  const first = members[0];
  return {
    __exemplarType: true,
    name: name,
    description: description,
    members: members,
    example: first !== null && first !== undefined && first.__exemplarType === true ? first.example : first,
    check: function (value) { return __typeMatches(value, this); },
  };
}"#,
    },
    Helper {
        name: "Enum",
        deps: &[],
        public: true,
        source: r#"function Enum(name, description, entries) {
  if (entries === undefined && description !== null && typeof description === 'object') entries = description;
  return Object.freeze(Object.assign({}, entries));
}"#,
    },
    Helper {
        name: "Generic",
        deps: &["__typeMatches"],
        public: true,
        source: r#"function Generic(name, params, declaration) {
  return {
    __exemplarType: true,
    name: name,
    description: declaration.description,
    params: params,
    declaration: declaration,
    example: declaration.example,
    check: function (value) { return __typeMatches(value, this); },
  };
}"#,
    },
    Helper {
        name: "__extend",
        deps: &[],
        public: true,
        source: r#"function __extend(target, methods) {
  const ctor = typeof target === 'string' ? globalThis[target] : target;
  for (const key of Object.keys(methods)) {
    Object.defineProperty(ctor.prototype, key, { value: methods[key], writable: true, configurable: true, enumerable: false });
  }
}"#,
    },
    Helper {
        name: "__overloadClass",
        deps: &[],
        public: true,
        source: r#"function __overloadClass(cls, dispatch) {
  const Overloaded = function (...args) { return dispatch(...args); };
  Object.setPrototypeOf(Overloaded, cls);
  Overloaded.prototype = cls.prototype;
  Object.defineProperty(Overloaded, 'name', { value: cls.name.replace(/\$class$/, '') });
  return Overloaded;
}"#,
    },
    Helper {
        name: "__checkType",
        deps: &[],
        public: true,
        source: r#"function __checkType(value, type) {
  if (type.nullable && (value === null || value === undefined)) return true;
  switch (type.kind) {
    case 'string': return typeof value === 'string';
    case 'number': return typeof value === 'number';
    case 'integer': return Number.isInteger(value);
    case 'non-negative-integer': return Number.isInteger(value) && value >= 0;
    case 'boolean': return typeof value === 'boolean';
    case 'null': return value === null;
    case 'undefined': return value === undefined;
    case 'union': return (type.members || []).some(m => __checkType(value, m));
    case 'array': return Array.isArray(value) && (!type.items || value.every(v => __checkType(v, type.items)));
    case 'object': {
      if (value === null || typeof value !== 'object' || Array.isArray(value)) return false;
      if (type.destructuredParams) {
        return Object.keys(type.destructuredParams).every(k => {
          const p = type.destructuredParams[k];
          return value[k] === undefined ? !p.required : __checkType(value[k], p.type);
        });
      }
      const shape = type.shape || {};
      return Object.keys(shape).every(k => {
        const s = shape[k];
        return value[k] === undefined ? (s.nullable || s.kind === 'undefined' || s.kind === 'any') : __checkType(value[k], s);
      });
    }
    default: return true;
  }
}"#,
    },
    Helper {
        name: "__checkReturn",
        deps: &["__checkType"],
        public: true,
        source: r#"function __checkReturn(value, type, name) {
  if (__checkType(value, type)) return value;
  return { $error: true, message: 'return value of ' + name + ' does not match its declared type', returns: true };
}"#,
    },
];

fn helper(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().find(|h| h.name == name)
}

/// Identifiers that occur as code (not inside strings, comments or
/// patterns, and not as a property name after `.`).
fn code_identifiers(code: &str) -> BTreeSet<&str> {
    let mask = CodeMask::new(code);
    let bytes = code.as_bytes();
    let mut names = BTreeSet::new();
    let mut at = 0;
    while at < bytes.len() {
        let b = bytes[at];
        if !is_ident_start_byte(b) || !mask.is_code(at) {
            at += 1;
            continue;
        }
        let boundary = at == 0 || (!is_ident_byte(bytes[at - 1]) && bytes[at - 1] != b'.');
        match ident_at(code, at) {
            Some((name, end)) => {
                if boundary {
                    names.insert(name);
                }
                at = end;
            }
            None => at += 1,
        }
    }
    names
}

/// Names of the helpers `code` needs, dependencies included, in prelude
/// order.
pub fn referenced_helpers(code: &str) -> Vec<&'static str> {
    let idents = code_identifiers(code);
    let mut needed: BTreeSet<&'static str> = BTreeSet::new();
    let mut stack: Vec<&'static str> = HELPERS
        .iter()
        .filter(|h| h.public && idents.contains(h.name))
        .map(|h| h.name)
        .collect();
    while let Some(name) = stack.pop() {
        if needed.insert(name) {
            if let Some(h) = helper(name) {
                stack.extend(h.deps.iter().copied());
            }
        }
    }
    HELPERS
        .iter()
        .filter(|h| needed.contains(h.name))
        .map(|h| h.name)
        .collect()
}

/// Render the prelude for the given helper names. Empty when none.
pub fn render(names: &[&str]) -> String {
    let mut out = String::new();
    for name in names {
        if let Some(h) = helper(name) {
            out.push_str(h.source);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_referenced_helpers_with_deps() {
        let names = referenced_helpers("const ok = Is(a, b);");
        assert_eq!(names, vec!["__deepEqual", "Is"]);
    }

    #[test]
    fn test_strings_comments_and_properties_ignored() {
        assert!(referenced_helpers("const s = 'Is(a, b)'; // Type\nobj.Union(1);").is_empty());
    }

    #[test]
    fn test_transitive_dependencies_in_order() {
        let names = referenced_helpers("const C = Union('C', ['a']);");
        assert_eq!(names, vec!["__deepEqual", "__typeMatches", "Union"]);
    }

    #[test]
    fn test_render_is_hoisted_declarations() {
        let text = render(&referenced_helpers("return __checkReturn(x, t, 'f');"));
        assert!(text.starts_with("function __checkType("));
        assert!(text.contains("function __checkReturn("));
    }

    #[test]
    fn test_internal_helpers_not_selected_by_name() {
        assert!(referenced_helpers("__deepEqual(1, 2)").is_empty());
    }
}
