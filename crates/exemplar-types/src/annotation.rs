//! AST for the statically-annotated dialect.
//!
//! Only declaration signatures are represented: interfaces, type aliases,
//! and the parameter/return annotations of functions. Function bodies stay
//! as source text and are handed to the example-typed pipeline once their
//! annotations are erased.

use crate::ast::Ident;
use crate::Span;

/// A type annotation: `number`, `string[]`, `{ a: T }`, `A | B`, `Map<K, V>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: AnnotationKind,
    pub span: Span,
}

impl TypeAnnotation {
    pub fn new(kind: AnnotationKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Keyword(Keyword),
    StringLiteral(String),
    NumberLiteral(f64),
    BoolLiteral(bool),
    /// `T[]`
    Array(Box<TypeAnnotation>),
    /// `[A, B]`
    Tuple(Vec<TypeAnnotation>),
    /// `{ a: A; b?: B }`
    Object(Vec<PropertySignature>),
    Union(Vec<TypeAnnotation>),
    Intersection(Vec<TypeAnnotation>),
    /// `Name` or `Name<Args>`
    Reference {
        name: String,
        args: Vec<TypeAnnotation>,
    },
    /// `(a: A) => R`
    Function {
        params: Vec<AnnotatedParam>,
        returns: Box<TypeAnnotation>,
    },
    Paren(Box<TypeAnnotation>),
    /// `typeof value`
    Typeof(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Any,
    Unknown,
    Void,
    Never,
    Object,
    BigInt,
    Symbol,
}

impl Keyword {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Keyword::String,
            "number" => Keyword::Number,
            "boolean" => Keyword::Boolean,
            "null" => Keyword::Null,
            "undefined" => Keyword::Undefined,
            "any" => Keyword::Any,
            "unknown" => Keyword::Unknown,
            "void" => Keyword::Void,
            "never" => Keyword::Never,
            "object" => Keyword::Object,
            "bigint" => Keyword::BigInt,
            "symbol" => Keyword::Symbol,
            _ => return None,
        })
    }
}

/// A member of an interface or object type literal.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySignature {
    pub name: String,
    pub optional: bool,
    pub annotation: TypeAnnotation,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// `interface Name<T> extends Base { members }`
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: Ident,
    pub type_params: Vec<String>,
    pub extends: Vec<TypeAnnotation>,
    pub members: Vec<PropertySignature>,
    pub span: Span,
}

/// `type Name<T> = annotation`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAliasDecl {
    pub name: Ident,
    pub type_params: Vec<String>,
    pub annotation: TypeAnnotation,
    pub span: Span,
}

/// A parameter in an annotated signature.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedParam {
    pub name: String,
    pub optional: bool,
    pub rest: bool,
    pub annotation: Option<TypeAnnotation>,
    /// Source span of the default value, if one is written.
    pub default: Option<Span>,
    pub span: Span,
}

/// An annotated function signature. The body is not parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedFunction {
    pub name: Ident,
    pub type_params: Vec<String>,
    pub params: Vec<AnnotatedParam>,
    pub returns: Option<TypeAnnotation>,
    pub is_async: bool,
    pub exported: bool,
    /// `<T, U>` after the name, if present.
    pub type_params_span: Option<Span>,
    /// `: R` after the parameter list, colon included.
    pub returns_span: Option<Span>,
    pub body_span: Span,
    pub span: Span,
}

/// Everything the annotated-dialect parser extracts from one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedModule {
    pub interfaces: Vec<InterfaceDecl>,
    pub aliases: Vec<TypeAliasDecl>,
    pub functions: Vec<AnnotatedFunction>,
    /// Annotation text inside bodies (`let x: T`, `as T`) to erase.
    pub erasures: Vec<Span>,
}
