//! AST node types for the host-language subset.
//!
//! Every node carries a [`Span`] whose byte offsets point into the text the
//! node was parsed from. The rewrite pipeline splices edits at these offsets,
//! so spans must stay exact. Large recursive types are boxed to keep enum
//! sizes reasonable.

use crate::Span;
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete module: a list of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Program {
    /// Iterate over top-level function declarations, looking through `export`.
    pub fn functions(&self) -> impl Iterator<Item = (&Function, bool)> {
        self.body.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Function(f) => Some((f, false)),
            StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                StmtKind::Function(f) => Some((f, true)),
                _ => None,
            },
            _ => None,
        })
    }

    /// Iterate over top-level class declarations, looking through `export`.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.body.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Class(c) => Some(c),
            StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                StmtKind::Class(c) => Some(c),
                _ => None,
            },
            _ => None,
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers & Patterns
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A binding target: `x`, `{ a, b = 1 }`, `[first, ...rest]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Ident),
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Ident>,
        span: Span,
    },
    Array {
        elements: Vec<Option<PatternElem>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident(id) => id.span,
            Pattern::Object { span, .. } | Pattern::Array { span, .. } => *span,
        }
    }

    /// The name if this is a plain identifier binding.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Pattern::Ident(id) => Some(&id.name),
            _ => None,
        }
    }

    /// Every name this pattern binds, in source order.
    pub fn bound_names(&self) -> Vec<&Ident> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a Ident>) {
        match self {
            Pattern::Ident(id) => out.push(id),
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    prop.value.collect_names(out);
                }
                if let Some(rest) = rest {
                    out.push(rest);
                }
            }
            Pattern::Array { elements, rest, .. } => {
                for elem in elements.iter().flatten() {
                    elem.target.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
        }
    }
}

/// `key: value = default` inside an object pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProp {
    pub key: String,
    pub value: Pattern,
    pub default: Option<Expr>,
    pub span: Span,
}

/// An array pattern element with an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternElem {
    pub target: Pattern,
    pub default: Option<Expr>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions & Classes
// ══════════════════════════════════════════════════════════════════════════════

/// A function parameter: `a`, `a = 0`, `{ x } = {}`, `...rest`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub target: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
    pub span: Span,
}

impl Param {
    pub fn name(&self) -> Option<&str> {
        self.target.as_ident()
    }
}

/// A function declaration, expression, arrow function, or method.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<Ident>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
    /// Span of the parenthesized parameter list, parentheses included.
    pub params_span: Span,
    pub span: Span,
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|n| n.name.as_str())
    }

    /// The block body, if the function has one.
    pub fn block(&self) -> Option<&Block> {
        match &self.body {
            FunctionBody::Block(block) => Some(block),
            FunctionBody::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    /// Concise arrow body: `x => x + 1`.
    Expr(Box<Expr>),
}

/// `{ stmts }`. The span covers both braces.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `class Name extends Base { members }`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Ident,
    pub superclass: Option<Expr>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

impl ClassDecl {
    pub fn constructors(&self) -> impl Iterator<Item = &Function> {
        self.members.iter().filter_map(|m| match &m.kind {
            ClassMemberKind::Constructor(f) => Some(f),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &Function, bool)> {
        self.members.iter().filter_map(|m| match &m.kind {
            ClassMemberKind::Method(f) => Some((m.key.as_str(), f, m.is_static)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub key: String,
    pub kind: ClassMemberKind,
    pub is_static: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMemberKind {
    Constructor(Function),
    Method(Function),
    Getter(Function),
    Setter(Function),
    Field(Option<Expr>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Var(VarDecl),
    Function(Function),
    Class(ClassDecl),
    Expr(Expr),
    Block(Block),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        head: ForHead,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        head: ForHead,
        object: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Throw(Expr),
    Try {
        block: Block,
        handler: Option<CatchClause>,
        finalizer: Option<Block>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: Ident,
        body: Box<Stmt>,
    },
    Import(ImportDecl),
    Export(ExportDecl),
    /// `unsafe { ... }`: failures inside degrade to a tagged error value.
    Unsafe(Block),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Var => write!(f, "var"),
            VarKind::Let => write!(f, "let"),
            VarKind::Const => write!(f, "const"),
        }
    }
}

/// `let a = 1, b`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarations: Vec<VarDeclarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub target: Pattern,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

/// The binding side of `for (const x of xs)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForHead {
    pub kind: Option<VarKind>,
    pub target: Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `import a, { b as c } from 'mod'`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub default: Option<Ident>,
    pub namespace: Option<Ident>,
    pub named: Vec<(Ident, Ident)>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    /// `export function f() {}`, `export const x = 1`
    Decl(Box<Stmt>),
    /// `export default expr`
    Default(Expr),
    /// `export { a, b as c }`
    Named(Vec<(Ident, Ident)>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// `true` for `null` and the `undefined` identifier.
    pub fn is_nullish_literal(&self) -> bool {
        matches!(&self.unparen().kind, ExprKind::Null)
            || self.unparen().as_ident() == Some("undefined")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(String),
    Template(Template),
    Regex { pattern: String, flags: String },
    Bool(bool),
    Null,
    Ident(String),
    This,
    /// Elements may be `Spread`.
    Array(Vec<Expr>),
    Object(Vec<ObjectProp>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Function(Box<Function>),
    Spread(Box<Expr>),
    Await(Box<Expr>),
    Paren(Box<Expr>),
    Sequence(Vec<Expr>),
}

/// `` `text ${expr} text` ``: `quasis.len() == exprs.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub quasis: Vec<String>,
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    Property {
        key: PropKey,
        value: Expr,
        shorthand: bool,
        span: Span,
    },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Named(String),
    Computed(Expr),
}

impl PropKey {
    pub fn as_named(&self) -> Option<&str> {
        match self {
            PropKey::Named(name) => Some(name),
            PropKey::Computed(_) => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    InstanceOf,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Nullish => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    And,
    Or,
    Nullish,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::Exp => "**=",
            AssignOp::And => "&&=",
            AssignOp::Or => "||=",
            AssignOp::Nullish => "??=",
        }
    }

    /// The binary operator a compound assignment applies, if any.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::Exp => Some(BinaryOp::Exp),
            _ => None,
        }
    }
}
