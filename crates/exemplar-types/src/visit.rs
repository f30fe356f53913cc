//! Read-only AST traversal.
//!
//! Implement [`AstVisitor`] and override the hooks you need; call the
//! matching `walk_*` function from an override to keep descending.

use crate::ast::*;

pub trait AstVisitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Called for every function, method and arrow.
    fn visit_function(&mut self, func: &Function) {
        walk_function(self, func);
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        walk_pattern(self, pattern);
    }

    fn visit_class(&mut self, class: &ClassDecl) {
        walk_class(self, class);
    }
}

pub fn walk_program<V: AstVisitor + ?Sized>(v: &mut V, program: &Program) {
    for stmt in &program.body {
        v.visit_stmt(stmt);
    }
}

pub fn walk_block<V: AstVisitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.body {
        v.visit_stmt(stmt);
    }
}

fn walk_var<V: AstVisitor + ?Sized>(v: &mut V, decl: &VarDecl) {
    for d in &decl.declarations {
        v.visit_pattern(&d.target);
        if let Some(init) = &d.init {
            v.visit_expr(init);
        }
    }
}

pub fn walk_stmt<V: AstVisitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Var(decl) => walk_var(v, decl),
        StmtKind::Function(func) => v.visit_function(func),
        StmtKind::Class(class) => v.visit_class(class),
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => v.visit_expr(expr),
        StmtKind::Block(block) | StmtKind::Unsafe(block) => walk_block(v, block),
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_stmt(consequent);
            if let Some(alt) = alternate {
                v.visit_stmt(alt);
            }
        }
        StmtKind::While { test, body } | StmtKind::DoWhile { body, test } => {
            v.visit_expr(test);
            v.visit_stmt(body);
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            match init {
                Some(ForInit::Var(decl)) => walk_var(v, decl),
                Some(ForInit::Expr(expr)) => v.visit_expr(expr),
                None => {}
            }
            if let Some(test) = test {
                v.visit_expr(test);
            }
            if let Some(update) = update {
                v.visit_expr(update);
            }
            v.visit_stmt(body);
        }
        StmtKind::ForOf {
            head,
            iterable: source,
            body,
        }
        | StmtKind::ForIn {
            head,
            object: source,
            body,
        } => {
            v.visit_pattern(&head.target);
            v.visit_expr(source);
            v.visit_stmt(body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            walk_block(v, block);
            if let Some(handler) = handler {
                if let Some(param) = &handler.param {
                    v.visit_pattern(param);
                }
                walk_block(v, &handler.body);
            }
            if let Some(finalizer) = finalizer {
                walk_block(v, finalizer);
            }
        }
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            v.visit_expr(discriminant);
            for case in cases {
                if let Some(test) = &case.test {
                    v.visit_expr(test);
                }
                for stmt in &case.body {
                    v.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Labeled { body, .. } => v.visit_stmt(body),
        StmtKind::Export(ExportDecl::Decl(inner)) => v.visit_stmt(inner),
        StmtKind::Export(ExportDecl::Default(expr)) => v.visit_expr(expr),
        StmtKind::Export(ExportDecl::Named(_))
        | StmtKind::Import(_)
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Empty => {}
    }
}

pub fn walk_function<V: AstVisitor + ?Sized>(v: &mut V, func: &Function) {
    for param in &func.params {
        v.visit_pattern(&param.target);
        if let Some(default) = &param.default {
            v.visit_expr(default);
        }
    }
    match &func.body {
        FunctionBody::Block(block) => walk_block(v, block),
        FunctionBody::Expr(expr) => v.visit_expr(expr),
    }
}

pub fn walk_class<V: AstVisitor + ?Sized>(v: &mut V, class: &ClassDecl) {
    if let Some(superclass) = &class.superclass {
        v.visit_expr(superclass);
    }
    for member in &class.members {
        match &member.kind {
            ClassMemberKind::Constructor(f)
            | ClassMemberKind::Method(f)
            | ClassMemberKind::Getter(f)
            | ClassMemberKind::Setter(f) => v.visit_function(f),
            ClassMemberKind::Field(Some(init)) => v.visit_expr(init),
            ClassMemberKind::Field(None) => {}
        }
    }
}

pub fn walk_pattern<V: AstVisitor + ?Sized>(v: &mut V, pattern: &Pattern) {
    match pattern {
        Pattern::Ident(_) => {}
        Pattern::Object { props, .. } => {
            for prop in props {
                v.visit_pattern(&prop.value);
                if let Some(default) = &prop.default {
                    v.visit_expr(default);
                }
            }
        }
        Pattern::Array { elements, rest, .. } => {
            for elem in elements.iter().flatten() {
                v.visit_pattern(&elem.target);
                if let Some(default) = &elem.default {
                    v.visit_expr(default);
                }
            }
            if let Some(rest) = rest {
                v.visit_pattern(rest);
            }
        }
    }
}

pub fn walk_expr<V: AstVisitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Regex { .. }
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::Ident(_)
        | ExprKind::This => {}
        ExprKind::Template(t) => {
            for e in &t.exprs {
                v.visit_expr(e);
            }
        }
        ExprKind::Array(items) | ExprKind::Sequence(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        ExprKind::Object(props) => {
            for prop in props {
                match prop {
                    ObjectProp::Property { key, value, .. } => {
                        if let PropKey::Computed(k) = key {
                            v.visit_expr(k);
                        }
                        v.visit_expr(value);
                    }
                    ObjectProp::Spread(e) => v.visit_expr(e),
                }
            }
        }
        ExprKind::Member { object, .. } => v.visit_expr(object),
        ExprKind::Index { object, index, .. } => {
            v.visit_expr(object);
            v.visit_expr(index);
        }
        ExprKind::Call { callee, args, .. } | ExprKind::New { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Update { target, .. } => v.visit_expr(target),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            v.visit_expr(test);
            v.visit_expr(consequent);
            v.visit_expr(alternate);
        }
        ExprKind::Assign { target, value, .. } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        ExprKind::Function(func) => v.visit_function(func),
        ExprKind::Spread(e) | ExprKind::Await(e) | ExprKind::Paren(e) => v.visit_expr(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Span;

    struct Idents(Vec<String>);

    impl AstVisitor for Idents {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Ident(name) = &expr.kind {
                self.0.push(name.clone());
            }
            walk_expr(self, expr);
        }
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.into()), Span::default())
    }

    #[test]
    fn test_walk_reaches_nested_expressions() {
        let call = Expr::new(
            ExprKind::Call {
                callee: Box::new(ident("f")),
                args: vec![Expr::new(
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(ident("a")),
                        right: Box::new(ident("b")),
                    },
                    Span::default(),
                )],
                optional: false,
            },
            Span::default(),
        );
        let program = Program {
            body: vec![Stmt::new(StmtKind::Expr(call), Span::default())],
            span: Span::default(),
        };
        let mut v = Idents(Vec::new());
        walk_program(&mut v, &program);
        assert_eq!(v.0, vec!["f", "a", "b"]);
    }
}
