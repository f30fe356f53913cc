//! Statement parsing.

use crate::parser::Parser;
use exemplar_lexer::token::TokenKind;
use exemplar_types::ast::*;
use exemplar_types::ErrorCode;

impl<'src> Parser<'src> {
    /// Parse a block of statements: `{ stmts... }`
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(),
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(Block {
            body,
            span: self.span_from(start),
        })
    }

    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_var_decl()?;
                self.consume_semicolon();
                StmtKind::Var(decl)
            }
            TokenKind::Function => StmtKind::Function(self.parse_function(false, true)?),
            TokenKind::Identifier(name)
                if name == "async"
                    && self.look_ahead(1) == &TokenKind::Function
                    && !self.newline_before_ahead(1) =>
            {
                self.advance();
                StmtKind::Function(self.parse_function(true, true)?)
            }
            TokenKind::Identifier(name) if name == "unsafe" && self.look_ahead(1) == &TokenKind::LBrace => {
                self.advance();
                StmtKind::Unsafe(self.parse_block()?)
            }
            TokenKind::Identifier(_) if self.look_ahead(1) == &TokenKind::Colon => {
                let label = self.expect_identifier()?;
                self.advance(); // eat `:`
                let body = self.parse_statement()?;
                StmtKind::Labeled {
                    label,
                    body: Box::new(body),
                }
            }
            TokenKind::Class => StmtKind::Class(self.parse_class()?),
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::Do => self.parse_do_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Return => self.parse_return()?,
            TokenKind::Break | TokenKind::Continue => self.parse_jump()?,
            TokenKind::Throw => {
                self.advance();
                if self.peek().newline_before {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "line break is not allowed after 'throw'",
                    );
                    return None;
                }
                let value = self.parse_expression()?;
                self.consume_semicolon();
                StmtKind::Throw(value)
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Switch => self.parse_switch()?,
            TokenKind::Import if self.look_ahead(1) != &TokenKind::LParen => {
                StmtKind::Import(self.parse_import()?)
            }
            TokenKind::Export => StmtKind::Export(self.parse_export()?),
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon();
                StmtKind::Expr(expr)
            }
        };
        Some(Stmt::new(kind, self.span_from(start)))
    }

    /// `let a = 1, { b } = obj` (without the terminator).
    pub(crate) fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let kind = match self.advance().kind {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            _ => VarKind::Const,
        };
        let mut declarations = Vec::new();
        loop {
            let start = self.current_span();
            let target = self.parse_binding_pattern()?;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(VarDeclarator {
                target,
                init,
                span: self.span_from(start),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(VarDecl { kind, declarations })
    }

    fn parse_paren_expr(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Some(expr)
    }

    fn parse_if(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `if`
        let test = self.parse_paren_expr()?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Some(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_while(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `while`
        let test = self.parse_paren_expr()?;
        let body = Box::new(self.parse_statement()?);
        Some(StmtKind::While { test, body })
    }

    fn parse_do_while(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `do`
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        let test = self.parse_paren_expr()?;
        self.eat(&TokenKind::Semicolon);
        Some(StmtKind::DoWhile { body, test })
    }

    /// `for (init; test; update)`, `for (x of xs)`, `for (k in obj)`.
    fn parse_for(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `for`
        if self.check_ident("await") {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "'for await' is not supported");
            return None;
        }
        self.expect(&TokenKind::LParen)?;

        let mut init = None;
        if matches!(self.peek_kind(), TokenKind::Var | TokenKind::Let | TokenKind::Const) {
            let kind = match self.peek_kind() {
                TokenKind::Var => VarKind::Var,
                TokenKind::Let => VarKind::Let,
                _ => VarKind::Const,
            };
            // Peek past the binding to see whether this is for-of/for-in.
            let save = self.save();
            self.advance();
            let target = self.parse_binding_pattern()?;
            if self.check_ident("of") || self.check(&TokenKind::In) {
                let head = ForHead {
                    kind: Some(kind),
                    target,
                };
                return self.parse_for_iteration(head);
            }
            self.restore(save);
            self.no_in = true;
            let decl = self.parse_var_decl();
            self.no_in = false;
            init = Some(ForInit::Var(decl?));
        } else if !self.check(&TokenKind::Semicolon) {
            self.no_in = true;
            let expr = self.parse_expression();
            self.no_in = false;
            let expr = expr?;
            if self.check_ident("of") || self.check(&TokenKind::In) {
                let target = self.expr_to_pattern(expr)?;
                return self.parse_for_iteration(ForHead { kind: None, target });
            }
            init = Some(ForInit::Expr(expr));
        }

        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Some(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_iteration(&mut self, head: ForHead) -> Option<StmtKind> {
        let is_of = self.check_ident("of");
        self.advance(); // eat `of` / `in`
        let subject = if is_of {
            self.parse_assignment()?
        } else {
            self.parse_expression()?
        };
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Some(if is_of {
            StmtKind::ForOf {
                head,
                iterable: subject,
                body,
            }
        } else {
            StmtKind::ForIn {
                head,
                object: subject,
                body,
            }
        })
    }

    fn parse_return(&mut self) -> Option<StmtKind> {
        let span = self.advance().span; // eat `return`
        if self.function_depth == 0 {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                "'return' outside of a function",
                span,
            );
            return None;
        }
        let value = if self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.at_end()
            || self.peek().newline_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon();
        Some(StmtKind::Return(value))
    }

    fn parse_jump(&mut self) -> Option<StmtKind> {
        let is_break = self.advance().kind == TokenKind::Break;
        let label = match self.peek_kind() {
            TokenKind::Identifier(_) if !self.peek().newline_before => self.expect_identifier(),
            _ => None,
        };
        self.consume_semicolon();
        Some(if is_break {
            StmtKind::Break(label)
        } else {
            StmtKind::Continue(label)
        })
    }

    fn parse_try(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `try`
        let block = self.parse_block()?;
        let handler = if self.eat(&TokenKind::Catch) {
            let param = if self.eat(&TokenKind::LParen) {
                let pattern = self.parse_binding_pattern()?;
                self.expect(&TokenKind::RParen)?;
                Some(pattern)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "'try' needs a 'catch' or 'finally' block",
            );
            return None;
        }
        Some(StmtKind::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> Option<StmtKind> {
        self.advance(); // eat `switch`
        let discriminant = self.parse_paren_expr()?;
        self.expect(&TokenKind::LBrace)?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let start = self.current_span();
            let test = if self.eat(&TokenKind::Default) {
                None
            } else {
                self.expect(&TokenKind::Case)?;
                Some(self.parse_expression()?)
            };
            self.expect(&TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.peek_kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                match self.parse_statement() {
                    Some(stmt) => body.push(stmt),
                    None => self.synchronize(),
                }
            }
            cases.push(SwitchCase {
                test,
                body,
                span: self.span_from(start),
            });
        }
        self.expect(&TokenKind::RBrace)?;
        Some(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    /// Convert an already-parsed expression into a binding target
    /// (`for (x of xs)` without a declaration keyword).
    pub(crate) fn expr_to_pattern(&mut self, expr: Expr) -> Option<Pattern> {
        match expr.kind {
            ExprKind::Ident(name) => Some(Pattern::Ident(Ident::new(name, expr.span))),
            _ => {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "invalid binding target",
                    expr.span,
                );
                None
            }
        }
    }
}
