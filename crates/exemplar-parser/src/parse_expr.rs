//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 14. `,` (sequence)
//! 13. `=`, `+=`, ... (assignment, right-assoc), arrow functions
//! 12. `? :` (conditional)
//! 11. `||`, `??`
//! 10. `&&`
//!  9. `|`
//!  8. `^`
//!  7. `&`
//!  6. `==`, `!=`, `===`, `!==`
//!  5. `<`, `>`, `<=`, `>=`, `in`, `instanceof`
//!  4. `<<`, `>>`, `>>>`
//!  3. `+`, `-` then `*`, `/`, `%` then `**` (right-assoc)
//!  2. unary prefix, `await`, postfix `++`/`--`
//!  1. `.`, `?.`, `[]`, `()`, `new`

use exemplar_lexer::token::TokenKind;
use exemplar_types::ast::*;
use exemplar_types::{ErrorCode, Span};

use crate::parser::Parser;

/// Nesting beyond this is rejected instead of overflowing the stack.
const MAX_EXPR_DEPTH: u32 = 64;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// `Expression = Assignment { "," Assignment }`
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_assignment()?);
        }
        Some(Expr::new(ExprKind::Sequence(items), self.span_from(start)))
    }

    /// `Assignment = Arrow | Conditional [ AssignOp Assignment ]`
    pub(crate) fn parse_assignment(&mut self) -> Option<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.error_at_current(
                ErrorCode::NESTING_TOO_DEEP,
                format!("maximum expression nesting depth is {MAX_EXPR_DEPTH}"),
            );
            self.expr_depth -= 1;
            return None;
        }
        let result = self.parse_assignment_inner();
        self.expr_depth -= 1;
        result
    }

    fn parse_assignment_inner(&mut self) -> Option<Expr> {
        if let Some(is_async) = self.at_arrow_function() {
            return self.parse_arrow(is_async);
        }
        let start = self.current_span();
        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Mod,
            TokenKind::StarStarEq => AssignOp::Exp,
            TokenKind::AmpAmpEq => AssignOp::And,
            TokenKind::PipePipeEq => AssignOp::Or,
            TokenKind::QuestionQuestionEq => AssignOp::Nullish,
            _ => return Some(target),
        };
        let valid = match &target.unparen().kind {
            ExprKind::Ident(_) | ExprKind::Member { optional: false, .. } => true,
            ExprKind::Index { optional: false, .. } => true,
            ExprKind::Array(_) | ExprKind::Object(_) => op == AssignOp::Assign,
            _ => false,
        };
        if !valid {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                "invalid assignment target",
                target.span,
            );
            return None;
        }
        self.advance(); // eat operator
        let value = self.parse_assignment()?;
        Some(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            self.span_from(start),
        ))
    }

    // ── Arrow functions ───────────────────────────────────────────────────────

    /// `Some(is_async)` when the cursor starts an arrow function.
    fn at_arrow_function(&self) -> Option<bool> {
        let (offset, is_async) = match self.peek_kind() {
            TokenKind::Identifier(name)
                if name == "async"
                    && !self.newline_before_ahead(1)
                    && matches!(
                        self.look_ahead(1),
                        TokenKind::Identifier(_) | TokenKind::LParen
                    ) =>
            {
                (1, true)
            }
            _ => (0, false),
        };
        match self.look_ahead(offset) {
            TokenKind::Identifier(_) => {
                (self.look_ahead(offset + 1) == &TokenKind::Arrow).then_some(is_async)
            }
            TokenKind::LParen => {
                let past = self.past_matching(offset)?;
                (self.look_ahead(offset + past) == &TokenKind::Arrow
                    && !self.newline_before_ahead(offset + past))
                .then_some(is_async)
            }
            _ => None,
        }
    }

    fn parse_arrow(&mut self, is_async: bool) -> Option<Expr> {
        let start = self.current_span();
        if is_async {
            self.advance(); // eat `async`
        }
        let (params, params_span) = if self.check(&TokenKind::LParen) {
            self.parse_params()?
        } else {
            let id = self.expect_identifier()?;
            let span = id.span;
            let param = Param {
                target: Pattern::Ident(id),
                default: None,
                rest: false,
                span,
            };
            (vec![param], span)
        };
        self.expect(&TokenKind::Arrow)?;

        self.function_depth += 1;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let body = if self.check(&TokenKind::LBrace) {
            self.parse_block().map(FunctionBody::Block)
        } else {
            self.parse_assignment().map(|e| FunctionBody::Expr(Box::new(e)))
        };
        self.no_in = saved_no_in;
        self.function_depth -= 1;
        let body = body?;

        let span = self.span_from(start);
        let function = Function {
            name: None,
            params,
            body,
            is_async,
            is_arrow: true,
            params_span,
            span,
        };
        Some(Expr::new(ExprKind::Function(Box::new(function)), span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Conditional = LogicalOr [ "?" Assignment ":" Assignment ]`
    fn parse_conditional(&mut self) -> Option<Expr> {
        let test = self.parse_logical_or()?;
        if !self.eat(&TokenKind::Question) {
            return Some(test);
        }
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let consequent = self.parse_assignment();
        self.no_in = saved_no_in;
        let consequent = consequent?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        let span = test.span.merge(alternate.span);
        Some(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// `LogicalOr = LogicalAnd { ("||" | "??") LogicalAnd }`
    fn parse_logical_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_logical_and()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::PipePipe => LogicalOp::Or,
                TokenKind::QuestionQuestion => LogicalOp::Nullish,
                _ => break,
            };
            self.advance();
            let right = self.parse_logical_and()?;
            left = logical(op, left, right);
        }
        Some(left)
    }

    /// `LogicalAnd = BitOr { "&&" BitOr }`
    fn parse_logical_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_binary(0)?;
        while self.eat(&TokenKind::AmpAmp) {
            let right = self.parse_binary(0)?;
            left = logical(LogicalOp::And, left, right);
        }
        Some(left)
    }

    /// Left-associative binary levels from `|` down to `%`.
    ///
    /// `level` indexes [`BINARY_LEVELS`]; the level past the end is
    /// exponentiation.
    fn parse_binary(&mut self, level: usize) -> Option<Expr> {
        if level == BINARY_LEVELS {
            return self.parse_exponent();
        }
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.binary_op_at(level) {
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = binary(op, left, right);
        }
        Some(left)
    }

    fn binary_op_at(&self, level: usize) -> Option<BinaryOp> {
        let op = match (level, self.peek_kind()) {
            (0, TokenKind::Pipe) => BinaryOp::BitOr,
            (1, TokenKind::Caret) => BinaryOp::BitXor,
            (2, TokenKind::Amp) => BinaryOp::BitAnd,
            (3, TokenKind::EqEq) => BinaryOp::Eq,
            (3, TokenKind::BangEq) => BinaryOp::NotEq,
            (3, TokenKind::EqEqEq) => BinaryOp::StrictEq,
            (3, TokenKind::BangEqEq) => BinaryOp::StrictNotEq,
            (4, TokenKind::Lt) => BinaryOp::Lt,
            (4, TokenKind::LtEq) => BinaryOp::LtEq,
            (4, TokenKind::Gt) => BinaryOp::Gt,
            (4, TokenKind::GtEq) => BinaryOp::GtEq,
            (4, TokenKind::Instanceof) => BinaryOp::InstanceOf,
            (4, TokenKind::In) if !self.no_in => BinaryOp::In,
            (5, TokenKind::Shl) => BinaryOp::Shl,
            (5, TokenKind::Shr) => BinaryOp::Shr,
            (5, TokenKind::UShr) => BinaryOp::UShr,
            (6, TokenKind::Plus) => BinaryOp::Add,
            (6, TokenKind::Minus) => BinaryOp::Sub,
            (7, TokenKind::Star) => BinaryOp::Mul,
            (7, TokenKind::Slash) => BinaryOp::Div,
            (7, TokenKind::Percent) => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// `Exponent = Unary [ "**" Exponent ]`
    fn parse_exponent(&mut self) -> Option<Expr> {
        let base = self.parse_unary()?;
        if !self.eat(&TokenKind::StarStar) {
            return Some(base);
        }
        if matches!(base.kind, ExprKind::Unary { .. }) {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                "unary operand of '**' must be parenthesized",
                base.span,
            );
            return None;
        }
        let exponent = self.parse_exponent()?;
        Some(binary(BinaryOp::Exp, base, exponent))
    }

    /// `Unary = ( "-" | "+" | "!" | "~" | "typeof" | "void" | "delete" ) Unary
    ///        | ( "++" | "--" ) Unary | "await" Unary | Postfix`
    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Some(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                self.span_from(start),
            ));
        }
        if matches!(self.peek_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.advance().kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let target = self.parse_unary()?;
            self.check_update_target(&target)?;
            return Some(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                self.span_from(start),
            ));
        }
        if self.check_ident("await")
            && !self.newline_before_ahead(1)
            && starts_expression(self.look_ahead(1))
        {
            self.advance();
            let operand = self.parse_unary()?;
            return Some(Expr::new(
                ExprKind::Await(Box::new(operand)),
                self.span_from(start),
            ));
        }
        self.parse_postfix()
    }

    /// `Postfix = LeftHandSide [ "++" | "--" ]` (no line break before the operator).
    fn parse_postfix(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let expr = self.parse_left_hand_side()?;
        let op = match self.peek_kind() {
            TokenKind::PlusPlus if !self.peek().newline_before => UpdateOp::Increment,
            TokenKind::MinusMinus if !self.peek().newline_before => UpdateOp::Decrement,
            _ => return Some(expr),
        };
        self.check_update_target(&expr)?;
        self.advance();
        Some(Expr::new(
            ExprKind::Update {
                op,
                prefix: false,
                target: Box::new(expr),
            },
            self.span_from(start),
        ))
    }

    fn check_update_target(&mut self, target: &Expr) -> Option<()> {
        match &target.unparen().kind {
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => Some(()),
            _ => {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "invalid increment/decrement target",
                    target.span,
                );
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Calls & Member Access
    // ══════════════════════════════════════════════════════════════════════════

    /// `LeftHandSide = ( "new" NewTarget [ Args ] | Primary ) { Access | Args }`
    fn parse_left_hand_side(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_property_name()?;
                    expr = member(expr, name.name, false, self.span_from(start));
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    match self.peek_kind() {
                        TokenKind::LParen => {
                            let args = self.parse_arguments()?;
                            expr = call(expr, args, true, self.span_from(start));
                        }
                        TokenKind::LBracket => {
                            let index = self.parse_index()?;
                            expr = index_expr(expr, index, true, self.span_from(start));
                        }
                        _ => {
                            let name = self.expect_property_name()?;
                            expr = member(expr, name.name, true, self.span_from(start));
                        }
                    }
                }
                TokenKind::LBracket => {
                    let index = self.parse_index()?;
                    expr = index_expr(expr, index, false, self.span_from(start));
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = call(expr, args, false, self.span_from(start));
                }
                TokenKind::TemplateStart => {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "tagged templates are not supported",
                    );
                    return None;
                }
                _ => break,
            }
        }
        Some(expr)
    }

    /// `new Callee(args)`; the callee is a member chain without calls.
    fn parse_new(&mut self) -> Option<Expr> {
        let start = self.current_span();
        self.advance(); // eat `new`
        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_property_name()?;
                    callee = member(callee, name.name, false, self.span_from(start));
                }
                TokenKind::LBracket => {
                    let index = self.parse_index()?;
                    callee = index_expr(callee, index, false, self.span_from(start));
                }
                _ => break,
            }
        }
        let args = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Some(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            self.span_from(start),
        ))
    }

    fn parse_index(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LBracket)?;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let index = self.parse_expression();
        self.no_in = saved_no_in;
        let index = index?;
        self.expect(&TokenKind::RBracket)?;
        Some(index)
    }

    /// `Args = "(" [ ["..."] Assignment { "," ["..."] Assignment } [","] ] ")"`
    pub(crate) fn parse_arguments(&mut self) -> Option<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let args = self.parse_element_list(&TokenKind::RParen, false);
        self.no_in = saved_no_in;
        let args = args?;
        self.expect(&TokenKind::RParen)?;
        Some(args)
    }

    /// Comma-separated assignment expressions (spread allowed) up to `close`.
    /// With `holes`, empty slots (`[a, , b]`) become `undefined`.
    fn parse_element_list(&mut self, close: &TokenKind, holes: bool) -> Option<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) && !self.at_end() {
            if holes && self.check(&TokenKind::Comma) {
                let span = self.advance().span;
                items.push(Expr::new(ExprKind::Ident("undefined".into()), span));
                continue;
            }
            items.push(self.parse_spread_or_assignment()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(items)
    }

    fn parse_spread_or_assignment(&mut self) -> Option<Expr> {
        let start = self.current_span();
        if self.eat(&TokenKind::Ellipsis) {
            let inner = self.parse_assignment()?;
            return Some(Expr::new(
                ExprKind::Spread(Box::new(inner)),
                self.span_from(start),
            ));
        }
        self.parse_assignment()
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a primary expression.
    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            // ── Literals ────────────────────────────────────────────────
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::String(s) => {
                self.advance();
                ExprKind::String(s)
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                ExprKind::Regex { pattern, flags }
            }
            TokenKind::TemplateStart => ExprKind::Template(self.parse_template()?),
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::This => {
                self.advance();
                ExprKind::This
            }
            TokenKind::Super => {
                self.advance();
                ExprKind::Ident("super".into())
            }

            // ── Collections ─────────────────────────────────────────────
            TokenKind::LBracket => {
                self.advance();
                let saved_no_in = std::mem::replace(&mut self.no_in, false);
                let items = self.parse_element_list(&TokenKind::RBracket, true);
                self.no_in = saved_no_in;
                let items = items?;
                self.expect(&TokenKind::RBracket)?;
                ExprKind::Array(items)
            }
            TokenKind::LBrace => ExprKind::Object(self.parse_object_literal()?),

            // ── Grouping ────────────────────────────────────────────────
            TokenKind::LParen => {
                self.advance();
                let saved_no_in = std::mem::replace(&mut self.no_in, false);
                let inner = self.parse_expression();
                self.no_in = saved_no_in;
                let inner = inner?;
                self.expect(&TokenKind::RParen)?;
                ExprKind::Paren(Box::new(inner))
            }

            // ── Functions ───────────────────────────────────────────────
            TokenKind::Function => ExprKind::Function(Box::new(self.parse_function(false, false)?)),
            TokenKind::Identifier(name)
                if name == "async"
                    && self.look_ahead(1) == &TokenKind::Function
                    && !self.newline_before_ahead(1) =>
            {
                self.advance();
                ExprKind::Function(Box::new(self.parse_function(true, false)?))
            }

            TokenKind::Identifier(name) => {
                self.advance();
                ExprKind::Ident(name)
            }

            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected expression, got '{}'", self.peek_kind()),
                );
                return None;
            }
        };
        Some(Expr::new(kind, self.span_from(start)))
    }

    /// `` `chunk ${expr} chunk` `` → quasis interleaved with expressions.
    fn parse_template(&mut self) -> Option<Template> {
        self.expect(&TokenKind::TemplateStart)?;
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut pending = String::new();
        loop {
            match self.peek_kind().clone() {
                TokenKind::TemplateChunk(text) => {
                    self.advance();
                    pending.push_str(&text);
                }
                TokenKind::InterpolationStart => {
                    self.advance();
                    quasis.push(std::mem::take(&mut pending));
                    let saved_no_in = std::mem::replace(&mut self.no_in, false);
                    let expr = self.parse_expression();
                    self.no_in = saved_no_in;
                    exprs.push(expr?);
                    self.expect(&TokenKind::InterpolationEnd)?;
                }
                TokenKind::TemplateEnd => {
                    self.advance();
                    quasis.push(pending);
                    return Some(Template { quasis, exprs });
                }
                _ => {
                    self.error_at_current(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated template literal",
                    );
                    return None;
                }
            }
        }
    }

    /// `{ a, b: 1, [k]: v, ...rest, method() {} }`
    fn parse_object_literal(&mut self) -> Option<Vec<ObjectProp>> {
        self.expect(&TokenKind::LBrace)?;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let props = self.parse_object_props();
        self.no_in = saved_no_in;
        let props = props?;
        self.expect(&TokenKind::RBrace)?;
        Some(props)
    }

    fn parse_object_props(&mut self) -> Option<Vec<ObjectProp>> {
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let start = self.current_span();
            if self.eat(&TokenKind::Ellipsis) {
                props.push(ObjectProp::Spread(self.parse_assignment()?));
            } else {
                props.push(self.parse_object_property(start)?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(props)
    }

    fn parse_object_property(&mut self, start: Span) -> Option<ObjectProp> {
        // `async name() {}`
        let is_async = self.check_ident("async")
            && !matches!(
                self.look_ahead(1),
                TokenKind::Colon | TokenKind::Comma | TokenKind::LParen | TokenKind::RBrace
            );
        if is_async {
            self.advance();
        }
        let key_span = self.current_span();
        let key = self.parse_property_key()?;

        if self.check(&TokenKind::LParen) {
            let function = self.parse_method_body(&key, key_span, is_async)?;
            let value = Expr::new(ExprKind::Function(Box::new(function)), self.span_from(key_span));
            return Some(ObjectProp::Property {
                key,
                value,
                shorthand: false,
                span: self.span_from(start),
            });
        }
        if is_async {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "expected '(' after async method name");
            return None;
        }
        if self.eat(&TokenKind::Colon) {
            let value = self.parse_assignment()?;
            return Some(ObjectProp::Property {
                key,
                value,
                shorthand: false,
                span: self.span_from(start),
            });
        }
        // Shorthand `{ a }`.
        match &key {
            PropKey::Named(name) if is_identifier_name(name) => {
                let value = Expr::new(ExprKind::Ident(name.clone()), key_span);
                Some(ObjectProp::Property {
                    key,
                    value,
                    shorthand: true,
                    span: self.span_from(start),
                })
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected ':', got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// A property key: name, keyword, string, number or `[computed]`.
    pub(crate) fn parse_property_key(&mut self) -> Option<PropKey> {
        match self.peek_kind().clone() {
            TokenKind::String(s) => {
                self.advance();
                Some(PropKey::Named(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                Some(PropKey::Named(format_number_key(n)))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.parse_assignment()?;
                self.expect(&TokenKind::RBracket)?;
                Some(PropKey::Computed(expr))
            }
            _ => self.expect_property_name().map(|id| PropKey::Named(id.name)),
        }
    }

    /// Parameters and body of a shorthand method, starting at `(`.
    fn parse_method_body(&mut self, key: &PropKey, key_span: Span, is_async: bool) -> Option<Function> {
        let (params, params_span) = self.parse_params()?;
        let body = self.parse_function_body()?;
        let name = key.as_named().map(|n| Ident::new(n, key_span));
        Some(Function {
            name,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_arrow: false,
            params_span,
            span: self.span_from(key_span),
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Node helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Number of left-associative levels handled by `parse_binary`.
const BINARY_LEVELS: usize = 8;

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn member(object: Expr, property: String, optional: bool, span: Span) -> Expr {
    Expr::new(
        ExprKind::Member {
            object: Box::new(object),
            property,
            optional,
        },
        span,
    )
}

fn index_expr(object: Expr, index: Expr, optional: bool, span: Span) -> Expr {
    Expr::new(
        ExprKind::Index {
            object: Box::new(object),
            index: Box::new(index),
            optional,
        },
        span,
    )
}

fn call(callee: Expr, args: Vec<Expr>, optional: bool, span: Span) -> Expr {
    Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
            optional,
        },
        span,
    )
}

/// `true` if a token can begin an expression (used to read `await x`).
fn starts_expression(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Regex { .. }
            | TokenKind::TemplateStart
            | TokenKind::Identifier(_)
            | TokenKind::This
            | TokenKind::Super
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::False
            | TokenKind::New
            | TokenKind::Function
            | TokenKind::Typeof
            | TokenKind::Void
            | TokenKind::Delete
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus
    )
}

fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Canonical key text for a numeric property name (`{ 1: x }` → `"1"`).
fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
