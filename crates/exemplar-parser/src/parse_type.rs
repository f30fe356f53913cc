//! Statically-annotated dialect: type annotations and declaration signatures.
//!
//! Only what the annotation inference path needs is parsed into an AST:
//! interfaces, type aliases, and top-level function signatures. Everything
//! else is scanned token by token so annotations inside bodies (`let x: T`,
//! `expr as T`, typed nested functions) can be recorded as erasures.

use exemplar_lexer::token::TokenKind;
use exemplar_types::annotation::*;
use exemplar_types::ast::Ident;
use exemplar_types::{ErrorCode, Span};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Module Scan
    // ══════════════════════════════════════════════════════════════════════════

    /// Scan a whole annotated module.
    pub(crate) fn parse_annotated_module(&mut self) -> AnnotatedModule {
        let mut module = AnnotatedModule::default();
        let mut depth = 0usize;
        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            let before = self.current_span().start;
            self.scan_annotated_token(&mut module, &mut depth);
            // Every branch must make progress.
            if !self.at_end() && self.current_span().start == before {
                self.advance();
            }
        }
        module
    }

    fn scan_annotated_token(&mut self, module: &mut AnnotatedModule, depth: &mut usize) {
        let statement_start = self.at_statement_start();
        match self.peek_kind().clone() {
            TokenKind::LBrace | TokenKind::InterpolationStart => {
                *depth += 1;
                self.advance();
            }
            TokenKind::RBrace | TokenKind::InterpolationEnd => {
                *depth = depth.saturating_sub(1);
                self.advance();
            }
            TokenKind::Import if *depth == 0 && statement_start => self.skip_import(),
            TokenKind::Export if *depth == 0 => {
                self.advance();
                if self.check(&TokenKind::LBrace) {
                    self.skip_balanced();
                } else {
                    self.scan_declaration(module, *depth, true);
                }
            }
            TokenKind::Identifier(name)
                if statement_start && (name == "interface" || name == "type" || name == "declare") =>
            {
                self.scan_declaration(module, *depth, false);
            }
            TokenKind::Function => self.scan_declaration(module, *depth, false),
            TokenKind::Identifier(name)
                if name == "async" && self.look_ahead(1) == &TokenKind::Function =>
            {
                self.scan_declaration(module, *depth, false);
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => self.scan_variable(module),
            TokenKind::Identifier(name) if name == "as" => self.scan_assertion(module),
            TokenKind::LParen => self.scan_arrow_params(module),
            TokenKind::Identifier(_) if *depth > 0 && statement_start => self.scan_method(module),
            _ => {
                self.advance();
            }
        }
    }

    /// `true` if the current token begins a statement.
    fn at_statement_start(&self) -> bool {
        match self.previous_kind() {
            None => true,
            Some(TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace) => true,
            Some(_) => self.peek().newline_before,
        }
    }

    /// Declarations that may follow `export` or start a statement.
    fn scan_declaration(&mut self, module: &mut AnnotatedModule, depth: usize, exported: bool) {
        let start = if exported {
            self.previous_span()
        } else {
            self.current_span()
        };
        if self.eat_ident("declare") {
            // Ambient declarations have no runtime text at all.
            self.skip_statement();
            module.erasures.push(self.span_from(start));
            return;
        }
        match self.peek_kind().clone() {
            TokenKind::Identifier(name)
                if name == "interface" && matches!(self.look_ahead(1), TokenKind::Identifier(_)) =>
            {
                if let Some(decl) = self.parse_interface(start) {
                    module.interfaces.push(decl);
                }
            }
            TokenKind::Identifier(name)
                if name == "type"
                    && matches!(self.look_ahead(1), TokenKind::Identifier(_))
                    && matches!(self.look_ahead(2), TokenKind::Eq | TokenKind::Lt) =>
            {
                if let Some(decl) = self.parse_type_alias(start) {
                    module.aliases.push(decl);
                }
            }
            TokenKind::Function => self.scan_function(module, depth, exported, false, start),
            TokenKind::Identifier(name) if name == "async" && self.look_ahead(1) == &TokenKind::Function => {
                self.advance();
                self.scan_function(module, depth, exported, true, start);
            }
            _ => {}
        }
    }

    fn scan_function(
        &mut self,
        module: &mut AnnotatedModule,
        depth: usize,
        exported: bool,
        is_async: bool,
        start: Span,
    ) {
        let save = self.save();
        match self.parse_annotated_function(exported, is_async, start) {
            Some(Signature::Declaration(function)) if depth == 0 && !function.name.name.is_empty() => {
                module.functions.push(function)
            }
            Some(Signature::Declaration(function)) => {
                module.erasures.extend(function_erasures(&function));
            }
            Some(Signature::Overload(span)) => module.erasures.push(span),
            None => {
                // Not a signature we understand; keep scanning plain tokens.
                self.restore(save);
                self.advance();
            }
        }
    }

    /// `let x: T = ...`, `const { a }: T = ...`
    fn scan_variable(&mut self, module: &mut AnnotatedModule) {
        self.advance(); // eat keyword
        loop {
            match self.peek_kind() {
                TokenKind::Identifier(_) => {
                    self.advance();
                }
                TokenKind::LBrace | TokenKind::LBracket => match self.past_matching(0) {
                    Some(n) => {
                        for _ in 0..n {
                            self.advance();
                        }
                    }
                    None => return,
                },
                _ => return,
            }
            if self.check(&TokenKind::Colon) {
                if let Some(span) = self.annotation_after_colon() {
                    module.erasures.push(span);
                }
            }
            // Only a bare declarator list continues after a comma.
            if self.look_ahead(0) == &TokenKind::Comma
                && matches!(self.look_ahead(1), TokenKind::Identifier(_))
                && matches!(self.look_ahead(2), TokenKind::Colon)
            {
                self.advance();
                continue;
            }
            return;
        }
    }

    /// `expr as T` / `expr as const`
    fn scan_assertion(&mut self, module: &mut AnnotatedModule) {
        let ends_value = self.previous_kind().is_some_and(|k| k.ends_value());
        if !ends_value || self.peek().newline_before {
            self.advance();
            return;
        }
        let start = self.current_span();
        let save = self.save();
        self.advance(); // eat `as`
        let ok = if self.check(&TokenKind::Const) {
            self.advance();
            true
        } else {
            self.parse_type_annotation().is_some()
        };
        if ok {
            module.erasures.push(self.span_from(start));
        } else {
            self.restore(save);
            self.advance();
        }
    }

    /// `(a: T, b?: U): R => ...` inside bodies.
    fn scan_arrow_params(&mut self, module: &mut AnnotatedModule) {
        let Some(past) = self.past_matching(0) else {
            self.advance();
            return;
        };
        match self.look_ahead(past) {
            TokenKind::Arrow => {
                let save = self.save();
                match self.parse_annotated_params() {
                    Some(params) => module.erasures.extend(param_erasures(&params)),
                    None => {
                        self.restore(save);
                        self.advance();
                    }
                }
            }
            TokenKind::Colon => {
                let save = self.save();
                let params = self.parse_annotated_params();
                let returns = params.as_ref().and_then(|_| self.annotation_after_colon());
                match (params, returns) {
                    (Some(params), Some(span)) if self.check(&TokenKind::Arrow) => {
                        module.erasures.extend(param_erasures(&params));
                        module.erasures.push(span);
                    }
                    _ => {
                        self.restore(save);
                        self.advance();
                    }
                }
            }
            _ => {
                self.advance();
            }
        }
    }

    /// Class methods: `name(a: T): R {` at the start of a member.
    fn scan_method(&mut self, module: &mut AnnotatedModule) {
        if self.look_ahead(1) != &TokenKind::LParen {
            self.advance();
            return;
        }
        let Some(past) = self.past_matching(1) else {
            self.advance();
            return;
        };
        if !matches!(self.look_ahead(1 + past), TokenKind::LBrace | TokenKind::Colon) {
            self.advance();
            return;
        }
        let save = self.save();
        self.advance(); // eat name
        let Some(params) = self.parse_annotated_params() else {
            self.restore(save);
            self.advance();
            return;
        };
        let returns = if self.check(&TokenKind::Colon) {
            self.annotation_after_colon()
        } else {
            None
        };
        if self.check(&TokenKind::LBrace) {
            module.erasures.extend(param_erasures(&params));
            module.erasures.extend(returns);
        } else {
            self.restore(save);
            self.advance();
        }
    }

    /// With the cursor on `:`, parse the following annotation and return
    /// the span from the colon through its end.
    fn annotation_after_colon(&mut self) -> Option<Span> {
        let start = self.current_span();
        let save = self.save();
        self.advance(); // eat `:`
        match self.parse_type_annotation() {
            Some(_) => Some(self.span_from(start)),
            None => {
                self.restore(save);
                None
            }
        }
    }

    fn skip_import(&mut self) {
        self.advance(); // eat `import`
        while !self.at_end() {
            if let TokenKind::String(_) = self.peek_kind() {
                self.advance();
                self.eat(&TokenKind::Semicolon);
                return;
            }
            self.advance();
        }
    }

    fn skip_balanced(&mut self) {
        match self.past_matching(0) {
            Some(n) => {
                for _ in 0..n {
                    self.advance();
                }
            }
            None => {
                self.advance();
            }
        }
    }

    /// Skip to the end of the current statement, balancing brackets.
    fn skip_statement(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => {
                    self.skip_balanced();
                    if self.peek().newline_before {
                        return;
                    }
                }
                _ => {
                    self.advance();
                    if self.peek().newline_before {
                        return;
                    }
                }
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Declarations
    // ══════════════════════════════════════════════════════════════════════════

    /// `interface Name<T> extends A, B { members }`
    fn parse_interface(&mut self, start: Span) -> Option<InterfaceDecl> {
        self.advance(); // eat `interface`
        let name = self.expect_identifier()?;
        let type_params = self.parse_type_params()?.0;
        let mut extends = Vec::new();
        if self.eat(&TokenKind::Extends) {
            loop {
                extends.push(self.parse_type_postfix()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let members = self.parse_object_type_members()?;
        Some(InterfaceDecl {
            name,
            type_params,
            extends,
            members,
            span: self.span_from(start),
        })
    }

    /// `type Name<T> = annotation;`
    fn parse_type_alias(&mut self, start: Span) -> Option<TypeAliasDecl> {
        self.advance(); // eat `type`
        let name = self.expect_identifier()?;
        let type_params = self.parse_type_params()?.0;
        self.expect(&TokenKind::Eq)?;
        let annotation = self.parse_type_annotation()?;
        self.eat(&TokenKind::Semicolon);
        Some(TypeAliasDecl {
            name,
            type_params,
            annotation,
            span: self.span_from(start),
        })
    }

    /// `function name<T>(params): R { ... }` with the cursor on `function`.
    ///
    /// A signature without a body is an overload declaration and is reported
    /// as a span to erase.
    fn parse_annotated_function(&mut self, exported: bool, is_async: bool, start: Span) -> Option<Signature> {
        self.expect(&TokenKind::Function)?;
        let name = match self.peek_kind() {
            TokenKind::Identifier(_) => self.expect_identifier()?,
            // Anonymous function expression: nothing to record by name.
            _ => Ident::new("", self.current_span()),
        };
        let (type_params, type_params_span) = self.parse_type_params()?;
        let params = self.parse_annotated_params()?;
        let (returns, returns_span) = if self.check(&TokenKind::Colon) {
            let colon = self.advance().span;
            let annotation = self.parse_type_annotation()?;
            let span = self.span_from(colon);
            (Some(annotation), Some(span))
        } else {
            (None, None)
        };
        if !self.check(&TokenKind::LBrace) {
            self.eat(&TokenKind::Semicolon);
            return Some(Signature::Overload(self.span_from(start)));
        }
        let body_len = self.past_matching(0)?;
        let body_start = self.current_span();
        let body_end = self.token_end_ahead(body_len - 1);
        Some(Signature::Declaration(AnnotatedFunction {
            name,
            type_params,
            params,
            returns,
            is_async,
            exported,
            type_params_span,
            returns_span,
            body_span: Span::new(body_start.start, body_end, body_start.line, body_start.column),
            span: Span::new(start.start, body_end, start.line, start.column),
        }))
    }

    /// `<T, U extends V = W>`; returns the names and the span of the list.
    fn parse_type_params(&mut self) -> Option<(Vec<String>, Option<Span>)> {
        if !self.check(&TokenKind::Lt) {
            return Some((Vec::new(), None));
        }
        let start = self.advance().span;
        let mut names = Vec::new();
        while !self.check(&TokenKind::Gt) && !self.at_end() {
            names.push(self.expect_identifier()?.name);
            if self.eat(&TokenKind::Extends) {
                self.parse_type_annotation()?;
            }
            if self.eat(&TokenKind::Eq) {
                self.parse_type_annotation()?;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat_type_close() {
            self.expect(&TokenKind::Gt)?;
        }
        Some((names, Some(self.span_from(start))))
    }

    /// `(a: T, b?: U = d, ...rest: V[])`
    fn parse_annotated_params(&mut self) -> Option<Vec<AnnotatedParam>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_end() {
            let rest = self.eat(&TokenKind::Ellipsis);
            let start = self.current_span();
            let name = match self.peek_kind() {
                TokenKind::LBrace | TokenKind::LBracket => {
                    let n = self.past_matching(0)?;
                    for _ in 0..n {
                        self.advance();
                    }
                    let span = self.span_from(start);
                    self.source().source[span.start..span.end].to_string()
                }
                TokenKind::This => {
                    self.advance();
                    "this".to_string()
                }
                _ => self.expect_identifier()?.name,
            };
            let optional = self.eat(&TokenKind::Question);
            let annotation = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type_annotation()?)
            } else {
                None
            };
            let span = self.span_from(start);
            let default = if self.eat(&TokenKind::Eq) {
                let default_start = self.current_span();
                self.parse_assignment()?;
                Some(self.span_from(default_start))
            } else {
                None
            };
            params.push(AnnotatedParam {
                name,
                optional,
                rest,
                annotation,
                default,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some(params)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Type Annotations
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a type annotation.
    ///
    /// ```ebnf
    /// Type         = [ "|" ] Intersection { "|" Intersection } ;
    /// Intersection = [ "&" ] Postfix { "&" Postfix } ;
    /// Postfix      = Primary { "[" "]" } ;
    /// Primary      = Keyword | Literal | Reference [ "<" Type { "," Type } ">" ]
    ///              | "{" Members "}" | "[" Types "]" | "(" Type ")"
    ///              | "(" Params ")" "=>" Type | "typeof" Name | "keyof" Type ;
    /// ```
    pub(crate) fn parse_type_annotation(&mut self) -> Option<TypeAnnotation> {
        let start = self.current_span();
        self.eat(&TokenKind::Pipe);
        let first = self.parse_type_intersection()?;
        if !self.check(&TokenKind::Pipe) {
            return Some(first);
        }
        let mut members = vec![first];
        while self.eat(&TokenKind::Pipe) {
            members.push(self.parse_type_intersection()?);
        }
        Some(TypeAnnotation::new(
            AnnotationKind::Union(members),
            self.span_from(start),
        ))
    }

    fn parse_type_intersection(&mut self) -> Option<TypeAnnotation> {
        let start = self.current_span();
        self.eat(&TokenKind::Amp);
        let first = self.parse_type_postfix()?;
        if !self.check(&TokenKind::Amp) {
            return Some(first);
        }
        let mut members = vec![first];
        while self.eat(&TokenKind::Amp) {
            members.push(self.parse_type_postfix()?);
        }
        Some(TypeAnnotation::new(
            AnnotationKind::Intersection(members),
            self.span_from(start),
        ))
    }

    fn parse_type_postfix(&mut self) -> Option<TypeAnnotation> {
        let start = self.current_span();
        let mut ty = self.parse_type_primary()?;
        while self.check(&TokenKind::LBracket)
            && self.look_ahead(1) == &TokenKind::RBracket
            && !self.peek().newline_before
        {
            self.advance();
            self.advance();
            ty = TypeAnnotation::new(AnnotationKind::Array(Box::new(ty)), self.span_from(start));
        }
        Some(ty)
    }

    fn parse_type_primary(&mut self) -> Option<TypeAnnotation> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Null => {
                self.advance();
                AnnotationKind::Keyword(Keyword::Null)
            }
            TokenKind::Void => {
                self.advance();
                AnnotationKind::Keyword(Keyword::Void)
            }
            TokenKind::True | TokenKind::False => {
                let value = self.advance().kind == TokenKind::True;
                AnnotationKind::BoolLiteral(value)
            }
            TokenKind::String(s) => {
                self.advance();
                AnnotationKind::StringLiteral(s)
            }
            TokenKind::Number(n) => {
                self.advance();
                AnnotationKind::NumberLiteral(n)
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek_kind().clone() {
                    TokenKind::Number(n) => {
                        self.advance();
                        AnnotationKind::NumberLiteral(-n)
                    }
                    _ => {
                        self.error_at_current(ErrorCode::UNKNOWN_TYPE, "expected a number literal type");
                        return None;
                    }
                }
            }
            TokenKind::Typeof => {
                self.advance();
                let mut name = self.expect_identifier()?.name;
                while self.eat(&TokenKind::Dot) {
                    name.push('.');
                    name.push_str(&self.expect_property_name()?.name);
                }
                AnnotationKind::Typeof(name)
            }
            TokenKind::LBrace => AnnotationKind::Object(self.parse_object_type_members()?),
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) && !self.at_end() {
                    // Labeled element: `[x: number]`
                    if matches!(self.peek_kind(), TokenKind::Identifier(_))
                        && matches!(self.look_ahead(1), TokenKind::Colon | TokenKind::Question)
                    {
                        self.advance();
                        self.eat(&TokenKind::Question);
                        self.expect(&TokenKind::Colon)?;
                    }
                    self.eat(&TokenKind::Ellipsis);
                    items.push(self.parse_type_annotation()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                AnnotationKind::Tuple(items)
            }
            TokenKind::LParen => {
                let is_function = self
                    .past_matching(0)
                    .is_some_and(|n| self.look_ahead(n) == &TokenKind::Arrow);
                if is_function {
                    let params = self.parse_annotated_params()?;
                    self.expect(&TokenKind::Arrow)?;
                    let returns = self.parse_type_annotation()?;
                    AnnotationKind::Function {
                        params,
                        returns: Box::new(returns),
                    }
                } else {
                    self.advance();
                    let inner = self.parse_type_annotation()?;
                    self.expect(&TokenKind::RParen)?;
                    AnnotationKind::Paren(Box::new(inner))
                }
            }
            TokenKind::Identifier(name) if name == "keyof" => {
                self.advance();
                self.parse_type_postfix()?;
                AnnotationKind::Keyword(Keyword::String)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if let Some(keyword) = Keyword::from_name(&name) {
                    AnnotationKind::Keyword(keyword)
                } else {
                    let mut full = name;
                    while self.check(&TokenKind::Dot) {
                        self.advance();
                        full.push('.');
                        full.push_str(&self.expect_property_name()?.name);
                    }
                    let args = self.parse_type_args()?;
                    AnnotationKind::Reference { name: full, args }
                }
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNKNOWN_TYPE,
                    format!("expected a type, got '{}'", self.peek_kind()),
                );
                return None;
            }
        };
        Some(TypeAnnotation::new(kind, self.span_from(start)))
    }

    /// `<A, B>` after a reference name.
    fn parse_type_args(&mut self) -> Option<Vec<TypeAnnotation>> {
        if !self.check(&TokenKind::Lt) || self.peek().newline_before {
            return Some(Vec::new());
        }
        self.advance();
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type_annotation()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat_type_close() {
            self.expect(&TokenKind::Gt)?;
        }
        Some(args)
    }

    /// `{ a: A; b?: B, m(x: X): R; [key: string]: V }`
    ///
    /// Index signatures are parsed and dropped.
    fn parse_object_type_members(&mut self) -> Option<Vec<PropertySignature>> {
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let start = self.current_span();
            if self.check_ident("readonly") && !matches!(self.look_ahead(1), TokenKind::Colon | TokenKind::Question) {
                self.advance();
            }
            if self.check(&TokenKind::LBracket) {
                self.advance();
                self.expect_identifier()?;
                self.expect(&TokenKind::Colon)?;
                self.parse_type_annotation()?;
                self.expect(&TokenKind::RBracket)?;
                self.expect(&TokenKind::Colon)?;
                self.parse_type_annotation()?;
            } else {
                let name = match self.peek_kind().clone() {
                    TokenKind::String(s) => {
                        self.advance();
                        s
                    }
                    TokenKind::Number(n) => {
                        self.advance();
                        n.to_string()
                    }
                    _ => self.expect_property_name()?.name,
                };
                let optional = self.eat(&TokenKind::Question);
                let annotation = if self.check(&TokenKind::LParen) {
                    let params = self.parse_annotated_params()?;
                    self.expect(&TokenKind::Colon)?;
                    let returns = self.parse_type_annotation()?;
                    TypeAnnotation::new(
                        AnnotationKind::Function {
                            params,
                            returns: Box::new(returns),
                        },
                        self.span_from(start),
                    )
                } else {
                    self.expect(&TokenKind::Colon)?;
                    self.parse_type_annotation()?
                };
                members.push(PropertySignature {
                    name,
                    optional,
                    annotation,
                    span: self.span_from(start),
                });
            }
            if !self.eat(&TokenKind::Semicolon) && !self.eat(&TokenKind::Comma) && !self.check(&TokenKind::RBrace) {
                if !self.peek().newline_before {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("expected ';' or ',' between members, got '{}'", self.peek_kind()),
                    );
                    return None;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(members)
    }
}

/// What a `function` keyword introduced in the annotated dialect.
enum Signature {
    Declaration(AnnotatedFunction),
    /// A body-less overload signature.
    Overload(Span),
}

/// Annotation spans of a function that is not recorded as a declaration.
fn function_erasures(function: &AnnotatedFunction) -> Vec<Span> {
    let mut spans: Vec<Span> = function.type_params_span.into_iter().collect();
    spans.extend(param_erasures(&function.params));
    spans.extend(function.returns_span);
    spans
}

/// `?: T` / `: T` after each parameter name.
fn param_erasures(params: &[AnnotatedParam]) -> Vec<Span> {
    params
        .iter()
        .filter_map(|p| {
            let annotation = p.annotation.as_ref()?;
            let name_end = p.span.start + p.name.len();
            Some(Span::new(name_end, annotation.span.end, p.span.line, p.span.column))
        })
        .collect()
}
