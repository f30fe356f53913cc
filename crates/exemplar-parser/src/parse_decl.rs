//! Declaration parsing: functions, parameters, binding patterns, classes,
//! imports and exports.

use exemplar_lexer::token::TokenKind;
use exemplar_types::ast::*;
use exemplar_types::ErrorCode;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════════

    /// `function [name] (params) { body }` with the cursor on `function`.
    ///
    /// For async functions the caller has already consumed `async`, and the
    /// span starts at that token.
    pub(crate) fn parse_function(&mut self, is_async: bool, is_declaration: bool) -> Option<Function> {
        let start = if is_async {
            self.previous_span()
        } else {
            self.current_span()
        };
        self.expect(&TokenKind::Function)?;
        if self.check(&TokenKind::Star) {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "generator functions are not supported");
            return None;
        }
        let name = match self.peek_kind() {
            TokenKind::Identifier(_) => self.expect_identifier(),
            _ if is_declaration => {
                self.error_at_current(
                    ErrorCode::MALFORMED_DECLARATION,
                    format!("expected function name, got '{}'", self.peek_kind()),
                );
                return None;
            }
            _ => None,
        };
        let (params, params_span) = self.parse_params()?;
        let body = self.parse_function_body()?;
        Some(Function {
            name,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_arrow: false,
            params_span,
            span: self.span_from(start),
        })
    }

    /// A function body block, with `return` permitted inside.
    pub(crate) fn parse_function_body(&mut self) -> Option<Block> {
        self.function_depth += 1;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let body = self.parse_block();
        self.no_in = saved_no_in;
        self.function_depth -= 1;
        body
    }

    /// `"(" [ Param { "," Param } [","] ] ")"`; returns the list and the span
    /// of the parenthesized list.
    pub(crate) fn parse_params(&mut self) -> Option<(Vec<Param>, exemplar_types::Span)> {
        let start = self.current_span();
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_end() {
            let param_start = self.current_span();
            let rest = self.eat(&TokenKind::Ellipsis);
            let target = self.parse_binding_pattern()?;
            let default = if !rest && self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                target,
                default,
                rest,
                span: self.span_from(param_start),
            });
            if rest && !self.check(&TokenKind::RParen) {
                self.error_at_current(
                    ErrorCode::INVALID_PARAMETER,
                    "a rest parameter must be last in a parameter list",
                );
                return None;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some((params, self.span_from(start)))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Binding Patterns
    // ══════════════════════════════════════════════════════════════════════════

    /// `Pattern = Identifier | ObjectPattern | ArrayPattern`
    pub(crate) fn parse_binding_pattern(&mut self) -> Option<Pattern> {
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_object_pattern(),
            TokenKind::LBracket => self.parse_array_pattern(),
            _ => self.expect_identifier().map(Pattern::Ident),
        }
    }

    /// `{ a, b: c, d = 1, ...rest }`
    fn parse_object_pattern(&mut self) -> Option<Pattern> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.eat(&TokenKind::Ellipsis) {
                rest = Some(self.expect_identifier()?);
                break;
            }
            let prop_start = self.current_span();
            let key = self.expect_property_name()?;
            let value = if self.eat(&TokenKind::Colon) {
                self.parse_binding_pattern()?
            } else if key.name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
                && TokenKind::keyword(&key.name).is_none()
            {
                Pattern::Ident(key.clone())
            } else {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("'{}' cannot be used as a binding name", key.name),
                    key.span,
                );
                return None;
            };
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            props.push(ObjectPatternProp {
                key: key.name,
                value,
                default,
                span: self.span_from(prop_start),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(Pattern::Object {
            props,
            rest,
            span: self.span_from(start),
        })
    }

    /// `[a, , b = 1, ...rest]`
    fn parse_array_pattern(&mut self) -> Option<Pattern> {
        let start = self.current_span();
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        let mut rest = None;
        while !self.check(&TokenKind::RBracket) && !self.at_end() {
            if self.eat(&TokenKind::Comma) {
                elements.push(None);
                continue;
            }
            if self.eat(&TokenKind::Ellipsis) {
                rest = Some(Box::new(self.parse_binding_pattern()?));
                break;
            }
            let target = self.parse_binding_pattern()?;
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            elements.push(Some(PatternElem { target, default }));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Some(Pattern::Array {
            elements,
            rest,
            span: self.span_from(start),
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Classes
    // ══════════════════════════════════════════════════════════════════════════

    /// `class Name [extends Base] { members }`
    pub(crate) fn parse_class(&mut self) -> Option<ClassDecl> {
        let start = self.current_span();
        self.expect(&TokenKind::Class)?;
        let name = self.expect_identifier()?;
        let superclass = if self.eat(&TokenKind::Extends) {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            match self.parse_class_member() {
                Some(member) => members.push(member),
                None => return None,
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(ClassDecl {
            name,
            superclass,
            members,
            span: self.span_from(start),
        })
    }

    fn parse_class_member(&mut self) -> Option<ClassMember> {
        let start = self.current_span();
        let is_static = self.check_ident("static") && !self.member_name_ends_here(1);
        if is_static {
            self.advance();
        }
        let is_async = self.check_ident("async") && !self.member_name_ends_here(1);
        if is_async {
            self.advance();
        }
        let accessor = if (self.check_ident("get") || self.check_ident("set"))
            && !self.member_name_ends_here(1)
        {
            let word = self.advance().kind;
            Some(word == TokenKind::Identifier("get".into()))
        } else {
            None
        };

        let key_span = self.current_span();
        let key = match self.parse_property_key()? {
            PropKey::Named(name) => name,
            PropKey::Computed(_) => {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    "computed class member names are not supported",
                    key_span,
                );
                return None;
            }
        };

        if self.check(&TokenKind::LParen) {
            let (params, params_span) = self.parse_params()?;
            let body = self.parse_function_body()?;
            let function = Function {
                name: Some(Ident::new(key.clone(), key_span)),
                params,
                body: FunctionBody::Block(body),
                is_async,
                is_arrow: false,
                params_span,
                span: self.span_from(key_span),
            };
            let kind = match accessor {
                Some(true) => ClassMemberKind::Getter(function),
                Some(false) => ClassMemberKind::Setter(function),
                None if key == "constructor" && !is_static => ClassMemberKind::Constructor(function),
                None => ClassMemberKind::Method(function),
            };
            return Some(ClassMember {
                key,
                kind,
                is_static,
                span: self.span_from(start),
            });
        }

        // Field: `name = value;` or `name;`
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.consume_semicolon();
        Some(ClassMember {
            key,
            kind: ClassMemberKind::Field(init),
            is_static,
            span: self.span_from(start),
        })
    }

    /// `true` if the token `n` ahead ends a member name, so the current
    /// contextual word (`static`, `get`, ...) is itself the name.
    fn member_name_ends_here(&self, n: usize) -> bool {
        matches!(
            self.look_ahead(n),
            TokenKind::LParen | TokenKind::Eq | TokenKind::Semicolon | TokenKind::RBrace
        ) || self.newline_before_ahead(n)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Modules
    // ══════════════════════════════════════════════════════════════════════════

    /// `import x, { a as b } from 'm'`, `import * as ns from 'm'`, `import 'm'`
    pub(crate) fn parse_import(&mut self) -> Option<ImportDecl> {
        self.expect(&TokenKind::Import)?;
        let mut decl = ImportDecl {
            default: None,
            namespace: None,
            named: Vec::new(),
            source: String::new(),
        };
        if let TokenKind::String(source) = self.peek_kind().clone() {
            self.advance();
            decl.source = source;
            self.consume_semicolon();
            return Some(decl);
        }
        if matches!(self.peek_kind(), TokenKind::Identifier(_)) {
            decl.default = self.expect_identifier();
            if !self.eat(&TokenKind::Comma) {
                return self.finish_import(decl);
            }
        }
        if self.eat(&TokenKind::Star) {
            if !self.eat_ident("as") {
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "expected 'as' after '*'");
                return None;
            }
            decl.namespace = self.expect_identifier();
        } else {
            decl.named = self.parse_specifiers()?;
        }
        self.finish_import(decl)
    }

    fn finish_import(&mut self, mut decl: ImportDecl) -> Option<ImportDecl> {
        if !self.eat_ident("from") {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected 'from', got '{}'", self.peek_kind()),
            );
            return None;
        }
        decl.source = self.expect_string_literal()?;
        self.consume_semicolon();
        Some(decl)
    }

    /// `{ a, b as c }` → `[(a, a), (b, c)]`
    fn parse_specifiers(&mut self) -> Option<Vec<(Ident, Ident)>> {
        self.expect(&TokenKind::LBrace)?;
        let mut specifiers = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let imported = self.expect_property_name()?;
            let local = if self.eat_ident("as") {
                self.expect_property_name()?
            } else {
                imported.clone()
            };
            specifiers.push((imported, local));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Some(specifiers)
    }

    /// `export <declaration>`, `export default expr`, `export { a, b as c }`
    pub(crate) fn parse_export(&mut self) -> Option<ExportDecl> {
        self.expect(&TokenKind::Export)?;
        if self.eat(&TokenKind::Default) {
            let expr = self.parse_assignment()?;
            self.consume_semicolon();
            return Some(ExportDecl::Default(expr));
        }
        if self.check(&TokenKind::LBrace) {
            let names = self.parse_specifiers()?;
            if self.eat_ident("from") {
                self.expect_string_literal()?;
            }
            self.consume_semicolon();
            return Some(ExportDecl::Named(names));
        }
        let is_declaration = matches!(
            self.peek_kind(),
            TokenKind::Function | TokenKind::Class | TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) || (self.check_ident("async") && self.look_ahead(1) == &TokenKind::Function);
        if !is_declaration {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected a declaration after 'export', got '{}'", self.peek_kind()),
            );
            return None;
        }
        let stmt = self.parse_statement()?;
        Some(ExportDecl::Decl(Box::new(stmt)))
    }
}
