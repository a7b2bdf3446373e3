//! Recursive descent parser producing [`SourceFile`].
//!
//! Parsing stops at the first error. Besides the syntax tree, the parser
//! computes the content hashes lowering stores: every consumed token is fed
//! to the innermost open hasher. A member opens its own hasher, so edits to
//! a nested member never change the hash of the member containing it. A
//! container body opens a hasher for its fields whose result is fed back to
//! the enclosing one.
//!
//! ```text
//! file      = body EOF
//! body      = (member | field ",")*
//! member    = ["pub"] ["export"] "const" IDENT [":" expr] "=" expr ";"
//!           | ["pub"] ["export"] "fn" IDENT "(" ")" ["!"] expr block
//!           | "test" [STRING] block
//!           | "comptime" block
//!           | ["pub"] "usingnamespace" expr ";"
//! field     = IDENT [":" expr]
//! block     = "{" (("return" [expr] | expr) ";")* "}"
//! expr      = postfix ("+" postfix)*
//! postfix   = primary ("(" ")")*
//! primary   = INT | STRING | IDENT | "&" IDENT | "*" ["const"] primary
//!           | "error" "." IDENT | BUILTIN "(" [expr ("," expr)* [","]] ")"
//!           | ("struct" | "union" | "enum" | "opaque") "{" body "}"
//!           | "(" expr ")"
//! ```

use crate::ast::{
    ContainerAst, Expr, ExprArena, ExprId, ExprKind, FieldAst, FuncAst, Member, MemberName,
    MemberValue, Stmt,
};
use crate::lexer::{lex, Token, TokenKind};
use kiln_ir::{ContainerKind, SourceHasher, Span, SyntaxTree};
use kiln_sema::ParseError;

/// A parsed file. Node 0 of `tree` spans the whole file and belongs to the
/// root container.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub root: ContainerAst,
    pub arena: ExprArena,
    pub tree: SyntaxTree,
}

pub fn parse(source: &str) -> Result<SourceFile, ParseError> {
    let tokens = lex(source).map_err(|e| {
        let found = source
            .get(e.offset as usize..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or('?');
        ParseError {
            message: format!("invalid character '{found}'"),
            byte_offset: e.offset,
        }
    })?;
    let parser = Parser {
        source,
        tokens,
        pos: 0,
        arena: ExprArena::new(),
        tree: SyntaxTree::new(),
        hashers: Vec::new(),
    };
    parser.parse_file()
}

type PResult<T> = Result<T, ParseError>;

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    arena: ExprArena,
    tree: SyntaxTree,
    /// Innermost last.
    hashers: Vec<SourceHasher>,
}

impl<'src> Parser<'src> {
    fn parse_file(mut self) -> PResult<SourceFile> {
        let len = u32::try_from(self.source.len()).unwrap_or(u32::MAX);
        let node = self.tree.push(Span::new(0, len));
        self.hashers.push(SourceHasher::new());
        let (fields, members) = self.container_body(TokenKind::Eof)?;
        let fields_hash = self.hashers.pop().unwrap_or_default().finish();
        Ok(SourceFile {
            root: ContainerAst {
                kind: ContainerKind::Struct,
                fields,
                members,
                node,
                fields_hash,
            },
            arena: self.arena,
            tree: self.tree,
        })
    }

    // ===== Token access =====

    fn current(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn text(&self, token: Token) -> &'src str {
        self.source.get(token.span.to_range()).unwrap_or("")
    }

    /// End of the last consumed token.
    fn prev_end(&self) -> u32 {
        match self.pos.checked_sub(1) {
            Some(prev) => self.tokens[prev].span.end,
            None => 0,
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            return token;
        }
        let text = self.text(token);
        if let Some(hasher) = self.hashers.last_mut() {
            hasher.write_u32(token.kind as u32);
            hasher.write_str(text);
        }
        self.pos += 1;
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {}", kind.describe())))
        }
    }

    fn expect_ident(&mut self) -> PResult<&'src str> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(self.text(token))
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError {
            message: format!("{expected}, found {}", token.kind.describe()),
            byte_offset: token.span.start,
        }
    }

    // ===== Containers and members =====

    fn container_body(&mut self, end: TokenKind) -> PResult<(Vec<FieldAst>, Vec<Member>)> {
        let mut fields = Vec::new();
        let mut members = Vec::new();
        while !self.check(end) {
            match self.current_kind() {
                TokenKind::Pub
                | TokenKind::Export
                | TokenKind::Const
                | TokenKind::Fn
                | TokenKind::Test
                | TokenKind::Comptime
                | TokenKind::Usingnamespace => members.push(self.member()?),
                TokenKind::Ident => {
                    fields.push(self.field()?);
                    if !self.eat(TokenKind::Comma) && !self.check(end) {
                        return Err(self.error("expected ',' after field"));
                    }
                }
                _ => return Err(self.error("expected declaration or field")),
            }
        }
        Ok((fields, members))
    }

    fn field(&mut self) -> PResult<FieldAst> {
        let start = self.current().span.start;
        let name = self.expect_ident()?.to_owned();
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(FieldAst {
            name,
            ty,
            span: Span::new(start, self.prev_end()),
        })
    }

    fn member(&mut self) -> PResult<Member> {
        let start = self.current().span.start;
        let node = self.tree.push(Span::point(start));
        self.hashers.push(SourceHasher::new());
        let result = self.member_inner();
        let src_hash = self.hashers.pop().unwrap_or_default().finish();
        let (name, is_pub, is_export, value) = result?;
        self.tree.set_span(node, Span::new(start, self.prev_end()));
        Ok(Member {
            name,
            is_pub,
            is_export,
            node,
            src_hash,
            value,
        })
    }

    fn member_inner(&mut self) -> PResult<(MemberName, bool, bool, MemberValue)> {
        let is_pub = self.eat(TokenKind::Pub);
        let is_export = self.eat(TokenKind::Export);
        match self.current_kind() {
            TokenKind::Const => {
                self.advance();
                let name = self.expect_ident()?.to_owned();
                let ty = if self.eat(TokenKind::Colon) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Eq)?;
                let value = self.expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok((MemberName::Named(name), is_pub, is_export, MemberValue::Const { ty, value }))
            }
            TokenKind::Fn => {
                self.advance();
                let name = self.expect_ident()?.to_owned();
                self.expect(TokenKind::LParen)?;
                self.expect(TokenKind::RParen)?;
                let inferred_error_set = self.eat(TokenKind::Bang);
                let ret = self.expr()?;
                let body = self.block()?;
                let func = FuncAst {
                    ret,
                    inferred_error_set,
                    body,
                };
                Ok((MemberName::Named(name), is_pub, is_export, MemberValue::Func(func)))
            }
            TokenKind::Test if !is_pub && !is_export => {
                self.advance();
                let name = if self.check(TokenKind::String) {
                    let token = self.advance();
                    Some(unescape(self.text(token)))
                } else {
                    None
                };
                let body = self.block()?;
                Ok((MemberName::Test(name), false, false, MemberValue::Block(body)))
            }
            TokenKind::Comptime if !is_pub && !is_export => {
                self.advance();
                let body = self.block()?;
                Ok((MemberName::Comptime, false, false, MemberValue::Block(body)))
            }
            TokenKind::Usingnamespace if !is_export => {
                self.advance();
                let target = self.expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok((MemberName::Usingnamespace, is_pub, false, MemberValue::Using(target)))
            }
            _ => Err(self.error("expected declaration")),
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.check(TokenKind::Return) {
                let start = self.advance().span.start;
                let node = self.tree.push(Span::point(start));
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                self.tree.set_span(node, Span::new(start, self.prev_end()));
                stmts.push(Stmt::Return { value, node });
            } else {
                let expr = self.expr()?;
                self.expect(TokenKind::Semicolon)?;
                stmts.push(Stmt::Expr(expr));
            }
        }
        Ok(stmts)
    }

    // ===== Expressions =====

    fn alloc(&mut self, kind: ExprKind, node: u32, start: u32) -> ExprId {
        let span = Span::new(start, self.prev_end().max(start));
        self.tree.set_span(node, span);
        self.arena.alloc(Expr { kind, node, span })
    }

    fn expr(&mut self) -> PResult<ExprId> {
        let mut lhs = self.postfix()?;
        while self.eat(TokenKind::Plus) {
            let rhs = self.postfix()?;
            let start = self.arena.get(lhs).span.start;
            let node = self.tree.push(Span::point(start));
            lhs = self.alloc(ExprKind::Add(lhs, rhs), node, start);
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> PResult<ExprId> {
        let mut expr = self.primary()?;
        while self.eat(TokenKind::LParen) {
            self.expect(TokenKind::RParen)?;
            let start = self.arena.get(expr).span.start;
            let node = self.tree.push(Span::point(start));
            expr = self.alloc(ExprKind::Call(expr), node, start);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<ExprId> {
        let token = self.current();
        let start = token.span.start;
        let kind = match token.kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum | TokenKind::Opaque => {
                return self.container_expr();
            }
            TokenKind::Int
            | TokenKind::String
            | TokenKind::Ident
            | TokenKind::Amp
            | TokenKind::Star
            | TokenKind::Error
            | TokenKind::Builtin => token.kind,
            _ => return Err(self.error("expected expression")),
        };
        let node = self.tree.push(Span::point(start));
        self.advance();
        let text = self.text(token);
        let expr = match kind {
            TokenKind::Int => ExprKind::Int(text.to_owned()),
            TokenKind::String => ExprKind::Str(unescape(text)),
            TokenKind::Ident => ExprKind::Ident(text.to_owned()),
            TokenKind::Amp => ExprKind::AddrOf(self.expect_ident()?.to_owned()),
            TokenKind::Star => {
                let is_const = self.eat(TokenKind::Const);
                let child = self.primary()?;
                ExprKind::PtrType { is_const, child }
            }
            TokenKind::Error => {
                self.expect(TokenKind::Dot)?;
                ExprKind::ErrorValue(self.expect_ident()?.to_owned())
            }
            _ => {
                let name = text.trim_start_matches('@').to_owned();
                ExprKind::Builtin {
                    name,
                    args: self.builtin_args()?,
                }
            }
        };
        Ok(self.alloc(expr, node, start))
    }

    fn builtin_args(&mut self) -> PResult<Vec<ExprId>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.eat(TokenKind::RParen) {
            args.push(self.expr()?);
            if !self.eat(TokenKind::Comma) && !self.check(TokenKind::RParen) {
                return Err(self.error("expected ',' or ')'"));
            }
        }
        Ok(args)
    }

    fn container_expr(&mut self) -> PResult<ExprId> {
        let token = self.advance();
        let start = token.span.start;
        let kind = match token.kind {
            TokenKind::Union => ContainerKind::Union,
            TokenKind::Enum => ContainerKind::Enum,
            TokenKind::Opaque => ContainerKind::Opaque,
            _ => ContainerKind::Struct,
        };
        let node = self.tree.push(Span::point(start));
        self.expect(TokenKind::LBrace)?;
        self.hashers.push(SourceHasher::new());
        let body = self
            .container_body(TokenKind::RBrace)
            .and_then(|body| self.expect(TokenKind::RBrace).map(|_| body));
        let fields_hash = self.hashers.pop().unwrap_or_default().finish();
        let (fields, members) = body?;
        if let Some(outer) = self.hashers.last_mut() {
            outer.write_u64(fields_hash.value());
        }
        let container = ContainerAst {
            kind,
            fields,
            members,
            node,
            fields_hash,
        };
        Ok(self.alloc(ExprKind::Container(Box::new(container)), node, start))
    }
}

/// The contents of a string literal token.
fn unescape(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests;
