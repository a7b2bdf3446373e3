//! Lexer using logos.
//!
//! Whitespace and `//` comments are skipped. Integer literals keep their
//! text; the value is checked during lowering so an out-of-range literal is
//! a lowering error rather than a syntax error.

use kiln_ir::Span;
use logos::Logos;

#[derive(Logos, Copy, Clone, Debug, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    #[token("const")]
    Const,
    #[token("pub")]
    Pub,
    #[token("export")]
    Export,
    #[token("fn")]
    Fn,
    #[token("test")]
    Test,
    #[token("comptime")]
    Comptime,
    #[token("usingnamespace")]
    Usingnamespace,
    #[token("struct")]
    Struct,
    #[token("union")]
    Union,
    #[token("enum")]
    Enum,
    #[token("opaque")]
    Opaque,
    #[token("return")]
    Return,
    #[token("error")]
    Error,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("*")]
    Star,
    #[token("&")]
    Amp,
    #[token("!")]
    Bang,
    #[token(".")]
    Dot,

    #[regex(r"@[a-zA-Z_][a-zA-Z0-9_]*")]
    Builtin,
    #[regex(r"[0-9][0-9_]*")]
    Int,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    Eof,
}

impl TokenKind {
    /// How the token reads in an error message.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Const => "'const'",
            TokenKind::Pub => "'pub'",
            TokenKind::Export => "'export'",
            TokenKind::Fn => "'fn'",
            TokenKind::Test => "'test'",
            TokenKind::Comptime => "'comptime'",
            TokenKind::Usingnamespace => "'usingnamespace'",
            TokenKind::Struct => "'struct'",
            TokenKind::Union => "'union'",
            TokenKind::Enum => "'enum'",
            TokenKind::Opaque => "'opaque'",
            TokenKind::Return => "'return'",
            TokenKind::Error => "'error'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Eq => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Star => "'*'",
            TokenKind::Amp => "'&'",
            TokenKind::Bang => "'!'",
            TokenKind::Dot => "'.'",
            TokenKind::Builtin => "a builtin function",
            TokenKind::Int => "an integer literal",
            TokenKind::String => "a string literal",
            TokenKind::Ident => "an identifier",
            TokenKind::Eof => "end of file",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Byte offset of the first character logos could not match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub offset: u32,
}

/// Lex all of `source`, ending with an `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = Span::from_range(lexer.span());
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(()) => return Err(LexError { offset: span.start }),
        }
    }
    let end = u32::try_from(source.len()).unwrap_or(u32::MAX);
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(end, end),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests can panic")]

    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_win_over_identifiers() {
        assert_eq!(
            kinds("const constant = struct {};"),
            vec![
                TokenKind::Const,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Struct,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_newlines_are_skipped() {
        assert_eq!(
            kinds("// header\nconst a = 1; // trailing\n"),
            vec![
                TokenKind::Const,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn builtins_and_strings() {
        let tokens = lex(r#"@compileError("no \"way\"")"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Builtin);
        assert_eq!(tokens[0].span, Span::new(0, 13));
        assert_eq!(tokens[2].kind, TokenKind::String);
    }

    #[test]
    fn unknown_characters_are_reported() {
        assert_eq!(lex("const a = 1 $ 2;"), Err(LexError { offset: 12 }));
    }
}
