//! Lexical layer only. The manifest's grammar is kept deliberately
//! shallow: `pest` recognizes directives, parens, braces,
//! commas, identifiers, and quoted strings (plus both comment forms), and
//! hands back a flat token stream. The directive-driven structure on top
//! of that stream is a hand-written cursor in `interpreter.rs`, mirroring
//! how `vasm::parser`'s `Rule`/`Parser` pair feeds `vasm`'s own
//! hand-written per-instruction processing in `instructions.rs`.

use pest::iterators::Pairs;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ManifestGrammar;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Directive,
    Identifier,
    String,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestToken {
    pub kind: TokenKind,
    /// Raw lexeme. For `String`, includes the surrounding quotes.
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl ManifestToken {
    /// The string's contents with surrounding quotes and `\"` escapes
    /// resolved. Only meaningful when `kind == TokenKind::String`.
    pub fn unquoted(&self) -> String {
        let inner = &self.text[1..self.text.len() - 1];
        inner.replace("\\\"", "\"")
    }
}

pub fn tokenize(source: &str) -> Result<Vec<ManifestToken>, pest::error::Error<Rule>> {
    let pairs = ManifestGrammar::parse(Rule::manifest, source)?;
    Ok(flatten(pairs))
}

fn flatten(pairs: Pairs<Rule>) -> Vec<ManifestToken> {
    let mut tokens = Vec::new();
    for pair in pairs {
        if pair.as_rule() == Rule::token {
            let inner = pair.into_inner().next().unwrap();
            let (line, column) = inner.as_span().start_pos().line_col();
            let kind = match inner.as_rule() {
                Rule::directive => TokenKind::Directive,
                Rule::identifier => TokenKind::Identifier,
                Rule::string => TokenKind::String,
                Rule::lparen => TokenKind::LParen,
                Rule::rparen => TokenKind::RParen,
                Rule::lbrace => TokenKind::LBrace,
                Rule::rbrace => TokenKind::RBrace,
                Rule::comma => TokenKind::Comma,
                _ => unreachable!("token alternative not covered"),
            };
            tokens.push(ManifestToken {
                kind,
                text: inner.as_str().to_string(),
                line: line as u32,
                column: column as u32,
            });
        } else {
            tokens.extend(flatten(pair.into_inner()));
        }
    }
    tokens
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokenizes_directive_call_with_strings() {
        let tokens = tokenize(r#".target(main)"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].text, ".target");
        assert_eq!(tokens[1].kind, TokenKind::LParen);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].text, "main");
        assert_eq!(tokens[3].kind, TokenKind::RParen);
    }

    #[test]
    fn skips_line_and_block_comments() {
        let tokens = tokenize(";* block *;\n.label ; trailing\nNAME").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, ".label");
        assert_eq!(tokens[1].text, "NAME");
    }

    #[test]
    fn string_literal_unquotes_escapes() {
        let tokens = tokenize(r#""a\"b""#).unwrap();
        assert_eq!(tokens[0].unquoted(), "a\"b");
    }
}
