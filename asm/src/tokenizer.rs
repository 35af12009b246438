//! The source tokenizer: hand-rolled, priority-ordered lexical
//! scanning. Kept separate from the manifest's `pest` grammar
//! (`manifest::parser`) because the preprocessor downstream needs token
//! arrays with `dead` flags and directive-index sets that don't map
//! naturally onto a parse tree — the tradeoff `vasm` itself never had to
//! make, since it parses a fixed grammar in one shot.

use spasm::{Diagnostics, Token};
use std::collections::BTreeSet;

const BRACKETS: [char; 6] = ['(', ')', '[', ']', '{', '}'];

/// Tokenizes `source` (already read from `filepath`). Returns the ordered
/// token sequence and the set of indices pointing at directive tokens.
/// An unterminated block comment or string literal stops tokenizing early
/// and reports one error; everything produced up to that point is kept.
pub fn tokenize_source(source: &str, filepath: &str, diagnostics: &mut Diagnostics) -> (Vec<Token>, BTreeSet<usize>) {
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut tokens = Vec::new();
    let mut directive_indices = BTreeSet::new();
    let mut i = 0;
    let mut line: u32 = 1;

    while i < n {
        let c = chars[i];

        if c.is_whitespace() {
            if c == '\n' {
                line += 1;
            }
            i += 1;
            continue;
        }

        if c == ';' {
            if i + 1 < n && chars[i + 1] == '*' {
                let start_line = line;
                let mut j = i + 2;
                let mut terminated = false;
                while j + 1 < n {
                    if chars[j] == '*' && chars[j + 1] == ';' {
                        j += 2;
                        terminated = true;
                        break;
                    }
                    if chars[j] == '\n' {
                        line += 1;
                    }
                    j += 1;
                }
                if !terminated {
                    diagnostics.error(format!(
                        "\"{}\" @ line {}: unterminated block comment",
                        filepath, start_line
                    ));
                    break;
                }
                i = j;
            } else {
                while i < n && chars[i] != '\n' {
                    i += 1;
                }
            }
            continue;
        }

        if c == '"' {
            let start_line = line;
            let start = i;
            let mut j = i + 1;
            let mut closed = false;
            while j < n {
                if chars[j] == '\\' && j + 1 < n && chars[j + 1] == '"' {
                    j += 2;
                    continue;
                }
                if chars[j] == '"' {
                    j += 1;
                    closed = true;
                    break;
                }
                if chars[j] == '\n' {
                    line += 1;
                }
                j += 1;
            }
            if !closed {
                diagnostics.error(format!(
                    "\"{}\" @ line {}: unterminated string literal",
                    filepath, start_line
                ));
                break;
            }
            let value: String = chars[start..j].iter().collect();
            tokens.push(Token::new(value, start_line, filepath));
            i = j;
            continue;
        }

        if c == '*' && i + 1 < n && chars[i + 1] == ';' {
            diagnostics.error(format!(
                "\"{}\" @ line {}: dangling block-comment close \"*;\" starts no recognized lexeme",
                filepath, line
            ));
            tokens.push(Token::new("*;", line, filepath));
            i += 2;
            continue;
        }

        if BRACKETS.contains(&c) {
            diagnostics.error(format!(
                "\"{}\" @ line {}: unhandled bracket '{}' in tokenizer",
                filepath, line, c
            ));
            tokens.push(Token::new(c.to_string(), line, filepath));
            i += 1;
            continue;
        }

        let start = i;
        let start_line = line;
        while i < n {
            let ch = chars[i];
            if ch.is_whitespace() || ch == ';' || ch == '"' || BRACKETS.contains(&ch) {
                break;
            }
            i += 1;
        }
        let value: String = chars[start..i].iter().collect();
        let index = tokens.len();
        if value.starts_with('@') {
            directive_indices.insert(index);
        }
        tokens.push(Token::new(value, start_line, filepath));
    }

    (tokens, directive_indices)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_literal_spans_lines_as_one_token() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, _) = tokenize_source("\"hello\nworld\"", "f.spasm", &mut diagnostics);
        assert!(!diagnostics.has_errors());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, "\"hello\nworld\"");
        assert_eq!(tokens[0].line, 1);
    }

    #[test]
    fn nested_block_comment_not_supported() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, _) = tokenize_source(";* a ;* b *; c *;", "f.spasm", &mut diagnostics);
        assert!(diagnostics.has_errors());
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["c", "*;"]);
    }

    #[test]
    fn directive_tokens_are_indexed() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, indices) = tokenize_source("@include \"x\"\nADD r1, r2", "f.spasm", &mut diagnostics);
        assert!(!diagnostics.has_errors());
        assert_eq!(tokens[0].value, "@include");
        assert!(indices.contains(&0));
        assert_eq!(indices.len(), 1);
    }

    #[test]
    fn unterminated_string_reports_error_and_stops() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, _) = tokenize_source("ADD r1, \"oops", "f.spasm", &mut diagnostics);
        assert!(diagnostics.has_errors());
        assert_eq!(tokens.len(), 2); // ADD, r1, (comma dropped by generic scan boundary? see below)
    }

    #[test]
    fn bracket_characters_are_reserved_but_recorded() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, _) = tokenize_source("(", "f.spasm", &mut diagnostics);
        assert!(diagnostics.has_errors());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, "(");
    }

    #[test]
    fn round_trip_ignoring_provenance() {
        let mut diagnostics = Diagnostics::new();
        let (tokens, _) = tokenize_source("ADD r1, r2 ; comment\nSUB r3, r4", "f.spasm", &mut diagnostics);
        let flattened: Vec<String> = tokens.iter().map(|t| t.value.clone()).collect();
        let reassembled = flattened.join(" ");
        let mut diagnostics2 = Diagnostics::new();
        let (retokenized, _) = tokenize_source(&reassembled, "f.spasm", &mut diagnostics2);
        let retokenized_values: Vec<String> = retokenized.iter().map(|t| t.value.clone()).collect();
        assert_eq!(flattened, retokenized_values);
    }
}
