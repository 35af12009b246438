//! The preprocessor: file inclusion, value/block macro
//! substitution, and entry-symbol designation, flattened into a single
//! live token stream per target.
//!
//! New tokens are appended via replacement tables rather than in-place
//! rewriting: a macro is always a list of replacement
//! tokens, a value macro being the degenerate singleton case. The splice
//! step at the end is the only place tokens are actually reordered.

use crate::tokenizer::tokenize_source;
use manifest::Target;
use regex::Regex;
use spasm::{Diagnostics, Token};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Preprocesses every file in `target.build_files`, in the target's
/// (already sorted — `BTreeSet`) iteration order, and concatenates the
/// results.
pub fn preprocess_target(target: &mut Target, diagnostics: &mut Diagnostics) -> spasm::Result<Vec<Token>> {
    let files: Vec<PathBuf> = target.build_files.iter().cloned().collect();
    let mut flattened = Vec::new();
    for file in files {
        let mut active_includes = HashSet::new();
        let tokens = preprocess_file(&file, target, diagnostics, &mut active_includes)?;
        flattened.extend(tokens);
    }
    Ok(flattened)
}

fn preprocess_file(
    path: &Path,
    target: &mut Target,
    diagnostics: &mut Diagnostics,
    active_includes: &mut HashSet<PathBuf>,
) -> spasm::Result<Vec<Token>> {
    let canonical = canonicalize_best_effort(path);
    if active_includes.contains(&canonical) {
        diagnostics.error(format!(
            "include cycle detected: \"{}\" is already being expanded",
            canonical.display()
        ));
        return Ok(Vec::new());
    }
    active_includes.insert(canonical.clone());

    let source = fs::read_to_string(path)?;
    let filepath = path.display().to_string();
    let (mut tokens, directive_indices) = tokenize_source(&source, &filepath, diagnostics);

    for (name, value) in target.definitions.clone() {
        substitute_value(&mut tokens, 0, &name, &value);
    }

    let mut block_macros: Vec<(usize, String, Vec<Token>)> = Vec::new();
    let mut include_splices: std::collections::HashMap<usize, Vec<Token>> = std::collections::HashMap::new();

    for index in directive_indices {
        if tokens[index].dead {
            continue;
        }
        match tokens[index].value.as_str() {
            "@include" => {
                handle_include(
                    &mut tokens,
                    index,
                    target,
                    path,
                    diagnostics,
                    active_includes,
                    &mut include_splices,
                )?;
            }
            "@define" => handle_define(&mut tokens, index, diagnostics, &mut block_macros),
            "@entry" => handle_entry(&mut tokens, index, target, diagnostics),
            other => {
                diagnostics.error(format!(
                    "{}: unknown preprocessor directive \"{}\"",
                    tokens[index].file_location(),
                    other
                ));
            }
        }
    }

    let mut output = Vec::with_capacity(tokens.len());
    for (index, token) in tokens.into_iter().enumerate() {
        if let Some(replacement) = include_splices.remove(&index) {
            output.extend(replacement);
            continue;
        }
        if token.dead {
            continue;
        }
        if let Some(replacement) = find_block_macro(&block_macros, index, &token.value) {
            output.extend(replacement.clone());
            continue;
        }
        output.push(token);
    }

    active_includes.remove(&canonical);
    Ok(output)
}

#[allow(clippy::too_many_arguments)]
fn handle_include(
    tokens: &mut [Token],
    index: usize,
    target: &mut Target,
    current_file: &Path,
    diagnostics: &mut Diagnostics,
    active_includes: &mut HashSet<PathBuf>,
    include_splices: &mut std::collections::HashMap<usize, Vec<Token>>,
) -> spasm::Result<()> {
    let arg_index = index + 1;
    let location = tokens[index].file_location();
    let arg_value = match tokens.get(arg_index) {
        Some(tok) if tok.value.starts_with('"') => tok.value.clone(),
        _ => {
            diagnostics.error(format!("{}: @include expects a quoted path", location));
            return Ok(());
        }
    };

    let raw_path = unquote(&arg_value);
    tokens[index].dead = true;
    tokens[arg_index].dead = true;

    match resolve_include_path(&raw_path, target, current_file) {
        Some(resolved) => {
            let included = preprocess_file(&resolved, target, diagnostics, active_includes)?;
            include_splices.insert(index, included);
        }
        None => {
            diagnostics.error(format!("{}: could not resolve @include \"{}\"", location, raw_path));
        }
    }
    Ok(())
}

fn handle_define(
    tokens: &mut [Token],
    index: usize,
    diagnostics: &mut Diagnostics,
    block_macros: &mut Vec<(usize, String, Vec<Token>)>,
) {
    let location = tokens[index].file_location();
    let name_index = index + 1;
    let name = match tokens.get(name_index) {
        Some(tok) => tok.value.clone(),
        None => {
            diagnostics.error(format!("{}: @define expects a name", location));
            return;
        }
    };
    if !is_identifier(&name) {
        diagnostics.error(format!("{}: \"{}\" is not a valid @define name", location, name));
        return;
    }

    let body_start = name_index + 1;
    if tokens.get(body_start).map(|t| t.value == "\\").unwrap_or(false) {
        let mut close = None;
        let mut j = body_start + 1;
        while j < tokens.len() {
            if tokens[j].value == "\\" {
                close = Some(j);
                break;
            }
            j += 1;
        }
        match close {
            Some(close_index) => {
                let body: Vec<Token> = tokens[body_start + 1..close_index].to_vec();
                block_macros.push((close_index, name, body));
                for token in &mut tokens[index..=close_index] {
                    token.dead = true;
                }
            }
            None => {
                diagnostics.error(format!(
                    "{}: @define {} is missing its closing '\\'",
                    location, name
                ));
            }
        }
    } else if let Some(value_token) = tokens.get(body_start).cloned() {
        tokens[index].dead = true;
        tokens[name_index].dead = true;
        tokens[body_start].dead = true;
        substitute_value(tokens, body_start + 1, &name, &value_token.value);
    } else {
        diagnostics.error(format!("{}: @define {} is missing a value", location, name));
    }
}

fn handle_entry(tokens: &mut [Token], index: usize, target: &mut Target, diagnostics: &mut Diagnostics) {
    let location = tokens[index].file_location();
    let symbol_index = index + 1;
    let symbol = match tokens.get(symbol_index) {
        Some(tok) => tok.value.clone(),
        None => {
            diagnostics.error(format!("{}: @entry expects a symbol", location));
            return;
        }
    };
    tokens[index].dead = true;
    tokens[symbol_index].dead = true;

    if let Some(existing) = &target.entry_symbol {
        diagnostics.error(format!(
            "{}: entry symbol already set to \"{}\" for target \"{}\"",
            location, existing, target.name
        ));
        return;
    }
    target.entry_symbol = Some(symbol);
}

fn find_block_macro<'m>(
    macros: &'m [(usize, String, Vec<Token>)],
    index: usize,
    name: &str,
) -> Option<&'m Vec<Token>> {
    macros
        .iter()
        .filter(|(defined_at, macro_name, _)| *defined_at < index && macro_name == name)
        .max_by_key(|(defined_at, _, _)| *defined_at)
        .map(|(_, _, body)| body)
}

/// Applies `\bname\b → value` over `tokens[start..]` (word-boundary
/// substring substitution on each token's raw text, not full-token
/// replacement — matching `compiler2.py`'s `_swapDefined`).
fn substitute_value(tokens: &mut [Token], start: usize, name: &str, value: &str) {
    let pattern = format!(r"\b{}\b", regex::escape(name));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return,
    };
    for token in tokens[start..].iter_mut() {
        if re.is_match(&token.value) {
            token.value = re.replace_all(&token.value, value).into_owned();
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => chars.all(|c| c == '_' || c.is_ascii_alphanumeric()),
        _ => false,
    }
}

fn unquote(raw: &str) -> String {
    if raw.len() < 2 {
        return raw.to_string();
    }
    raw[1..raw.len() - 1].replace("\\\"", "\"")
}

fn resolve_include_path(raw: &str, target: &Target, _current_file: &Path) -> Option<PathBuf> {
    let mut name = raw.to_string();
    if !name.ends_with(".spasm") {
        name.push_str(".spasm");
    }

    let direct = PathBuf::from(&name);
    if direct.exists() {
        return Some(direct);
    }
    for dir in &target.include_directories {
        let candidate = dir.join(&name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    let candidate = target.working_directory.join(&name);
    if candidate.exists() {
        return Some(candidate);
    }
    None
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn target_at(dir: &Path) -> Target {
        Target::new("demo", dir.to_path_buf())
    }

    #[test]
    fn value_macro_substitutes_whole_word_occurrences() {
        let mut tokens = vec![
            Token::new("MOV", 1, "f.spasm"),
            Token::new("WIDTH", 1, "f.spasm"),
        ];
        substitute_value(&mut tokens, 0, "WIDTH", "16");
        assert_eq!(tokens[1].value, "16");
        assert_eq!(tokens[0].value, "MOV");
    }

    #[test]
    fn block_macro_expansion_matches_scenario() {
        let dir = std::env::temp_dir().join(format!("spasm-test-macro-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("main.spasm");
        fs::File::create(&file)
            .unwrap()
            .write_all(b"@define INC \\ ADI r1, 1 \\\nINC\nINC")
            .unwrap();

        let mut target = target_at(&dir);
        target.build_files.insert(file);
        let mut diagnostics = Diagnostics::new();
        let tokens = preprocess_target(&mut target, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["ADI", "r1,", "1", "ADI", "r1,", "1"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn include_splices_tokens_in_place_with_included_provenance() {
        let dir = std::env::temp_dir().join(format!("spasm-test-include-{}", std::process::id()));
        let inc_dir = dir.join("inc");
        fs::create_dir_all(&inc_dir).unwrap();
        let helpers = inc_dir.join("helpers.spasm");
        fs::File::create(&helpers).unwrap().write_all(b"NOP").unwrap();
        let main_file = dir.join("main.spasm");
        fs::File::create(&main_file)
            .unwrap()
            .write_all(b"@include \"helpers\"\nRET")
            .unwrap();

        let mut target = target_at(&dir);
        target.include_directories.insert(inc_dir.clone());
        target.build_files.insert(main_file);
        let mut diagnostics = Diagnostics::new();
        let tokens = preprocess_target(&mut target, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["NOP", "RET"]);
        assert!(tokens[0].filepath.contains("helpers.spasm"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn include_cycle_is_reported_and_does_not_hang() {
        let dir = std::env::temp_dir().join(format!("spasm-test-cycle-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("main.spasm");
        fs::File::create(&file)
            .unwrap()
            .write_all(b"@include \"main\"")
            .unwrap();

        let mut target = target_at(&dir);
        target.build_files.insert(file);
        let mut diagnostics = Diagnostics::new();
        let tokens = preprocess_target(&mut target, &mut diagnostics).unwrap();
        assert!(diagnostics.has_errors());
        assert!(tokens.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn entry_directive_sets_target_symbol_once() {
        let dir = std::env::temp_dir().join(format!("spasm-test-entry-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("main.spasm");
        fs::File::create(&file)
            .unwrap()
            .write_all(b"@entry start\n.start")
            .unwrap();

        let mut target = target_at(&dir);
        target.build_files.insert(file);
        let mut diagnostics = Diagnostics::new();
        preprocess_target(&mut target, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        assert_eq!(target.entry_symbol.as_deref(), Some("start"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn a_file_with_no_directives_or_definitions_passes_through_unchanged() {
        let dir = std::env::temp_dir().join(format!("spasm-test-idempotence-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("main.spasm");
        fs::File::create(&file).unwrap().write_all(b"ADI r1, 1\nNOP").unwrap();

        let mut target = target_at(&dir);
        target.build_files.insert(file);
        let mut diagnostics = Diagnostics::new();
        let tokens = preprocess_target(&mut target, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["ADI", "r1,", "1", "NOP"]);
        assert!(tokens.iter().all(|t| !t.dead));

        fs::remove_dir_all(&dir).ok();
    }
}
