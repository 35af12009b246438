//! The directive-driven cursor that walks the flat token stream produced by
//! `parser::tokenize` and builds targets, file lists, and labels.
//! Recovery policy: a directive either applies fully or not at all — on the
//! first malformed token inside a directive, one error is logged and the
//! cursor is advanced to the next directive token.

use crate::model::{FileList, Format, SearchMode, Target};
use crate::parser::{ManifestToken, TokenKind};
use spasm::Diagnostics;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use util::EnumFromStr;

pub struct Interpreter<'d> {
    manifest_dir: PathBuf,
    targets: HashMap<String, Target>,
    flists: HashMap<String, FileList>,
    labels: HashSet<String>,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Interpreter<'d> {
    pub fn new(manifest_dir: PathBuf, diagnostics: &'d mut Diagnostics) -> Interpreter<'d> {
        Interpreter {
            manifest_dir,
            targets: HashMap::new(),
            flists: HashMap::new(),
            labels: HashSet::new(),
            diagnostics,
        }
    }

    pub fn run(&mut self, tokens: &[ManifestToken]) {
        let mut pos = 0;
        self.run_block(tokens, &mut pos);
    }

    pub fn into_parts(self) -> (HashMap<String, Target>, HashMap<String, FileList>, HashSet<String>) {
        (self.targets, self.flists, self.labels)
    }

    fn run_block(&mut self, tokens: &[ManifestToken], pos: &mut usize) {
        while *pos < tokens.len() {
            let tok = tokens[*pos].clone();
            if tok.kind != TokenKind::Directive {
                self.diagnostics.error(format!(
                    "line {}: expected a directive, found \"{}\"",
                    tok.line, tok.text
                ));
                *pos += 1;
                self.recover(tokens, pos);
                continue;
            }
            *pos += 1;
            if let Err(message) = self.dispatch(&tok.text, tokens, pos) {
                self.diagnostics.error(format!(
                    "line {}: {} {}",
                    tok.line, tok.text, message
                ));
                self.recover(tokens, pos);
            }
        }
    }

    fn recover(&mut self, tokens: &[ManifestToken], pos: &mut usize) {
        while *pos < tokens.len() && tokens[*pos].kind != TokenKind::Directive {
            *pos += 1;
        }
    }

    fn dispatch(
        &mut self,
        directive: &str,
        tokens: &[ManifestToken],
        pos: &mut usize,
    ) -> Result<(), String> {
        match directive {
            ".target" => self.directive_target(tokens, pos),
            ".label" => self.directive_label(tokens, pos),
            ".flist" => self.directive_flist(tokens, pos),
            ".include_directory" => self.directive_include_directory(tokens, pos),
            ".search_set" => self.directive_search(tokens, pos, true),
            ".search_add" => self.directive_search(tokens, pos, false),
            ".add_target" => self.directive_add_target(tokens, pos),
            ".define" => self.directive_define(tokens, pos),
            ".entry" => self.directive_entry(tokens, pos),
            ".output" => self.directive_output(tokens, pos),
            ".format" => self.directive_format(tokens, pos),
            ".depends" => self.directive_depends(tokens, pos),
            ".ifdef" => self.directive_conditional(tokens, pos, false),
            ".ifndef" => self.directive_conditional(tokens, pos, true),
            other => Err(format!("is not a recognized directive ({})", other)),
        }
    }

    fn check_name_available(&self, name: &str) -> Result<(), String> {
        if self.targets.contains_key(name) || self.flists.contains_key(name) || self.labels.contains(name)
        {
            return Err(format!("\"{}\" is already declared", name));
        }
        Ok(())
    }

    fn target(&self, name: &str) -> Result<&Target, String> {
        self.targets
            .get(name)
            .ok_or_else(|| format!("unknown target \"{}\"", name))
    }

    fn target_mut(&mut self, name: &str) -> Result<&mut Target, String> {
        self.targets
            .get_mut(name)
            .ok_or_else(|| format!("unknown target \"{}\"", name))
    }

    fn directive_target(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let name = expect_kind(tokens, pos, TokenKind::Identifier)?.text.clone();
        self.check_name_available(&name)?;
        self.targets
            .insert(name.clone(), Target::new(name, self.manifest_dir.clone()));
        Ok(())
    }

    fn directive_label(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let name = expect_kind(tokens, pos, TokenKind::Identifier)?.text.clone();
        self.check_name_available(&name)?;
        self.labels.insert(name);
        Ok(())
    }

    fn directive_flist(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let name = expect_kind(tokens, pos, TokenKind::Identifier)?.text.clone();
        self.check_name_available(&name)?;
        self.flists.insert(name.clone(), FileList::new(name));
        Ok(())
    }

    fn directive_include_directory(
        &mut self,
        tokens: &[ManifestToken],
        pos: &mut usize,
    ) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        let mut it = args.into_iter();
        let target_tok = it.next().ok_or("expected a target name")?;
        if target_tok.kind != TokenKind::Identifier {
            return Err("target name must be an identifier".to_string());
        }
        let paths: Vec<String> = it
            .map(|tok| {
                if tok.kind != TokenKind::String {
                    Err(format!("expected a quoted path, found \"{}\"", tok.text))
                } else {
                    Ok(tok.unquoted())
                }
            })
            .collect::<Result<_, _>>()?;
        if paths.is_empty() {
            return Err("expected at least one path".to_string());
        }
        let base = self.manifest_dir.clone();
        let target = self.target_mut(&target_tok.text)?;
        for path in paths {
            target.include_directories.insert(resolve_relative(&base, &path));
        }
        Ok(())
    }

    fn directive_search(
        &mut self,
        tokens: &[ManifestToken],
        pos: &mut usize,
        replace: bool,
    ) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        let mut it = args.into_iter();
        let flist_tok = it.next().ok_or("expected a file-list name")?;
        let mode_tok = it.next().ok_or("expected a search mode")?;
        let ext_tok = it.next().ok_or("expected an extension list")?;
        if ext_tok.kind != TokenKind::String {
            return Err("extension list must be a quoted string".to_string());
        }
        let mode = SearchMode::from_str(&mode_tok.text).map_err(|err| err.to_string())?;
        let extensions: Vec<String> = ext_tok
            .unquoted()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err("expected at least one extension".to_string());
        }
        let dirs: Vec<String> = it
            .map(|tok| {
                if tok.kind != TokenKind::String {
                    Err(format!("expected a quoted directory, found \"{}\"", tok.text))
                } else {
                    Ok(tok.unquoted())
                }
            })
            .collect::<Result<_, _>>()?;
        if dirs.is_empty() {
            return Err("expected at least one directory".to_string());
        }

        let base = self.manifest_dir.clone();
        let mut found = BTreeSet::new();
        for dir in &dirs {
            let root = resolve_relative(&base, dir);
            collect_matching_files(&root, &extensions, mode, &mut found);
        }

        let flist = self
            .flists
            .entry(flist_tok.text.clone())
            .or_insert_with(|| FileList::new(flist_tok.text.clone()));
        if replace {
            flist.files = found;
        } else {
            flist.files.extend(found);
        }
        Ok(())
    }

    fn directive_add_target(
        &mut self,
        tokens: &[ManifestToken],
        pos: &mut usize,
    ) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        let mut it = args.into_iter();
        let target_tok = it.next().ok_or("expected a target name")?;
        let base = self.manifest_dir.clone();
        let include_dirs: Vec<PathBuf> = self
            .target(&target_tok.text)?
            .include_directories
            .iter()
            .cloned()
            .collect();

        let mut resolved = BTreeSet::new();
        for item in it {
            match item.kind {
                TokenKind::String => {
                    let raw = item.unquoted();
                    resolved.insert(resolve_build_item(&base, &include_dirs, &raw)?);
                }
                TokenKind::Identifier => {
                    let flist = self
                        .flists
                        .get(&item.text)
                        .ok_or_else(|| format!("unknown file list \"{}\"", item.text))?;
                    resolved.extend(flist.files.iter().cloned());
                }
                _ => return Err(format!("unexpected token \"{}\"", item.text)),
            }
        }
        let target = self.target_mut(&target_tok.text)?;
        target.build_files.extend(resolved);
        Ok(())
    }

    fn directive_define(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        if args.len() != 3 {
            return Err("expected (target, \"NAME\", \"VALUE\")".to_string());
        }
        if args[1].kind != TokenKind::String || args[2].kind != TokenKind::String {
            return Err("NAME and VALUE must be quoted strings".to_string());
        }
        let name = args[1].unquoted();
        let value = args[2].unquoted();
        let target = self.target_mut(&args[0].text)?;
        if target.has_definition(&name) {
            return Err(format!(
                "definition \"{}\" already exists on target \"{}\"",
                name, target.name
            ));
        }
        target.definitions.push((name, value));
        Ok(())
    }

    fn directive_entry(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        if args.len() != 2 {
            return Err("expected (target, \"SYMBOL\")".to_string());
        }
        if args[1].kind != TokenKind::String {
            return Err("SYMBOL must be a quoted string".to_string());
        }
        let symbol = args[1].unquoted();
        let target = self.target_mut(&args[0].text)?;
        if target.entry_symbol.is_some() {
            return Err(format!("target \"{}\" already has an entry symbol", target.name));
        }
        target.entry_symbol = Some(symbol);
        Ok(())
    }

    fn directive_output(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        if args.len() < 2 || args.len() > 3 {
            return Err("expected (target, \"dir\"[, \"name\"])".to_string());
        }
        if args[1].kind != TokenKind::String {
            return Err("output directory must be a quoted string".to_string());
        }
        let dir = resolve_relative(&self.manifest_dir.clone(), &args[1].unquoted());
        let name = if args.len() == 3 {
            if args[2].kind != TokenKind::String {
                return Err("output name must be a quoted string".to_string());
            }
            Some(args[2].unquoted())
        } else {
            None
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|err| format!("could not create output directory \"{}\": {}", dir.display(), err))?;
        }
        let target = self.target_mut(&args[0].text)?;
        target.output_directory = Some(dir);
        if let Some(name) = name {
            target.output_name = Some(name);
        }
        Ok(())
    }

    fn directive_format(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        if args.len() != 2 {
            return Err("expected (target, \"bin\"|\"hex\"|\"elf\")".to_string());
        }
        if args[1].kind != TokenKind::String {
            return Err("format must be a quoted string".to_string());
        }
        let format = Format::from_str(&args[1].unquoted()).map_err(|err| err.to_string())?;
        let target = self.target_mut(&args[0].text)?;
        target.format = Some(format);
        Ok(())
    }

    fn directive_depends(&mut self, tokens: &[ManifestToken], pos: &mut usize) -> Result<(), String> {
        let args = parse_paren_args(tokens, pos)?;
        let mut it = args.into_iter();
        let target_tok = it.next().ok_or("expected a target name")?;
        if !self.targets.contains_key(&target_tok.text) {
            return Err(format!("unknown target \"{}\"", target_tok.text));
        }
        for dep_tok in it {
            if dep_tok.kind != TokenKind::String {
                self.diagnostics.error(format!(
                    "dependency name must be a quoted string, found \"{}\"",
                    dep_tok.text
                ));
                continue;
            }
            let dep_name = dep_tok.unquoted();
            if dep_name == target_tok.text {
                self.diagnostics
                    .error(format!("target \"{}\" cannot depend on itself", target_tok.text));
                continue;
            }
            if !self.targets.contains_key(&dep_name) {
                self.diagnostics
                    .error(format!("unknown target \"{}\" named in .depends", dep_name));
                continue;
            }
            let creates_cycle = self
                .targets
                .get(&dep_name)
                .map(|dep| dep.dependencies.iter().any(|name| name == &target_tok.text))
                .unwrap_or(false);
            if creates_cycle {
                self.diagnostics.error(format!(
                    "circular dependency between \"{}\" and \"{}\"",
                    target_tok.text, dep_name
                ));
                continue;
            }
            let target = self.targets.get_mut(&target_tok.text).unwrap();
            if target.dependencies.iter().any(|name| name == &dep_name) {
                self.diagnostics.warn(format!(
                    "target \"{}\" already depends on \"{}\"",
                    target.name, dep_name
                ));
                continue;
            }
            target.dependencies.push(dep_name);
        }
        Ok(())
    }

    fn directive_conditional(
        &mut self,
        tokens: &[ManifestToken],
        pos: &mut usize,
        invert: bool,
    ) -> Result<(), String> {
        let name = expect_kind(tokens, pos, TokenKind::Identifier)?.text.clone();
        expect_kind(tokens, pos, TokenKind::LBrace)?;
        let body_start = *pos;
        let body_end = find_matching_rbrace(tokens, body_start)?;
        let condition = self.labels.contains(&name);
        let should_run = if invert { !condition } else { condition };
        if should_run {
            let mut body_pos = 0;
            self.run_block(&tokens[body_start..body_end], &mut body_pos);
        }
        *pos = body_end + 1;
        Ok(())
    }
}

fn next_token<'t>(tokens: &'t [ManifestToken], pos: &mut usize) -> Option<&'t ManifestToken> {
    let tok = tokens.get(*pos);
    if tok.is_some() {
        *pos += 1;
    }
    tok
}

fn peek_kind(tokens: &[ManifestToken], pos: usize) -> Option<TokenKind> {
    tokens.get(pos).map(|tok| tok.kind)
}

fn expect_kind<'t>(
    tokens: &'t [ManifestToken],
    pos: &mut usize,
    kind: TokenKind,
) -> Result<&'t ManifestToken, String> {
    match next_token(tokens, pos) {
        Some(tok) if tok.kind == kind => Ok(tok),
        Some(tok) => Err(format!("expected {:?}, found \"{}\"", kind, tok.text)),
        None => Err(format!("expected {:?}, found end of manifest", kind)),
    }
}

fn parse_paren_args(tokens: &[ManifestToken], pos: &mut usize) -> Result<Vec<ManifestToken>, String> {
    expect_kind(tokens, pos, TokenKind::LParen)?;
    let mut args = Vec::new();
    if peek_kind(tokens, *pos) == Some(TokenKind::RParen) {
        *pos += 1;
        return Ok(args);
    }
    loop {
        let tok = next_token(tokens, pos)
            .ok_or("unexpected end of manifest inside argument list")?
            .clone();
        match tok.kind {
            TokenKind::Identifier | TokenKind::String => args.push(tok),
            _ => return Err(format!("unexpected token \"{}\" in argument list", tok.text)),
        }
        match peek_kind(tokens, *pos) {
            Some(TokenKind::Comma) => {
                *pos += 1;
            }
            Some(TokenKind::RParen) => {
                *pos += 1;
                break;
            }
            _ => return Err("expected ',' or ')' in argument list".to_string()),
        }
    }
    Ok(args)
}

fn find_matching_rbrace(tokens: &[ManifestToken], start: usize) -> Result<usize, String> {
    let mut depth = 1i32;
    let mut i = start;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::LBrace => depth += 1,
            TokenKind::RBrace => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err("unterminated block: missing '}'".to_string())
}

fn resolve_relative(base: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(candidate)
    }
}

fn resolve_build_item(base: &Path, include_dirs: &[PathBuf], raw: &str) -> Result<PathBuf, String> {
    let direct = PathBuf::from(raw);
    if direct.is_absolute() {
        return Ok(direct);
    }
    let manifest_relative = base.join(&direct);
    if manifest_relative.exists() {
        return Ok(manifest_relative);
    }
    for dir in include_dirs {
        let candidate = dir.join(&direct);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(format!("could not resolve build item \"{}\"", raw))
}

fn collect_matching_files(root: &Path, extensions: &[String], mode: SearchMode, out: &mut BTreeSet<PathBuf>) {
    walk_directory(root, extensions, mode, 0, out);
}

fn walk_directory(
    dir: &Path,
    extensions: &[String],
    mode: SearchMode,
    depth: u32,
    out: &mut BTreeSet<PathBuf>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let recurse = match mode {
                SearchMode::Shallow => false,
                SearchMode::Depth(limit) => depth < limit,
                SearchMode::All => true,
            };
            if recurse {
                walk_directory(&path, extensions, mode, depth + 1, out);
            }
        } else if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            if extensions.iter().any(|ext| file_name.ends_with(ext.as_str())) {
                out.insert(path);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::tokenize;

    type Parsed = (HashMap<String, Target>, HashMap<String, FileList>, HashSet<String>, Diagnostics);

    fn run(source: &str) -> Parsed {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(source).unwrap();
        let (targets, flists, labels) = {
            let mut interpreter = Interpreter::new(PathBuf::from("/manifest"), &mut diagnostics);
            interpreter.run(&tokens);
            interpreter.into_parts()
        };
        (targets, flists, labels, diagnostics)
    }

    #[test]
    fn target_and_entry_and_define() {
        let (targets, _, _, diagnostics) = run(
            r#"
            .target demo
            .entry(demo, "start")
            .define(demo, "WIDTH", "16")
            "#,
        );
        assert!(!diagnostics.has_errors());
        let target = &targets["demo"];
        assert_eq!(target.entry_symbol.as_deref(), Some("start"));
        assert_eq!(target.definitions, vec![("WIDTH".to_string(), "16".to_string())]);
    }

    #[test]
    fn duplicate_entry_is_an_error() {
        let (_, _, _, diagnostics) = run(
            r#"
            .target demo
            .entry(demo, "start")
            .entry(demo, "other")
            "#,
        );
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn depends_cycle_is_rejected() {
        let (targets, _, _, diagnostics) = run(
            r#"
            .target a
            .target b
            .depends(a, "b")
            .depends(b, "a")
            "#,
        );
        assert!(diagnostics.has_errors());
        assert_eq!(targets["a"].dependencies, vec!["b".to_string()]);
        assert!(targets["b"].dependencies.is_empty());
    }

    #[test]
    fn ifdef_runs_body_only_when_label_declared() {
        let (targets, _, _, diagnostics) = run(
            r#"
            .label FEATURE_X
            .target demo
            .ifdef FEATURE_X {
                .entry(demo, "start")
            }
            .ifndef FEATURE_Y {
                .define(demo, "FOUND", "yes")
            }
            "#,
        );
        assert!(!diagnostics.has_errors());
        let target = &targets["demo"];
        assert_eq!(target.entry_symbol.as_deref(), Some("start"));
        assert!(target.has_definition("FOUND"));
    }

    #[test]
    fn unknown_directive_recovers_at_next_directive() {
        let (targets, _, _, diagnostics) = run(
            r#"
            .bogus(demo)
            .target demo
            "#,
        );
        assert!(diagnostics.has_errors());
        assert!(targets.contains_key("demo"));
    }
}
