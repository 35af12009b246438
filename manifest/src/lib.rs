//! The build-manifest interpreter: parses a manifest file into
//! targets and file lists, plus the supplementary manifest dump and
//! target verification routines (mirroring `MakeParser`/`Target`'s
//! build-readiness checks).

mod dump;
mod interpreter;
mod model;
mod parser;

pub use dump::DUMP_FILE_NAME;
pub use model::{FileList, Format, SearchMode, Target};

use interpreter::Interpreter;
use spasm::Diagnostics;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the interpreter built from one manifest file.
pub struct Manifest {
    pub targets: HashMap<String, Target>,
    pub flists: HashMap<String, FileList>,
    pub labels: HashSet<String>,
}

/// Parses and interprets the manifest at `path`. Lexical errors (a
/// malformed token the small grammar itself cannot recognize) are pushed
/// to `diagnostics` and an empty `Manifest` is returned, matching the
/// "never throw" policy — everything else is a recoverable,
/// directive-scoped error handled by the interpreter itself.
pub fn interpret_manifest_file(
    path: impl AsRef<Path>,
    diagnostics: &mut Diagnostics,
) -> spasm::Result<Manifest> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    let manifest_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(interpret_manifest_source(&source, manifest_dir, diagnostics))
}

pub fn interpret_manifest_source(
    source: &str,
    manifest_dir: PathBuf,
    diagnostics: &mut Diagnostics,
) -> Manifest {
    let tokens = match parser::tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => {
            diagnostics.fatal_error(format!("manifest could not be tokenized: {}", err));
            return Manifest {
                targets: HashMap::new(),
                flists: HashMap::new(),
                labels: HashSet::new(),
            };
        }
    };

    let mut interpreter = Interpreter::new(manifest_dir, diagnostics);
    interpreter.run(&tokens);
    let (targets, flists, labels) = interpreter.into_parts();
    Manifest {
        targets,
        flists,
        labels,
    }
}

/// Renders the manifest dump. `write_to_file`, when true, also
/// writes the rendering to `<manifest_dir>/_smake_build_dump_.txt`.
pub fn dump(manifest: &Manifest, manifest_dir: &Path, write_to_file: bool) -> spasm::Result<String> {
    let rendered = dump::render(&manifest.labels, &manifest.flists, &manifest.targets);
    if write_to_file {
        fs::write(manifest_dir.join(dump::DUMP_FILE_NAME), &rendered)?;
    }
    Ok(rendered)
}

/// Target verification: checks build-readiness without compiling.
/// Returns a fresh `Diagnostics` the caller can inspect or merge into the
/// session sink; never mutates `target`.
pub fn verify_target(target: &Target) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    if target.name.is_empty() {
        diagnostics.error("target has no name");
    }
    if target.entry_symbol.is_none() {
        diagnostics.error(format!("target \"{}\" has no entry symbol", target.name));
    }
    if target.build_files.is_empty() {
        diagnostics.error(format!("target \"{}\" has no build files", target.name));
    }
    if target.output_directory.is_none() {
        diagnostics.error(format!("target \"{}\" has no output directory", target.name));
    }

    if target.dependencies.is_empty() {
        diagnostics.debug(format!("target \"{}\" has no dependencies", target.name));
    }
    if target.include_directories.is_empty() {
        diagnostics.debug(format!("target \"{}\" has no include directories", target.name));
    }
    if target.definitions.is_empty() {
        diagnostics.debug(format!("target \"{}\" has no definitions", target.name));
    }

    if !target.built {
        diagnostics.warn(format!("target \"{}\" has not been built yet", target.name));
    }

    diagnostics
}
