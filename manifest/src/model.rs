//! The data model built by the manifest interpreter: target descriptors,
//! file lists, and the small enums that appear in directive arguments.

use std::collections::BTreeSet;
use std::path::PathBuf;
use util::{EnumFromStr, ParseEnumError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Bin,
    Hex,
    Elf,
}

impl EnumFromStr for Format {
    fn from_str(s: &str) -> Result<Format, ParseEnumError> {
        match s.trim().to_lowercase().as_str() {
            "bin" => Ok(Format::Bin),
            "hex" => Ok(Format::Hex),
            "elf" => Ok(Format::Elf),
            other => Err(ParseEnumError {
                value: other.to_string(),
                enum_name: "Format",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Shallow,
    /// `cdepthN`: recurse up to `N` directories deep.
    Depth(u32),
    All,
}

impl EnumFromStr for SearchMode {
    fn from_str(s: &str) -> Result<SearchMode, ParseEnumError> {
        let lower = s.trim().to_lowercase();
        if lower == "shallow" {
            return Ok(SearchMode::Shallow);
        }
        if lower == "all" {
            return Ok(SearchMode::All);
        }
        if let Some(suffix) = lower.strip_prefix("cdepth") {
            if let Ok(depth) = suffix.parse::<u32>() {
                return Ok(SearchMode::Depth(depth));
            }
        }
        Err(ParseEnumError {
            value: s.to_string(),
            enum_name: "SearchMode",
        })
    }
}

/// A named, re-usable set of file paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileList {
    pub name: String,
    pub files: BTreeSet<PathBuf>,
}

impl FileList {
    pub fn new(name: impl Into<String>) -> FileList {
        FileList {
            name: name.into(),
            files: BTreeSet::new(),
        }
    }
}

/// A build unit. `dependencies` is kept in
/// declaration order; acyclicity is enforced by the interpreter at
/// `.depends` time, not by this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub working_directory: PathBuf,
    pub include_directories: BTreeSet<PathBuf>,
    pub build_files: BTreeSet<PathBuf>,
    pub entry_symbol: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub output_name: Option<String>,
    pub definitions: Vec<(String, String)>,
    pub dependencies: Vec<String>,
    pub format: Option<Format>,
    pub built: bool,
}

impl Target {
    pub fn new(name: impl Into<String>, working_directory: PathBuf) -> Target {
        Target {
            name: name.into(),
            working_directory,
            include_directories: BTreeSet::new(),
            build_files: BTreeSet::new(),
            entry_symbol: None,
            output_directory: None,
            output_name: None,
            definitions: Vec::new(),
            dependencies: Vec::new(),
            format: None,
            built: false,
        }
    }

    pub fn has_definition(&self, name: &str) -> bool {
        self.definitions.iter().any(|(n, _)| n == name)
    }
}
