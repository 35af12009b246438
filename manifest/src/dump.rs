//! Manifest dump: a deterministic, human-readable rendering of
//! everything the interpreter built, in the vein of a `build(dump=...,
//! dump_to_file=...)` report. Presentation only — never affects
//! diagnostics or target contents.

use crate::model::{FileList, Target};
use std::collections::HashMap;
use std::fmt::Write as _;

pub const DUMP_FILE_NAME: &str = "_smake_build_dump_.txt";

pub fn render(
    labels: &std::collections::HashSet<String>,
    flists: &HashMap<String, FileList>,
    targets: &HashMap<String, Target>,
) -> String {
    let mut out = String::new();

    let mut label_names: Vec<&String> = labels.iter().collect();
    label_names.sort();
    writeln!(out, "labels:").unwrap();
    for name in label_names {
        writeln!(out, "  {}", name).unwrap();
    }

    let mut flist_names: Vec<&String> = flists.keys().collect();
    flist_names.sort();
    writeln!(out, "file lists:").unwrap();
    for name in flist_names {
        let flist = &flists[name];
        writeln!(out, "  {}:", name).unwrap();
        let mut files: Vec<String> = flist.files.iter().map(|p| p.display().to_string()).collect();
        files.sort();
        for file in files {
            writeln!(out, "    {}", file).unwrap();
        }
    }

    let mut target_names: Vec<&String> = targets.keys().collect();
    target_names.sort();
    writeln!(out, "targets:").unwrap();
    for name in target_names {
        let target = &targets[name];
        writeln!(out, "  {}:", name).unwrap();
        writeln!(out, "    working_directory: {}", target.working_directory.display()).unwrap();

        let mut include_dirs: Vec<String> = target
            .include_directories
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        include_dirs.sort();
        writeln!(out, "    include_directories: [{}]", include_dirs.join(", ")).unwrap();

        let mut build_files: Vec<String> = target
            .build_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        build_files.sort();
        writeln!(out, "    build_files: [{}]", build_files.join(", ")).unwrap();

        writeln!(
            out,
            "    entry_symbol: {}",
            target.entry_symbol.as_deref().unwrap_or("<none>")
        )
        .unwrap();

        let mut definitions: Vec<String> = target
            .definitions
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        definitions.sort();
        writeln!(out, "    definitions: [{}]", definitions.join(", ")).unwrap();

        writeln!(out, "    dependencies: [{}]", target.dependencies.join(", ")).unwrap();

        writeln!(
            out,
            "    output: {}",
            match (&target.output_directory, &target.output_name) {
                (Some(dir), Some(name)) => format!("{}/{}", dir.display(), name),
                (Some(dir), None) => dir.display().to_string(),
                (None, _) => "<none>".to_string(),
            }
        )
        .unwrap();

        writeln!(
            out,
            "    format: {}",
            target
                .format
                .map(|f| format!("{:?}", f).to_lowercase())
                .unwrap_or_else(|| "<none>".to_string())
        )
        .unwrap();

        writeln!(out, "    built: {}", target.built).unwrap();
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Target;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;

    #[test]
    fn dump_is_sorted_and_deterministic() {
        let mut targets = HashMap::new();
        let mut b = Target::new("b", PathBuf::from("/m"));
        b.dependencies.push("a".to_string());
        targets.insert("b".to_string(), b);
        targets.insert("a".to_string(), Target::new("a", PathBuf::from("/m")));

        let labels: HashSet<String> = ["zeta", "alpha"].iter().map(|s| s.to_string()).collect();
        let flists = HashMap::new();

        let rendered = render(&labels, &flists, &targets);
        let alpha_idx = rendered.find("alpha").unwrap();
        let zeta_idx = rendered.find("zeta").unwrap();
        assert!(alpha_idx < zeta_idx);

        let a_idx = rendered.find("  a:").unwrap();
        let b_idx = rendered.find("  b:").unwrap();
        assert!(a_idx < b_idx);
    }
}
