#[macro_use]
extern crate clap;

use clap::{Arg, SubCommand};
use manifest::Target;
use spasm::{Diagnostic, Diagnostics};
use std::path::PathBuf;
use std::process;

fn main() {
    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("build")
                .about("Interprets a manifest and assembles every target it declares")
                .arg(
                    Arg::with_name("MANIFEST")
                        .help("Path to the build manifest")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("isa")
                        .long("isa")
                        .takes_value(true)
                        .value_name("FILE")
                        .help("Instruction-set CSV to assemble against"),
                )
                .arg(
                    Arg::with_name("dump")
                        .long("dump")
                        .help("Print the manifest dump to stdout"),
                )
                .arg(
                    Arg::with_name("dump_file")
                        .long("dump-file")
                        .help("Also write the manifest dump to _smake_build_dump_.txt"),
                ),
        )
        .get_matches();

    let exit_code = match matches.subcommand() {
        ("build", Some(sub)) => run_build(sub),
        _ => {
            eprintln!("no subcommand given, try `spasm build <manifest>`");
            1
        }
    };

    process::exit(exit_code);
}

fn run_build(sub: &clap::ArgMatches) -> i32 {
    let manifest_path = PathBuf::from(sub.value_of("MANIFEST").unwrap());
    let isa_path = sub.value_of("isa").map(PathBuf::from);
    let want_dump = sub.is_present("dump") || sub.is_present("dump_file");
    let write_dump_file = sub.is_present("dump_file");

    let mut diagnostics = Diagnostics::new();

    let manifest = match manifest::interpret_manifest_file(&manifest_path, &mut diagnostics) {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("could not read manifest \"{}\": {}", manifest_path.display(), err);
            return 1;
        }
    };

    if want_dump {
        let manifest_dir = manifest_path.parent().unwrap_or_else(|| std::path::Path::new("."));
        match manifest::dump(&manifest, manifest_dir, write_dump_file) {
            Ok(rendered) => print!("{}", rendered),
            Err(err) => eprintln!("could not write manifest dump: {}", err),
        }
    }

    let mut session = asm::Session::new(manifest.targets.values().next().map_or_else(
        || PathBuf::from("."),
        |target| target.working_directory.clone(),
    ));

    if let Some(isa_path) = &isa_path {
        if let Err(err) = session.load_instruction_set(isa_path) {
            eprintln!("could not load instruction set \"{}\": {}", isa_path.display(), err);
            return 1;
        }
    }

    let mut targets: Vec<Target> = manifest.targets.into_iter().map(|(_, target)| target).collect();
    targets.sort_by(|a, b| a.name.cmp(&b.name));

    for mut target in targets {
        diagnostics.extend(manifest::verify_target(&target));

        if session.instruction_set().is_none() {
            diagnostics.error(format!(
                "target \"{}\" was not assembled: no instruction set was loaded (pass --isa)",
                target.name
            ));
            continue;
        }

        match session.assemble_target(&mut target) {
            Ok(_) => target.built = true,
            Err(err) => diagnostics.fatal_error(format!("target \"{}\" failed: {}", target.name, err)),
        }
    }

    diagnostics.extend(session.diagnostics);
    print_diagnostics(diagnostics)
}

/// Prints the three queues in debug, warning, error order and
/// returns the process exit code: zero iff the error queue was empty.
fn print_diagnostics(mut diagnostics: Diagnostics) -> i32 {
    while let Some(debug) = diagnostics.consume_debug() {
        print_line(&debug);
    }
    while let Some(warning) = diagnostics.consume_warning() {
        print_line(&warning);
    }
    let mut had_errors = false;
    while let Some(error) = diagnostics.consume_error() {
        had_errors = true;
        print_line(&error);
    }

    if had_errors {
        1
    } else {
        0
    }
}

fn print_line(diagnostic: &Diagnostic) {
    println!("{}", diagnostic);
}
