//! The assembler crate: tokenizer, preprocessor, label arena, and the
//! front-end that ties them together into a per-target assembly pass.

mod frontend;
mod instruction;
mod labels;
mod preprocessor;
mod tokenizer;
mod variable;

pub use frontend::Assembled;
pub use instruction::{ArgumentValue, Instruction};
pub use labels::{Handle, LabelArena, Scope, ScopeEntry};
pub use variable::{VariableType, VariableValue};

use isa::InstructionSet;
use manifest::Target;
use spasm::Diagnostics;
use std::path::{Path, PathBuf};

/// Owns the diagnostics sink and the loaded instruction set for one
/// invocation of the toolchain. A session assembles any
/// number of targets against the same instruction set.
pub struct Session {
    pub diagnostics: Diagnostics,
    pub working_directory: PathBuf,
    instruction_set: Option<InstructionSet>,
}

impl Session {
    pub fn new(working_directory: impl Into<PathBuf>) -> Session {
        Session {
            diagnostics: Diagnostics::new(),
            working_directory: working_directory.into(),
            instruction_set: None,
        }
    }

    /// Loads the instruction-set table once; subsequent targets assembled
    /// by this session all share it.
    pub fn load_instruction_set(&mut self, path: impl AsRef<Path>) -> spasm::Result<()> {
        let set = InstructionSet::load_from_path(path, &mut self.diagnostics)?;
        self.instruction_set = Some(set);
        Ok(())
    }

    pub fn instruction_set(&self) -> Option<&InstructionSet> {
        self.instruction_set.as_ref()
    }

    /// Preprocesses and assembles one target. Requires an instruction set
    /// to already be loaded, since the front-end cannot classify
    /// instruction lines without one.
    pub fn assemble_target(&mut self, target: &mut Target) -> spasm::Result<Assembled> {
        let instruction_set = match &self.instruction_set {
            Some(set) => set,
            None => {
                return Err(spasm::Error::Internal(
                    "assemble_target called before an instruction set was loaded".to_string(),
                ))
            }
        };

        let tokens = preprocessor::preprocess_target(target, &mut self.diagnostics)?;
        Ok(frontend::assemble_tokens(&tokens, instruction_set, &mut self.diagnostics))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_isa(path: &Path) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(
            file,
            "INSTRUCTION_NAME,OPCODE,BITFLAGS,ARGUMENT_1_TYPE,ARGUMENT_1_RANGE,ARGUMENT_1_BIT_LENGTH"
        )
        .unwrap();
        writeln!(file, "NOP,0,0,,,").unwrap();
    }

    #[test]
    fn assembles_a_minimal_target_end_to_end() {
        let dir = std::env::temp_dir().join(format!("spasm-session-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let isa_path = dir.join("isa.csv");
        write_isa(&isa_path);

        let source_path = dir.join("main.spasm");
        std::fs::write(&source_path, ".start\nNOP\n").unwrap();

        let mut target = Target::new("demo", dir.clone());
        target.build_files.insert(source_path);

        let mut session = Session::new(dir.clone());
        session.load_instruction_set(&isa_path).unwrap();
        let assembled = session.assemble_target(&mut target).unwrap();

        assert!(!session.diagnostics.has_errors());
        let start = assembled.arena.scope(assembled.root).children["start"];
        assert_eq!(assembled.arena.scope(start).entries.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
