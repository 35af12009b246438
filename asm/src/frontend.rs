//! The assembler front-end: per-token recognition of labels,
//! variable declarations, and instructions against the loaded
//! instruction set, producing a label/variable tree plus instruction
//! records with typed arguments. Final machine-code encoding is out of
//! scope — this stage only validates and classifies.

use crate::instruction::{ArgumentValue, Instruction};
use crate::labels::{Handle, LabelArena};
use crate::variable::{auto_size, Variable, VariableType, VariableValue};
use isa::{InstructionSet, InstructionType, OperandSpec, OperandType};
use spasm::{Diagnostics, Token};
use util::parse_int_literal;

pub struct Assembled {
    pub arena: LabelArena,
    pub root: Handle,
}

/// Consumes the target's flattened post-preprocessor token stream and
/// builds the label arena and instruction list. `current_label` tracks
/// the innermost open label scope, starting at the arena root.
pub fn assemble_tokens(
    tokens: &[Token],
    instruction_set: &InstructionSet,
    diagnostics: &mut Diagnostics,
) -> Assembled {
    let mut arena = LabelArena::new();
    let root = arena.root();
    let mut current = root;

    let mut i = 0;
    while i < tokens.len() {
        if is_separator(&tokens[i].value) {
            i += 1;
            continue;
        }

        let token = &tokens[i];

        if let Some(name) = label_name(&token.value) {
            match arena.declare_label(current, name, token) {
                Ok(handle) => current = handle,
                Err(message) => diagnostics.error(format!("{}: {}", token.file_location(), message)),
            }
            i += 1;
            continue;
        }

        if let Some(var_type) = VariableType::from_keyword(&token.value) {
            i = parse_variable_line(tokens, i + 1, var_type, current, &mut arena, diagnostics);
            continue;
        }

        if let Some(instruction_type) = instruction_set.get(&token.value) {
            let (next, instruction) = parse_instruction_line(tokens, i, instruction_type, diagnostics);
            if let Some(instruction) = instruction {
                arena.push_instruction(current, instruction);
            }
            i = next;
            continue;
        }

        diagnostics.error(format!(
            "{}: unrecognized token \"{}\"",
            token.file_location(),
            token.value
        ));
        i += 1;
    }

    Assembled { arena, root }
}

/// Instructions accept commas as an optional separator; since the
/// tokenizer does not treat `,` specially, it is almost always still
/// attached to the preceding operand (`r1,`). A token is a pure separator
/// once its comma padding is stripped to nothing.
fn is_separator(value: &str) -> bool {
    !value.is_empty() && value.trim_matches(',').is_empty()
}

fn operand_text(raw: &str) -> &str {
    raw.trim_matches(',')
}

fn label_name(value: &str) -> Option<&str> {
    if value.len() > 1 && value.starts_with('.') {
        Some(value[1..].trim_end_matches(':'))
    } else {
        None
    }
}

fn parse_variable_line(
    tokens: &[Token],
    start: usize,
    var_type: VariableType,
    scope: Handle,
    arena: &mut LabelArena,
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut i = start;

    let explicit_size = if var_type == VariableType::Text {
        match tokens.get(i) {
            Some(tok) => {
                let size = if tok.value == "auto" {
                    None
                } else {
                    match tok.value.parse::<u32>() {
                        Ok(n) => Some(n),
                        Err(_) => {
                            diagnostics.error(format!(
                                "{}: TEXT size must be a positive integer or \"auto\", found \"{}\"",
                                tok.file_location(),
                                tok.value
                            ));
                            return i + 1;
                        }
                    }
                };
                i += 1;
                size
            }
            None => {
                diagnostics.error("TEXT declaration is missing a size".to_string());
                return i;
            }
        }
    } else {
        None
    };

    let name_token = match tokens.get(i) {
        Some(tok) => tok,
        None => {
            diagnostics.error("variable declaration is missing a name".to_string());
            return i;
        }
    };
    i += 1;

    let value_token = match tokens.get(i) {
        Some(tok) => tok,
        None => {
            diagnostics.error(format!("variable \"{}\" is missing a value", name_token.value));
            return i;
        }
    };
    i += 1;

    let value = if value_token.value.starts_with('"') {
        let inner = &value_token.value[1..value_token.value.len() - 1];
        VariableValue::Bytes(inner.replace("\\\"", "\"").into_bytes())
    } else {
        match parse_int_literal(operand_text(&value_token.value)) {
            Ok(n) => VariableValue::Int(n),
            Err(_) => {
                diagnostics.error(format!(
                    "{}: \"{}\" is not a valid variable value",
                    value_token.file_location(),
                    value_token.value
                ));
                return i;
            }
        }
    };

    let size_bytes = var_type.fixed_size().unwrap_or_else(|| explicit_size.unwrap_or_else(|| auto_size(&value)));

    let variable = Variable {
        name: name_token.value.clone(),
        address: None,
        size_bytes,
        ty: var_type,
        value,
        parent_label: Some(scope),
        definition_line: name_token.line,
        definition_file: name_token.filepath.clone(),
    };

    if let Err(message) = arena.declare_variable(scope, variable) {
        diagnostics.error(format!("{}: {}", name_token.file_location(), message));
    }

    i
}

fn parse_instruction_line(
    tokens: &[Token],
    start: usize,
    instruction_type: &InstructionType,
    diagnostics: &mut Diagnostics,
) -> (usize, Option<Instruction>) {
    let mnemonic_token = &tokens[start];
    let mut i = start + 1;
    let mut arguments = Vec::new();
    let mut ok = true;

    for spec in &instruction_type.operands {
        while tokens.get(i).map(|t| is_separator(&t.value)).unwrap_or(false) {
            i += 1;
        }
        let arg_token = match tokens.get(i) {
            Some(tok) => tok,
            None => {
                diagnostics.error(format!(
                    "{}: instruction \"{}\" expects {} operand(s), found fewer",
                    mnemonic_token.file_location(),
                    instruction_type.name,
                    instruction_type.operands.len()
                ));
                return (i, None);
            }
        };

        let text = operand_text(&arg_token.value);
        if !spec.is_valid(text) {
            diagnostics.error(format!(
                "{}: \"{}\" is not a valid operand for \"{}\"",
                arg_token.file_location(),
                text,
                instruction_type.name
            ));
            ok = false;
            i += 1;
            continue;
        }

        arguments.push(classify_argument(spec, text));
        i += 1;
    }

    if ok {
        (
            i,
            Some(Instruction {
                instruction_type: instruction_type.clone(),
                arguments,
            }),
        )
    } else {
        (i, None)
    }
}

fn classify_argument(spec: &OperandSpec, value: &str) -> ArgumentValue {
    if spec.range.valid_registers.contains(value) {
        return ArgumentValue::Register(value.to_string());
    }
    if let Ok(n) = parse_int_literal(value) {
        if spec.range.immediate_in_range(n) {
            return ArgumentValue::Immediate(n);
        }
    }
    if spec.types.contains(&OperandType::Label) {
        return ArgumentValue::Label(value.to_string());
    }
    ArgumentValue::Variable(value.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use isa::InstructionSet;
    use std::io::Write;

    fn isa_with_add() -> InstructionSet {
        let dir = std::env::temp_dir().join(format!("spasm-test-isa-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("isa.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "INSTRUCTION_NAME,OPCODE,BITFLAGS,ARGUMENT_1_TYPE,ARGUMENT_1_RANGE,ARGUMENT_1_BIT_LENGTH,ARGUMENT_2_TYPE,ARGUMENT_2_RANGE,ARGUMENT_2_BIT_LENGTH"
        )
        .unwrap();
        writeln!(file, "ADD,1,0000,REGISTER,r0-r3,4,REGISTER:IMMEDIATE,-8:7 r0-r3,4").unwrap();
        let mut diagnostics = Diagnostics::new();
        let set = InstructionSet::load_from_path(&path, &mut diagnostics).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        assert!(!diagnostics.has_errors());
        set
    }

    #[test]
    fn recognizes_label_variable_and_instruction_lines() {
        let set = isa_with_add();
        let tokens = vec![
            Token::new(".main", 1, "f.spasm"),
            Token::new("WORD", 2, "f.spasm"),
            Token::new("COUNT", 2, "f.spasm"),
            Token::new("4", 2, "f.spasm"),
            Token::new("ADD", 3, "f.spasm"),
            Token::new("r0,", 3, "f.spasm"),
            Token::new("r1", 3, "f.spasm"),
        ];
        let mut diagnostics = Diagnostics::new();
        let assembled = assemble_tokens(&tokens, &set, &mut diagnostics);
        assert!(!diagnostics.has_errors());

        let main_handle = assembled.arena.scope(assembled.root).children["main"];
        let main_scope = assembled.arena.scope(main_handle);
        assert!(main_scope.local_variables.contains_key("COUNT"));
        assert_eq!(main_scope.entries.len(), 2); // variable + instruction
    }

    #[test]
    fn invalid_operand_is_reported() {
        let set = isa_with_add();
        let tokens = vec![
            Token::new("ADD", 1, "f.spasm"),
            Token::new("r9,", 1, "f.spasm"),
            Token::new("r1", 1, "f.spasm"),
        ];
        let mut diagnostics = Diagnostics::new();
        let assembled = assemble_tokens(&tokens, &set, &mut diagnostics);
        assert!(diagnostics.has_errors());
        assert!(assembled.arena.scope(assembled.root).entries.is_empty());
    }
}
