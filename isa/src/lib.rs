//! The instruction-set loader: reads the tabular opcode description and
//! builds an immutable `InstructionSet` registry consulted by the
//! assembler front-end. Plays the same role `vasm::instructions` plays
//! for its fixed grammar, but data-driven from an external CSV table
//! instead of a fixed `pest` grammar, since this toolchain's ISA is not
//! baked in.

use regex::Regex;
use spasm::Diagnostics;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use util::{parse_binary_flags, parse_int_literal, EnumFromStr, ParseEnumError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandType {
    Register,
    Immediate,
    Label,
    Variable,
}

impl EnumFromStr for OperandType {
    fn from_str(s: &str) -> Result<OperandType, ParseEnumError> {
        match s.trim().to_uppercase().as_str() {
            "REGISTER" => Ok(OperandType::Register),
            "IMMEDIATE" => Ok(OperandType::Immediate),
            "LABEL" => Ok(OperandType::Label),
            "VARIABLE" => Ok(OperandType::Variable),
            other => Err(ParseEnumError {
                value: other.to_string(),
                enum_name: "OperandType",
            }),
        }
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandType::Register => "REGISTER",
            OperandType::Immediate => "IMMEDIATE",
            OperandType::Label => "LABEL",
            OperandType::Variable => "VARIABLE",
        };
        write!(f, "{}", name)
    }
}

/// A colon-separated union of operand type tags, e.g. `REGISTER:IMMEDIATE`.
fn parse_operand_types(raw: &str) -> Result<Vec<OperandType>, ParseEnumError> {
    raw.split(':').map(OperandType::from_str).collect()
}

/// `{immediate_min, immediate_max, valid_registers}`. `isValid` dispatches
/// on the operand's declared type union: LABEL and VARIABLE are dispatched
/// too rather than silently rejected, since their resolution is deferred
/// rather than unsupported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperandRange {
    pub immediate_min: Option<i64>,
    pub immediate_max: Option<i64>,
    pub valid_registers: HashSet<String>,
}

impl OperandRange {
    pub fn immediate_in_range(&self, value: i64) -> bool {
        match (self.immediate_min, self.immediate_max) {
            (Some(min), Some(max)) => value >= min && value <= max,
            _ => false,
        }
    }
}

/// The full description of one operand slot: its declared type union, the
/// range predicate that governs it, and the bit width it occupies in the
/// encoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperandSpec {
    pub types: Vec<OperandType>,
    pub range: OperandRange,
    pub bit_length: u32,
}

impl OperandSpec {
    /// True if `token` satisfies at least one of this slot's declared
    /// types. REGISTER matches by exact name; IMMEDIATE parses the token
    /// and checks the numeric range; LABEL/VARIABLE are accepted
    /// unconditionally — their resolution happens after assembly, which is
    /// out of this front-end's scope.
    pub fn is_valid(&self, token: &str) -> bool {
        self.types.iter().any(|ty| match ty {
            OperandType::Register => self.range.valid_registers.contains(token),
            OperandType::Immediate => parse_int_literal(token)
                .map(|value| self.range.immediate_in_range(value))
                .unwrap_or(false),
            OperandType::Label | OperandType::Variable => true,
        })
    }
}

/// `{name, opcode_bits, flag_bits, operands}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionType {
    pub name: String,
    pub opcode_bits: u32,
    pub flag_bits: u32,
    pub operands: Vec<OperandSpec>,
}

/// Immutable once loaded. Maps instruction mnemonic (case-insensitive,
/// stored upper-case) to its descriptor, and tracks every register name
/// seen across all `ARGUMENT_i_RANGE` columns so the tokenizer/assembler
/// can recognize bare register identifiers without re-deriving them from
/// every instruction row.
#[derive(Clone, Debug, Default)]
pub struct InstructionSet {
    instructions: HashMap<String, InstructionType>,
    known_registers: HashSet<String>,
}

impl InstructionSet {
    pub fn get(&self, name: &str) -> Option<&InstructionType> {
        self.instructions.get(&name.to_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instructions.contains_key(&name.to_uppercase())
    }

    pub fn known_registers(&self) -> &HashSet<String> {
        &self.known_registers
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Loads a header-row CSV instruction table. Malformed rows
    /// are skipped with an error pushed to `diagnostics`; a well-formed row
    /// elsewhere in the file is unaffected by one bad row.
    pub fn load_from_path(
        path: impl AsRef<Path>,
        diagnostics: &mut Diagnostics,
    ) -> spasm::Result<InstructionSet> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|err| {
            spasm::Error::Internal(format!(
                "could not open instruction-set file \"{}\": {}",
                path.display(),
                err
            ))
        })?;

        let mut set = InstructionSet::default();
        let headers = reader
            .headers()
            .map_err(|err| spasm::Error::Internal(format!("unreadable CSV header: {}", err)))?
            .clone();

        for (row_number, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    diagnostics.error(format!(
                        "instruction-set row {}: unreadable CSV record: {}",
                        row_number + 2,
                        err
                    ));
                    continue;
                }
            };
            let row: HashMap<&str, &str> = headers
                .iter()
                .zip(record.iter())
                .map(|(key, value)| (key, value))
                .collect();

            match parse_row(&row) {
                Ok(instruction) => {
                    for operand in &instruction.operands {
                        set.known_registers
                            .extend(operand.range.valid_registers.iter().cloned());
                    }
                    set.instructions
                        .insert(instruction.name.to_uppercase(), instruction);
                }
                Err(message) => {
                    diagnostics.error(format!("instruction-set row {}: {}", row_number + 2, message));
                }
            }
        }

        Ok(set)
    }
}

fn parse_row(row: &HashMap<&str, &str>) -> Result<InstructionType, String> {
    let name = row
        .get("INSTRUCTION_NAME")
        .ok_or("missing INSTRUCTION_NAME column")?
        .trim();
    if name.is_empty() {
        return Err("empty INSTRUCTION_NAME".to_string());
    }

    let opcode_bits = row
        .get("OPCODE")
        .ok_or("missing OPCODE column")?
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("OPCODE \"{}\" is not a non-negative integer", row["OPCODE"]))?;

    let flag_bits = match row.get("BITFLAGS").map(|s| s.trim()) {
        Some(raw) if !raw.is_empty() => {
            parse_binary_flags(raw).map_err(|err| format!("BITFLAGS: {}", err))?
        }
        _ => 0,
    };

    let mut operands = Vec::new();
    let mut index = 1;
    loop {
        let type_key = format!("ARGUMENT_{}_TYPE", index);
        let range_key = format!("ARGUMENT_{}_RANGE", index);
        let bits_key = format!("ARGUMENT_{}_BIT_LENGTH", index);

        let type_raw = match row.get(type_key.as_str()) {
            Some(raw) if !raw.trim().is_empty() => raw.trim(),
            _ => break,
        };

        let types = parse_operand_types(type_raw)
            .map_err(|err| format!("{} ({})", err, type_key))?;

        let range_raw = row.get(range_key.as_str()).map(|s| s.trim()).unwrap_or("");
        let range = parse_range(range_raw).map_err(|err| format!("{}: {}", range_key, err))?;

        let bit_length = row
            .get(bits_key.as_str())
            .ok_or_else(|| format!("missing {}", bits_key))?
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("{} is not a non-negative integer", bits_key))?;

        operands.push(OperandSpec {
            types,
            range,
            bit_length,
        });
        index += 1;
    }

    Ok(InstructionType {
        name: name.to_string(),
        opcode_bits,
        flag_bits,
        operands,
    })
}

/// Parses `ARGUMENT_i_RANGE`: an optional `<min>:<max>` immediate
/// spec (extracted first, consumed out of the string) followed by any
/// number of register specs — either `rN-rM` GPR ranges or bare register
/// identifiers — in any order, separated by any non-register character.
fn parse_range(raw: &str) -> Result<OperandRange, String> {
    if raw.is_empty() {
        return Ok(OperandRange::default());
    }

    let immediate_re = Regex::new(r"(-?\d+):(-?\d+)").unwrap();
    let mut immediate_min = None;
    let mut immediate_max = None;
    let remainder: String = if let Some(caps) = immediate_re.captures(raw) {
        let min = caps[1]
            .parse::<i64>()
            .map_err(|_| format!("bad immediate lower bound in \"{}\"", raw))?;
        let max = caps[2]
            .parse::<i64>()
            .map_err(|_| format!("bad immediate upper bound in \"{}\"", raw))?;
        if min > max {
            return Err(format!("immediate range {}:{} has min > max", min, max));
        }
        immediate_min = Some(min);
        immediate_max = Some(max);
        let whole = caps.get(0).unwrap();
        format!("{}{}", &raw[..whole.start()], &raw[whole.end()..])
    } else {
        raw.to_string()
    };

    let mut valid_registers = HashSet::new();
    let gpr_range_re = Regex::new(r"(?i)\br(\d+)-r(\d+)\b").unwrap();
    let mut consumed = remainder.clone();
    for caps in gpr_range_re.captures_iter(&remainder) {
        let lo: u32 = caps[1]
            .parse()
            .map_err(|_| format!("bad register range in \"{}\"", raw))?;
        let hi: u32 = caps[2]
            .parse()
            .map_err(|_| format!("bad register range in \"{}\"", raw))?;
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        for n in lo..=hi {
            valid_registers.insert(format!("r{}", n));
        }
        consumed = consumed.replacen(&caps[0], " ", 1);
    }

    let identifier_re = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
    for token in identifier_re.find_iter(&consumed) {
        valid_registers.insert(token.as_str().to_lowercase());
    }

    Ok(OperandRange {
        immediate_min,
        immediate_max,
        valid_registers,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> HashMap<&str, &str> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn parses_simple_row_with_one_register_operand() {
        let r = row(&[
            ("INSTRUCTION_NAME", "ADD"),
            ("OPCODE", "3"),
            ("BITFLAGS", "0000"),
            ("ARGUMENT_1_TYPE", "REGISTER"),
            ("ARGUMENT_1_RANGE", "r0-r3"),
            ("ARGUMENT_1_BIT_LENGTH", "4"),
        ]);
        let instr = parse_row(&r).unwrap();
        assert_eq!(instr.name, "ADD");
        assert_eq!(instr.opcode_bits, 3);
        assert_eq!(instr.operands.len(), 1);
        assert!(instr.operands[0].is_valid("r0"));
        assert!(instr.operands[0].is_valid("r3"));
        assert!(!instr.operands[0].is_valid("r4"));
    }

    #[test]
    fn union_type_accepts_either_branch() {
        let r = row(&[
            ("INSTRUCTION_NAME", "ADI"),
            ("OPCODE", "5"),
            ("BITFLAGS", "0001"),
            ("ARGUMENT_1_TYPE", "REGISTER:IMMEDIATE"),
            ("ARGUMENT_1_RANGE", "-128:127 r0-r1"),
            ("ARGUMENT_1_BIT_LENGTH", "8"),
        ]);
        let instr = parse_row(&r).unwrap();
        let spec = &instr.operands[0];
        assert!(spec.is_valid("r0"));
        assert!(spec.is_valid("100"));
        assert!(!spec.is_valid("200"));
        assert!(!spec.is_valid("r9"));
    }

    #[test]
    fn label_and_variable_operands_are_always_valid() {
        let r = row(&[
            ("INSTRUCTION_NAME", "JMP"),
            ("OPCODE", "9"),
            ("BITFLAGS", "0"),
            ("ARGUMENT_1_TYPE", "LABEL:VARIABLE"),
            ("ARGUMENT_1_RANGE", ""),
            ("ARGUMENT_1_BIT_LENGTH", "16"),
        ]);
        let instr = parse_row(&r).unwrap();
        assert!(instr.operands[0].is_valid("anything"));
    }

    #[test]
    fn missing_bit_length_is_an_error() {
        let r = row(&[
            ("INSTRUCTION_NAME", "NOP"),
            ("OPCODE", "0"),
            ("BITFLAGS", "0"),
            ("ARGUMENT_1_TYPE", "REGISTER"),
            ("ARGUMENT_1_RANGE", "r0"),
        ]);
        assert!(parse_row(&r).is_err());
    }

    #[test]
    fn unknown_operand_type_tag_is_an_error() {
        let r = row(&[
            ("INSTRUCTION_NAME", "BAD"),
            ("OPCODE", "1"),
            ("BITFLAGS", "0"),
            ("ARGUMENT_1_TYPE", "FROBNICATE"),
            ("ARGUMENT_1_RANGE", ""),
            ("ARGUMENT_1_BIT_LENGTH", "4"),
        ]);
        assert!(parse_row(&r).is_err());
    }
}
