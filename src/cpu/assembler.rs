use std::fmt;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::instruction::{Fields, Instruction, MOV_IMMEDIATE_BASE};
use super::opcode::{JumpKind, Opcode, JUMP_SENTINEL};

const IMMEDIATE_MASK: u32 = 0b11;
const JUMP_TARGET_MASK: u32 = 0b111;

// decodes as ADD R0, R0
pub const NOP: u8 = 0x00;

pub const REFERENCE_ENCODINGS: &'static [(&'static str, u8)] = &[
    ("MOV R1, #1", 0b101_01_101), // immediate 1 stored as 5
    ("MOV R2, R1", 0b101_10_001),
    ("ADD R1, R2", 0b000_01_010),
    ("MUL R2, R1", 0b001_10_001),
    ("JMP 7", 0b011_11_111),
    ("JZ 3", 0b100_11_011),
    ("CMP R1, R2", 0b110_01_010),
];

pub fn assemble(asm: &str) -> Assembly {
    assemble_program(asm.lines())
}

// A bad line becomes a NOP word with an error diagnostic, so later lines keep
// their addresses.
pub fn assemble_program<I, S>(lines: I) -> Assembly
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut assembly = Assembly::default();
    for (idx, line) in lines.into_iter().enumerate() {
        let source = line.as_ref().trim();
        let line_no = idx + 1;
        let word = match encode(source) {
            Ok(None) => continue,
            Ok(Some(Encoded { word, warnings })) => {
                for w in warnings {
                    assembly.push_diagnostic(line_no, source, DiagnosticKind::Warning(w));
                }
                word
            }
            Err(e) => {
                assembly.push_diagnostic(line_no, source, DiagnosticKind::Error(e));
                NOP
            }
        };
        let f = Fields::decode(word);
        debug!(
            line = line_no,
            source,
            "{:08b} -> 0x{:02X} (op:{:03b} dest:{:02b} src:{:03b})",
            word,
            word,
            f.opcode,
            f.dest,
            f.src_or_imm
        );
        assembly.lines.push(AssembledLine {
            line: line_no,
            source: source.to_string(),
            word,
        });
    }
    assembly
}

pub fn encode(line: &str) -> Result<Option<Encoded>, AsmError> {
    Ok(parse_statement(line)?.map(|s| s.assemble()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub word: u8,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    ImmediateTruncated { value: String, truncated: u8 },
    JumpTargetTruncated { target: String, truncated: u8 },
    ThreeOperandUnsupported { mnemonic: String },
    UnknownInstruction { mnemonic: String },
    AliasedAsJump { opcode: Opcode, jump: JumpKind },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ImmediateTruncated { value, truncated } => {
                write!(f, "immediate value {} truncated to {}", value, truncated)
            }
            Warning::JumpTargetTruncated { target, truncated } => {
                write!(f, "jump address {} truncated to {}", target, truncated)
            }
            Warning::ThreeOperandUnsupported { mnemonic } => write!(
                f,
                "three-operand {} not directly supported, assembled as NOP (use MOV first)",
                mnemonic
            ),
            Warning::UnknownInstruction { mnemonic } => {
                write!(f, "unknown instruction '{}', assembled as NOP", mnemonic)
            }
            Warning::AliasedAsJump { opcode, jump } => write!(
                f,
                "{} with destination R3 shares the {} encoding and executes as {}",
                opcode, jump, jump
            ),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("unknown register '{0}', expected R0-R3")]
    UnknownRegister(String),

    #[error("{mnemonic} is missing an operand")]
    MissingOperand { mnemonic: String },

    #[error("unexpected operand '{operand}' for {mnemonic}")]
    UnexpectedOperand { mnemonic: String, operand: String },

    #[error("malformed number '{0}'")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Warning(Warning),
    Error(AsmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based source line.
    pub line: usize,
    pub source: String,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Error(_))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Warning(w) => {
                write!(f, "line {}: warning: {} ({})", self.line, w, self.source)
            }
            DiagnosticKind::Error(e) => {
                write!(f, "line {}: error: {} ({})", self.line, e, self.source)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledLine {
    pub line: usize,
    pub source: String,
    pub word: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub lines: Vec<AssembledLine>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Assembly {
    pub fn bytes(&self) -> Vec<u8> {
        self.lines.iter().map(|l| l.word).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn listing(&self) -> String {
        self.lines
            .iter()
            .map(|l| {
                let f = Fields::decode(l.word);
                format!(
                    "Line {:2}: {:20} -> {:08b} -> 0x{:02X} (op:{:03b} dest:{:02b} src:{:03b})",
                    l.line, l.source, l.word, l.word, f.opcode, f.dest, f.src_or_imm
                )
            })
            .join("\n")
    }

    fn push_diagnostic(&mut self, line: usize, source: &str, kind: DiagnosticKind) {
        let diagnostic = Diagnostic {
            line,
            source: source.to_string(),
            kind,
        };
        debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

#[derive(Debug, PartialEq)]
enum Statement {
    Nop,
    MovImmediate { dest: u8, value: Number },
    MovRegister { dest: u8, src: u8 },
    // two-operand ALU forms and CMP
    Binary { opcode: Opcode, dest: u8, src: u8 },
    ThreeOperand { opcode: Opcode },
    Not { dest: u8 },
    Jump { kind: JumpKind, target: Number },
    Unknown { mnemonic: String },
}

impl Statement {
    fn assemble(&self) -> Encoded {
        let mut warnings = vec![];
        let word = match self {
            Statement::Nop => NOP,
            Statement::MovImmediate { dest, value } => {
                let (imm, lossy) = value.masked(IMMEDIATE_MASK);
                if lossy {
                    warnings.push(Warning::ImmediateTruncated {
                        value: value.text.clone(),
                        truncated: imm,
                    });
                }
                Fields::new(Opcode::MOV.bits(), *dest, imm + MOV_IMMEDIATE_BASE).encode()
            }
            Statement::MovRegister { dest, src } => Instruction::AluOrMov {
                opcode: Opcode::MOV,
                dest: *dest,
                src: *src,
            }
            .encode(),
            Statement::Binary { opcode, dest, src } => {
                if *dest == JUMP_SENTINEL {
                    if let Some(jump) = opcode.aliased_jump() {
                        warnings.push(Warning::AliasedAsJump {
                            opcode: *opcode,
                            jump,
                        });
                    }
                }
                Fields::new(opcode.bits(), *dest, *src).encode()
            }
            Statement::ThreeOperand { opcode } => {
                warnings.push(Warning::ThreeOperandUnsupported {
                    mnemonic: opcode.mnemonic().to_string(),
                });
                NOP
            }
            Statement::Not { dest } => Fields::new(Opcode::NOT.bits(), *dest, 0).encode(),
            Statement::Jump { kind, target } => {
                let (truncated, lossy) = target.masked(JUMP_TARGET_MASK);
                if lossy {
                    warnings.push(Warning::JumpTargetTruncated {
                        target: target.text.clone(),
                        truncated,
                    });
                }
                Instruction::Jump {
                    kind: *kind,
                    target: truncated,
                }
                .encode()
            }
            Statement::Unknown { mnemonic } => {
                warnings.push(Warning::UnknownInstruction {
                    mnemonic: mnemonic.to_string(),
                });
                NOP
            }
        };
        Encoded { word, warnings }
    }
}

// Drop comments and surrounding whitespace. Returns an empty string for
// blank and comment-only lines.
fn strip_comment(line: &str) -> &str {
    let mut code = line;
    if let Some(i) = code.find(';') {
        code = &code[..i];
    }
    if let Some(i) = code.find("//") {
        code = &code[..i];
    }
    code.trim()
}

fn parse_statement(line: &str) -> Result<Option<Statement>, AsmError> {
    lazy_static! {
        static ref SEPARATOR_RE: Regex = Regex::new(r"[\s,]+").unwrap();
    }

    let code = strip_comment(line);
    if code.is_empty() {
        return Ok(None);
    }
    let mut tokens = SEPARATOR_RE.split(code).filter(|t| !t.is_empty());
    let mnemonic = match tokens.next() {
        Some(m) => m.to_uppercase(),
        None => return Ok(None),
    };
    let operands: Vec<&str> = tokens.collect();

    let statement = match &mnemonic[..] {
        "NOP" => {
            expect_operands(&mnemonic, &operands, 0)?;
            Statement::Nop
        }
        "MOV" => {
            expect_operands(&mnemonic, &operands, 2)?;
            let dest = parse_register(operands[0])?;
            if operands[1].starts_with('#') {
                Statement::MovImmediate {
                    dest,
                    value: parse_number(operands[1])?,
                }
            } else {
                Statement::MovRegister {
                    dest,
                    src: parse_register(operands[1])?,
                }
            }
        }
        "NOT" => {
            expect_operands(&mnemonic, &operands, 1)?;
            Statement::Not {
                dest: parse_register(operands[0])?,
            }
        }
        "CMP" => {
            expect_operands(&mnemonic, &operands, 2)?;
            Statement::Binary {
                opcode: Opcode::CMP,
                dest: parse_register(operands[0])?,
                src: parse_register(operands[1])?,
            }
        }
        m => {
            if let Some(kind) = JumpKind::from_mnemonic(m) {
                expect_operands(&mnemonic, &operands, 1)?;
                Statement::Jump {
                    kind,
                    target: parse_number(operands[0])?,
                }
            } else if let Some(opcode) = Opcode::from_mnemonic(m).filter(|o| o.is_binary_alu()) {
                if operands.len() == 3 {
                    Statement::ThreeOperand { opcode }
                } else {
                    expect_operands(&mnemonic, &operands, 2)?;
                    Statement::Binary {
                        opcode,
                        dest: parse_register(operands[0])?,
                        src: parse_register(operands[1])?,
                    }
                }
            } else {
                Statement::Unknown {
                    mnemonic: mnemonic.to_string(),
                }
            }
        }
    };
    Ok(Some(statement))
}

fn expect_operands(mnemonic: &str, operands: &[&str], count: usize) -> Result<(), AsmError> {
    if operands.len() < count {
        Err(AsmError::MissingOperand {
            mnemonic: mnemonic.to_string(),
        })
    } else if let Some(extra) = operands.get(count) {
        Err(AsmError::UnexpectedOperand {
            mnemonic: mnemonic.to_string(),
            operand: extra.to_string(),
        })
    } else {
        Ok(())
    }
}

fn parse_register(s: &str) -> Result<u8, AsmError> {
    lazy_static! {
        static ref REGISTER_RE: Regex = Regex::new(r"(?i)^R([0-3])$").unwrap();
    }
    match REGISTER_RE.captures(s) {
        Some(cap) => cap[1]
            .parse::<u8>()
            .map_err(|_| AsmError::UnknownRegister(s.to_string())),
        None => Err(AsmError::UnknownRegister(s.to_string())),
    }
}

// Numeric operand as written. `bits` holds the literal modulo 2^32, so the low
// bits survive even when the literal does not fit in a u32.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Number {
    text: String,
    bits: u32,
    overflowed: bool,
}

impl Number {
    // Low bits under `mask`, and whether anything above them was dropped.
    fn masked(&self, mask: u32) -> (u8, bool) {
        ((self.bits & mask) as u8, self.overflowed || self.bits > mask)
    }
}

// `#<decimal>`, `#0x<hex>`, or a bare decimal (jump targets)
fn parse_number(s: &str) -> Result<Number, AsmError> {
    lazy_static! {
        static ref HEX_RE: Regex = Regex::new(r"(?i)^#0x([0-9a-f]+)$").unwrap();
        static ref DEC_RE: Regex = Regex::new(r"^#?([0-9]+)$").unwrap();
    }
    let (digits, radix) = if let Some(cap) = HEX_RE.captures(s) {
        (cap[1].to_string(), 16)
    } else if let Some(cap) = DEC_RE.captures(s) {
        (cap[1].to_string(), 10)
    } else {
        return Err(AsmError::InvalidNumber(s.to_string()));
    };
    let (bits, overflowed) = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold((0u32, false), |(acc, overflowed), d| {
            match acc.checked_mul(radix).and_then(|v| v.checked_add(d)) {
                Some(v) => (v, overflowed),
                None => (acc.wrapping_mul(radix).wrapping_add(d), true),
            }
        });
    Ok(Number {
        text: s.trim_start_matches('#').to_string(),
        bits,
        overflowed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::{iproduct, izip};

    fn word(line: &str) -> u8 {
        encode(line).unwrap().unwrap().word
    }

    fn warnings(line: &str) -> Vec<Warning> {
        encode(line).unwrap().unwrap().warnings
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("  // a comment"), "");
        assert_eq!(strip_comment(";;; a comment"), "");
        assert_eq!(strip_comment("   "), "");
        assert_eq!(strip_comment("  add r1, r2 ; a comment"), "add r1, r2");
        assert_eq!(strip_comment("JMP 3 // loop"), "JMP 3");
    }

    #[test]
    fn test_non_instruction_lines() {
        for line in vec!["", "   ", "// MOV R0, #1", "; NOT R1", "\t"] {
            assert_eq!(encode(line), Ok(None), "'{}' should produce no word", line);
        }
    }

    #[test]
    fn test_parse_statement() {
        let codes = vec![
            "NOP",
            "mov r1, #1",
            "MOV R2, R1",
            "ADD R1,R2",
            "OR R0 R1",
            "ADD R0, R1, R2",
            "NOT R3",
            "CMP R1, R2",
            "JZ #0x3",
            "HALT",
        ];
        let statements = vec![
            Statement::Nop,
            Statement::MovImmediate {
                dest: 1,
                value: parse_number("#1").unwrap(),
            },
            Statement::MovRegister { dest: 2, src: 1 },
            Statement::Binary {
                opcode: Opcode::ADD,
                dest: 1,
                src: 2,
            },
            Statement::Binary {
                opcode: Opcode::OR,
                dest: 0,
                src: 1,
            },
            Statement::ThreeOperand {
                opcode: Opcode::ADD,
            },
            Statement::Not { dest: 3 },
            Statement::Binary {
                opcode: Opcode::CMP,
                dest: 1,
                src: 2,
            },
            Statement::Jump {
                kind: JumpKind::JZ,
                target: parse_number("#0x3").unwrap(),
            },
            Statement::Unknown {
                mnemonic: "HALT".to_string(),
            },
        ];
        for (c, s) in codes.iter().zip(statements.into_iter()) {
            assert_eq!(parse_statement(c), Ok(Some(s)), "parsing '{}'", c);
        }
    }

    #[test]
    fn test_literal_encodings() {
        let codes = vec![
            "MOV R1, #1",
            "MOV R2, R1",
            "ADD R1, R2",
            "MUL R2, R1",
            "JMP 7",
            "JZ 3",
            "CMP R1, R2",
        ];
        let expected: Vec<u8> = vec![
            0b10101101, 0b10110001, 0b00001010, 0b00110001, 0b01111111, 0b10011011, 0b11001010,
        ];
        for (c, e) in izip!(codes, expected) {
            assert_eq!(word(c), e, "{} was assembled wrong", c);
            assert!(warnings(c).is_empty());
        }
    }

    #[test]
    fn test_reference_encodings() {
        for (line, expected) in REFERENCE_ENCODINGS {
            assert_eq!(word(line), *expected, "{}", line);
        }
    }

    #[test]
    fn test_alu_round_trip() {
        let mnemonics = vec!["ADD", "MUL", "AND", "OR", "XOR", "CMP"];
        for (m, d, s) in iproduct!(mnemonics, 0..4u8, 0..4u8) {
            let line = format!("{} R{}, R{}", m, d, s);
            let f = Fields::decode(word(&line));
            let opcode = Opcode::from_mnemonic(m).unwrap();
            assert_eq!(f, Fields::new(opcode.bits(), d, s), "{}", line);
        }
    }

    #[test]
    fn test_immediate_truncation() {
        assert_eq!(word("MOV R0, #5"), word("MOV R0, #1"));
        assert_eq!(
            warnings("MOV R0, #5"),
            vec![Warning::ImmediateTruncated {
                value: "5".to_string(),
                truncated: 1
            }]
        );
        assert_eq!(word("MOV R3, #0xFF"), word("MOV R3, #3"));
        assert!(warnings("MOV R0, #3").is_empty());
    }

    #[test]
    fn test_jump_target_truncation() {
        assert_eq!(word("JMP 9"), word("JMP 1"));
        assert_eq!(
            warnings("JNZ #12"),
            vec![Warning::JumpTargetTruncated {
                target: "12".to_string(),
                truncated: 4
            }]
        );
        assert_eq!(word("JNZ 0"), 0b110_11_000);
    }

    #[test]
    fn test_oversized_literals_are_masked() {
        assert_eq!(word("JMP 4294967296"), word("JMP 0"));
        assert_eq!(
            warnings("JMP 4294967296"),
            vec![Warning::JumpTargetTruncated {
                target: "4294967296".to_string(),
                truncated: 0
            }]
        );
        assert_eq!(word("MOV R0, #0x100000000"), word("MOV R0, #0"));
        assert_eq!(
            warnings("MOV R0, #0x100000000"),
            vec![Warning::ImmediateTruncated {
                value: "0x100000000".to_string(),
                truncated: 0
            }]
        );
        // low bits of 2^64 + 5 are kept
        assert_eq!(word("JZ 18446744073709551621"), word("JZ 5"));
        assert_eq!(warnings("JZ 18446744073709551621").len(), 1);
        assert_eq!(
            warnings("MOV R1, #0x100000000")[0].to_string(),
            "immediate value 0x100000000 truncated to 0"
        );
    }

    #[test]
    fn test_fallbacks_to_nop() {
        let e = encode("ADD R0, R1, R2").unwrap().unwrap();
        assert_eq!(e.word, NOP);
        assert_eq!(
            e.warnings,
            vec![Warning::ThreeOperandUnsupported {
                mnemonic: "ADD".to_string()
            }]
        );

        let e = encode("sub r0, r1").unwrap().unwrap();
        assert_eq!(e.word, NOP);
        assert_eq!(
            e.warnings,
            vec![Warning::UnknownInstruction {
                mnemonic: "SUB".to_string()
            }]
        );
    }

    #[test]
    fn test_r3_destination_aliases_jump() {
        let e = encode("OR R3, R1").unwrap().unwrap();
        assert_eq!(e.word, word("JMP 1"));
        assert_eq!(
            e.warnings,
            vec![Warning::AliasedAsJump {
                opcode: Opcode::OR,
                jump: JumpKind::JMP
            }]
        );
        assert!(warnings("ADD R3, R1").is_empty());
    }

    #[test]
    fn test_line_errors() {
        assert_eq!(
            encode("MOV R4, #1"),
            Err(AsmError::UnknownRegister("R4".to_string()))
        );
        assert_eq!(
            encode("ADD R1, X"),
            Err(AsmError::UnknownRegister("X".to_string()))
        );
        assert_eq!(
            encode("NOT"),
            Err(AsmError::MissingOperand {
                mnemonic: "NOT".to_string()
            })
        );
        assert_eq!(
            encode("JMP 1 2"),
            Err(AsmError::UnexpectedOperand {
                mnemonic: "JMP".to_string(),
                operand: "2".to_string()
            })
        );
        assert_eq!(
            encode("MOV R0, #abc"),
            Err(AsmError::InvalidNumber("#abc".to_string()))
        );
    }

    #[test]
    fn test_assemble_program() {
        let code = r"
        // load
        MOV R0, #2
        MOV R1, R5
        ; done
        FOO
        MOV R2, #7
        ";
        let assembly = assemble(code);
        assert_eq!(assembly.bytes(), vec![0xA6, NOP, NOP, 0xB7]);
        assert_eq!(
            assembly.lines.iter().map(|l| l.line).collect::<Vec<_>>(),
            vec![3, 4, 6, 7]
        );
        assert!(assembly.has_errors());
        assert_eq!(assembly.errors().count(), 1);
        assert_eq!(assembly.warnings().count(), 2);
        assert_eq!(assembly.diagnostics[0].line, 4);
        assert_eq!(
            assembly.diagnostics[0].to_string(),
            "line 4: error: unknown register 'R5', expected R0-R3 (MOV R1, R5)"
        );
    }

    #[test]
    fn test_listing() {
        let assembly = assemble("MOV R1, #1\nJZ 3");
        assert_eq!(
            assembly.listing(),
            "Line  1: MOV R1, #1           -> 10101101 -> 0xAD (op:101 dest:01 src:101)\n\
             Line  2: JZ 3                 -> 10011011 -> 0x9B (op:100 dest:11 src:011)"
        );
    }
}
