use std::fmt;

use super::opcode::{JumpKind, Opcode, JUMP_SENTINEL};

// 7  bit  0
// ---- ----
// OOOD DSSS
// |||| ||||
// |||| |+++- src_or_imm: source register (0SS), MOV immediate (1II) or jump target
// |||+-+---- dest: destination register, or JUMP_SENTINEL for jumps
// +++------- opcode
const OPCODE_SHIFT: u8 = 5;
const DEST_SHIFT: u8 = 3;
const OPCODE_MASK: u8 = 0b111;
const DEST_MASK: u8 = 0b11;
const SRC_MASK: u8 = 0b111;

/// MOV fields at or above this value carry an immediate of `field - MOV_IMMEDIATE_BASE`.
pub const MOV_IMMEDIATE_BASE: u8 = 0b100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fields {
    pub opcode: u8,
    pub dest: u8,
    pub src_or_imm: u8,
}

impl Fields {
    pub fn new(opcode: u8, dest: u8, src_or_imm: u8) -> Fields {
        Fields {
            opcode: opcode & OPCODE_MASK,
            dest: dest & DEST_MASK,
            src_or_imm: src_or_imm & SRC_MASK,
        }
    }

    pub fn decode(word: u8) -> Fields {
        Fields {
            opcode: (word >> OPCODE_SHIFT) & OPCODE_MASK,
            dest: (word >> DEST_SHIFT) & DEST_MASK,
            src_or_imm: word & SRC_MASK,
        }
    }

    pub fn encode(self) -> u8 {
        ((self.opcode & OPCODE_MASK) << OPCODE_SHIFT)
            | ((self.dest & DEST_MASK) << DEST_SHIFT)
            | (self.src_or_imm & SRC_MASK)
    }
}

impl From<u8> for Fields {
    fn from(word: u8) -> Fields {
        Fields::decode(word)
    }
}

/// A classified instruction word.
///
/// The `dest == JUMP_SENTINEL` check happens exactly once, in [`Instruction::decode`].
/// Anything that is not a jump is an ALU, MOV, CMP or NOT operation named by its opcode,
/// so `OR R3, ..`, `XOR R3, ..` and `CMP R3, ..` cannot be expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    AluOrMov { opcode: Opcode, dest: u8, src: u8 },
    Jump { kind: JumpKind, target: u8 },
}

impl Instruction {
    pub fn decode(word: u8) -> Instruction {
        let fields = Fields::decode(word);
        let opcode = Opcode::from_bits(fields.opcode);
        if fields.dest == JUMP_SENTINEL {
            if let Some(kind) = opcode.aliased_jump() {
                return Instruction::Jump {
                    kind,
                    target: fields.src_or_imm,
                };
            }
        }
        Instruction::AluOrMov {
            opcode,
            dest: fields.dest,
            src: fields.src_or_imm,
        }
    }

    pub fn fields(&self) -> Fields {
        match *self {
            Instruction::AluOrMov { opcode, dest, src } => Fields::new(opcode.bits(), dest, src),
            Instruction::Jump { kind, target } => {
                Fields::new(kind.opcode().bits(), JUMP_SENTINEL, target)
            }
        }
    }

    pub fn encode(&self) -> u8 {
        self.fields().encode()
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Instruction::Jump { .. })
    }
}

/// Register index named by a source field. The top bit is register-mode padding.
pub fn source_register(src: u8) -> usize {
    (src & 0b11) as usize
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Jump { kind, target } => write!(f, "{} {}", kind, target),
            Instruction::AluOrMov {
                opcode: Opcode::MOV,
                dest,
                src,
            } if src >= MOV_IMMEDIATE_BASE => {
                write!(f, "MOV R{}, #{}", dest, src - MOV_IMMEDIATE_BASE)
            }
            Instruction::AluOrMov {
                opcode: Opcode::NOT,
                dest,
                ..
            } => write!(f, "NOT R{}", dest),
            Instruction::AluOrMov { opcode, dest, src } => {
                write!(f, "{} R{}, R{}", opcode, dest, source_register(src))
            }
        }
    }
}
