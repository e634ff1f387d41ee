use std::fmt;

// indexed by opcode bits
const OPCODES: [Opcode; 8] = {
    use Opcode::*;
    [ADD, MUL, AND, OR, XOR, MOV, CMP, NOT]
};

const JUMPS: [JumpKind; 3] = [JumpKind::JMP, JumpKind::JZ, JumpKind::JNZ];

// Destination field value that turns an OR/XOR/CMP word into a jump.
pub const JUMP_SENTINEL: u8 = 0b11;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    ADD,
    MUL,
    AND,
    OR,
    XOR,
    MOV,
    CMP,
    NOT,
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Opcode {
        OPCODES[(bits & 0b111) as usize]
    }

    pub fn bits(self) -> u8 {
        match self {
            Opcode::ADD => 0b000,
            Opcode::MUL => 0b001,
            Opcode::AND => 0b010,
            Opcode::OR => 0b011,
            Opcode::XOR => 0b100,
            Opcode::MOV => 0b101,
            Opcode::CMP => 0b110,
            Opcode::NOT => 0b111,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::ADD => "ADD",
            Opcode::MUL => "MUL",
            Opcode::AND => "AND",
            Opcode::OR => "OR",
            Opcode::XOR => "XOR",
            Opcode::MOV => "MOV",
            Opcode::CMP => "CMP",
            Opcode::NOT => "NOT",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        OPCODES
            .iter()
            .copied()
            .find(|opcode| opcode.mnemonic().eq_ignore_ascii_case(s))
    }

    // Jumps have no opcode of their own. Each one borrows an ALU opcode and is
    // told apart by dest == JUMP_SENTINEL.
    pub fn aliased_jump(self) -> Option<JumpKind> {
        match self {
            Opcode::OR => Some(JumpKind::JMP),
            Opcode::XOR => Some(JumpKind::JZ),
            Opcode::CMP => Some(JumpKind::JNZ),
            Opcode::ADD | Opcode::MUL | Opcode::AND | Opcode::MOV | Opcode::NOT => None,
        }
    }

    /// Two-operand register forms: `OP Rd, Rs`.
    pub fn is_binary_alu(self) -> bool {
        use Opcode::*;
        matches!(self, ADD | MUL | AND | OR | XOR)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JumpKind {
    JMP,
    JZ,
    JNZ,
}

impl JumpKind {
    pub fn opcode(self) -> Opcode {
        match self {
            JumpKind::JMP => Opcode::OR,
            JumpKind::JZ => Opcode::XOR,
            JumpKind::JNZ => Opcode::CMP,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            JumpKind::JMP => "JMP",
            JumpKind::JZ => "JZ",
            JumpKind::JNZ => "JNZ",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<JumpKind> {
        JUMPS
            .iter()
            .copied()
            .find(|kind| kind.mnemonic().eq_ignore_ascii_case(s))
    }

    pub fn is_taken(self, zero: bool) -> bool {
        match self {
            JumpKind::JMP => true,
            JumpKind::JZ => zero,
            JumpKind::JNZ => !zero,
        }
    }
}

impl fmt::Display for JumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bits() {
        use Opcode::*;
        let opcodes = vec![ADD, MUL, AND, OR, XOR, MOV, CMP, NOT];
        for (bits, opcode) in opcodes.into_iter().enumerate() {
            assert_eq!(opcode.bits(), bits as u8);
            assert_eq!(Opcode::from_bits(bits as u8), opcode);
        }
    }

    #[test]
    fn test_lookup_tables_agree() {
        for (bits, opcode) in OPCODES.iter().enumerate() {
            assert_eq!(opcode.bits() as usize, bits, "{} is out of place", opcode);
        }
        for kind in JUMPS.iter() {
            assert_eq!(kind.opcode().aliased_jump(), Some(*kind));
        }
    }

    #[test]
    fn test_jump_aliases() {
        assert_eq!(JumpKind::JMP.opcode().bits(), 0b011);
        assert_eq!(JumpKind::JZ.opcode().bits(), 0b100);
        assert_eq!(JumpKind::JNZ.opcode().bits(), 0b110);
        assert_eq!(Opcode::OR.aliased_jump(), Some(JumpKind::JMP));
        assert_eq!(Opcode::XOR.aliased_jump(), Some(JumpKind::JZ));
        assert_eq!(Opcode::CMP.aliased_jump(), Some(JumpKind::JNZ));
        assert_eq!(Opcode::MOV.aliased_jump(), None);
    }

    #[test]
    fn test_from_mnemonic_ignores_case() {
        assert_eq!(Opcode::from_mnemonic("xor"), Some(Opcode::XOR));
        assert_eq!(Opcode::from_mnemonic("Mov"), Some(Opcode::MOV));
        assert_eq!(Opcode::from_mnemonic("JMP"), None);
        assert_eq!(JumpKind::from_mnemonic("jnz"), Some(JumpKind::JNZ));
        assert_eq!(JumpKind::from_mnemonic("NOP"), None);
    }

    #[test]
    fn test_jump_taken() {
        assert!(JumpKind::JMP.is_taken(false));
        assert!(JumpKind::JMP.is_taken(true));
        assert!(JumpKind::JZ.is_taken(true));
        assert!(!JumpKind::JZ.is_taken(false));
        assert!(JumpKind::JNZ.is_taken(false));
        assert!(!JumpKind::JNZ.is_taken(true));
    }
}
