use std::fs;
use std::path::Path;

use itertools::Itertools;

use crate::cpu::assembler::NOP;

pub const ROM_SIZE: usize = 16;
const ADDR_MASK: u8 = 0x0F;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RomError {
    #[error("program has {len} words, the ROM holds at most 16")]
    ProgramTooLarge { len: usize },
}

/// The 16-word instruction memory, addressed by a 4-bit address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rom {
    words: [u8; ROM_SIZE],
}

impl Rom {
    pub fn new(words: [u8; ROM_SIZE]) -> Rom {
        Rom { words }
    }

    /// Place `program` at address 0 and fill the rest with NOPs.
    pub fn from_program(program: &[u8]) -> Result<Rom, RomError> {
        if program.len() > ROM_SIZE {
            return Err(RomError::ProgramTooLarge { len: program.len() });
        }
        let mut words = [NOP; ROM_SIZE];
        words[..program.len()].copy_from_slice(program);
        Ok(Rom { words })
    }

    /// Only the low 4 address bits are wired, like the hardware ROM.
    pub fn read(&self, addr: u8) -> u8 {
        self.words[(addr & ADDR_MASK) as usize]
    }

    pub fn words(&self) -> &[u8; ROM_SIZE] {
        &self.words
    }

    /// Verilog description of a combinational 16x8 ROM initialised with these words.
    pub fn to_verilog(&self) -> String {
        let entries = self
            .words
            .iter()
            .enumerate()
            .map(|(i, word)| format!("        memory[{:2}] = 8'h{:02X};", i, word))
            .join("\n");
        format!(
            "`timescale 1ns/1ps

module instruction_memory (
    input [3:0] addr,
    output [7:0] data
);
    reg [7:0] memory [0:15];
    assign data = memory[addr];

    initial begin
{}
    end
endmodule
",
            entries
        )
    }

    pub fn write_verilog<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        fs::write(path, self.to_verilog())
    }
}

impl Default for Rom {
    fn default() -> Self {
        Rom::new([NOP; ROM_SIZE])
    }
}

/// Space separated upper-case hex, e.g. `A6 AF B4`.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).join(" ")
}
