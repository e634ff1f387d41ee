use itertools::Itertools;

use super::CPU;

impl CPU {
    /// One line describing the instruction about to execute and the state before it runs:
    ///
    /// `PC:0B  9B  10011011  JZ 3        R0:02 R1:00 R2:06 R3:FE Z:0 CYC:11`
    pub fn trace(&self) -> String {
        let word = self.rom().read(self.pc);
        let asm = self.peek_next_instruction().to_string();
        let registers = self
            .registers
            .iter()
            .enumerate()
            .map(|(i, r)| format!("R{}:{:02X}", i, r))
            .join(" ");
        format!(
            "PC:{:02X}  {:02X}  {:08b}  {:12}{} Z:{} CYC:{}",
            self.pc,
            word,
            word,
            asm,
            registers,
            self.zero_flag() as u8,
            self.total_cycles()
        )
    }
}
