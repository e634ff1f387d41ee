pub mod assembler;
pub mod instruction;
pub mod opcode;
pub mod trace;

use bitflags::bitflags;
use tracing::{info, trace};

use crate::rom::{Rom, ROM_SIZE};
use instruction::{source_register, Instruction, MOV_IMMEDIATE_BASE};
use opcode::Opcode;

pub const NUM_REGISTERS: usize = 4;

bitflags! {
    // 7  bit  0
    // ---- ----
    // .... ...Z
    //         |
    //         +- Zero. Set when the last ALU or CMP result was zero;
    //            MOV and jumps leave it alone.
    pub struct CpuFlags: u8 {
        const ZERO = 0b0000_0001;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuState {
    pub registers: [u8; NUM_REGISTERS],
    pub pc: u8,
    pub zero_flag: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltCondition {
    Never,
    // `pc` reached after more than `cycles` instructions
    PcAfter { pc: u8, cycles: u32 },
    // a taken jump to its own address; nothing can leave that loop
    SelfLoop,
}

impl HaltCondition {
    fn is_met(&self, pc_before: u8, inst: &Instruction, pc_after: u8, cycles: u32) -> bool {
        match *self {
            HaltCondition::Never => false,
            HaltCondition::PcAfter { pc, cycles: after } => pc_after == pc && cycles > after,
            HaltCondition::SelfLoop => inst.is_jump() && pc_after == pc_before,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub max_cycles: u32,
    pub halt: HaltCondition,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            max_cycles: 50,
            halt: HaltCondition::Never,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxCycles,
    PcOutOfRange,
    Halted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub state: CpuState,
    pub cycles: u32,
    pub stop: StopReason,
}

pub struct CPU {
    pub registers: [u8; NUM_REGISTERS],
    pub pc: u8,        // Program Counter
    status: CpuFlags,  // Processor Status
    total_cycles: u32, // Number of instructions this CPU has executed
    rom: Rom,
}

impl CPU {
    pub fn new(rom: Rom) -> CPU {
        CPU {
            registers: [0; NUM_REGISTERS],
            pc: 0,
            status: CpuFlags::empty(),
            total_cycles: 0,
            rom,
        }
    }

    pub fn reset(&mut self) {
        self.registers = [0; NUM_REGISTERS];
        self.pc = 0;
        self.status = CpuFlags::empty();
        self.total_cycles = 0;
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn zero_flag(&self) -> bool {
        self.status.contains(CpuFlags::ZERO)
    }

    pub fn set_zero_flag(&mut self, set: bool) {
        self.status.set(CpuFlags::ZERO, set);
    }

    pub fn total_cycles(&self) -> u32 {
        self.total_cycles
    }

    pub fn pc_in_range(&self) -> bool {
        (self.pc as usize) < ROM_SIZE
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            registers: self.registers,
            pc: self.pc,
            zero_flag: self.zero_flag(),
        }
    }

    pub fn peek_next_instruction(&self) -> Instruction {
        Instruction::decode(self.rom.read(self.pc))
    }

    pub fn step(&mut self) -> Instruction {
        let inst = self.peek_next_instruction();
        self.execute_inst(inst);
        self.total_cycles += 1;
        inst
    }

    pub fn run(&mut self, config: &RunConfig) -> RunSummary {
        self.run_with_callback(config, |_| {})
    }

    /// `callback` sees the CPU before each instruction executes.
    pub fn run_with_callback<F: FnMut(&CPU)>(
        &mut self,
        config: &RunConfig,
        mut callback: F,
    ) -> RunSummary {
        let mut cycles: u32 = 0;
        let stop = loop {
            if cycles >= config.max_cycles {
                break StopReason::MaxCycles;
            }
            if !self.pc_in_range() {
                break StopReason::PcOutOfRange;
            }

            callback(self);

            let pc = self.pc;
            let inst = self.step();
            cycles += 1;
            trace!(pc, "{}", inst);

            if config.halt.is_met(pc, &inst, self.pc, cycles) {
                break StopReason::Halted;
            }
        };

        let summary = RunSummary {
            state: self.state(),
            cycles,
            stop,
        };
        info!(cycles, stop = ?summary.stop, pc = self.pc, "run finished");
        summary
    }

    fn execute_inst(&mut self, inst: Instruction) {
        use Opcode::*;

        match inst {
            Instruction::Jump { kind, target } => {
                if kind.is_taken(self.zero_flag()) {
                    self.pc = target;
                } else {
                    self.pc = self.pc.wrapping_add(1);
                }
            }
            Instruction::AluOrMov { opcode, dest, src } => {
                let dest = dest as usize;
                let a = self.registers[dest];
                let b = self.registers[source_register(src)];
                match opcode {
                    ADD => self.write_result(dest, a.wrapping_add(b)),
                    MUL => self.write_result(dest, a.wrapping_mul(b)),
                    AND => self.write_result(dest, a & b),
                    OR => self.write_result(dest, a | b),
                    XOR => self.write_result(dest, a ^ b),
                    NOT => self.write_result(dest, !a),
                    CMP => self.set_zero_flag(a.wrapping_sub(b) == 0),
                    MOV => {
                        self.registers[dest] = if src >= MOV_IMMEDIATE_BASE {
                            src - MOV_IMMEDIATE_BASE
                        } else {
                            b
                        };
                    }
                }
                self.pc = self.pc.wrapping_add(1);
            }
        }
    }

    fn write_result(&mut self, dest: usize, result: u8) {
        self.registers[dest] = result;
        self.set_zero_flag(result == 0);
    }
}
