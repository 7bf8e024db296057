use common::constants::{BYTES_PER_INSTRUCTION, REGISTER_COUNT, REGISTER_NAMES};
use common::{VAddr, Word};
use strum_macros::IntoStaticStr;

use crate::instruction::{self, InstructionPattern};

use super::mmu::Mmu;

/// Emulates an RV32IM hart: the integer register file, the program counter
/// and the memory behind it.
#[derive(Clone, Debug)]
pub struct Cpu {
    x: [Word; REGISTER_COUNT],
    pub(crate) pc: Word,
    pub(crate) mmu: Mmu,
}

/// Per-step decode context. Lives for one `exec_once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decode {
    /// Address of the current instruction.
    pub pc: VAddr,
    /// Sequential next pc, `pc + 4`.
    pub snpc: VAddr,
    /// Where execution continues. Defaults to `snpc`; jumps and taken
    /// branches override it.
    pub dnpc: VAddr,
    /// The fetched instruction word.
    pub word: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trap {
    pub trap_type: TrapType,
    pub value: u64, // Trap type specific value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum TrapType {
    /// `ebreak`; value is the return value register.
    Breakpoint,
    /// No pattern matched, or a reserved encoding; value is the word.
    IllegalInstruction,
    /// `ecall`; value is the call number.
    EnvironmentCall,
    InstructionAccessFault,
    LoadAccessFault,
    StoreAccessFault,
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.trap_type.into();
        write!(f, "{name} ({:#x})", self.value)
    }
}

impl Cpu {
    /// Creates a new `Cpu` with `memory_size` bytes of RAM mapped at
    /// `memory_base`. The pc starts at `memory_base`.
    ///
    /// # Arguments
    /// * `memory_base`
    /// * `memory_size`
    pub fn new(memory_base: VAddr, memory_size: u64) -> Self {
        Cpu {
            x: [0; REGISTER_COUNT],
            pc: memory_base,
            mmu: Mmu::new(memory_base, memory_size),
        }
    }

    /// Updates Program Counter content
    ///
    /// # Arguments
    /// * `value`
    pub fn update_pc(&mut self, value: VAddr) {
        self.pc = value;
    }

    /// Reads Program counter content
    pub fn read_pc(&self) -> VAddr {
        self.pc
    }

    /// Reads integer register content
    ///
    /// # Arguments
    /// * `reg` Register number. Must be 0-31
    pub fn read_register(&self, reg: usize) -> Word {
        debug_assert!(reg < REGISTER_COUNT, "reg must be 0-31. {reg}");
        match reg {
            0 => 0, // 0th register is hardwired zero
            _ => self.x[reg],
        }
    }

    /// Writes integer register content. Writes to register 0 are accepted
    /// here and discarded at the end of the step.
    ///
    /// # Arguments
    /// * `reg` Register number. Must be 0-31
    /// * `value`
    pub fn write_register(&mut self, reg: usize, value: Word) {
        debug_assert!(reg < REGISTER_COUNT, "reg must be 0-31. {reg}");
        self.x[reg] = value;
    }

    /// Looks up a register by name: `pc`, an ABI name (`a0`, `$0`, ...),
    /// or an architectural name (`x0`..`x31`).
    pub fn resolve_register(&self, name: &str) -> Option<Word> {
        if name == "pc" {
            return Some(self.pc);
        }
        if name == "0" {
            return Some(self.read_register(0));
        }
        if let Some(index) = REGISTER_NAMES.iter().position(|n| *n == name) {
            return Some(self.read_register(index));
        }
        name.strip_prefix('x')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|index| *index < REGISTER_COUNT)
            .map(|index| self.read_register(index))
    }

    pub fn get_mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn get_mut_mmu(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    fn fetch(&self) -> Result<Decode, Trap> {
        let word = self.mmu.fetch_word(self.pc)?;
        let snpc = self.pc.wrapping_add(BYTES_PER_INSTRUCTION);
        Ok(Decode {
            pc: self.pc,
            snpc,
            dnpc: snpc,
            word,
        })
    }

    /// Fetches, decodes and executes one instruction, then moves the pc to
    /// `dnpc`. On a trap the pc stays on the trapping instruction.
    pub fn exec_once(&mut self) -> Result<(Decode, &'static InstructionPattern), Trap> {
        let mut decode = self.fetch()?;
        let result = instruction::decode_exec(self, &mut decode);
        self.x[0] = 0; // hardwired zero
        let pattern = result?;
        self.pc = decode.dnpc;
        Ok((decode, pattern))
    }

    /// Formats the register file one register per line: name, hex, decimal.
    pub fn dump_registers(&self) -> String {
        let mut out = format!("{:<15} {:<#15x} {:<15}\n", "pc", self.pc, self.pc);
        for (i, name) in REGISTER_NAMES.iter().enumerate() {
            let value = self.read_register(i);
            out.push_str(&format!("{name:<15} {value:<#15x} {value:<15}\n"));
        }
        out
    }
}
