//! RV32IM fetch, decode and execute engine with a pattern-table decoder.

pub mod emulator;
pub mod instruction;

pub use emulator::cpu::{self, Cpu, Decode, Trap, TrapType};
pub use emulator::{
    Emulator, EmulatorConfig, ExecState, ImageError, Statistics, StepControl, StepMonitor,
    StepRecord,
};
pub use instruction::{lookup, InstructionPattern};
