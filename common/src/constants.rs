use crate::Word;

pub const XLEN: usize = 32;
pub const REGISTER_COUNT: usize = 32;
pub const RAM_START_ADDRESS: Word = 0x80000000;
pub const DEFAULT_MEMORY_SIZE: u64 = 0x8000000; // 128 MiB
pub const RESET_VECTOR: Word = RAM_START_ADDRESS;
pub const BYTES_PER_INSTRUCTION: Word = 4;

/// `run` budgets below this echo every executed instruction to the debugger.
pub const MAX_INSTRUCTIONS_TO_PRINT: u64 = 10;

/// Holds the debug trap's return value and the exit code of the halt call.
pub const RETURN_VALUE_REGISTER: usize = 10; // a0
/// Selects the environment call.
pub const SYSCALL_NUMBER_REGISTER: usize = 17; // a7
pub const SYSCALL_EXIT: Word = 93;

#[rustfmt::skip]
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = [
    "$0", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
    "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// Program loaded when no image is given. Ends in a good trap.
pub const BUILTIN_IMAGE: [Word; 5] = [
    0x00000297, // auipc t0,0
    0x00028823, // sb    zero,16(t0)
    0x0102c503, // lbu   a0,16(t0)
    0x00100073, // ebreak
    0xdeadbeef, // data
];
