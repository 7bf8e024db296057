use crate::emulator::cpu::{Cpu, Decode, Trap};

pub mod format;
pub mod pattern;
mod table;

pub use format::{decode_operands, InstructionType, Operands};
pub use pattern::Pattern;
pub use table::INSTRUCTIONS;

/// Action run for a matched instruction. Reads and writes registers and
/// memory through the `Cpu` and may redirect `Decode::dnpc`.
pub type ExecFn = fn(&mut Cpu, &mut Decode, Operands) -> Result<(), Trap>;

/// One row of the instruction table.
#[derive(Debug, Clone, Copy)]
pub struct InstructionPattern {
    pub name: &'static str,
    pub pattern: Pattern,
    pub kind: InstructionType,
    pub exec: ExecFn,
}

/// Returns the first table entry whose pattern matches `word`. The table
/// ends with a catch-all, so every word resolves to some entry.
pub fn lookup(word: u32) -> &'static InstructionPattern {
    INSTRUCTIONS
        .iter()
        .find(|entry| entry.pattern.matches(word))
        .unwrap_or(&table::INVALID_INSTRUCTION)
}

/// Decodes `decode.word` against the table and runs the matching action.
pub(crate) fn decode_exec(
    cpu: &mut Cpu,
    decode: &mut Decode,
) -> Result<&'static InstructionPattern, Trap> {
    let entry = lookup(decode.word);
    let operands = decode_operands(decode.word, entry.kind, cpu);
    (entry.exec)(cpu, decode, operands)?;
    Ok(entry)
}
