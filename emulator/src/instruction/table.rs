use common::constants::{RETURN_VALUE_REGISTER, SYSCALL_NUMBER_REGISTER, XLEN};
use common::{SWord, Word};

use super::{InstructionPattern, InstructionType, Operands, Pattern};
use crate::emulator::cpu::{Cpu, Decode, Trap, TrapType};

/// Declares one table entry. The body runs with the cpu, the decode
/// context and the operands bound to the given names, and may return
/// early with a trap.
macro_rules! instpat {
    (
        $template:literal,
        $name:ident,
        $kind:ident,
        |$cpu:ident, $s:ident, $op:ident| $body:block
    ) => {
        InstructionPattern {
            name: stringify!($name),
            pattern: Pattern::from_template($template),
            kind: InstructionType::$kind,
            exec: {
                #[allow(unused_variables, unreachable_code)]
                fn $name($cpu: &mut Cpu, $s: &mut Decode, $op: Operands) -> Result<(), Trap> {
                    $body
                    Ok(())
                }
                $name
            },
        }
    };
}

#[inline]
fn load(cpu: &Cpu, address: Word, width: u64) -> Result<Word, Trap> {
    cpu.get_mmu().load(address, width).map(|value| value as Word)
}

#[inline]
fn store(cpu: &mut Cpu, address: Word, width: u64, value: Word) -> Result<(), Trap> {
    cpu.get_mut_mmu().store(address, width, value as u64)
}

#[inline]
fn branch(s: &mut Decode, taken: bool, offset: Word) {
    if taken {
        s.dnpc = s.pc.wrapping_add(offset);
    }
}

// Shift immediates carry the shift amount in imm[4:0]. imm[5] set is a
// reserved encoding on RV32 and the instruction does nothing.
const SHAMT_MASK: Word = XLEN as Word - 1;
const SHAMT_RESERVED: Word = XLEN as Word;

pub(super) const INVALID_INSTRUCTION: InstructionPattern =
    instpat!("??????? ????? ????? ??? ????? ????? ??", inv, N, |cpu, s, op| {
        return Err(Trap {
            trap_type: TrapType::IllegalInstruction,
            value: s.word as u64,
        });
    });

/// Instruction table, matched top to bottom. The last entry matches every
/// word and raises an illegal instruction trap.
pub static INSTRUCTIONS: &[InstructionPattern] = &[
    instpat!("??????? ????? ????? ??? ????? 01101 11", lui, U, |cpu, s, op| {
        cpu.write_register(op.rd, op.imm);
    }),
    instpat!("??????? ????? ????? ??? ????? 00101 11", auipc, U, |cpu, s, op| {
        cpu.write_register(op.rd, s.pc.wrapping_add(op.imm));
    }),
    instpat!("??????? ????? ????? ??? ????? 11011 11", jal, J, |cpu, s, op| {
        cpu.write_register(op.rd, s.snpc);
        s.dnpc = s.pc.wrapping_add(op.imm);
    }),
    instpat!("??????? ????? ????? 000 ????? 11001 11", jalr, I, |cpu, s, op| {
        s.dnpc = op.src1.wrapping_add(op.imm) & !1;
        cpu.write_register(op.rd, s.snpc);
    }),
    instpat!("??????? ????? ????? 000 ????? 11000 11", beq, B, |cpu, s, op| {
        branch(s, op.src1 == op.src2, op.imm);
    }),
    instpat!("??????? ????? ????? 001 ????? 11000 11", bne, B, |cpu, s, op| {
        branch(s, op.src1 != op.src2, op.imm);
    }),
    instpat!("??????? ????? ????? 100 ????? 11000 11", blt, B, |cpu, s, op| {
        branch(s, (op.src1 as SWord) < (op.src2 as SWord), op.imm);
    }),
    instpat!("??????? ????? ????? 101 ????? 11000 11", bge, B, |cpu, s, op| {
        branch(s, (op.src1 as SWord) >= (op.src2 as SWord), op.imm);
    }),
    instpat!("??????? ????? ????? 110 ????? 11000 11", bltu, B, |cpu, s, op| {
        branch(s, op.src1 < op.src2, op.imm);
    }),
    instpat!("??????? ????? ????? 111 ????? 11000 11", bgeu, B, |cpu, s, op| {
        branch(s, op.src1 >= op.src2, op.imm);
    }),
    instpat!("??????? ????? ????? 000 ????? 00000 11", lb, I, |cpu, s, op| {
        let value = load(cpu, op.src1.wrapping_add(op.imm), 1)?;
        cpu.write_register(op.rd, value as u8 as i8 as SWord as Word);
    }),
    instpat!("??????? ????? ????? 001 ????? 00000 11", lh, I, |cpu, s, op| {
        let value = load(cpu, op.src1.wrapping_add(op.imm), 2)?;
        cpu.write_register(op.rd, value as u16 as i16 as SWord as Word);
    }),
    instpat!("??????? ????? ????? 010 ????? 00000 11", lw, I, |cpu, s, op| {
        let value = load(cpu, op.src1.wrapping_add(op.imm), 4)?;
        cpu.write_register(op.rd, value);
    }),
    instpat!("??????? ????? ????? 100 ????? 00000 11", lbu, I, |cpu, s, op| {
        let value = load(cpu, op.src1.wrapping_add(op.imm), 1)?;
        cpu.write_register(op.rd, value);
    }),
    instpat!("??????? ????? ????? 101 ????? 00000 11", lhu, I, |cpu, s, op| {
        let value = load(cpu, op.src1.wrapping_add(op.imm), 2)?;
        cpu.write_register(op.rd, value);
    }),
    instpat!("??????? ????? ????? 000 ????? 01000 11", sb, S, |cpu, s, op| {
        store(cpu, op.src1.wrapping_add(op.imm), 1, op.src2)?;
    }),
    instpat!("??????? ????? ????? 001 ????? 01000 11", sh, S, |cpu, s, op| {
        store(cpu, op.src1.wrapping_add(op.imm), 2, op.src2)?;
    }),
    instpat!("??????? ????? ????? 010 ????? 01000 11", sw, S, |cpu, s, op| {
        store(cpu, op.src1.wrapping_add(op.imm), 4, op.src2)?;
    }),
    instpat!("??????? ????? ????? 000 ????? 00100 11", addi, I, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1.wrapping_add(op.imm));
    }),
    instpat!("??????? ????? ????? 010 ????? 00100 11", slti, I, |cpu, s, op| {
        cpu.write_register(op.rd, ((op.src1 as SWord) < (op.imm as SWord)) as Word);
    }),
    instpat!("??????? ????? ????? 011 ????? 00100 11", sltiu, I, |cpu, s, op| {
        cpu.write_register(op.rd, (op.src1 < op.imm) as Word);
    }),
    instpat!("??????? ????? ????? 100 ????? 00100 11", xori, I, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 ^ op.imm);
    }),
    instpat!("??????? ????? ????? 110 ????? 00100 11", ori, I, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 | op.imm);
    }),
    instpat!("??????? ????? ????? 111 ????? 00100 11", andi, I, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 & op.imm);
    }),
    instpat!("000000? ????? ????? 001 ????? 00100 11", slli, I, |cpu, s, op| {
        if op.imm & SHAMT_RESERVED == 0 {
            cpu.write_register(op.rd, op.src1 << (op.imm & SHAMT_MASK));
        }
    }),
    instpat!("000000? ????? ????? 101 ????? 00100 11", srli, I, |cpu, s, op| {
        if op.imm & SHAMT_RESERVED == 0 {
            cpu.write_register(op.rd, op.src1 >> (op.imm & SHAMT_MASK));
        }
    }),
    instpat!("010000? ????? ????? 101 ????? 00100 11", srai, I, |cpu, s, op| {
        if op.imm & SHAMT_RESERVED == 0 {
            let value = (op.src1 as SWord) >> (op.imm & SHAMT_MASK);
            cpu.write_register(op.rd, value as Word);
        }
    }),
    instpat!("0000000 ????? ????? 000 ????? 01100 11", add, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1.wrapping_add(op.src2));
    }),
    instpat!("0100000 ????? ????? 000 ????? 01100 11", sub, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1.wrapping_sub(op.src2));
    }),
    instpat!("0000000 ????? ????? 001 ????? 01100 11", sll, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 << (op.src2 & SHAMT_MASK));
    }),
    instpat!("0000000 ????? ????? 010 ????? 01100 11", slt, R, |cpu, s, op| {
        cpu.write_register(op.rd, ((op.src1 as SWord) < (op.src2 as SWord)) as Word);
    }),
    instpat!("0000000 ????? ????? 011 ????? 01100 11", sltu, R, |cpu, s, op| {
        cpu.write_register(op.rd, (op.src1 < op.src2) as Word);
    }),
    instpat!("0000000 ????? ????? 100 ????? 01100 11", xor, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 ^ op.src2);
    }),
    instpat!("0000000 ????? ????? 101 ????? 01100 11", srl, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 >> (op.src2 & SHAMT_MASK));
    }),
    instpat!("0100000 ????? ????? 101 ????? 01100 11", sra, R, |cpu, s, op| {
        let value = (op.src1 as SWord) >> (op.src2 & SHAMT_MASK);
        cpu.write_register(op.rd, value as Word);
    }),
    instpat!("0000000 ????? ????? 110 ????? 01100 11", or, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 | op.src2);
    }),
    instpat!("0000000 ????? ????? 111 ????? 01100 11", and, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1 & op.src2);
    }),
    instpat!("0000001 ????? ????? 000 ????? 01100 11", mul, R, |cpu, s, op| {
        cpu.write_register(op.rd, op.src1.wrapping_mul(op.src2));
    }),
    instpat!("0000001 ????? ????? 001 ????? 01100 11", mulh, R, |cpu, s, op| {
        let product = (op.src1 as SWord as i64) * (op.src2 as SWord as i64);
        cpu.write_register(op.rd, (product >> 32) as Word);
    }),
    instpat!("0000001 ????? ????? 010 ????? 01100 11", mulhsu, R, |cpu, s, op| {
        let product = (op.src1 as SWord as i64) * (op.src2 as i64);
        cpu.write_register(op.rd, (product >> 32) as Word);
    }),
    instpat!("0000001 ????? ????? 011 ????? 01100 11", mulhu, R, |cpu, s, op| {
        let product = (op.src1 as u64) * (op.src2 as u64);
        cpu.write_register(op.rd, (product >> 32) as Word);
    }),
    instpat!("0000001 ????? ????? 100 ????? 01100 11", div, R, |cpu, s, op| {
        let value = match op.src2 {
            0 => Word::MAX,
            _ => (op.src1 as SWord).wrapping_div(op.src2 as SWord) as Word,
        };
        cpu.write_register(op.rd, value);
    }),
    instpat!("0000001 ????? ????? 101 ????? 01100 11", divu, R, |cpu, s, op| {
        let value = match op.src2 {
            0 => Word::MAX,
            _ => op.src1 / op.src2,
        };
        cpu.write_register(op.rd, value);
    }),
    instpat!("0000001 ????? ????? 110 ????? 01100 11", rem, R, |cpu, s, op| {
        let value = match op.src2 {
            0 => op.src1,
            _ => (op.src1 as SWord).wrapping_rem(op.src2 as SWord) as Word,
        };
        cpu.write_register(op.rd, value);
    }),
    instpat!("0000001 ????? ????? 111 ????? 01100 11", remu, R, |cpu, s, op| {
        let value = match op.src2 {
            0 => op.src1,
            _ => op.src1 % op.src2,
        };
        cpu.write_register(op.rd, value);
    }),
    instpat!("0000000 00000 00000 000 00000 11100 11", ecall, N, |cpu, s, op| {
        return Err(Trap {
            trap_type: TrapType::EnvironmentCall,
            value: cpu.read_register(SYSCALL_NUMBER_REGISTER) as u64,
        });
    }),
    instpat!("0000000 00001 00000 000 00000 11100 11", ebreak, N, |cpu, s, op| {
        return Err(Trap {
            trap_type: TrapType::Breakpoint,
            value: cpu.read_register(RETURN_VALUE_REGISTER) as u64,
        });
    }),
    INVALID_INSTRUCTION,
];
