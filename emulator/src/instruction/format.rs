use common::Word;
use strum_macros::{Display, IntoStaticStr};

use crate::emulator::cpu::Cpu;

/// Structural encoding of an instruction; selects which operand fields
/// [`decode_operands`] extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum InstructionType {
    I,
    U,
    S,
    J,
    R,
    B,
    /// No operands.
    N,
}

/// Operands of one decoded instruction. Fields a format does not define stay
/// zero. `imm` is sign-extended to the native word.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    pub rd: usize,
    pub src1: Word,
    pub src2: Word,
    pub imm: Word,
}

#[inline]
fn rd(word: u32) -> usize {
    ((word >> 7) & 0x1f) as usize // [11:7]
}

#[inline]
fn rs1(word: u32) -> usize {
    ((word >> 15) & 0x1f) as usize // [19:15]
}

#[inline]
fn rs2(word: u32) -> usize {
    ((word >> 20) & 0x1f) as usize // [24:20]
}

pub fn imm_i(word: u32) -> Word {
    (match word & 0x80000000 {
        // imm[31:11] = [31]
        0x80000000 => 0xfffff800,
        _ => 0,
    } | ((word >> 20) & 0x000007ff)) // imm[10:0] = [30:20]
}

pub fn imm_u(word: u32) -> Word {
    word & 0xfffff000 // imm[31:12] = [31:12]
}

pub fn imm_s(word: u32) -> Word {
    (match word & 0x80000000 {
        // imm[31:12] = [31]
        0x80000000 => 0xfffff000,
        _ => 0,
    } | ((word >> 20) & 0xfe0) // imm[11:5] = [31:25]
        | ((word >> 7) & 0x1f)) // imm[4:0] = [11:7]
}

pub fn imm_j(word: u32) -> Word {
    (match word & 0x80000000 {
        // imm[31:20] = [31]
        0x80000000 => 0xfff00000,
        _ => 0,
    } | (word & 0x000ff000) // imm[19:12] = [19:12]
        | ((word & 0x00100000) >> 9) // imm[11] = [20]
        | ((word & 0x7fe00000) >> 20)) // imm[10:1] = [30:21]
}

pub fn imm_b(word: u32) -> Word {
    (match word & 0x80000000 {
        // imm[31:12] = [31]
        0x80000000 => 0xfffff000,
        _ => 0,
    } | ((word << 4) & 0x00000800) // imm[11] = [7]
        | ((word >> 20) & 0x000007e0) // imm[10:5] = [30:25]
        | ((word >> 7) & 0x0000001e)) // imm[4:1] = [11:8]
}

/// Extracts the operands of `word` for the given structural type, reading
/// source registers from `cpu`. Pure apart from those register reads.
pub fn decode_operands(word: u32, kind: InstructionType, cpu: &Cpu) -> Operands {
    let rd = rd(word);
    let src1 = || cpu.read_register(rs1(word));
    let src2 = || cpu.read_register(rs2(word));
    match kind {
        InstructionType::I => Operands {
            rd,
            src1: src1(),
            imm: imm_i(word),
            ..Default::default()
        },
        InstructionType::U => Operands {
            rd,
            imm: imm_u(word),
            ..Default::default()
        },
        InstructionType::S => Operands {
            rd,
            src1: src1(),
            src2: src2(),
            imm: imm_s(word),
        },
        InstructionType::J => Operands {
            rd,
            imm: imm_j(word),
            ..Default::default()
        },
        InstructionType::R => Operands {
            rd,
            src1: src1(),
            src2: src2(),
            ..Default::default()
        },
        InstructionType::B => Operands {
            rd,
            src1: src1(),
            src2: src2(),
            imm: imm_b(word),
        },
        InstructionType::N => Operands {
            rd,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod test_format {
    use super::*;
    use common::constants::RAM_START_ADDRESS;

    fn create_cpu() -> Cpu {
        Cpu::new(RAM_START_ADDRESS, 64)
    }

    #[test]
    fn i_type_addi() {
        let mut cpu = create_cpu();
        cpu.write_register(11, 0x1234);
        // addi a0, a1, -1
        let operands = decode_operands(0xfff58513, InstructionType::I, &cpu);
        assert_eq!(10, operands.rd);
        assert_eq!(0x1234, operands.src1);
        assert_eq!(-1i32 as Word, operands.imm);
        assert_eq!(0, operands.src2);
    }

    #[test]
    fn i_type_ignores_other_fields() {
        let cpu = create_cpu();
        // addi x1, x0, 2047 with garbage in funct3 still slices the same fields
        assert_eq!(2047, imm_i(0x7ff00093));
        assert_eq!(2047, imm_i(0x7ff07093));
        assert_eq!(1, decode_operands(0x7ff07093, InstructionType::I, &cpu).rd);
        assert_eq!(-2048i32 as Word, imm_i(0x80000093));
    }

    #[test]
    fn u_type() {
        // lui a0, 0xdeadb
        assert_eq!(0xdeadb000, imm_u(0xdeadb537));
    }

    #[test]
    fn s_type() {
        // sb zero, 16(t0)
        assert_eq!(16, imm_s(0x00028823));
        // sw a0, -4(sp)
        assert_eq!(-4i32 as Word, imm_s(0xfea12e23));
    }

    #[test]
    fn b_type() {
        // beq x0, x0, -8
        assert_eq!(-8i32 as Word, imm_b(0xfe000ce3));
        // bne a0, a1, 16
        assert_eq!(16, imm_b(0x00b51863));
    }

    #[test]
    fn j_type() {
        // jal ra, 2048
        assert_eq!(2048, imm_j(0x001000ef));
        // jal x0, -4
        assert_eq!(-4i32 as Word, imm_j(0xffdff06f));
    }

    #[test]
    fn sign_bit_alone_gives_most_negative_immediate() {
        assert_eq!(-2048i32 as Word, imm_i(0x80000000));
        assert_eq!(-2048i32 as Word, imm_s(0x80000000));
        assert_eq!(-4096i32 as Word, imm_b(0x80000000));
        assert_eq!(-(1i32 << 20) as Word, imm_j(0x80000000));
        assert_eq!(0x7ff, imm_i(0x7ff00000));
    }

    #[test]
    fn r_type_reads_both_sources() {
        let mut cpu = create_cpu();
        cpu.write_register(1, 7);
        cpu.write_register(2, 9);
        // add x3, x1, x2
        let operands = decode_operands(0x002081b3, InstructionType::R, &cpu);
        assert_eq!(3, operands.rd);
        assert_eq!(7, operands.src1);
        assert_eq!(9, operands.src2);
        assert_eq!(0, operands.imm);
    }
}
