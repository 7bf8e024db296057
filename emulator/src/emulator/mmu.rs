use common::{VAddr, Word};

use super::cpu::{Trap, TrapType};
use super::memory::Memory;

/// Maps guest addresses onto main memory. Guest RAM occupies
/// `[base, base + capacity)`; anything outside of it faults.
/// Accesses are little-endian and need not be aligned.
#[derive(Clone, Debug)]
pub struct Mmu {
    base: VAddr,
    memory: Memory,
}

enum MemoryAccessType {
    Execute,
    Read,
    Write,
}

impl Mmu {
    /// Creates a new `Mmu` with `capacity` bytes of zeroed RAM at `base`.
    ///
    /// # Arguments
    /// * `base`
    /// * `capacity`
    pub fn new(base: VAddr, capacity: u64) -> Self {
        let mut memory = Memory::default();
        memory.init(capacity);
        Mmu { base, memory }
    }

    /// Returns true if `width` bytes starting at `address` are backed by RAM.
    pub fn in_bounds(&self, address: VAddr, width: u64) -> bool {
        address >= self.base
            && self
                .memory
                .validate_range((address - self.base) as u64, width)
    }

    fn translate(
        &self,
        address: VAddr,
        width: u64,
        access_type: MemoryAccessType,
    ) -> Result<u64, Trap> {
        if self.in_bounds(address, width) {
            return Ok((address - self.base) as u64);
        }
        let trap_type = match access_type {
            MemoryAccessType::Execute => TrapType::InstructionAccessFault,
            MemoryAccessType::Read => TrapType::LoadAccessFault,
            MemoryAccessType::Write => TrapType::StoreAccessFault,
        };
        Err(Trap {
            trap_type,
            value: address as u64,
        })
    }

    /// Fetches an instruction word.
    ///
    /// # Arguments
    /// * `address` Program counter
    pub fn fetch_word(&self, address: VAddr) -> Result<u32, Trap> {
        let offset = self.translate(address, 4, MemoryAccessType::Execute)?;
        Ok(self.memory.read_word(offset))
    }

    /// Loads `width` bytes, zero-extended.
    ///
    /// # Arguments
    /// * `address`
    /// * `width` One of 1, 2, 4, 8
    pub fn load(&self, address: VAddr, width: u64) -> Result<u64, Trap> {
        let offset = self.translate(address, width, MemoryAccessType::Read)?;
        match width {
            1 => Ok(self.memory.read_byte(offset) as u64),
            2 => Ok(self.memory.read_halfword(offset) as u64),
            4 => Ok(self.memory.read_word(offset) as u64),
            8 => Ok(self.memory.read_doubleword(offset)),
            _ => Err(Trap {
                trap_type: TrapType::LoadAccessFault,
                value: address as u64,
            }),
        }
    }

    /// Stores the low `width` bytes of `value`.
    ///
    /// # Arguments
    /// * `address`
    /// * `width` One of 1, 2, 4, 8
    /// * `value`
    pub fn store(&mut self, address: VAddr, width: u64, value: u64) -> Result<(), Trap> {
        let offset = self.translate(address, width, MemoryAccessType::Write)?;
        match width {
            1 => self.memory.write_byte(offset, value as u8),
            2 => self.memory.write_halfword(offset, value as u16),
            4 => self.memory.write_word(offset, value as u32),
            8 => self.memory.write_doubleword(offset, value),
            _ => {
                return Err(Trap {
                    trap_type: TrapType::StoreAccessFault,
                    value: address as u64,
                })
            }
        }
        Ok(())
    }

    pub fn load_word(&self, address: VAddr) -> Result<Word, Trap> {
        self.load(address, 4).map(|value| value as Word)
    }

    pub fn store_word(&mut self, address: VAddr, value: Word) -> Result<(), Trap> {
        self.store(address, 4, value as u64)
    }

    /// Copies `data` into RAM starting at `address`.
    pub fn store_bytes(&mut self, address: VAddr, data: &[u8]) -> Result<(), Trap> {
        let offset = self.translate(address, data.len() as u64, MemoryAccessType::Write)?;
        for (i, byte) in data.iter().enumerate() {
            self.memory.write_byte(offset + i as u64, *byte);
        }
        Ok(())
    }
}
