/// Emulates main memory.
///
/// Content is held as little-endian doublewords. Addresses are offsets from
/// the start of memory; mapping guest addresses onto offsets is the job of
/// [`Mmu`](super::mmu::Mmu).
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u64>,
}

impl Memory {
    /// Initializes memory content with `capacity` zeroed bytes.
    /// This method is expected to be called only once.
    ///
    /// # Arguments
    /// * `capacity`
    pub fn init(&mut self, capacity: u64) {
        self.data = vec![0; capacity.div_ceil(8) as usize];
    }

    /// Size of memory in bytes.
    pub fn capacity(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    /// Reads a byte from memory.
    ///
    /// # Arguments
    /// * `address`
    pub fn read_byte(&self, address: u64) -> u8 {
        let index = (address >> 3) as usize;
        let pos = (address % 8) * 8;
        (self.data[index] >> pos) as u8
    }

    /// Reads two bytes from memory.
    ///
    /// # Arguments
    /// * `address`
    pub fn read_halfword(&self, address: u64) -> u16 {
        if address % 2 == 0 {
            let index = (address >> 3) as usize;
            let pos = (address % 8) * 8;
            (self.data[index] >> pos) as u16
        } else {
            self.read_bytes(address, 2) as u16
        }
    }

    /// Reads four bytes from memory.
    ///
    /// # Arguments
    /// * `address`
    pub fn read_word(&self, address: u64) -> u32 {
        if address % 4 == 0 {
            let index = (address >> 3) as usize;
            let pos = (address % 8) * 8;
            (self.data[index] >> pos) as u32
        } else {
            self.read_bytes(address, 4) as u32
        }
    }

    /// Reads eight bytes from memory.
    ///
    /// # Arguments
    /// * `address`
    pub fn read_doubleword(&self, address: u64) -> u64 {
        if address % 8 == 0 {
            self.data[(address >> 3) as usize]
        } else if address % 4 == 0 {
            (self.read_word(address) as u64) | ((self.read_word(address.wrapping_add(4)) as u64) << 32)
        } else {
            self.read_bytes(address, 8)
        }
    }

    /// Reads multiple bytes from memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `width` up to eight
    pub fn read_bytes(&self, address: u64, width: u64) -> u64 {
        let mut data = 0_u64;
        for i in 0..width {
            data |= (self.read_byte(address.wrapping_add(i)) as u64) << (i * 8);
        }
        data
    }

    /// Writes a byte to memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `value`
    pub fn write_byte(&mut self, address: u64, value: u8) {
        let index = (address >> 3) as usize;
        let pos = (address % 8) * 8;
        self.data[index] = (self.data[index] & !(0xff << pos)) | ((value as u64) << pos);
    }

    /// Writes two bytes to memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `value`
    pub fn write_halfword(&mut self, address: u64, value: u16) {
        if address % 2 == 0 {
            let index = (address >> 3) as usize;
            let pos = (address % 8) * 8;
            self.data[index] = (self.data[index] & !(0xffff << pos)) | ((value as u64) << pos);
        } else {
            self.write_bytes(address, value as u64, 2);
        }
    }

    /// Writes four bytes to memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `value`
    pub fn write_word(&mut self, address: u64, value: u32) {
        if address % 4 == 0 {
            let index = (address >> 3) as usize;
            let pos = (address % 8) * 8;
            self.data[index] = (self.data[index] & !(0xffffffff << pos)) | ((value as u64) << pos);
        } else {
            self.write_bytes(address, value as u64, 4);
        }
    }

    /// Writes eight bytes to memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `value`
    pub fn write_doubleword(&mut self, address: u64, value: u64) {
        if address % 8 == 0 {
            self.data[(address >> 3) as usize] = value;
        } else if address % 4 == 0 {
            self.write_word(address, (value & 0xffffffff) as u32);
            self.write_word(address.wrapping_add(4), (value >> 32) as u32);
        } else {
            self.write_bytes(address, value, 8);
        }
    }

    /// Write multiple bytes to memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `value`
    /// * `width` up to eight
    pub fn write_bytes(&mut self, address: u64, value: u64, width: u64) {
        for i in 0..width {
            self.write_byte(address.wrapping_add(i), (value >> (i * 8)) as u8);
        }
    }

    /// Checks that `width` bytes starting at `address` lie inside memory.
    ///
    /// # Arguments
    /// * `address`
    /// * `width`
    pub fn validate_range(&self, address: u64, width: u64) -> bool {
        address
            .checked_add(width)
            .is_some_and(|end| end <= self.capacity())
    }
}

#[cfg(test)]
mod test_memory {
    use super::*;

    fn create_memory() -> Memory {
        let mut memory = Memory::default();
        memory.init(64);
        memory
    }

    #[test]
    fn byte_lanes() {
        let mut memory = create_memory();
        memory.write_word(8, 0xdeadbeef);
        assert_eq!(0xef, memory.read_byte(8));
        assert_eq!(0xbe, memory.read_byte(9));
        assert_eq!(0xdead, memory.read_halfword(10));
        assert_eq!(0xdeadbeef, memory.read_doubleword(8));
    }

    #[test]
    fn unaligned_access() {
        let mut memory = create_memory();
        memory.write_word(3, 0x11223344);
        assert_eq!(0x11223344, memory.read_word(3));
        assert_eq!(0x2233, memory.read_halfword(4));
        memory.write_doubleword(13, 0x0102030405060708);
        assert_eq!(0x0102030405060708, memory.read_doubleword(13));
        assert_eq!(0x08, memory.read_byte(13));
    }

    #[test]
    fn range_validation() {
        let memory = create_memory();
        assert!(memory.validate_range(0, 64));
        assert!(memory.validate_range(60, 4));
        assert!(!memory.validate_range(61, 4));
        assert!(!memory.validate_range(u64::MAX, 1));
    }
}
