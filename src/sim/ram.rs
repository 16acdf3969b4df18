use crate::utils::format_bytes;

// Physical memory. Allocated once at startup and never resized.
pub struct Ram {
    byte_array: ByteArray,
}

impl Ram {
    pub fn new(mem_size: usize) -> Ram {
        Ram {
            byte_array: ByteArray::new(mem_size),
        }
    }

    pub fn read(&self, addr: usize) -> u8 {
        self.byte_array.read(addr)
    }

    pub fn write(&mut self, addr: usize, value: u8) {
        self.byte_array.write(addr, value);
    }

    pub fn size(&self) -> usize {
        self.byte_array.size()
    }

    /// Borrow `len` bytes starting at `addr`. Used by the swapper, which must
    /// copy whole frames without going through address translation.
    pub fn frame(&self, addr: usize, len: usize) -> &[u8] {
        &self.byte_array.memory[addr..addr + len]
    }

    pub fn load_frame(&mut self, addr: usize, bytes: &[u8]) {
        self.byte_array.memory[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub fn fill(&mut self, addr: usize, len: usize, value: u8) {
        self.byte_array.memory[addr..addr + len].fill(value);
    }

    pub fn dump(&self, start: Option<usize>, end: Option<usize>) -> String {
        format_bytes(&self.byte_array.memory, start, end)
    }
}

pub struct ByteArray {
    pub memory: Vec<u8>,
}

impl ByteArray {
    pub fn new(mem_size: usize) -> ByteArray {
        ByteArray {
            memory: vec![0; mem_size],
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn read(&self, addr: usize) -> u8 {
        self.memory[addr]
    }

    pub fn write(&mut self, addr: usize, x: u8) {
        self.memory[addr] = x;
    }
}

/// Decode a little-endian u32 from `memory[addr..addr + 4]`.
pub fn read_as_word(memory: &[u8], addr: usize) -> u32 {
    let mut x: u32 = 0;
    for i in 0..4 {
        let m = memory[addr + i] as u32;
        x += m << (8 * i);
    }
    x
}

/// Encode `x` little-endian into `memory[addr..addr + 4]`.
pub fn write_word(memory: &mut [u8], addr: usize, x: u32) {
    let xs = x.to_le_bytes();
    memory[addr..addr + 4].copy_from_slice(&xs);
}

/// Round `number` up to a multiple of `boundary`, or `None` if that does
/// not fit in a u32.
pub fn round_to_boundary(number: u32, boundary: u32) -> Option<u32> {
    let units = number / boundary + u32::from(number % boundary > 0);
    units.checked_mul(boundary)
}
