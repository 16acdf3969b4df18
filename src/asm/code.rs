use std::fmt;
use std::str::FromStr;

use crate::sim::inst::Opcode;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operand {
    Register(u32),
    Literal(u32),
}

impl Operand {
    /// The 4-byte value written into the image.
    pub fn value(self) -> u32 {
        match self {
            Operand::Register(r) => r,
            Operand::Literal(x) => x,
        }
    }
}

impl FromStr for Operand {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if let Some(index) = input.strip_prefix(['r', 'R']) {
            return index
                .parse::<u32>()
                .map(Operand::Register)
                .map_err(|_| format!("Invalid register: {}", input));
        }
        if let Some(num_str) = input.strip_prefix('$') {
            // negative literals are stored two's-complement
            if let Ok(x) = num_str.parse::<u32>() {
                return Ok(Operand::Literal(x));
            }
            if let Ok(x) = num_str.parse::<i32>() {
                return Ok(Operand::Literal(x as u32));
            }
            return Err(format!("Invalid literal: {}", input));
        }
        Err(format!("Invalid operand: {}", input))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "r{}", r),
            Operand::Literal(x) => write!(f, "${}", *x as i32),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction { opcode, operands }
    }

    pub fn byte_length(&self) -> usize {
        1 + 4 * self.operands.len()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}
