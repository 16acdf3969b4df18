mod code;
mod image;
mod scanner;

use std::fmt;
use std::str::FromStr;

pub use self::code::{Instruction, Operand};
pub use self::scanner::ScanError;

/// A parsed program, ready to be turned into a process image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Program {
        Program { instructions }
    }

    pub fn parse(src: &str) -> Result<Program, ScanError> {
        scanner::Scanner::scan(src).map(Program::new)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn memory_image(&self) -> Vec<u8> {
        image::assemble_many(&self.instructions)
    }
}

impl FromStr for Program {
    type Err = ScanError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Program::parse(src)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut addr = 0;
        for inst in &self.instructions {
            writeln!(f, "{:>4}: {}", addr, inst)?;
            addr += inst.byte_length();
        }
        Ok(())
    }
}
