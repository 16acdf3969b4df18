use thiserror::Error;

use super::code::{Instruction, Operand};
use crate::sim::inst::{decode_opcode, Opcode};

#[derive(Debug, PartialEq, Eq, Error)]
#[error("line {line_num}: {message}")]
pub struct ScanError {
    pub line_num: usize,
    pub message: String,
}

// One instruction per line:
//   <opcode> [operand] [operand] ; comment
// where the opcode is its number or its mnemonic, and an operand is rN or $N.
pub struct Scanner {
    line_num: usize,
}

impl Scanner {
    pub fn new() -> Scanner {
        Scanner { line_num: 1 }
    }

    pub fn scan(input: &str) -> Result<Vec<Instruction>, ScanError> {
        Scanner::new().scan_src(input)
    }

    fn error<T>(&self, message: String) -> Result<T, ScanError> {
        Err(ScanError {
            line_num: self.line_num,
            message,
        })
    }

    pub fn scan_src(&mut self, src: &str) -> Result<Vec<Instruction>, ScanError> {
        let mut instructions = Vec::new();
        for line in src.lines() {
            if let Some(inst) = self.scan_line(line)? {
                instructions.push(inst);
            }
            self.line_num += 1;
        }
        Ok(instructions)
    }

    fn scan_line(&self, input: &str) -> Result<Option<Instruction>, ScanError> {
        let input = match input.find(';') {
            Some(i) => input[..i].trim(),
            None => input.trim(),
        };
        if input.is_empty() {
            return Ok(None);
        }
        let parts = Self::split_command(input);
        let (head, args) = match parts.split_first() {
            Some(x) => x,
            None => return Ok(None),
        };
        let opcode = self.scan_opcode(head)?;
        if args.len() != opcode.arity() {
            return self.error(format!(
                "{} takes {} operands, found {}",
                opcode,
                opcode.arity(),
                args.len()
            ));
        }
        let operands = args
            .iter()
            .map(|a| self.scan_operand(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Instruction::new(opcode, operands)))
    }

    fn scan_opcode(&self, input: &str) -> Result<Opcode, ScanError> {
        let opcode = match input.parse::<u8>() {
            Ok(x) => decode_opcode(x),
            Err(_) => Opcode::from_mnemonic(input),
        };
        match opcode {
            Some(op) => Ok(op),
            None => self.error(format!("invalid opcode: {}", input)),
        }
    }

    fn scan_operand(&self, input: &str) -> Result<Operand, ScanError> {
        match input.parse() {
            Ok(x) => Ok(x),
            Err(e) => self.error(e),
        }
    }

    fn split_command(input: &str) -> Vec<&str> {
        input
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner::new()
    }
}
