use super::code::Instruction;
use crate::sim::inst::encode_opcode;
use crate::sim::ram::write_word;

fn assemble_one(inst: &Instruction) -> Vec<u8> {
    let mut xs = vec![0; inst.byte_length()];
    xs[0] = encode_opcode(inst.opcode);
    for (i, operand) in inst.operands.iter().enumerate() {
        write_word(&mut xs, 1 + 4 * i, operand.value());
    }
    xs
}

/// Opcode byte followed by each operand as a little-endian word, with no
/// padding between instructions.
pub fn assemble_many(instructions: &[Instruction]) -> Vec<u8> {
    let mut xs = Vec::new();
    for inst in instructions {
        xs.append(&mut assemble_one(inst));
    }
    xs
}
