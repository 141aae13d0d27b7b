/*!
  This module is responsible for decoding instruction words into `Instruction`s.

  An instruction word, read as a decimal number, is `modes * 100 + opcode`. The digits of
  `modes`, least significant first, give the addressing mode of each parameter in turn. A
  missing digit means position mode, so a word below 100 has all parameters in position mode.
*/
use std::convert::TryFrom;

use super::{Instruction, Mode, Operation, Parameter};
use crate::error::{Error, Result};
use crate::memory::Cell;

/// Splits an instruction word into its opcode field and its mode digits.
fn split_word(word: Cell) -> (Cell, Cell) {
  (word % 100, word / 100)
}

fn try_decode_operation(word: Cell, ip: usize) -> Result<Operation> {
  let (opcode, _modes) = split_word(word);
  u8::try_from(opcode)
    .ok()
    .and_then(|code| Operation::try_from(code).ok())
    .ok_or(Error::InvalidOpcode { opcode, ip })
}

/**
  Decodes the instruction at `ip`. The operation determines the instruction length; an unknown
  operation is an error rather than a guess. The parameters carry their raw values; resolving
  them against memory and the relative base is the machine's job.
*/
pub fn try_decode_instruction(cells: &[Cell], ip: usize) -> Result<Instruction> {
  let out_of_range = |address: usize| Error::AddressOutOfRange {
    address : address as Cell,
    size    : cells.len(),
    ip
  };

  let word      = *cells.get(ip).ok_or_else(|| out_of_range(ip))?;
  let operation = try_decode_operation(word, ip)?;
  let (_opcode, mut modes) = split_word(word);

  let mut parameters = Vec::with_capacity(operation.arity());
  for j in 0..operation.arity() {
    let digit = modes % 10;
    modes /= 10;
    let mode =
      u8::try_from(digit)
        .ok()
        .and_then(|digit| Mode::try_from(digit).ok())
        .ok_or(Error::InvalidMode { mode: digit, ip })?;
    let raw = *cells.get(ip + 1 + j).ok_or_else(|| out_of_range(ip + 1 + j))?;
    parameters.push(Parameter::new(mode, raw));
  }

  let instruction = Instruction { operation, parameters };
  if let Some(Parameter { mode: Mode::Immediate, .. }) = instruction.destination() {
    return Err(Error::ImmediateDestination { operation, ip });
  }

  Ok(instruction)
}

/**
  Produces a listing of the program, one entry per decoded instruction. Cells that do not
  decode, typically data the program keeps after its code, are listed one at a time as `DATA`.
  This is a linear sweep; it does not follow jumps.
*/
pub fn disassemble(cells: &[Cell]) -> Vec<(usize, String)> {
  let mut listing = Vec::new();
  let mut ip = 0;

  while ip < cells.len() {
    match try_decode_instruction(cells, ip) {

      Ok(instruction) => {
        listing.push((ip, instruction.to_string()));
        ip += instruction.length();
      }

      Err(_) => {
        listing.push((ip, format!("DATA {}", cells[ip])));
        ip += 1;
      }

    }
  }

  listing
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn low_words_default_to_position_mode(){
    let instruction = try_decode_instruction(&[1, 0, 0, 0, 99], 0).unwrap();
    assert_eq!(instruction.operation, Operation::Add);
    assert_eq!(instruction.length(), 4);
    assert!(instruction.parameters.iter().all(|p| p.mode == Mode::Position));
  }

  #[test]
  fn mode_digits(){
    let instruction = try_decode_instruction(&[1002, 4, 3, 4, 33], 0).unwrap();
    assert_eq!(
      instruction.parameters,
      vec![
        Parameter::new(Mode::Position,  4),
        Parameter::new(Mode::Immediate, 3),
        Parameter::new(Mode::Position,  4),
      ]
    );

    let instruction = try_decode_instruction(&[0, 21101, 5, 6, 7], 1).unwrap();
    assert_eq!(instruction.parameters[0].mode, Mode::Immediate);
    assert_eq!(instruction.parameters[1].mode, Mode::Immediate);
    assert_eq!(instruction.parameters[2].mode, Mode::Relative);

    let instruction = try_decode_instruction(&[204, -1], 0).unwrap();
    assert_eq!(instruction.operation, Operation::Write);
    assert_eq!(instruction.parameters, vec![Parameter::new(Mode::Relative, -1)]);
  }

  #[test]
  fn terminate_has_no_parameters(){
    let instruction = try_decode_instruction(&[99], 0).unwrap();
    assert_eq!(instruction.operation, Operation::Terminate);
    assert!(instruction.parameters.is_empty());
  }

  #[test]
  fn invalid_opcodes(){
    assert!(matches!(
      try_decode_instruction(&[42, 0, 0], 0),
      Err(Error::InvalidOpcode { opcode: 42, ip: 0 })
    ));
    assert!(matches!(
      try_decode_instruction(&[0, -1], 1),
      Err(Error::InvalidOpcode { opcode: -1, ip: 1 })
    ));
  }

  #[test]
  fn invalid_modes(){
    assert!(matches!(
      try_decode_instruction(&[301, 0, 0, 0], 0),
      Err(Error::InvalidMode { mode: 3, ip: 0 })
    ));
  }

  #[test]
  fn immediate_destination_is_rejected(){
    assert!(matches!(
      try_decode_instruction(&[11101, 1, 1, 0], 0),
      Err(Error::ImmediateDestination { operation: Operation::Add, ip: 0 })
    ));
    assert!(matches!(
      try_decode_instruction(&[103, 0], 0),
      Err(Error::ImmediateDestination { operation: Operation::Read, ip: 0 })
    ));
    // Immediate jump targets are fine.
    assert!(try_decode_instruction(&[1105, 1, 7], 0).is_ok());
  }

  #[test]
  fn truncated_instruction(){
    assert!(matches!(
      try_decode_instruction(&[1, 0, 0], 0),
      Err(Error::AddressOutOfRange { address: 3, size: 3, ip: 0 })
    ));
    assert!(matches!(
      try_decode_instruction(&[99], 1),
      Err(Error::AddressOutOfRange { address: 1, size: 1, ip: 1 })
    ));
  }

  #[test]
  fn listing(){
    let listing = disassemble(&[1002, 4, 3, 4, 3, 0, 4, 0, 99, -1]);
    let text: Vec<&str> = listing.iter().map(|(_, line)| line.as_str()).collect();
    assert_eq!(
      text,
      vec!["Multiply([4], 3, [4])", "Read([0])", "Write([0])", "Terminate", "DATA -1"]
    );
    let addresses: Vec<usize> = listing.iter().map(|(ip, _)| *ip).collect();
    assert_eq!(addresses, vec![0, 4, 6, 8, 9]);
  }
}
