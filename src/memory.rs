//! The tape. A flat, fixed-size vector of signed 64-bit cells, sized generously at load time
//! so that programs may address cells beyond their own length.

use std::ops::Index;

/// A single memory cell, and the type of every value the machine computes with.
pub type Cell = i64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
  cells: Vec<Cell>,
}

impl Memory {

  /// Allocates `size` cells (at least `program.len()`) and copies the program to offset 0.
  pub fn with_program(program: &[Cell], size: usize) -> Memory {
    let mut cells = vec![0; size.max(program.len())];
    cells[..program.len()].copy_from_slice(program);
    Memory { cells }
  }

  /// Zeroes the tape and copies `program` back to offset 0. The size does not change.
  pub fn reload(&mut self, program: &[Cell]) {
    for cell in self.cells.iter_mut() {
      *cell = 0;
    }
    self.cells[..program.len()].copy_from_slice(program);
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  /// Converts a signed address into an index, if it lies on the tape.
  pub fn index_of(&self, address: Cell) -> Option<usize> {
    match address >= 0 && (address as u64) < self.cells.len() as u64 {
      true  => Some(address as usize),
      false => None
    }
  }

  pub fn get(&self, address: Cell) -> Option<Cell> {
    self.index_of(address).map(|idx| self.cells[idx])
  }

  /// Stores `value` at `address`, returning `None` without writing if it is off the tape.
  pub fn set(&mut self, address: Cell, value: Cell) -> Option<()> {
    let idx = self.index_of(address)?;
    self.cells[idx] = value;
    Some(())
  }

  pub fn as_slice(&self) -> &[Cell] {
    &self.cells
  }
}

impl Index<usize> for Memory {
  type Output = Cell;

  fn index(&self, idx: usize) -> &Cell {
    &self.cells[idx]
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn program_is_copied_and_padded(){
    let memory = Memory::with_program(&[1, 2, 3], 8);
    assert_eq!(memory.len(), 8);
    assert_eq!(memory.as_slice(), &[1, 2, 3, 0, 0, 0, 0, 0]);
  }

  #[test]
  fn size_never_below_program_length(){
    let memory = Memory::with_program(&[7, 7, 7, 7], 2);
    assert_eq!(memory.len(), 4);
  }

  #[test]
  fn out_of_range_addresses(){
    let mut memory = Memory::with_program(&[5], 4);
    assert_eq!(memory.get(-1), None);
    assert_eq!(memory.get(4), None);
    assert_eq!(memory.get(3), Some(0));
    assert_eq!(memory.set(4, 9), None);
    assert_eq!(memory.set(-7, 9), None);
    assert_eq!(memory.as_slice(), &[5, 0, 0, 0]);
  }

  #[test]
  fn reload_restores_program(){
    let mut memory = Memory::with_program(&[1, 2], 4);
    memory.set(0, 40);
    memory.set(3, 41);
    memory.reload(&[1, 2]);
    assert_eq!(memory.as_slice(), &[1, 2, 0, 0]);
  }
}
