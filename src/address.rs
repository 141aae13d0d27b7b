//! An `Either` type that holds a memory location as it was encoded by a parameter, either an
//! absolute address or an offset from the relative base, with some convenience functions.

use std::fmt::{Display, Formatter};

use crate::memory::Cell;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Address {
  /// An index into the tape, taken directly from a position-mode parameter.
  Absolute(Cell),
  /// An offset from the machine's relative base, taken from a relative-mode parameter.
  Relative(Cell)
}

impl Address {
  /// Computes the effective address, or `None` if the relative base plus offset overflows.
  /// The result may be negative or past the end of memory; range checking is the job of
  /// `Memory`.
  pub fn effective(&self, relative_base: Cell) -> Option<Cell> {
    match self {
      Address::Absolute(address) => Some(*address),
      Address::Relative(offset)  => relative_base.checked_add(*offset)
    }
  }
}


impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Address::Absolute(i) => {
        write!(f, "[{}]", i)
      },
      Address::Relative(i) if *i < 0 => {
        write!(f, "[rb{}]", i)
      },
      Address::Relative(i) => {
        write!(f, "[rb+{}]", i)
      }
    }
  }
}
