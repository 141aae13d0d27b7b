use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter};

use crate::address::Address;
use crate::memory::Cell;

/**
  Operations of the virtual machine. The discriminant of each variant is the opcode, the low
  two decimal digits of an instruction word.

  Everything else the machine needs to know about an operation, its length in cells, how many
  of its parameters are read as values and whether its last parameter is a write destination,
  lives in the `SIGNATURES` table below.
*/
#[derive(
StrumDisplay, TryFromPrimitive, IntoPrimitive, EnumIter,
Clone,        Copy,             Eq, PartialEq, Debug, Hash
)]
#[repr(u8)]
pub enum Operation {
  Add             =  1,  // add( value, value, destination )
  Multiply        =  2,  // multiply( value, value, destination )
  Read            =  3,  // read( destination )
  Write           =  4,  // write( value )
  JumpIfTrue      =  5,  // jump_if_true( value, target )
  JumpIfFalse     =  6,  // jump_if_false( value, target )
  LessThan        =  7,  // less_than( value, value, destination )
  Equals          =  8,  // equals( value, value, destination )
  SetRelativeBase =  9,  // set_relative_base( value )
  Terminate       = 99,  // terminate
}

/// The shape of an instruction for a given operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Signature {
  /// Instruction length in cells, including the opcode word.
  pub length : usize,
  /// Leading parameters consumed as values.
  pub values : usize,
  /// Whether one further parameter names the cell the instruction writes.
  pub writes : bool,
}

const fn signature(length: usize, values: usize, writes: bool) -> Signature {
  Signature { length, values, writes }
}

lazy_static! {
  static ref SIGNATURES: HashMap<Operation, Signature> = {
    let mut table = HashMap::new();
    table.insert(Operation::Add,             signature(4, 2, true ));
    table.insert(Operation::Multiply,        signature(4, 2, true ));
    table.insert(Operation::Read,            signature(2, 0, true ));
    table.insert(Operation::Write,           signature(2, 1, false));
    table.insert(Operation::JumpIfTrue,      signature(3, 2, false));
    table.insert(Operation::JumpIfFalse,     signature(3, 2, false));
    table.insert(Operation::LessThan,        signature(4, 2, true ));
    table.insert(Operation::Equals,          signature(4, 2, true ));
    table.insert(Operation::SetRelativeBase, signature(2, 1, false));
    table.insert(Operation::Terminate,       signature(1, 0, false));
    table
  };
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn signature(&self) -> Signature {
    // Every variant has an entry.
    SIGNATURES[self]
  }

  /// Instruction length in cells.
  pub fn length(&self) -> usize {
    self.signature().length
  }

  /// Number of parameters following the opcode word.
  pub fn arity(&self) -> usize {
    self.length() - 1
  }

  pub fn writes_memory(&self) -> bool {
    self.signature().writes
  }

  /// Index of the destination parameter, for operations that write memory.
  pub fn destination(&self) -> Option<usize> {
    match self.writes_memory() {
      true  => Some(self.arity() - 1),
      false => None
    }
  }
}

/// How a parameter's raw value is interpreted.
#[derive(
StrumDisplay, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,             Eq, PartialEq, Debug, Hash
)]
#[repr(u8)]
pub enum Mode {
  /// The raw value is an address into memory.
  Position  = 0,
  /// The raw value is the operand.
  Immediate = 1,
  /// The raw value is an offset from the relative base.
  Relative  = 2,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Parameter {
  pub mode : Mode,
  pub raw  : Cell,
}

impl Parameter {
  pub fn new(mode: Mode, raw: Cell) -> Parameter {
    Parameter { mode, raw }
  }

  /// The memory location this parameter refers to. Immediate parameters refer to none.
  pub fn address(&self) -> Option<Address> {
    match self.mode {
      Mode::Position  => Some(Address::Absolute(self.raw)),
      Mode::Relative  => Some(Address::Relative(self.raw)),
      Mode::Immediate => None
    }
  }
}

impl Display for Parameter {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.address() {
      Some(address) => write!(f, "{}", address),
      None          => write!(f, "{}", self.raw)
    }
  }
}

/// A decoded instruction. Ephemeral: it is rebuilt from memory every time the machine reaches
/// it, since programs may rewrite themselves.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
  pub operation  : Operation,
  pub parameters : Vec<Parameter>,
}

impl Instruction {
  pub fn length(&self) -> usize {
    self.operation.length()
  }

  /// The destination parameter of a writing instruction.
  pub fn destination(&self) -> Option<&Parameter> {
    self.operation.destination().and_then(|idx| self.parameters.get(idx))
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.parameters.is_empty() {

      true  => {
        write!(f, "{}", self.operation)
      }

      false => {
        write!(
          f,
          "{}({})",
          self.operation,
          self.parameters
              .iter()
              .map(Parameter::to_string)
              .collect::<Vec<String>>()
              .join(", ")
        )
      }

    }
  }
}
