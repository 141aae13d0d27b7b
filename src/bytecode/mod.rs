/*!

  IntCode programs are flat sequences of signed 64 bit cells. There is no separate code
  segment: an instruction is whatever cell the instruction pointer reaches, followed by as many
  parameter cells as its operation requires, and programs routinely overwrite their own
  instructions. Consequently nothing is decoded ahead of time. The machine decodes the word at
  the instruction pointer on every step.

  An instruction word has the decimal layout

    [mode of parameter n] ... [mode of parameter 1][mode of parameter 0][opcode:2 digits]

  with absent mode digits meaning position mode. Opcode lengths and parameter roles are held
  in a single read-only table built on first use.

  The textual source form of a program, comma separated integers, is handled by `source`.

*/

mod binary;
mod instruction;
pub mod source;

pub use binary::{disassemble, try_decode_instruction};
pub use instruction::{Instruction, Mode, Operation, Parameter, Signature};
pub use source::{parse_program, parse_programs};
