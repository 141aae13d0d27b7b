/*!
  An IntCode virtual machine and the plumbing to run several of them together.

  A `Machine` executes one program on its own tape. Its I/O goes either through local value
  stacks the caller fills and drains between runs, or through a channel pair so that it can
  run on its own thread. On top of that, `pipeline` composes machines into a chain or a
  feedback ring on a single thread, and `concurrent` runs machines on threads, either in a
  threaded ring or in lock-step with a `Controller`.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

mod address;
pub mod bytecode;
pub mod concurrent;
pub mod config;
mod error;
pub mod io;
pub mod machine;
mod memory;
pub mod pipeline;

pub use crate::address::Address;
pub use crate::config::MachineConfig;
pub use crate::error::{Error, Result};
pub use crate::io::{channel_pair, Handle, IoMode, Ports, Prompt, StdinPrompt};
pub use crate::machine::{Machine, State};
pub use crate::memory::Cell;
pub use crate::pipeline::{Pipeline, Topology};

/// Runs `program` synchronously on `inputs` and returns everything it wrote.
pub fn execute(program: &[Cell], inputs: &[Cell]) -> Result<Vec<Cell>> {
  let mut machine = Machine::new(program, MachineConfig::default())?;
  for input in inputs {
    machine.feed_input(*input);
  }
  machine.run_to_completion()
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn execute_compares_with_eight(){
    // Outputs 999 below 8, 1000 at 8 and 1001 above.
    let program = bytecode::parse_program(
      "3,21,1008,21,8,20,1005,20,22,107,8,21,20,1006,20,31,1106,0,36,98,0,0,1002,21,125,20,4,\
       20,1105,1,46,104,999,1105,1,46,1101,1000,1,20,4,20,1105,1,46,98,99"
    ).unwrap();

    assert_eq!(execute(&program, &[7]).unwrap(), vec![999]);
    assert_eq!(execute(&program, &[8]).unwrap(), vec![1000]);
    assert_eq!(execute(&program, &[9]).unwrap(), vec![1001]);
  }

  #[test]
  fn quine(){
    let program = [109, 1, 204, -1, 1001, 100, 1, 100, 1008, 100, 16, 101, 1006, 101, 0, 99];
    assert_eq!(execute(&program, &[]).unwrap(), program.to_vec());
  }

  #[test]
  fn large_numbers(){
    assert_eq!(execute(&[104, 1125899906842624, 99], &[]).unwrap(), vec![1125899906842624]);
    let output = execute(&[1102, 34915192, 34915192, 7, 4, 7, 99, 0], &[]).unwrap();
    assert_eq!(output[0].to_string().len(), 16);
  }
}
