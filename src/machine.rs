//! Structures and functions for the IntCode machine: memory, the instruction pointer, the
//! relative base, and the run/halt/complete state machine that drives them.

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};
use strum_macros::Display as StrumDisplay;
use tracing::{debug, error, trace};

use crate::address::Address;
use crate::bytecode::{try_decode_instruction, Instruction, Operation, Parameter};
use crate::config::MachineConfig;
use crate::error::{Error, Result};
use crate::io::{channel_pair, Handle, Io, IoMode, Ports, Prompt};
use crate::memory::{Cell, Memory};

/// Number of cells on either side of the instruction pointer shown by `Display`.
const MEMORY_WINDOW: usize = 6;

#[derive(StrumDisplay, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum State {
  /// Loaded, nothing executed yet.
  Ready,
  Running,
  /// Suspended right after a `Write`; resumable.
  HaltedOnOutput,
  /// Terminated or faulted. Terminal.
  Completed,
}

pub struct Machine {

  // Memory Stores
  program : Vec<Cell>, // The program as loaded, for `reset`
  memory  : Memory,    // The tape

  // Registers //
  ip            : usize, // Instruction pointer
  relative_base : Cell,

  // Flags
  state          : State,
  halt_on_output : bool,

  io    : Io,
  fault : Option<Error>, // Why the machine completed, if it did not terminate normally
  steps : u64,           // Instructions executed since load or reset

}

impl Machine {

  // region Display methods

  fn make_memory_table(memory: &Memory, highlight: usize) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    let start = highlight.saturating_sub(MEMORY_WINDOW);
    let end   = (highlight + MEMORY_WINDOW + 1).min(memory.len());

    for i in start..end {
      match i == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> M[{}] =", i), format!("{}", memory[i])]
          );
        }

        false => {
          table.add_row(
            row![r->format!("M[{}] =", i), format!("{}", memory[i])]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);
    table.add_row(row![r->"ip =", format!("{}", self.ip)]);
    table.add_row(row![r->"rb =", format!("{}", self.relative_base)]);
    table.add_row(row![r->"state =", format!("{}", self.state)]);
    table.add_row(row![r->"steps =", format!("{}", self.steps)]);
    table
  }

  // endregion

  // region Construction and inspection

  /**
    Loads `program` onto a fresh tape sized by `config`, with synchronous I/O. A channel-mode
    machine is built with `connected` or `with_ports` instead, so that its driver always holds
    the other end of its channels; asking for one here is an `InvalidConfiguration`.
  */
  pub fn new(program: &[Cell], config: MachineConfig) -> Result<Machine> {
    match config.io_mode {
      IoMode::Synchronous => Machine::with_io(program, &config, Io::synchronous()),
      IoMode::Channel     => Err(Error::InvalidConfiguration(
        "channel-mode machines are built with `Machine::connected` or `Machine::with_ports`".to_string()
      )),
    }
  }

  /// Loads `program` in channel mode over a fresh channel pair sized by `config`, handing the
  /// driver's end back alongside the machine.
  pub fn connected(program: &[Cell], config: MachineConfig) -> Result<(Machine, Handle)> {
    let (ports, handle) = channel_pair(config.channel_capacity);
    let machine = Machine::with_ports(program, config, ports)?;
    Ok((machine, handle))
  }

  /// Loads `program` in channel mode over channels wired by the caller.
  pub fn with_ports(program: &[Cell], config: MachineConfig, ports: Ports) -> Result<Machine> {
    let io = Io::with_ports(ports, config.channel_capacity, config.input_timeout);
    Machine::with_io(program, &config, io)
  }

  fn with_io(program: &[Cell], config: &MachineConfig, io: Io) -> Result<Machine> {
    if program.is_empty() {
      return Err(Error::EmptyProgram);
    }

    let memory = Memory::with_program(program, config.memory_size(program.len()));
    debug!(cells = program.len(), memory = memory.len(), mode = ?io.mode, "program loaded");

    Ok(Machine {
      program        : program.to_vec(),
      memory,
      ip             : 0,
      relative_base  : 0,
      state          : State::Ready,
      halt_on_output : config.halt_on_output,
      io,
      fault          : None,
      steps          : 0,
    })
  }

  /// Installs the input source of last resort.
  pub fn set_prompt(&mut self, prompt: Box<dyn Prompt>) {
    self.io.prompt = Some(prompt);
  }

  /**
    Restores the freshly loaded program and zeroes every register and flag. Local input and
    output stacks are emptied, as is any input still buffered on the input channel.

    A channel-mode machine keeps its channels if they are still open. Once it has completed
    they are closed for good, so it is rewired to a fresh pair sized by its configuration and
    the driver's end of that pair is returned.
  */
  pub fn reset(&mut self) -> Option<Handle> {
    self.memory.reload(&self.program);
    self.ip            = 0;
    self.relative_base = 0;
    self.state         = State::Ready;
    self.fault         = None;
    self.steps         = 0;
    self.io.reset()
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn is_completed(&self) -> bool {
    self.state == State::Completed
  }

  pub fn is_halted_on_output(&self) -> bool {
    self.state == State::HaltedOnOutput
  }

  pub fn io_mode(&self) -> IoMode {
    self.io.mode
  }

  pub fn ip(&self) -> usize {
    self.ip
  }

  pub fn relative_base(&self) -> Cell {
    self.relative_base
  }

  pub fn steps(&self) -> u64 {
    self.steps
  }

  pub fn memory(&self) -> &[Cell] {
    self.memory.as_slice()
  }

  /// The error that completed the machine, if it faulted.
  pub fn fault(&self) -> Option<&Error> {
    self.fault.as_ref()
  }

  pub fn peek(&self, address: Cell) -> Result<Cell> {
    self.memory.get(address).ok_or_else(|| self.out_of_range(address))
  }

  /// Overwrites a cell, typically to patch a program before running it.
  pub fn poke(&mut self, address: Cell, value: Cell) -> Result<()> {
    let error = self.out_of_range(address);
    self.memory.set(address, value).ok_or(error)
  }

  // endregion

  // region Input and output

  /// Queues a value on the local input stack.
  pub fn feed_input(&mut self, value: Cell) {
    self.io.inputs.push_back(value);
  }

  /// Takes the oldest value from the local output stack.
  pub fn take_output(&mut self) -> Option<Cell> {
    self.io.outputs.pop_front()
  }

  /// Takes every value on the local output stack, oldest first.
  pub fn drain_outputs(&mut self) -> Vec<Cell> {
    self.io.outputs.drain(..).collect()
  }

  // endregion

  // region Execution

  /**
    Runs until the machine halts on output or completes. Does nothing to a machine that is
    halted on output (see `resume`) or completed.

    A fault completes the machine, closes its channels and is returned here; it stays
    available from `fault` afterward.
  */
  pub fn run(&mut self) -> Result<State> {
    match self.state {
      State::HaltedOnOutput | State::Completed => return Ok(self.state),
      State::Ready | State::Running            => self.state = State::Running
    }

    while self.state == State::Running {
      self.step()?;
    }

    Ok(self.state)
  }

  /// Clears the halt-on-output flag and runs.
  pub fn resume(&mut self) -> Result<State> {
    if self.state == State::HaltedOnOutput {
      self.state = State::Running;
    }
    self.run()
  }

  /// Keeps resuming until the machine completes, returning the outputs left on the local stack.
  pub fn run_to_completion(&mut self) -> Result<Vec<Cell>> {
    while !self.is_completed() {
      self.resume()?;
    }
    Ok(self.drain_outputs())
  }

  /// Executes exactly one instruction. Halted and completed machines do not move.
  pub fn step(&mut self) -> Result<State> {
    match self.state {
      State::HaltedOnOutput | State::Completed => return Ok(self.state),
      State::Ready                             => self.state = State::Running,
      State::Running                           => {}
    }

    let result =
      try_decode_instruction(self.memory.as_slice(), self.ip)
        .and_then(|instruction| self.execute(&instruction));

    if let Err(e) = result {
      return Err(self.fail(e));
    }

    #[cfg(feature = "trace_computation")] println!("{}", self);

    Ok(self.state)
  }

  fn execute(&mut self, instruction: &Instruction) -> Result<()> {
    trace!(ip = self.ip, rb = self.relative_base, "{}", instruction);

    let operation = instruction.operation;
    let values    = self.operands(instruction)?;
    let next      = self.ip + instruction.length();
    self.steps   += 1;

    match operation {

      Operation::Add => {
        self.store(instruction, values[0].wrapping_add(values[1]))?;
        self.ip = next;
      }

      Operation::Multiply => {
        self.store(instruction, values[0].wrapping_mul(values[1]))?;
        self.ip = next;
      }

      Operation::Read => {
        let value = self.io.read().ok_or(Error::NoInput { ip: self.ip })?;
        self.store(instruction, value)?;
        self.ip = next;
      }

      Operation::Write => {
        let ip = self.ip;
        self.io.write(values[0]).map_err(|_| Error::OutputClosed { ip })?;
        self.ip = next;
        if self.halt_on_output {
          debug!(ip = self.ip, output = values[0], "halted on output");
          self.state = State::HaltedOnOutput;
        }
      }

      Operation::JumpIfTrue => {
        self.ip = match values[0] != 0 {
          true  => self.jump_target(values[1])?,
          false => next
        };
      }

      Operation::JumpIfFalse => {
        self.ip = match values[0] == 0 {
          true  => self.jump_target(values[1])?,
          false => next
        };
      }

      Operation::LessThan => {
        self.store(instruction, (values[0] < values[1]) as Cell)?;
        self.ip = next;
      }

      Operation::Equals => {
        self.store(instruction, (values[0] == values[1]) as Cell)?;
        self.ip = next;
      }

      Operation::SetRelativeBase => {
        self.relative_base =
          self.relative_base
              .checked_add(values[0])
              .ok_or_else(|| self.out_of_range(values[0]))?;
        self.ip = next;
      }

      Operation::Terminate => {
        self.complete();
      }

    } // end match operation

    Ok(())
  }

  /// Resolves the value parameters of `instruction`, leaving any destination unresolved.
  fn operands(&self, instruction: &Instruction) -> Result<Vec<Cell>> {
    instruction
      .parameters
      .iter()
      .take(instruction.operation.signature().values)
      .map(|parameter| self.resolve(parameter))
      .collect()
  }

  /// The value a parameter stands for: the raw value itself, or the cell it addresses.
  pub fn resolve(&self, parameter: &Parameter) -> Result<Cell> {
    match parameter.address() {
      Some(address) => self.peek(self.effective(&address, parameter.raw)?),
      None          => Ok(parameter.raw)
    }
  }

  /// The tape address `address` refers to under the current relative base.
  fn effective(&self, address: &Address, raw: Cell) -> Result<Cell> {
    address
      .effective(self.relative_base)
      .ok_or_else(|| self.out_of_range(raw))
  }

  /// Writes `value` through the destination parameter of `instruction`.
  fn store(&mut self, instruction: &Instruction, value: Cell) -> Result<()> {
    // The decoder guarantees that writing instructions carry a non-immediate destination.
    let (address, raw) =
      instruction
        .destination()
        .and_then(|parameter| parameter.address().map(|address| (address, parameter.raw)))
        .ok_or(Error::ImmediateDestination { operation: instruction.operation, ip: self.ip })?;
    let address = self.effective(&address, raw)?;
    self.poke(address, value)
  }

  fn jump_target(&self, target: Cell) -> Result<usize> {
    match self.memory.index_of(target) {
      Some(idx) => Ok(idx),
      None      => Err(self.out_of_range(target))
    }
  }

  fn out_of_range(&self, address: Cell) -> Error {
    Error::AddressOutOfRange {
      address,
      size : self.memory.len(),
      ip   : self.ip
    }
  }

  /// Enters `Completed` and signals it on the channels.
  fn complete(&mut self) {
    debug!(ip = self.ip, steps = self.steps, "completed");
    self.state = State::Completed;
    self.io.close();
  }

  /// Completes the machine on a fault, records it, and hands it back for returning.
  fn fail(&mut self, e: Error) -> Error {
    error!(ip = self.ip, rb = self.relative_base, "machine fault: {}", e);
    self.complete();
    self.fault = Some(e.clone());
    e
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let r_table = self.make_register_table();
    let m_table = Machine::make_memory_table(&self.memory, self.ip);

    let mut combined_table = table!([r_table, m_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Memory"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let next = match try_decode_instruction(self.memory.as_slice(), self.ip) {
      Ok(instruction) => instruction.to_string(),
      Err(e)          => e.to_string()
    };

    write!(f, "Next: {}\n{}", next, combined_table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Mode;

  fn machine(program: &[Cell]) -> Machine {
    Machine::new(program, MachineConfig::default()).unwrap()
  }

  #[test]
  fn add_and_multiply(){
    let mut m = machine(&[1, 0, 0, 0, 99]);
    assert_eq!(m.run().unwrap(), State::Completed);
    assert_eq!(&m.memory()[..5], &[2, 0, 0, 0, 99]);

    let mut m = machine(&[2, 4, 4, 5, 99, 0]);
    m.run().unwrap();
    assert_eq!(&m.memory()[..6], &[2, 4, 4, 5, 99, 9801]);

    let mut m = machine(&[1, 1, 1, 4, 99, 5, 6, 0, 99]);
    m.run().unwrap();
    assert_eq!(&m.memory()[..9], &[30, 1, 1, 4, 2, 5, 6, 0, 99]);
  }

  #[test]
  fn terminate_only(){
    let mut m = machine(&[99]);
    let before = m.memory().to_vec();
    assert_eq!(m.run().unwrap(), State::Completed);
    assert_eq!(m.ip(), 0);
    assert_eq!(m.memory(), &before[..]);
  }

  #[test]
  fn completed_is_terminal(){
    let mut m = machine(&[1101, 2, 3, 5, 99, 0]);
    m.run().unwrap();
    let memory = m.memory().to_vec();
    let ip = m.ip();

    for _ in 0..3 {
      assert_eq!(m.resume().unwrap(), State::Completed);
      assert_eq!(m.step().unwrap(), State::Completed);
    }
    assert!(m.is_completed());
    assert_eq!(m.ip(), ip);
    assert_eq!(m.memory(), &memory[..]);
  }

  #[test]
  fn relative_mode_reads_and_writes(){
    // rb = 10; M[rb+1] = M[rb-10] + M[rb-10]; write M[11]
    let mut m = machine(&[109, 10, 22201, -10, -10, 1, 4, 11, 99]);
    m.run().unwrap();
    assert_eq!(m.relative_base(), 10);
    assert_eq!(m.memory()[11], 109 + 109);
    assert_eq!(m.drain_outputs(), vec![218]);
  }

  #[test]
  fn resolving_parameters(){
    let mut m = machine(&[109, 3, 99, 42]);
    m.run().unwrap();
    assert_eq!(m.resolve(&Parameter::new(Mode::Immediate, 17)).unwrap(), 17);
    assert_eq!(m.resolve(&Parameter::new(Mode::Position, 3)).unwrap(), 42);
    assert_eq!(m.resolve(&Parameter::new(Mode::Relative, 0)).unwrap(), 42);
    assert_eq!(m.resolve(&Parameter::new(Mode::Relative, -3)).unwrap(), 109);
  }

  #[test]
  fn jumps(){
    // Outputs 0 if the input is 0, 1 otherwise.
    let program = [3, 3, 1105, -1, 9, 1101, 0, 0, 12, 4, 12, 99, 1];
    for (input, expected) in [(0, 0), (5, 1)].iter() {
      let mut m = machine(&program);
      m.feed_input(*input);
      m.run().unwrap();
      assert_eq!(m.drain_outputs(), vec![*expected]);
    }
  }

  #[test]
  fn invalid_opcode_completes(){
    let mut m = machine(&[1101, 1, 1, 0, 77]);
    let result = m.run();
    assert!(matches!(result, Err(Error::InvalidOpcode { opcode: 77, ip: 4 })));
    assert!(m.is_completed());
    assert!(matches!(m.fault(), Some(Error::InvalidOpcode { .. })));
    assert_eq!(m.memory()[0], 2);
  }

  #[test]
  fn out_of_range_completes(){
    let config = MachineConfig::default().with_memory(1, 0);
    let mut m = Machine::new(&[1, 0, 0, 9, 99], config).unwrap();
    assert!(matches!(
      m.run(),
      Err(Error::AddressOutOfRange { address: 9, size: 5, ip: 0 })
    ));
    assert!(m.is_completed());

    let mut m = machine(&[109, -5, 204, 0, 99]);
    assert!(matches!(m.run(), Err(Error::AddressOutOfRange { address: -5, ip: 2, .. })));

    let mut m = machine(&[1105, 1, -1]);
    assert!(matches!(m.run(), Err(Error::AddressOutOfRange { address: -1, .. })));
  }

  #[test]
  fn missing_input_is_fatal(){
    let mut m = machine(&[3, 0, 99]);
    assert!(matches!(m.run(), Err(Error::NoInput { ip: 0 })));
    assert!(m.is_completed());
  }

  #[test]
  fn halt_on_output(){
    let config = MachineConfig::default().with_halt_on_output(true);
    let mut m = Machine::new(&[104, 1, 104, 2, 99], config).unwrap();

    assert_eq!(m.run().unwrap(), State::HaltedOnOutput);
    assert_eq!(m.ip(), 2);
    assert_eq!(m.drain_outputs(), vec![1]);

    // `run` does not clear the halt.
    assert_eq!(m.run().unwrap(), State::HaltedOnOutput);
    assert!(m.drain_outputs().is_empty());

    assert_eq!(m.resume().unwrap(), State::HaltedOnOutput);
    assert_eq!(m.drain_outputs(), vec![2]);
    assert!(!m.is_completed());

    assert_eq!(m.resume().unwrap(), State::Completed);
    assert!(m.drain_outputs().is_empty());
  }

  #[test]
  fn poke_then_run(){
    let mut m = machine(&[1, 0, 0, 0, 99, 30, 40]);
    m.poke(1, 5).unwrap();
    m.poke(2, 6).unwrap();
    m.run().unwrap();
    assert_eq!(m.peek(0).unwrap(), 70);
    assert!(m.poke(-1, 0).is_err());
    assert!(m.peek(1_000_000).is_err());
  }

  #[test]
  fn reset_restores_program(){
    let config = MachineConfig::default().with_halt_on_output(true);
    let mut m = Machine::new(&[3, 9, 4, 9, 1101, 1, 1, 9, 99, 0], config).unwrap();
    m.feed_input(5);
    m.run().unwrap();
    assert_eq!(m.take_output(), Some(5));
    m.resume().unwrap();
    assert_eq!(m.memory()[9], 2);

    m.reset();
    assert_eq!(m.state(), State::Ready);
    assert_eq!(m.ip(), 0);
    assert_eq!(m.steps(), 0);
    assert_eq!(m.memory()[9], 0);
    m.feed_input(8);
    m.run().unwrap();
    assert_eq!(m.take_output(), Some(8));
  }

  #[test]
  fn relative_overflow_is_out_of_range(){
    let mut m = machine(&[109, Cell::MIN, 204, Cell::MIN, 99]);
    assert!(matches!(m.run(), Err(Error::AddressOutOfRange { address: Cell::MIN, ip: 2, .. })));
    assert!(m.is_completed());
    assert!(m.drain_outputs().is_empty());

    // Writing through an overflowing destination.
    let mut m = machine(&[109, Cell::MAX, 21101, 1, 1, 1, 99]);
    assert!(matches!(m.run(), Err(Error::AddressOutOfRange { address: 1, ip: 2, .. })));

    // Moving the relative base itself past the end of the cell range.
    let mut m = machine(&[109, Cell::MAX, 109, 1, 99]);
    assert!(matches!(m.run(), Err(Error::AddressOutOfRange { address: 1, ip: 2, .. })));
    assert_eq!(m.relative_base(), Cell::MAX);
  }

  #[test]
  fn channel_mode_needs_a_driver(){
    let config = MachineConfig::default().with_io_mode(IoMode::Channel);
    assert!(matches!(Machine::new(&[99], config), Err(Error::InvalidConfiguration(_))));
  }

  #[test]
  fn dropped_handle_does_not_block(){
    let config = MachineConfig::default().with_input_timeout(std::time::Duration::from_secs(60));
    let (mut m, handle) = Machine::connected(&[3, 0, 4, 0, 99], config).unwrap();
    assert_eq!(m.io_mode(), IoMode::Channel);
    drop(handle);
    m.feed_input(5);

    // The read falls back to the local stack at once; the write has nobody to deliver to.
    assert!(matches!(m.run(), Err(Error::OutputClosed { ip: 2 })));
    assert_eq!(m.memory()[0], 5);
  }

  #[test]
  fn reset_rewires_a_completed_channel_machine(){
    let config = MachineConfig::default().with_channel_capacity(1);
    let (mut m, handle) = Machine::connected(&[3, 0, 4, 0, 99], config).unwrap();

    assert!(handle.feed_input(5));
    assert_eq!(m.run().unwrap(), State::Completed);
    assert_eq!(handle.take_output(), Some(5));
    assert_eq!(handle.take_output(), None);

    let handle = m.reset().unwrap();
    assert!(handle.feed_input(6));
    assert_eq!(m.run().unwrap(), State::Completed);
    assert_eq!(handle.take_output(), Some(6));
  }

  #[test]
  fn reset_keeps_caller_wiring(){
    let (ports, handle) = channel_pair(1);
    let mut m = Machine::with_ports(&[3, 0, 4, 0, 99], MachineConfig::default(), ports).unwrap();
    assert!(m.reset().is_none());

    assert!(handle.feed_input(7));
    m.run().unwrap();
    assert_eq!(handle.take_output(), Some(7));
    assert!(machine(&[99]).reset().is_none());
  }

  #[test]
  fn empty_program_is_rejected(){
    assert!(matches!(Machine::new(&[], MachineConfig::default()), Err(Error::EmptyProgram)));
  }

  #[test]
  fn display_shows_next_instruction(){
    let m = machine(&[1002, 4, 3, 4, 33]);
    let text = format!("{}", m);
    assert!(text.starts_with("Next: Multiply([4], 3, [4])"));
  }
}
