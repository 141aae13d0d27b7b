//! Construction-time settings for a `Machine`.

use std::time::Duration;

use crate::io::IoMode;

/// Tape size is the program length times this factor, unless that is below `DEFAULT_MIN_MEMORY`.
pub const DEFAULT_MEMORY_FACTOR: usize = 10;
pub const DEFAULT_MIN_MEMORY: usize = 1024;
/// How long a channel-mode `Read` waits before falling back to the local input stack.
pub const DEFAULT_INPUT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  /// Whether I/O goes through the channel pair or the local value stacks.
  pub io_mode          : IoMode,
  /// Suspend after every `Write` until the driver resumes the machine.
  pub halt_on_output   : bool,
  pub memory_factor    : usize,
  pub min_memory       : usize,
  pub input_timeout    : Duration,
  /// Buffer size of the channels `Machine::new` creates in channel mode. Zero is a rendezvous.
  pub channel_capacity : usize,
}

impl Default for MachineConfig {
  fn default() -> MachineConfig {
    MachineConfig {
      io_mode          : IoMode::Synchronous,
      halt_on_output   : false,
      memory_factor    : DEFAULT_MEMORY_FACTOR,
      min_memory       : DEFAULT_MIN_MEMORY,
      input_timeout    : DEFAULT_INPUT_TIMEOUT,
      channel_capacity : 0,
    }
  }
}

impl MachineConfig {
  pub fn with_io_mode(mut self, io_mode: IoMode) -> MachineConfig {
    self.io_mode = io_mode;
    self
  }

  pub fn with_halt_on_output(mut self, halt_on_output: bool) -> MachineConfig {
    self.halt_on_output = halt_on_output;
    self
  }

  pub fn with_memory(mut self, memory_factor: usize, min_memory: usize) -> MachineConfig {
    self.memory_factor = memory_factor;
    self.min_memory    = min_memory;
    self
  }

  pub fn with_input_timeout(mut self, input_timeout: Duration) -> MachineConfig {
    self.input_timeout = input_timeout;
    self
  }

  pub fn with_channel_capacity(mut self, channel_capacity: usize) -> MachineConfig {
    self.channel_capacity = channel_capacity;
    self
  }

  /// Number of cells to allocate for a program of the given length.
  pub fn memory_size(&self, program_len: usize) -> usize {
    program_len
      .saturating_mul(self.memory_factor)
      .max(self.min_memory)
      .max(program_len)
  }
}
