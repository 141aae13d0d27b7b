//! Errors raised while loading, decoding and running IntCode programs, and while composing
//! machines into pipelines.
//!
//! Every machine error is fatal to the machine that raised it: the machine enters
//! `Completed` and closes its output and done signals before the error is returned. Input
//! timeouts are not errors; only a read with no input source left at all is.

use thiserror::Error;

use crate::bytecode::Operation;
use crate::memory::Cell;

/// Crate result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Error)]
pub enum Error {
  /// The program source contained something other than a signed decimal integer.
  #[error("line {line}, column {column}: `{token}` is not an integer")]
  Load {
    line   : usize,
    column : usize,
    token  : String,
  },

  /// A program source file could not be read.
  #[error("cannot read {path}: {reason}")]
  Unreadable {
    path   : String,
    reason : String,
  },

  /// The program source contained no cells at all.
  #[error("program source is empty")]
  EmptyProgram,

  /// The low two digits of the word at `ip` name no known operation.
  #[error("invalid opcode {opcode} at ip {ip}")]
  InvalidOpcode {
    opcode : Cell,
    ip     : usize,
  },

  /// A resolved address, direct or relative-base adjusted, fell outside the tape.
  #[error("address {address} out of range (memory size {size}) at ip {ip}")]
  AddressOutOfRange {
    address : Cell,
    size    : usize,
    ip      : usize,
  },

  /// An instruction asked to write through an immediate-mode parameter.
  #[error("{operation} at ip {ip} has an immediate-mode destination")]
  ImmediateDestination {
    operation : Operation,
    ip        : usize,
  },

  /// A parameter mode digit other than 0, 1 or 2.
  #[error("invalid parameter mode {mode} at ip {ip}")]
  InvalidMode {
    mode : Cell,
    ip   : usize,
  },

  /// `Read` found no value on its channel, its local stack or a prompt.
  #[error("no input available for read at ip {ip}")]
  NoInput {
    ip: usize
  },

  /// `Write` found its output channel closed by the receiving side.
  #[error("output channel closed while writing at ip {ip}")]
  OutputClosed {
    ip: usize
  },

  /// A machine in a pipeline terminated on a fault; the pipeline result is incomplete.
  #[error("machine {index} failed: {source}")]
  MachineFailed {
    index  : usize,
    #[source]
    source : Box<Error>,
  },

  /// The pipeline finished without producing a final value.
  #[error("pipeline produced no output")]
  NoOutput,

  /// Settings or pipeline shape that cannot be run.
  #[error("invalid configuration: {0}")]
  InvalidConfiguration(String),

  /// The operating system refused to start a machine thread.
  #[error("failed to spawn machine thread: {0}")]
  Spawn(String),

  /// A machine thread panicked instead of returning.
  #[error("machine thread panicked: {0}")]
  ThreadPanicked(String),
}

impl Error {
  /// Wraps the error with the index of the pipeline machine that raised it.
  pub fn in_machine(self, index: usize) -> Error {
    Error::MachineFailed {
      index,
      source: Box::new(self),
    }
  }
}
