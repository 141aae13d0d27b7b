/*!
  A machine's only connection to the outside world.

  In `IoMode::Synchronous` a machine reads from and writes to local value stacks that its caller
  fills and drains between runs. In `IoMode::Channel` it owns `Ports`, the machine's end of a
  channel pair, and whoever drives it holds the matching `Handle`. The machine never holds a
  `Handle` itself, so each of its channels has a live end outside the machine or none at all. A channel-mode `Read` waits
  a bounded time on the input channel, then falls back to the local input stack, then to a
  `Prompt` if one is installed.

  Completion is signalled by dropping every channel end the machine owns: the output and done
  channels disconnect together, exactly once, so anything blocked on the machine wakes up, and
  later sends to its input fail instead of queueing for a reader that is gone.
*/

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::memory::Cell;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IoMode {
  Synchronous,
  Channel,
}

/// A last-resort synchronous input source.
pub trait Prompt: Send {
  /// Produces one input value, or `None` if the source is exhausted.
  fn prompt(&mut self) -> Option<Cell>;
}

/// Asks for input on the terminal.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
  fn prompt(&mut self) -> Option<Cell> {
    eprint!("Enter value: ");
    let _ = std::io::stderr().flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
      Ok(0) => None,
      Ok(_) => match line.trim().parse::<Cell>() {
        Ok(value) => Some(value),
        Err(e)    => {
          warn!(input = line.trim(), error = %e, "prompted input is not an integer");
          None
        }
      },
      Err(e) => {
        warn!(error = %e, "failed to read prompted input");
        None
      }
    }
  }
}

/// The machine's end of a channel pair.
pub struct Ports {
  input  : Option<Receiver<Cell>>,
  output : Option<Sender<Cell>>,
  done   : Option<Sender<()>>,
}

impl Ports {
  /// Wires a machine to arbitrary channels. `done` never carries a message; dropping it is
  /// the completion signal.
  pub fn new(input: Receiver<Cell>, output: Sender<Cell>, done: Sender<()>) -> Ports {
    Ports {
      input  : Some(input),
      output : Some(output),
      done   : Some(done),
    }
  }

  /// Closes every channel end the machine holds. Later calls do nothing.
  pub fn close(&mut self) {
    self.input.take();
    self.output.take();
    self.done.take();
  }

  pub fn is_closed(&self) -> bool {
    self.done.is_none()
  }
}

/// The driver's end of a channel pair.
#[derive(Clone)]
pub struct Handle {
  input  : Sender<Cell>,
  output : Receiver<Cell>,
  done   : Receiver<()>,
}

impl Handle {
  /**
    Sends one input value to the machine. Blocks until the machine (or the channel buffer)
    accepts it, or until the machine completes, in which case the value is dropped and `false`
    is returned.
  */
  pub fn feed_input(&self, value: Cell) -> bool {
    select! {
      send(self.input, value) -> result => result.is_ok(),
      recv(self.done) -> _ => false,
    }
  }

  /// Blocks for the next output value; `None` once the machine has completed and every value
  /// it produced has been taken.
  pub fn take_output(&self) -> Option<Cell> {
    self.output.recv().ok()
  }

  pub fn is_completed(&self) -> bool {
    match self.done.try_recv() {
      Err(TryRecvError::Disconnected) => true,
      _ => false
    }
  }

  pub fn input(&self) -> &Sender<Cell> {
    &self.input
  }

  pub fn output(&self) -> &Receiver<Cell> {
    &self.output
  }

  pub fn done(&self) -> &Receiver<()> {
    &self.done
  }
}

/// Creates a channel pair whose value channels hold up to `capacity` values.
pub fn channel_pair(capacity: usize) -> (Ports, Handle) {
  let (input_tx, input_rx)   = channel::bounded(capacity);
  let (output_tx, output_rx) = channel::bounded(capacity);
  let (done_tx, done_rx)     = channel::bounded(0);

  (
    Ports::new(input_rx, output_tx, done_tx),
    Handle {
      input  : input_tx,
      output : output_rx,
      done   : done_rx,
    }
  )
}

/// Why a write could not be delivered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct OutputClosed;

/// Everything a machine reads from and writes to.
pub(crate) struct Io {
  pub mode    : IoMode,
  pub ports   : Option<Ports>,
  pub inputs  : VecDeque<Cell>,
  pub outputs : VecDeque<Cell>,
  pub prompt  : Option<Box<dyn Prompt>>,
  timeout     : Duration,
  capacity    : usize,
}

impl Io {
  pub fn synchronous() -> Io {
    Io {
      mode     : IoMode::Synchronous,
      ports    : None,
      inputs   : VecDeque::new(),
      outputs  : VecDeque::new(),
      prompt   : None,
      timeout  : Duration::from_secs(0),
      capacity : 0,
    }
  }

  /// Channel mode over channels wired by the caller. `capacity` sizes the pair created if the
  /// channels ever have to be replaced.
  pub fn with_ports(ports: Ports, capacity: usize, timeout: Duration) -> Io {
    Io {
      mode  : IoMode::Channel,
      ports : Some(ports),
      timeout,
      capacity,
      ..Io::synchronous()
    }
  }

  /**
    Clears the local stacks and discards input still buffered on the input channel. Open
    channels are kept. Closed channels cannot be reopened, so they are replaced with a fresh
    pair whose driver end is returned.
  */
  pub fn reset(&mut self) -> Option<Handle> {
    self.inputs.clear();
    self.outputs.clear();

    if self.mode != IoMode::Channel {
      return None;
    }

    let input = self.ports.as_ref().and_then(|ports| ports.input.as_ref());
    match input {

      Some(input) => {
        let stale = input.try_iter().count();
        if stale > 0 {
          debug!(stale, "discarded buffered input on reset");
        }
        None
      }

      None => {
        debug!(capacity = self.capacity, "channels closed; rewiring to a fresh pair");
        let (ports, handle) = channel_pair(self.capacity);
        self.ports = Some(ports);
        Some(handle)
      }

    }
  }

  /// Produces the next input value, trying the channel, the local stack and the prompt in turn.
  pub fn read(&mut self) -> Option<Cell> {
    if let Some(input) = self.ports.as_ref().and_then(|ports| ports.input.as_ref()) {
      match input.recv_timeout(self.timeout) {
        Ok(value) => return Some(value),
        Err(RecvTimeoutError::Timeout) => {
          debug!(timeout = ?self.timeout, "input channel timed out; trying the local stack");
        }
        Err(RecvTimeoutError::Disconnected) => {
          debug!("input channel closed; trying the local stack");
        }
      }
    }

    if let Some(value) = self.inputs.pop_front() {
      return Some(value);
    }

    match &mut self.prompt {
      Some(prompt) => {
        debug!("local input stack empty; prompting");
        prompt.prompt()
      }
      None => None
    }
  }

  /// Delivers one output value, blocking on the output channel in channel mode.
  pub fn write(&mut self, value: Cell) -> Result<(), OutputClosed> {
    match self.mode {

      IoMode::Channel => {
        let sender = self.ports.as_ref().and_then(|ports| ports.output.as_ref());
        match sender {
          Some(sender) => sender.send(value).map_err(|_| OutputClosed),
          None         => Err(OutputClosed)
        }
      }

      IoMode::Synchronous => {
        self.outputs.push_back(value);
        Ok(())
      }

    }
  }

  /// Signals completion to everything watching this machine's channels.
  pub fn close(&mut self) {
    if let Some(ports) = &mut self.ports {
      if !ports.is_closed() {
        debug!("closing channels");
      }
      ports.close();
    }
  }
}
