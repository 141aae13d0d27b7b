/*!
  Machines on their own threads.

  Each machine here runs in channel mode with `run_to_completion` on a thread of its own and is
  handed back through its `JoinHandle` when it completes, so its final memory and fault can be
  inspected afterward. Whoever talks to a running machine never blocks on it unconditionally:
  every receive and every send also watches the machine's done channel, which disconnects when
  the machine completes.
*/

use std::any::Any;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, select, Receiver};
use tracing::{debug, info, trace};

use crate::config::MachineConfig;
use crate::error::{Error, Result};
use crate::io::{Handle, IoMode, Ports};
use crate::machine::Machine;
use crate::memory::Cell;

/// Input channels of a threaded ring hold a machine's setting and, for the first machine,
/// the seed, before any machine starts.
const RING_INPUT_CAPACITY: usize = 2;

/**
  The other side of a machine driven by `drive`. The machine's outputs arrive in messages of
  `cycle()` values each, and the controller may answer each message with one input value.
*/
pub trait Controller {
  /// Number of outputs that make up one message.
  fn cycle(&self) -> usize;

  /// An input sent before any output is read.
  fn start(&mut self) -> Option<Cell> {
    None
  }

  /// Handles one complete message and optionally replies with the next input.
  fn respond(&mut self, outputs: &[Cell]) -> Option<Cell>;
}

/// Runs `machine` to completion on a new thread named `name`.
pub fn spawn(mut machine: Machine, name: &str) -> Result<JoinHandle<Machine>> {
  thread::Builder::new()
    .name(name.to_string())
    .spawn(move || {
      if let Err(e) = machine.run_to_completion() {
        debug!("machine thread finished on a fault: {}", e);
      }
      machine
    })
    .map_err(|e| Error::Spawn(e.to_string()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    return message.to_string();
  }
  match payload.downcast_ref::<String>() {
    Some(message) => message.clone(),
    None          => "unknown panic".to_string()
  }
}

/// Waits for a machine thread and surfaces its fault, if it had one.
fn join(worker: JoinHandle<Machine>) -> Result<Machine> {
  let machine = worker.join().map_err(|payload| Error::ThreadPanicked(panic_message(payload)))?;
  match machine.fault() {
    Some(fault) => Err(fault.clone()),
    None        => Ok(machine)
  }
}

/**
  Sends `value` to the machine. Outputs the machine produces while the send is pending are
  collected into `pending`, so a machine that writes before it reads cannot wedge the exchange.
  Returns `false` if the machine completed first.
*/
fn deliver(handle: &Handle, value: Cell, pending: &mut Vec<Cell>) -> bool {
  loop {
    select! {
      send(handle.input(), value) -> result => return result.is_ok(),
      recv(handle.output()) -> output => match output {
        Ok(output) => pending.push(output),
        Err(_)     => return false
      },
      recv(handle.done()) -> _ => return false,
    }
  }
}

/**
  Runs `program` on its own thread and lets `controller` converse with it until the machine
  completes. Returns the completed machine, or the fault that completed it.

  Outputs left over when the machine completes are still delivered to the controller in whole
  messages, but any replies to them are discarded. A trailing partial message is dropped.
*/
pub fn drive<C>(program: &[Cell], config: MachineConfig, controller: &mut C) -> Result<Machine>
  where C: Controller + ?Sized
{
  let cycle = controller.cycle();
  if cycle == 0 {
    return Err(Error::InvalidConfiguration("controller cycle must be at least 1".to_string()));
  }

  let config            = config.with_io_mode(IoMode::Channel).with_halt_on_output(false);
  let (machine, handle) = Machine::connected(program, config)?;
  let worker            = spawn(machine, "intcode-controlled")?;

  let mut pending = Vec::new();
  let mut running = match controller.start() {
    Some(value) => deliver(&handle, value, &mut pending),
    None        => true
  };

  while running {
    while running && pending.len() >= cycle {
      let message: Vec<Cell> = pending.drain(..cycle).collect();
      trace!(?message, "controller message");
      if let Some(reply) = controller.respond(&message) {
        running = deliver(&handle, reply, &mut pending);
      }
    }
    if !running {
      break;
    }

    select! {
      recv(handle.output()) -> output => match output {
        Ok(output) => pending.push(output),
        Err(_)     => running = false
      },
      recv(handle.done()) -> _ => running = false,
    }
  }

  // Values written just before completion may still be buffered.
  pending.extend(handle.output().try_iter());
  while pending.len() >= cycle {
    let message: Vec<Cell> = pending.drain(..cycle).collect();
    if controller.respond(&message).is_some() {
      debug!(?message, "machine completed; reply discarded");
    }
  }

  join(worker)
}

/**
  Runs a feedback ring with one thread per machine. Machine `k` reads its setting and then the
  outputs of machine `k - 1`; the first machine also reads the seed 0 and then whatever this
  thread relays back from the last machine. Returns the last value the last machine produced.

  Every machine runs to completion before the result is reported. The first machine to fault,
  in ring order, fails the whole run.
*/
pub fn run_feedback_ring_threaded(program: &[Cell], settings: &[Cell], config: MachineConfig) -> Result<Cell> {
  let n = settings.len();
  if n == 0 {
    return Err(Error::InvalidConfiguration("a pipeline needs at least one machine".to_string()));
  }
  let config = config.with_io_mode(IoMode::Channel).with_halt_on_output(false);

  let mut senders   = Vec::with_capacity(n);
  let mut receivers = Vec::with_capacity(n);
  for setting in settings {
    let (sender, receiver) = channel::bounded(RING_INPUT_CAPACITY);
    // Cannot fail: the receiver is alive and the buffer is empty.
    let _ = sender.send(*setting);
    senders.push(sender);
    receivers.push(receiver);
  }
  let _ = senders[0].send(0);

  let (tail_sender, tail) = channel::bounded(0);
  let mut done: Vec<Receiver<()>> = Vec::with_capacity(n);
  let mut workers = Vec::with_capacity(n);

  for (k, input) in receivers.into_iter().enumerate() {
    let output = match senders.get(k + 1) {
      Some(next) => next.clone(),
      None       => tail_sender.clone()
    };
    let (done_sender, done_receiver) = channel::bounded(0);
    let machine = Machine::with_ports(program, config.clone(), Ports::new(input, output, done_sender))?;
    workers.push(spawn(machine, &format!("intcode-ring-{}", k))?);
    done.push(done_receiver);
  }

  // Only machines may hold the downstream ends, so that a completing machine disconnects its
  // successor. The first machine's input stays here for the relay.
  let first = senders.swap_remove(0);
  drop(senders);
  drop(tail_sender);

  let mut last = None;
  for value in tail.iter() {
    last = Some(value);
    select! {
      send(first, value) -> result => {
        if result.is_err() {
          debug!(value, "first machine is gone; not relayed");
        }
      },
      recv(done[0]) -> _ => debug!(value, "first machine completed; not relayed"),
    }
  }

  let mut failure = None;
  for (k, worker) in workers.into_iter().enumerate() {
    if let Err(e) = join(worker) {
      failure = failure.or(Some(e.in_machine(k)));
    }
  }
  if let Some(e) = failure {
    return Err(e);
  }

  let signal = last.ok_or(Error::NoOutput)?;
  info!(?settings, signal, "threaded ring finished");
  Ok(signal)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::{run_feedback_ring, search};

  /// Reads `x`; stops on zero, otherwise writes `2x` and `x + 1` and starts over.
  const PAIRS: [Cell; 23] = [
    3, 21, 1006, 21, 20, 1002, 21, 2, 22, 4, 22, 1001, 21, 1, 22, 4, 22, 1105, 1, 0, 99, 0, 0
  ];

  const RING_PROGRAM: [Cell; 29] = [
    3, 26, 1001, 26, -4, 26, 3, 27, 1002, 27, 2, 27, 1, 27, 26, 27, 4, 27, 1001, 28, -1, 28,
    1005, 28, 6, 99, 0, 0, 5
  ];

  struct Scripted {
    cycle    : usize,
    start    : Option<Cell>,
    replies  : Vec<Cell>,
    messages : Vec<Vec<Cell>>,
  }

  impl Scripted {
    fn new(cycle: usize, start: Option<Cell>, replies: &[Cell]) -> Scripted {
      Scripted {
        cycle,
        start,
        replies  : replies.iter().rev().cloned().collect(),
        messages : Vec::new(),
      }
    }
  }

  impl Controller for Scripted {
    fn cycle(&self) -> usize {
      self.cycle
    }

    fn start(&mut self) -> Option<Cell> {
      self.start.take()
    }

    fn respond(&mut self, outputs: &[Cell]) -> Option<Cell> {
      self.messages.push(outputs.to_vec());
      self.replies.pop()
    }
  }

  #[test]
  fn controller_conversation(){
    let mut controller = Scripted::new(2, Some(3), &[5, 0]);
    let machine = drive(&PAIRS, MachineConfig::default(), &mut controller).unwrap();
    assert!(machine.is_completed());
    assert_eq!(controller.messages, vec![vec![6, 4], vec![10, 6]]);
  }

  #[test]
  fn machine_completing_early_releases_controller(){
    // A reply to a machine that has already terminated.
    let mut controller = Scripted::new(2, None, &[9]);
    drive(&[104, 1, 104, 2, 99], MachineConfig::default(), &mut controller).unwrap();
    assert_eq!(controller.messages, vec![vec![1, 2]]);

    // A start value nobody reads, and a message that never completes.
    let mut controller = Scripted::new(2, Some(1), &[]);
    drive(&[104, 7, 99], MachineConfig::default(), &mut controller).unwrap();
    assert!(controller.messages.is_empty());
  }

  #[test]
  fn machine_fault_is_reported(){
    let mut controller = Scripted::new(1, Some(1), &[]);
    let result = drive(&[3, 0, 42], MachineConfig::default(), &mut controller);
    assert!(matches!(result, Err(Error::InvalidOpcode { opcode: 42, ip: 2 })));
  }

  #[test]
  fn zero_cycle_is_rejected(){
    let mut controller = Scripted::new(0, None, &[]);
    assert!(matches!(
      drive(&[99], MachineConfig::default(), &mut controller),
      Err(Error::InvalidConfiguration(_))
    ));
  }

  #[test]
  fn spawned_machine_comes_back(){
    let mut machine = Machine::new(&[1101, 2, 3, 5, 99, 0], MachineConfig::default()).unwrap();
    machine.poke(1, 20).unwrap();
    let machine = join(spawn(machine, "intcode-test").unwrap()).unwrap();
    assert_eq!(machine.memory()[5], 23);
  }

  #[test]
  fn threaded_ring_agrees_with_cooperative_ring(){
    let settings = [9, 8, 7, 6, 5];
    let threaded = run_feedback_ring_threaded(&RING_PROGRAM, &settings, MachineConfig::default()).unwrap();
    assert_eq!(threaded, 139629729);
    assert_eq!(threaded, run_feedback_ring(&RING_PROGRAM, &settings).unwrap());
  }

  #[test]
  fn threaded_ring_search(){
    let (settings, signal) = search(&[5, 6, 7, 8, 9], |candidate| {
      run_feedback_ring_threaded(&RING_PROGRAM, candidate, MachineConfig::default())
    }).unwrap();
    assert_eq!(signal, 139629729);
    assert_eq!(settings, vec![9, 8, 7, 6, 5]);
  }

  #[test]
  fn threaded_ring_fault(){
    let result = run_feedback_ring_threaded(&[3, 0, 42], &[1, 2], MachineConfig::default());
    assert!(matches!(result, Err(Error::MachineFailed { index: 0, .. })));
    assert!(matches!(
      run_feedback_ring_threaded(&RING_PROGRAM, &[], MachineConfig::default()),
      Err(Error::InvalidConfiguration(_))
    ));
  }
}
