/*!
  Composition of several machines running the same program.

  A `Pipeline` owns its machines for as long as it lives and wires them in one of two
  topologies. In a `Chain` each machine runs to completion before the next one starts, its last
  output seeding the next machine. In a `Ring` the last machine's output feeds the first
  machine, and the machines are scheduled round-robin, each running until it halts on output
  or completes, until the last machine in the ring completes.

  Every trial starts from freshly reset machines whose pending input is the trial's setting
  for that machine. Scheduling here is cooperative and single threaded; see
  `crate::concurrent` for the threaded ring.
*/

use strum_macros::Display as StrumDisplay;
use tracing::{debug, info, trace};

use crate::config::MachineConfig;
use crate::error::{Error, Result};
use crate::machine::Machine;
use crate::memory::Cell;

#[derive(StrumDisplay, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Topology {
  Chain,
  Ring,
}

pub struct Pipeline {
  machines : Vec<Machine>,
  topology : Topology,
}

impl Pipeline {

  /// Loads `program` into `size` halt-on-output machines.
  pub fn new(program: &[Cell], size: usize, topology: Topology) -> Result<Pipeline> {
    if size == 0 {
      return Err(Error::InvalidConfiguration("a pipeline needs at least one machine".to_string()));
    }

    let config   = MachineConfig::default().with_halt_on_output(true);
    let machines = (0..size)
      .map(|_| Machine::new(program, config.clone()))
      .collect::<Result<Vec<Machine>>>()?;

    Ok(Pipeline { machines, topology })
  }

  pub fn len(&self) -> usize {
    self.machines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.machines.is_empty()
  }

  pub fn topology(&self) -> Topology {
    self.topology
  }

  pub fn machines(&self) -> &[Machine] {
    &self.machines
  }

  /**
    Runs one trial: machine `k` receives `settings[k]` as its first input, and the first
    machine additionally receives `seed`. Returns the final signal, which for a chain is the
    last machine's last output and for a ring is the last value handed from the last machine
    back to the first.
  */
  pub fn run(&mut self, settings: &[Cell], seed: Cell) -> Result<Cell> {
    if settings.len() != self.machines.len() {
      return Err(Error::InvalidConfiguration(format!(
        "{} settings for {} machines",
        settings.len(),
        self.machines.len()
      )));
    }

    debug!(topology = %self.topology, ?settings, seed, "pipeline trial");
    for (machine, setting) in self.machines.iter_mut().zip(settings) {
      machine.reset();
      machine.feed_input(*setting);
    }

    match self.topology {
      Topology::Chain => self.run_chain(seed),
      Topology::Ring  => self.run_ring(seed),
    }
  }

  fn run_chain(&mut self, seed: Cell) -> Result<Cell> {
    let mut signal = seed;

    for (k, machine) in self.machines.iter_mut().enumerate() {
      machine.feed_input(signal);
      let outputs = machine.run_to_completion().map_err(|e| e.in_machine(k))?;
      signal = *outputs.last().ok_or_else(|| Error::NoOutput.in_machine(k))?;
      trace!(machine = k, signal, "chain handoff");
    }

    Ok(signal)
  }

  fn run_ring(&mut self, seed: Cell) -> Result<Cell> {
    let n        = self.machines.len();
    let mut last = None;

    self.machines[0].feed_input(seed);

    while !self.machines[n - 1].is_completed() {
      for k in 0..n {
        let outputs = {
          let machine = &mut self.machines[k];
          if machine.is_completed() {
            continue;
          }
          machine.resume().map_err(|e| e.in_machine(k))?;
          machine.drain_outputs()
        };

        let next = (k + 1) % n;
        for value in outputs {
          trace!(from = k, to = next, value, "ring handoff");
          if k == n - 1 {
            last = Some(value);
          }
          self.machines[next].feed_input(value);
        }
      }
    }

    last.ok_or(Error::NoOutput)
  }
}

/// Runs a chain over `settings` with seed 0.
pub fn run_chain(program: &[Cell], settings: &[Cell]) -> Result<Cell> {
  Pipeline::new(program, settings.len(), Topology::Chain)?.run(settings, 0)
}

/// Runs a feedback ring over `settings` with seed 0.
pub fn run_feedback_ring(program: &[Cell], settings: &[Cell]) -> Result<Cell> {
  Pipeline::new(program, settings.len(), Topology::Ring)?.run(settings, 0)
}

/// Every ordering of `items`, by Heap's algorithm.
pub fn permutations(items: &[Cell]) -> Vec<Vec<Cell>> {
  let mut items  = items.to_vec();
  let mut result = vec![items.clone()];
  let mut counts = vec![0; items.len()];

  let mut i = 1;
  while i < items.len() {
    match counts[i] < i {

      true  => {
        let j = if i % 2 == 0 { 0 } else { counts[i] };
        items.swap(j, i);
        result.push(items.clone());
        counts[i] += 1;
        i = 1;
      }

      false => {
        counts[i] = 0;
        i += 1;
      }

    }
  }

  result
}

/**
  Tries `trial` on every permutation of `settings` and returns the permutation with the largest
  signal. The first failing trial aborts the search, since a partial search cannot be trusted
  to have found the maximum.
*/
pub fn search<F>(settings: &[Cell], mut trial: F) -> Result<(Vec<Cell>, Cell)>
  where F: FnMut(&[Cell]) -> Result<Cell>
{
  let mut best: Option<(Vec<Cell>, Cell)> = None;

  for candidate in permutations(settings) {
    let signal = trial(&candidate)?;
    let better = match &best {
      Some((_, best_signal)) => signal > *best_signal,
      None                   => true
    };
    if better {
      best = Some((candidate, signal));
    }
  }

  let (settings, signal) = best.ok_or(Error::NoOutput)?;
  info!(?settings, signal, "best configuration");
  Ok((settings, signal))
}

/// The best signal over every permutation of `settings` for the given topology.
pub fn max_signal(program: &[Cell], settings: &[Cell], topology: Topology) -> Result<(Vec<Cell>, Cell)> {
  let mut pipeline = Pipeline::new(program, settings.len(), topology)?;
  search(settings, |candidate| pipeline.run(candidate, 0))
}
