use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use intcode::bytecode::{disassemble, parse_programs};
use intcode::concurrent::run_feedback_ring_threaded;
use intcode::pipeline::{max_signal, search, Topology};
use intcode::{Cell, Error, Machine, MachineConfig, Result, StdinPrompt};

#[derive(Parser, Debug)]
#[command(name = "intcode")]
#[command(about = "Run IntCode programs alone or wired into pipelines")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one program and print its outputs, one per line
  Run {
    file: PathBuf,

    /// Which program of the file to run, counting non-blank lines from 1
    #[arg(long, default_value_t = 1)]
    line: usize,

    /// Input values, consumed in order
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    input: Vec<Cell>,

    /// Ask on the terminal once the given inputs run out
    #[arg(long)]
    prompt: bool,
  },

  /// Find the best signal through a linear chain of machines
  Chain {
    file: PathBuf,

    #[arg(long, default_value_t = 1)]
    line: usize,

    /// Settings to permute, one machine per setting
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "0,1,2,3,4")]
    settings: Vec<Cell>,
  },

  /// Find the best signal through a feedback ring of machines
  Ring {
    file: PathBuf,

    #[arg(long, default_value_t = 1)]
    line: usize,

    /// Settings to permute, one machine per setting
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "5,6,7,8,9")]
    settings: Vec<Cell>,

    /// Run every machine on its own thread
    #[arg(long)]
    threaded: bool,
  },

  /// List the instructions of a program
  Disassemble {
    file: PathBuf,

    #[arg(long, default_value_t = 1)]
    line: usize,
  },
}

fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

/// Reads `path` and picks the program on its `line`th non-blank line.
fn load(path: &Path, line: usize) -> Result<Vec<Cell>> {
  let text = std::fs::read_to_string(path).map_err(|e| Error::Unreadable {
    path   : path.display().to_string(),
    reason : e.to_string(),
  })?;

  let mut programs = parse_programs(&text)?;
  if programs.is_empty() {
    return Err(Error::EmptyProgram);
  }
  if line == 0 || line > programs.len() {
    return Err(Error::InvalidConfiguration(format!(
      "{} holds {} programs; there is no program {}",
      path.display(),
      programs.len(),
      line
    )));
  }

  info!(path = %path.display(), line, "program loaded");
  Ok(programs.swap_remove(line - 1))
}

fn print_best(settings: &[Cell], signal: Cell) {
  let settings: Vec<String> = settings.iter().map(Cell::to_string).collect();
  println!("settings: {}", settings.join(","));
  println!("signal: {}", signal);
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {

    Command::Run { file, line, input, prompt } => {
      let program     = load(&file, line)?;
      let mut machine = Machine::new(&program, MachineConfig::default())?;
      if prompt {
        machine.set_prompt(Box::new(StdinPrompt));
      }
      for value in input {
        machine.feed_input(value);
      }
      for output in machine.run_to_completion()? {
        println!("{}", output);
      }
    }

    Command::Chain { file, line, settings } => {
      let program = load(&file, line)?;
      let (best, signal) = max_signal(&program, &settings, Topology::Chain)?;
      print_best(&best, signal);
    }

    Command::Ring { file, line, settings, threaded } => {
      let program = load(&file, line)?;
      let (best, signal) = match threaded {
        true  => search(&settings, |candidate| {
          run_feedback_ring_threaded(&program, candidate, MachineConfig::default())
        })?,
        false => max_signal(&program, &settings, Topology::Ring)?
      };
      print_best(&best, signal);
    }

    Command::Disassemble { file, line } => {
      let program = load(&file, line)?;
      for (address, text) in disassemble(&program) {
        println!("{:>6}  {}", address, text);
      }
    }

  }

  Ok(())
}

fn main() {
  init_logging();

  if let Err(e) = run(Cli::parse()) {
    error!("{}", e);
    process::exit(1);
  }
}
