/*!
  Program source text is a comma separated list of signed decimal integers. A file may hold
  several independent programs, one per line. This module uses `nom` to turn such text into
  vectors of cells, reporting the line and column of the first token that is not an integer.
*/

use nom::{
  character::complete::{
    char as one_char,
    digit1,
    one_of,
    space0
  },
  combinator::{all_consuming, map_res, opt, recognize},
  multi::separated_list1,
  sequence::{delimited, pair},
  IResult
};

use crate::error::{Error, Result};
use crate::memory::Cell;

fn cell_p(input: &str) -> IResult<&str, Cell> {
  map_res(
    recognize(pair(opt(one_of("+-")), digit1)),
    |text: &str| text.parse::<Cell>()
  )(input)
}

fn cell_list_p(input: &str) -> IResult<&str, Vec<Cell>> {
  all_consuming(
    separated_list1(
      one_char(','),
      delimited(space0, cell_p, space0)
    )
  )(input)
}

/// Builds the load error for a line that `cell_list_p` rejected, pointing at the offending token.
fn load_error(line: &str, line_number: usize, rest: &str) -> Error {
  // The list parser stops in front of the separator that precedes the bad token.
  let rest   = rest.strip_prefix(',').unwrap_or(rest).trim_start();
  let column = line.len() - rest.len() + 1;
  let token  = rest.split(',').next().unwrap_or("").trim();

  Error::Load {
    line  : line_number,
    column,
    token : token.to_string()
  }
}

fn parse_line(line: &str, line_number: usize) -> Result<Vec<Cell>> {
  match cell_list_p(line) {

    Ok((_rest, cells)) => Ok(cells),

    Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
      Err(load_error(line, line_number, e.input))
    }

    Err(nom::Err::Incomplete(_)) => {
      Err(load_error(line, line_number, line))
    }

  }
}

/**
  Parses every program in `text`, one per non-blank line. Line endings may be `\n` or `\r\n`;
  surrounding whitespace is ignored.
*/
pub fn parse_programs(text: &str) -> Result<Vec<Vec<Cell>>> {
  text
    .lines()
    .enumerate()
    .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r').trim()))
    .filter(|(_, line)| !line.is_empty())
    .map(|(line_number, line)| parse_line(line, line_number))
    .collect()
}

/// Parses a source text that must contain exactly one program.
pub fn parse_program(text: &str) -> Result<Vec<Cell>> {
  let mut programs = parse_programs(text)?;
  match programs.len() {
    0 => Err(Error::EmptyProgram),
    1 => Ok(programs.remove(0)),
    n => Err(Error::InvalidConfiguration(format!("expected one program, found {}", n)))
  }
}
