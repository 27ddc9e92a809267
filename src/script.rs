//! Line-based script front end for the command layer
//!
//! One command per line: a command word followed by arguments. Arguments
//! are numeric literals, `$` (take from the handoff stack) or bare words
//! (names, paths, symbols). `#` starts a comment. The tokenizer is built
//! from nom combinators; dispatch goes straight into [`crate::commands`].

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{multispace0, multispace1},
    combinator::{eof, map, peek},
    multi::many0,
    number::complete::double,
    sequence::{preceded, terminated},
    IResult,
};
use std::fmt;

use crate::commands::{Core, Value};
use crate::error::Error;
use crate::patch::PatchConfig;

/// Parse `$` (stack take), when it stands alone.
fn parse_pop(input: &str) -> IResult<&str, Value> {
    map(
        terminated(tag("$"), peek(alt((multispace1, eof)))),
        |_| Value::Pop,
    )(input)
}

/// Parse a numeric literal, when it stands alone ("2nd.rom" is a word).
fn parse_number(input: &str) -> IResult<&str, Value> {
    map(
        terminated(double, peek(alt((multispace1, eof)))),
        Value::Num,
    )(input)
}

/// Parse a bare word: anything up to whitespace.
fn parse_word(input: &str) -> IResult<&str, Value> {
    map(
        take_while1(|c: char| !c.is_whitespace()),
        |s: &str| Value::Str(s.to_string()),
    )(input)
}

fn parse_token(input: &str) -> IResult<&str, Value> {
    alt((parse_pop, parse_number, parse_word))(input)
}

/// Tokenize one line of script (comment already stripped).
fn parse_line(input: &str) -> IResult<&str, Vec<Value>> {
    terminated(many0(preceded(multispace0, parse_token)), multispace0)(input)
}

/// A command error tagged with its script position.
#[derive(Debug)]
pub struct ScriptError {
    pub line: usize,
    pub source_line: String,
    pub error: Error,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error at line {}: {}", self.line, self.error)?;
        write!(f, "  {}", self.source_line.trim_end())
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Script interpreter: a command core plus line dispatch.
pub struct Interp {
    pub core: Core,
}

impl Interp {
    pub fn new(config: PatchConfig) -> Self {
        Self {
            core: Core::new(config),
        }
    }

    pub fn with_core(core: Core) -> Self {
        Self { core }
    }

    /// Run one line. Blank lines and comments are no-ops.
    pub fn eval_line(&mut self, line: &str) -> Result<(), Error> {
        let code = line.split('#').next().unwrap_or("");
        let tokens = match parse_line(code) {
            Ok((rest, tokens)) if rest.is_empty() => tokens,
            _ => {
                return Err(Error::UnknownCommand(code.trim().to_string()));
            }
        };

        let Some((head, args)) = tokens.split_first() else {
            return Ok(());
        };
        let Value::Str(command) = head else {
            return Err(Error::UnknownCommand(code.trim().to_string()));
        };
        self.core.run(command, args)
    }

    /// Run a whole script, stopping at the first failing line.
    pub fn eval_script(&mut self, src: &str) -> Result<(), ScriptError> {
        for (i, line) in src.lines().enumerate() {
            self.eval_line(line).map_err(|error| ScriptError {
                line: i + 1,
                source_line: line.to_string(),
                error,
            })?;
        }
        Ok(())
    }
}
