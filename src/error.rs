//! Error taxonomy for the VM/graph binding layer
//!
//! Every failure is recovered at the command boundary and surfaced as a
//! user-facing message; none of these corrupt patch or VM state.

use std::fmt;
use std::path::PathBuf;

/// All errors the binding layer can produce.
#[derive(Debug)]
pub enum Error {
    /// Wrong argument count at the command boundary. Checked before any
    /// side effect occurs.
    Arity {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    /// The patch's node arena cannot satisfy an allocation request.
    Allocation(&'static str),

    /// The host graph refused node or cable creation.
    Graph(String),

    /// A program image could not be read or parsed.
    Load { path: PathBuf, reason: String },

    /// Symbol resolution came back with the zero sentinel.
    SymbolNotFound { rom: PathBuf, symbol: String },

    /// Pop on an empty handoff stack. The stack is left unchanged.
    StackUnderflow,

    /// A typed pop found a value of the wrong kind on top. The stack is
    /// left unchanged.
    StackType {
        expected: &'static str,
        got: &'static str,
    },

    /// No VM handle registered under this name.
    UnknownHandle(String),

    /// A handle is already registered under this name.
    DuplicateHandle(String),

    /// The command name is not part of the dispatch table.
    UnknownCommand(String),

    /// An argument parsed but cannot be used by this command.
    BadArgument {
        command: &'static str,
        index: usize,
        reason: String,
    },

    /// WAV output failure during offline rendering.
    Render(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arity {
                command,
                expected,
                got,
            } => write!(
                f,
                "{command}: expected {expected} argument(s), got {got}"
            ),
            Error::Allocation(what) => write!(f, "allocation failed: {what}"),
            Error::Graph(msg) => write!(f, "graph error: {msg}"),
            Error::Load { path, reason } => {
                write!(f, "could not load program '{}': {reason}", path.display())
            }
            Error::SymbolNotFound { rom, symbol } => {
                write!(f, "symbol '{symbol}' not found in '{}'", rom.display())
            }
            Error::StackUnderflow => write!(f, "handoff stack is empty"),
            Error::StackType { expected, got } => {
                write!(f, "handoff stack: expected {expected}, found {got}")
            }
            Error::UnknownHandle(name) => write!(f, "no VM named '{name}'"),
            Error::DuplicateHandle(name) => {
                write!(f, "a VM named '{name}' already exists")
            }
            Error::UnknownCommand(name) => write!(f, "unknown command '{name}'"),
            Error::BadArgument {
                command,
                index,
                reason,
            } => write!(f, "{command}: bad argument {index}: {reason}"),
            Error::Render(msg) => write!(f, "render error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
