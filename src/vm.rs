//! VM engine contract and the built-in table-walking engine
//!
//! The execution engine behind a VM handle is a pluggable seam: the node
//! layer only needs load / eval / pointer / sample-rate / tick. `RomVm`
//! is the engine shipped with the crate. Its program image is a flat byte
//! table and one tick emits one value from it, which keeps the whole
//! trigger/weight path exercisable without a full interpreter.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Error;

/// Address inside a program image. Zero doubles as the "not found"
/// sentinel for symbol resolution, so valid entry points start at 1.
pub type Address = u16;

/// Execution engine behind a VM handle.
///
/// Implementations keep all execution state internal; nothing here touches
/// cables. `tick` is the only per-sample call.
pub trait VmEngine {
    /// Load a program image from disk. On failure the engine's state is
    /// unchanged, as if load was never called.
    fn load(&mut self, path: &Path) -> Result<(), Error>;

    /// Begin or resume execution at `addr`.
    fn eval(&mut self, addr: Address);

    /// Set the base address stepping starts from when execution has not
    /// been positioned yet.
    fn set_pointer(&mut self, addr: Address);

    /// Inform the engine of the patch sample rate.
    fn set_sample_rate(&mut self, sample_rate: u32);

    /// One sample-rate step driven by the conductor (condition) value.
    /// Returns one scalar output.
    fn tick(&mut self, conductor: f32) -> f32;
}

/// Resolve a named entry point inside a program image.
///
/// Pure and stateless: reads the sidecar symbol table (`<rom>.sym`, text
/// lines of `name address`) and returns the address, or 0 if the symbol
/// is absent or the table is unreadable. Requires no instantiated VM.
pub fn resolve_symbol(rom: &Path, symbol: &str) -> Address {
    let sym_path = {
        let mut p = rom.as_os_str().to_os_string();
        p.push(".sym");
        std::path::PathBuf::from(p)
    };

    let table = match fs::read_to_string(&sym_path) {
        Ok(t) => t,
        Err(e) => {
            warn!("could not read symbol table '{}': {e}", sym_path.display());
            return 0;
        }
    };

    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(addr)) = (fields.next(), fields.next()) else {
            continue;
        };
        if name == symbol {
            match addr.parse::<Address>() {
                Ok(a) => return a,
                Err(_) => {
                    warn!("malformed address for symbol '{name}' in '{}'", sym_path.display());
                    return 0;
                }
            }
        }
    }

    0
}

/// Built-in engine: a program counter walking a byte table.
///
/// While the conductor is at or below zero the last value is held. A
/// positive conductor reads the byte under the program counter, maps it
/// into `[-1, 1]`, and advances, wrapping inside the image.
pub struct RomVm {
    mem: Vec<u8>,
    pc: Address,
    pointer: Address,
    sample_rate: u32,
    value: f32,
}

impl RomVm {
    pub fn new() -> Self {
        Self {
            mem: Vec::new(),
            pc: 0,
            pointer: 0,
            sample_rate: 44100,
            value: 0.0,
        }
    }

    /// Current program counter (0 = not positioned yet).
    pub fn pc(&self) -> Address {
        self.pc
    }

    /// Base pointer stepping falls back to.
    pub fn pointer(&self) -> Address {
        self.pointer
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Size of the loaded image in bytes.
    pub fn image_len(&self) -> usize {
        self.mem.len()
    }
}

impl Default for RomVm {
    fn default() -> Self {
        Self::new()
    }
}

impl VmEngine for RomVm {
    fn load(&mut self, path: &Path) -> Result<(), Error> {
        // Read fully before replacing memory, so a failed load leaves the
        // previous image intact.
        let bytes = fs::read(path).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if bytes.is_empty() {
            return Err(Error::Load {
                path: path.to_path_buf(),
                reason: "empty program image".to_string(),
            });
        }

        debug!("loaded {} byte image from '{}'", bytes.len(), path.display());
        self.mem = bytes;
        Ok(())
    }

    fn eval(&mut self, addr: Address) {
        self.pc = addr;
    }

    fn set_pointer(&mut self, addr: Address) {
        self.pointer = addr;
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn tick(&mut self, conductor: f32) -> f32 {
        if self.mem.is_empty() {
            return 0.0;
        }

        if conductor > 0.0 {
            if self.pc == 0 {
                self.pc = self.pointer;
            }
            let idx = self.pc as usize % self.mem.len();
            self.value = self.mem[idx] as f32 / 127.5 - 1.0;
            self.pc = self.pc.wrapping_add(1);
            if self.pc == 0 {
                // Wrapped past the address space; restart from the base.
                self.pc = self.pointer;
            }
        }

        self.value
    }
}
