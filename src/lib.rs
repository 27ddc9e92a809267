//! # sigvm - a stateful VM inside a block-based signal graph
//!
//! This crate embeds an instruction-set virtual machine as a controllable
//! unit in a sample-synchronous patch. A VM lives behind a named,
//! registry-owned handle and is driven by graph nodes with a shorter
//! lifetime than the VM itself:
//!
//! - a **trigger node** steps the VM once per sample from a condition
//!   signal and emits the VM's scalar output
//! - a **weight node** reads the VM's cached last output and crossfades
//!   two amplitude envelopes into one bipolar-weighted signal
//!
//! Commands that produce and consume a handle are separate invocations;
//! a typed handoff stack passes the handle (or a cable, or a scalar)
//! from one command straight to the next without a second trip through
//! the name registry.
//!
//! ## Quick start
//!
//! ```no_run
//! use sigvm::patch::PatchConfig;
//! use sigvm::script::Interp;
//!
//! let mut interp = Interp::new(PatchConfig::default());
//! interp.eval_script(
//!     "vmnew v1\n\
//!      vmload v1 gesture.rom\n\
//!      vmsym gesture.rom main\n\
//!      vmnode v1 $ 1.0\n\
//!      out $\n",
//! ).unwrap();
//!
//! interp.core.patch.process_block();
//! let out = interp.core.patch.output().unwrap();
//! let block = interp.core.patch.cables().block(out);
//! assert_eq!(block.len(), 64);
//! ```
//!
//! The execution engine behind a handle is a trait seam
//! ([`vm::VmEngine`]); [`vm::RomVm`] is the small table-walking engine
//! shipped with the crate.

pub mod commands;
pub mod error;
pub mod handle;
pub mod nodes;
pub mod patch;
pub mod render;
pub mod script;
pub mod stack;
pub mod vm;

pub use commands::{Core, Value};
pub use error::Error;
pub use handle::{HandleRegistry, VmHandle, VmHandleRef};
pub use patch::{CableId, Patch, PatchConfig, PatchNode};
pub use stack::{HandoffStack, StackValue};
pub use vm::{resolve_symbol, Address, RomVm, VmEngine};
