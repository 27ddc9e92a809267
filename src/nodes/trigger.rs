//! Trigger node - steps the VM once per sample from a condition signal
//!
//! The trigger node is the only mutator of the VM behind a handle: each
//! sample it reads the condition cable, steps the VM with that value, and
//! writes the VM's scalar result to its output cable. Stepping happens at
//! full sample rate, inside an explicit per-sample loop.

use tracing::warn;

use crate::handle::{VmHandleRef, VmHandleView};
use crate::patch::{CableBank, CableId, PatchNode};
use crate::vm::Address;
use std::rc::Rc;

/// Trigger node: out[n] = vm.step(cond[n]) for every sample n.
pub struct TriggerNode {
    /// Weak view of the registry-owned handle. Never freed here.
    vm: VmHandleView,
    /// Base address execution starts from.
    pointer: Address,
    sample_rate: u32,
    cond: CableId,
    out: CableId,
}

impl TriggerNode {
    /// Bind a handle into the patch. Configures the VM's base pointer and
    /// sample rate once, at build time.
    pub fn new(
        vm: &VmHandleRef,
        pointer: Address,
        sample_rate: u32,
        cond: CableId,
        out: CableId,
    ) -> Self {
        vm.borrow_mut().bind(pointer, sample_rate);
        Self {
            vm: Rc::downgrade(vm),
            pointer,
            sample_rate,
            cond,
            out,
        }
    }

    pub fn pointer(&self) -> Address {
        self.pointer
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn cond_cable(&self) -> CableId {
        self.cond
    }

    pub fn out_cable(&self) -> CableId {
        self.out
    }
}

impl PatchNode for TriggerNode {
    fn compute(&mut self, cables: &mut CableBank) {
        let Some(vm) = self.vm.upgrade() else {
            // Handle was torn down before the node: emit silence.
            warn!("trigger node lost its VM handle");
            cables.fill(self.out, 0.0);
            return;
        };
        let mut vm = vm.borrow_mut();

        for n in 0..cables.block_size() {
            let cond = cables.get(self.cond, n);
            let out = vm.step(cond);
            cables.set(self.out, n, out);
        }
    }

    fn name(&self) -> &str {
        "TriggerNode"
    }
}
