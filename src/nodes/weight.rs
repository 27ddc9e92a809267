//! Weight node - bipolar amplitude weighting from the VM's last output
//!
//! The weight node never steps the VM. It reads the handle's cached last
//! output and crossfades between a negative-side and a positive-side
//! amplitude envelope:
//!
//! ```text
//! u   = (last + 1) / 2            // bipolar last output -> 0..1
//! out = amp_neg + (amp_pos - amp_neg) * u
//! ```
//!
//! Three cables: negative input, positive input, output.

use tracing::warn;

use crate::handle::{VmHandleRef, VmHandleView};
use crate::patch::{CableBank, CableId, PatchNode};
use std::rc::Rc;

/// Weight node: crossfades two amplitude envelopes by the VM's cached
/// last output.
pub struct WeightNode {
    /// Weak view of the registry-owned handle, read-only here.
    vm: VmHandleView,
    neg: CableId,
    pos: CableId,
    out: CableId,
    amp_neg: f32,
    amp_pos: f32,
}

impl WeightNode {
    pub fn new(vm: &VmHandleRef, neg: CableId, pos: CableId, out: CableId) -> Self {
        Self {
            vm: Rc::downgrade(vm),
            neg,
            pos,
            out,
            amp_neg: 0.0,
            amp_pos: 0.0,
        }
    }

    /// Set the amplitude applied at the negative end of the weighting.
    pub fn set_amp_neg(&mut self, amp: f32) {
        self.amp_neg = amp;
    }

    /// Set the amplitude applied at the positive end of the weighting.
    pub fn set_amp_pos(&mut self, amp: f32) {
        self.amp_pos = amp;
    }

    /// One weighting step against the VM's last output.
    pub fn tick(&mut self, last: f32) -> f32 {
        let u = (last + 1.0) * 0.5;
        self.amp_neg + (self.amp_pos - self.amp_neg) * u
    }

    pub fn neg_cable(&self) -> CableId {
        self.neg
    }

    pub fn pos_cable(&self) -> CableId {
        self.pos
    }

    pub fn out_cable(&self) -> CableId {
        self.out
    }
}

impl PatchNode for WeightNode {
    fn compute(&mut self, cables: &mut CableBank) {
        let Some(vm) = self.vm.upgrade() else {
            warn!("weight node lost its VM handle");
            cables.fill(self.out, 0.0);
            return;
        };
        let last = vm.borrow().last_output();

        for n in 0..cables.block_size() {
            let neg = cables.get(self.neg, n);
            // NB: both amplitudes track the negative-side cable.
            let pos = cables.get(self.neg, n);

            self.set_amp_neg(neg);
            self.set_amp_pos(pos);
            let out = self.tick(last);
            cables.set(self.out, n, out);
        }
    }

    fn name(&self) -> &str {
        "WeightNode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::handle::VmHandle;
    use crate::patch::{Patch, PatchConfig};
    use crate::vm::{Address, VmEngine};
    use std::cell::RefCell;
    use std::path::Path;

    /// Engine stub that emits a fixed value on every tick.
    struct ConstVm(f32);

    impl VmEngine for ConstVm {
        fn load(&mut self, _path: &Path) -> Result<(), Error> {
            Ok(())
        }
        fn eval(&mut self, _addr: Address) {}
        fn set_pointer(&mut self, _addr: Address) {}
        fn set_sample_rate(&mut self, _sample_rate: u32) {}
        fn tick(&mut self, _conductor: f32) -> f32 {
            self.0
        }
    }

    fn handle_with_last(last: f32) -> VmHandleRef {
        let h = Rc::new(RefCell::new(VmHandle::new(Box::new(ConstVm(last)))));
        // One step caches the value.
        h.borrow_mut().step(1.0);
        h
    }

    fn patch_with(block_size: usize) -> Patch {
        Patch::new(PatchConfig {
            block_size,
            ..Default::default()
        })
    }

    #[test]
    fn test_tick_crossfades_by_last_output() {
        let vm = handle_with_last(0.0);
        let mut node = WeightNode::new(&vm, 0, 1, 2);
        node.set_amp_neg(-1.0);
        node.set_amp_pos(1.0);

        // last = -1 selects the negative amplitude, +1 the positive one,
        // 0 sits exactly between.
        assert_eq!(node.tick(-1.0), -1.0);
        assert_eq!(node.tick(1.0), 1.0);
        assert_eq!(node.tick(0.0), 0.0);
    }

    #[test]
    fn test_compute_tracks_negative_envelope_only() {
        let mut patch = patch_with(4);
        let neg = patch.alloc_cable().unwrap();
        let pos = patch.alloc_cable().unwrap();
        let out = patch.alloc_cable().unwrap();
        patch.cables_mut().fill(neg, 0.2);
        patch.cables_mut().fill(pos, 0.9);

        let vm = handle_with_last(0.5);
        let mut node = WeightNode::new(&vm, neg, pos, out);
        node.compute(patch.cables_mut());

        // Both amplitudes were read from the negative-side cable, so the
        // crossfade collapses to the negative envelope's value and the
        // positive cable has no effect.
        for n in 0..4 {
            assert_eq!(patch.cables().get(out, n), 0.2);
        }

        // Changing the positive envelope changes nothing.
        patch.cables_mut().fill(pos, -3.0);
        node.compute(patch.cables_mut());
        for n in 0..4 {
            assert_eq!(patch.cables().get(out, n), 0.2);
        }
    }

    #[test]
    fn test_compute_never_steps_vm() {
        let mut patch = patch_with(4);
        let neg = patch.alloc_cable().unwrap();
        let pos = patch.alloc_cable().unwrap();
        let out = patch.alloc_cable().unwrap();

        let vm = handle_with_last(0.5);
        let before = vm.borrow().last_output();

        let mut node = WeightNode::new(&vm, neg, pos, out);
        node.compute(patch.cables_mut());

        assert_eq!(vm.borrow().last_output(), before);
    }

    #[test]
    fn test_dead_handle_emits_silence() {
        let mut patch = patch_with(4);
        let neg = patch.alloc_cable().unwrap();
        let pos = patch.alloc_cable().unwrap();
        let out = patch.alloc_cable().unwrap();
        patch.cables_mut().fill(out, 7.0);

        let vm = handle_with_last(0.5);
        let mut node = WeightNode::new(&vm, neg, pos, out);
        drop(vm);

        node.compute(patch.cables_mut());
        for n in 0..4 {
            assert_eq!(patch.cables().get(out, n), 0.0);
        }
    }
}
