//! Patch node implementations for the VM binding layer
//!
//! Two nodes drive and observe a VM handle:
//! - [`trigger::TriggerNode`] - steps the VM once per sample from a
//!   condition signal and emits the VM's scalar result
//! - [`weight::WeightNode`] - combines two envelopes with the VM's
//!   cached last output into one bipolar-weighted signal
//!
//! Both hold weak views of the registry-owned handle: destroying a node
//! (or the whole patch) never touches the VM behind it.

pub mod trigger;
pub mod weight;

pub use trigger::TriggerNode;
pub use weight::WeightNode;
