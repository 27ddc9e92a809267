//! Minimal block-based patch engine hosting the VM nodes
//!
//! A patch owns a bank of cables (per-block sample buffers) and a set of
//! nodes computed once per block, in insertion order. Construction
//! commands append nodes in dependency order, so insertion order *is* the
//! schedule. Node state lives in the patch and dies with it; anything a
//! node references beyond that (a VM handle) is held weakly and survives
//! patch teardown untouched.

use tracing::debug;

use crate::error::Error;

/// Index of a cable in the patch's cable bank.
pub type CableId = usize;

/// Per-patch bank of signal buffers, one block each.
pub struct CableBank {
    block_size: usize,
    bufs: Vec<Vec<f32>>,
}

impl CableBank {
    fn new(block_size: usize) -> Self {
        Self {
            block_size,
            bufs: Vec::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read one sample from a cable.
    pub fn get(&self, cable: CableId, n: usize) -> f32 {
        debug_assert!(n < self.block_size, "sample index {n} out of block");
        self.bufs[cable][n]
    }

    /// Write one sample to a cable.
    pub fn set(&mut self, cable: CableId, n: usize, value: f32) {
        debug_assert!(n < self.block_size, "sample index {n} out of block");
        self.bufs[cable][n] = value;
    }

    /// Fill a whole cable with one value (constant sources).
    pub fn fill(&mut self, cable: CableId, value: f32) {
        self.bufs[cable].fill(value);
    }

    /// The cable's full block, read-only.
    pub fn block(&self, cable: CableId) -> &[f32] {
        &self.bufs[cable]
    }

    pub fn cable_count(&self) -> usize {
        self.bufs.len()
    }
}

/// One node in the patch. Computed once per block; destroyed by dropping,
/// which releases node-local state only.
pub trait PatchNode {
    /// Process one block: read input cables, write output cables. Sample
    /// indices run strictly 0..block_size.
    fn compute(&mut self, cables: &mut CableBank);

    /// Human-readable name for debugging.
    fn name(&self) -> &str {
        "PatchNode"
    }
}

/// Patch capacities and timing.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Node arena capacity.
    pub max_nodes: usize,
    /// Cable bank capacity.
    pub max_cables: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 64,
            max_nodes: 256,
            max_cables: 512,
        }
    }
}

/// The active dataflow graph: cables plus nodes plus their schedule.
pub struct Patch {
    config: PatchConfig,
    cables: CableBank,
    nodes: Vec<Box<dyn PatchNode>>,
    output: Option<CableId>,
    /// Total node allocations over the patch's lifetime. Lets callers
    /// verify that a failed command allocated nothing.
    node_allocations: usize,
}

impl Patch {
    pub fn new(config: PatchConfig) -> Self {
        let cables = CableBank::new(config.block_size);
        Self {
            config,
            cables,
            nodes: Vec::new(),
            output: None,
            node_allocations: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Check that `nodes` node slots and `cables` cable slots are still
    /// available, before anything gets allocated. Node construction calls
    /// this first so a refused request has no side effects.
    pub fn can_alloc(&self, nodes: usize, cables: usize) -> Result<(), Error> {
        if self.nodes.len() + nodes > self.config.max_nodes {
            return Err(Error::Allocation("patch node arena exhausted"));
        }
        if self.cables.cable_count() + cables > self.config.max_cables {
            return Err(Error::Graph(format!(
                "cable limit of {} reached",
                self.config.max_cables
            )));
        }
        Ok(())
    }

    /// Allocate a zeroed cable.
    pub fn alloc_cable(&mut self) -> Result<CableId, Error> {
        self.can_alloc(0, 1)?;
        let id = self.cables.bufs.len();
        self.cables.bufs.push(vec![0.0; self.config.block_size]);
        Ok(id)
    }

    /// Append a node to the schedule. Nodes run in the order they were
    /// added.
    pub fn add_node(&mut self, node: Box<dyn PatchNode>) -> Result<(), Error> {
        self.can_alloc(1, 0)?;
        debug!("patch node {}: {}", self.nodes.len(), node.name());
        self.nodes.push(node);
        self.node_allocations += 1;
        Ok(())
    }

    /// Mark the cable external consumers read after each block.
    pub fn set_output(&mut self, cable: CableId) {
        self.output = Some(cable);
    }

    pub fn output(&self) -> Option<CableId> {
        self.output
    }

    /// Compute one block: every node once, in schedule order.
    pub fn process_block(&mut self) {
        let Patch { nodes, cables, .. } = self;
        for node in nodes.iter_mut() {
            node.compute(cables);
        }
    }

    pub fn cables(&self) -> &CableBank {
        &self.cables
    }

    pub fn cables_mut(&mut self) -> &mut CableBank {
        &mut self.cables
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Lifetime total of node allocations (never decremented).
    pub fn node_allocations(&self) -> usize {
        self.node_allocations
    }

    /// Patch teardown: drop every node and cable. Dropping a node
    /// releases node-local state only; VM handles are registry-owned and
    /// unaffected.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.cables.bufs.clear();
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes its node index count into a cable, for schedule checks.
    struct CountingNode {
        out: CableId,
        ticks: f32,
    }

    impl PatchNode for CountingNode {
        fn compute(&mut self, cables: &mut CableBank) {
            self.ticks += 1.0;
            cables.fill(self.out, self.ticks);
        }
        fn name(&self) -> &str {
            "CountingNode"
        }
    }

    /// Copies one cable into another.
    struct CopyNode {
        input: CableId,
        out: CableId,
    }

    impl PatchNode for CopyNode {
        fn compute(&mut self, cables: &mut CableBank) {
            for n in 0..cables.block_size() {
                let v = cables.get(self.input, n);
                cables.set(self.out, n, v);
            }
        }
    }

    #[test]
    fn test_nodes_run_in_insertion_order() {
        let mut patch = Patch::new(PatchConfig::default());
        let a = patch.alloc_cable().unwrap();
        let b = patch.alloc_cable().unwrap();

        patch
            .add_node(Box::new(CountingNode { out: a, ticks: 0.0 }))
            .unwrap();
        patch
            .add_node(Box::new(CopyNode { input: a, out: b }))
            .unwrap();

        patch.process_block();
        // The copy ran after the counter in the same block.
        assert_eq!(patch.cables().get(b, 0), 1.0);

        patch.process_block();
        assert_eq!(patch.cables().get(b, 0), 2.0);
    }

    #[test]
    fn test_node_arena_exhaustion() {
        let mut patch = Patch::new(PatchConfig {
            max_nodes: 1,
            ..PatchConfig::default()
        });
        let a = patch.alloc_cable().unwrap();

        patch
            .add_node(Box::new(CountingNode { out: a, ticks: 0.0 }))
            .unwrap();
        let err = patch
            .add_node(Box::new(CountingNode { out: a, ticks: 0.0 }))
            .unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
        assert_eq!(patch.node_count(), 1);
    }

    #[test]
    fn test_cable_limit_is_graph_error() {
        let mut patch = Patch::new(PatchConfig {
            max_cables: 2,
            ..PatchConfig::default()
        });
        patch.alloc_cable().unwrap();
        patch.alloc_cable().unwrap();
        assert!(matches!(patch.alloc_cable(), Err(Error::Graph(_))));
    }

    #[test]
    fn test_can_alloc_reports_before_allocating() {
        let patch = Patch::new(PatchConfig {
            max_nodes: 0,
            ..PatchConfig::default()
        });
        assert!(patch.can_alloc(1, 0).is_err());
        assert_eq!(patch.node_allocations(), 0);
    }

    #[test]
    fn test_clear_drops_nodes_and_cables() {
        let mut patch = Patch::new(PatchConfig::default());
        let a = patch.alloc_cable().unwrap();
        patch
            .add_node(Box::new(CountingNode { out: a, ticks: 0.0 }))
            .unwrap();
        patch.set_output(a);

        patch.clear();
        assert_eq!(patch.node_count(), 0);
        assert_eq!(patch.cables().cable_count(), 0);
        assert_eq!(patch.output(), None);
        // The allocation counter is a lifetime total.
        assert_eq!(patch.node_allocations(), 1);
    }
}
