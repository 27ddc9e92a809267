//! VM handles and the name-keyed handle registry
//!
//! A handle owns exactly one engine instance and caches the engine's most
//! recent output so downstream readers (the weight node) never have to
//! re-execute the VM. Handles are owned by the registry; graph nodes only
//! ever hold weak views, so a node teardown cannot free a VM.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::{Rc, Weak};

use tracing::{debug, info};

use crate::error::Error;
use crate::vm::{Address, VmEngine};

/// One VM instance plus its cached last output.
pub struct VmHandle {
    engine: Box<dyn VmEngine>,
    last_output: f32,
}

impl VmHandle {
    pub fn new(engine: Box<dyn VmEngine>) -> Self {
        Self {
            engine,
            last_output: 0.0,
        }
    }

    /// Load a program image into the VM.
    pub fn load(&mut self, path: &Path) -> Result<(), Error> {
        self.engine.load(path)
    }

    /// Resume execution at `addr`. Side effects stay inside the VM.
    pub fn eval(&mut self, addr: Address) {
        self.engine.eval(addr);
    }

    /// Configure base pointer and sample rate. Called once when a trigger
    /// node binds this handle into a patch.
    pub fn bind(&mut self, pointer: Address, sample_rate: u32) {
        self.engine.set_pointer(pointer);
        self.engine.set_sample_rate(sample_rate);
    }

    /// One VM step driven by the condition value. Updates the cached
    /// last output and returns the step's scalar result.
    pub fn step(&mut self, conductor: f32) -> f32 {
        let out = self.engine.tick(conductor);
        self.last_output = out;
        out
    }

    /// Most recent scalar produced by `step`. Non-destructive.
    pub fn last_output(&self) -> f32 {
        self.last_output
    }
}

/// Shared owning reference to a handle. Held by the registry and the
/// handoff stack.
pub type VmHandleRef = Rc<RefCell<VmHandle>>;

/// Non-owning view held by graph nodes. A node that outlives its handle
/// sees a dead view instead of a dangling pointer.
pub type VmHandleView = Weak<RefCell<VmHandle>>;

/// Name-keyed owner of all VM handles. Independent of any patch: handles
/// outlive the nodes that reference them within a patch generation.
#[derive(Default)]
pub struct HandleRegistry {
    handles: HashMap<String, VmHandleRef>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle under `name` and return a shared reference
    /// to it. Registering an existing name is an error.
    pub fn register(
        &mut self,
        name: &str,
        engine: Box<dyn VmEngine>,
    ) -> Result<VmHandleRef, Error> {
        if self.handles.contains_key(name) {
            return Err(Error::DuplicateHandle(name.to_string()));
        }
        let handle = Rc::new(RefCell::new(VmHandle::new(engine)));
        self.handles.insert(name.to_string(), Rc::clone(&handle));
        info!("registered VM '{name}'");
        Ok(handle)
    }

    /// Look up a handle by name.
    pub fn get(&self, name: &str) -> Result<VmHandleRef, Error> {
        self.handles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownHandle(name.to_string()))
    }

    /// Drop the handle registered under `name`. Returns whether a handle
    /// existed. The VM is released here and nowhere else.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.handles.remove(name).is_some();
        if removed {
            debug!("dropped VM '{name}'");
        }
        removed
    }

    /// Registry teardown: drop every handle.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
