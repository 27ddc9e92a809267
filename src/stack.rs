//! Typed handoff stack for passing resources between commands
//!
//! Separate command invocations that produce and consume a resource (make
//! a VM, then attach it to a node) hand values to each other through this
//! stack instead of a second trip through the name registry. Push/pop
//! pairing is strict LIFO within one command sequence. The stack is
//! typed: a pop that finds the wrong kind of value fails cleanly instead
//! of reinterpreting it, and both underflow and a type mismatch leave the
//! stack exactly as it was.

use crate::error::Error;
use crate::handle::VmHandleRef;
use crate::patch::CableId;

/// A value in flight between two commands.
#[derive(Clone)]
pub enum StackValue {
    /// A VM handle, shared with the registry.
    Handle(VmHandleRef),
    /// A cable in the active patch.
    Cable(CableId),
    /// A plain scalar (an address, a cached VM output).
    Scalar(f32),
}

impl StackValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StackValue::Handle(_) => "a VM handle",
            StackValue::Cable(_) => "a cable",
            StackValue::Scalar(_) => "a scalar",
        }
    }
}

/// Single-threaded LIFO of in-flight values.
#[derive(Default)]
pub struct HandoffStack {
    items: Vec<StackValue>,
}

impl HandoffStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: StackValue) {
        self.items.push(value);
    }

    /// Remove and return the top value.
    pub fn pop(&mut self) -> Result<StackValue, Error> {
        self.items.pop().ok_or(Error::StackUnderflow)
    }

    /// Pop a VM handle, failing without disturbing the stack if the top
    /// value is anything else.
    pub fn pop_handle(&mut self) -> Result<VmHandleRef, Error> {
        match self.items.last() {
            None => Err(Error::StackUnderflow),
            Some(StackValue::Handle(_)) => {
                let Some(StackValue::Handle(h)) = self.items.pop() else {
                    unreachable!()
                };
                Ok(h)
            }
            Some(other) => Err(Error::StackType {
                expected: "a VM handle",
                got: other.kind(),
            }),
        }
    }

    /// Pop a cable id.
    pub fn pop_cable(&mut self) -> Result<CableId, Error> {
        match self.items.last() {
            None => Err(Error::StackUnderflow),
            Some(StackValue::Cable(id)) => {
                let id = *id;
                self.items.pop();
                Ok(id)
            }
            Some(other) => Err(Error::StackType {
                expected: "a cable",
                got: other.kind(),
            }),
        }
    }

    /// Pop a scalar.
    pub fn pop_scalar(&mut self) -> Result<f32, Error> {
        match self.items.last() {
            None => Err(Error::StackUnderflow),
            Some(StackValue::Scalar(v)) => {
                let v = *v;
                self.items.pop();
                Ok(v)
            }
            Some(other) => Err(Error::StackType {
                expected: "a scalar",
                got: other.kind(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
