//! Command layer: fixed-arity operations over registry, stack and patch
//!
//! Every script command lands here. Dispatch checks the argument count
//! before anything else, so an arity error has no side effects. Handle
//! arguments are a registry name or `$` (pop from the handoff stack);
//! signal sources are a numeric constant or `$` (pop a cable); addresses
//! are numbers or `$` (pop a scalar). Commands that take several stack
//! arguments pop them right to left, mirroring the push order of the
//! producing commands.

use tracing::{debug, info};

use crate::error::Error;
use crate::handle::{HandleRegistry, VmHandleRef};
use crate::nodes::{TriggerNode, WeightNode};
use crate::patch::{CableId, Patch, PatchConfig};
use crate::stack::{HandoffStack, StackValue};
use crate::vm::{self, Address, RomVm, VmEngine};
use std::path::Path;

/// One parsed command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric literal.
    Num(f64),
    /// Bare word: a name, a path, a symbol.
    Str(String),
    /// `$`: take the value from the handoff stack.
    Pop,
}

/// Factory for the engine behind each new handle.
pub type EngineFactory = fn() -> Box<dyn VmEngine>;

fn default_engine() -> Box<dyn VmEngine> {
    Box::new(RomVm::new())
}

/// A signal source argument, resolved but not yet wired.
enum Source {
    Cable(CableId),
    Const(f32),
}

/// Execution context shared by all commands: the handle registry, the
/// handoff stack and the active patch.
pub struct Core {
    pub registry: HandleRegistry,
    pub stack: HandoffStack,
    pub patch: Patch,
    engine: EngineFactory,
}

impl Core {
    pub fn new(config: PatchConfig) -> Self {
        Self::with_engine(config, default_engine)
    }

    /// Build a core whose `vmnew` creates engines from `engine` instead
    /// of the built-in one.
    pub fn with_engine(config: PatchConfig, engine: EngineFactory) -> Self {
        Self {
            registry: HandleRegistry::new(),
            stack: HandoffStack::new(),
            patch: Patch::new(config),
            engine,
        }
    }

    /// Dispatch one command. The arity check happens before any other
    /// work; a mismatch leaves registry, stack and patch untouched.
    pub fn run(&mut self, command: &str, args: &[Value]) -> Result<(), Error> {
        let (name, expected): (&'static str, usize) = match command {
            "vmnew" => ("vmnew", 1),
            "vmget" => ("vmget", 1),
            "vmlast" => ("vmlast", 1),
            "vmload" => ("vmload", 2),
            "vmsym" => ("vmsym", 2),
            "vmeval" => ("vmeval", 2),
            "vmnode" => ("vmnode", 3),
            "vmweight" => ("vmweight", 3),
            "const" => ("const", 1),
            "out" => ("out", 1),
            other => return Err(Error::UnknownCommand(other.to_string())),
        };

        if args.len() != expected {
            return Err(Error::Arity {
                command: name,
                expected,
                got: args.len(),
            });
        }

        debug!("command {name}");
        match name {
            "vmnew" => self.vmnew(&args[0]),
            "vmget" => self.vmget(&args[0]),
            "vmlast" => self.vmlast(&args[0]),
            "vmload" => self.vmload(&args[0], &args[1]),
            "vmsym" => self.vmsym(&args[0], &args[1]),
            "vmeval" => self.vmeval(&args[0], &args[1]),
            "vmnode" => self.vmnode(&args[0], &args[1], &args[2]),
            "vmweight" => self.vmweight(&args[0], &args[1], &args[2]),
            "const" => self.constant(&args[0]),
            "out" => self.out(&args[0]),
            _ => unreachable!(),
        }
    }

    // ---- argument resolution -------------------------------------------

    fn handle_arg(
        &mut self,
        command: &'static str,
        index: usize,
        arg: &Value,
    ) -> Result<VmHandleRef, Error> {
        match arg {
            Value::Str(name) => self.registry.get(name),
            Value::Pop => self.stack.pop_handle(),
            Value::Num(_) => Err(Error::BadArgument {
                command,
                index,
                reason: "expected a VM name or $".to_string(),
            }),
        }
    }

    fn address_arg(
        &mut self,
        command: &'static str,
        index: usize,
        arg: &Value,
    ) -> Result<Address, Error> {
        let raw = match arg {
            Value::Num(n) => *n,
            Value::Pop => self.stack.pop_scalar()? as f64,
            Value::Str(_) => {
                return Err(Error::BadArgument {
                    command,
                    index,
                    reason: "expected an address or $".to_string(),
                })
            }
        };
        if !(0.0..=f64::from(Address::MAX)).contains(&raw) || raw.fract() != 0.0 {
            return Err(Error::BadArgument {
                command,
                index,
                reason: format!("'{raw}' is not a valid address"),
            });
        }
        Ok(raw as Address)
    }

    /// Resolve a signal source without allocating anything yet, so a
    /// later failure in the same command cannot strand a cable.
    fn source_arg(
        &mut self,
        command: &'static str,
        index: usize,
        arg: &Value,
    ) -> Result<Source, Error> {
        match arg {
            Value::Num(n) => Ok(Source::Const(*n as f32)),
            Value::Pop => Ok(Source::Cable(self.stack.pop_cable()?)),
            Value::Str(_) => Err(Error::BadArgument {
                command,
                index,
                reason: "expected a constant or $".to_string(),
            }),
        }
    }

    /// Turn a resolved source into a cable, allocating a filled constant
    /// cable when needed.
    fn wire_source(&mut self, source: Source) -> Result<CableId, Error> {
        match source {
            Source::Cable(id) => Ok(id),
            Source::Const(v) => {
                let id = self.patch.alloc_cable()?;
                self.patch.cables_mut().fill(id, v);
                Ok(id)
            }
        }
    }

    fn const_cables(sources: &[&Source]) -> usize {
        sources
            .iter()
            .filter(|s| matches!(s, Source::Const(_)))
            .count()
    }

    // ---- commands ------------------------------------------------------

    /// `vmnew name`: register a fresh VM handle and push it for the next
    /// consuming command.
    fn vmnew(&mut self, name: &Value) -> Result<(), Error> {
        let Value::Str(name) = name else {
            return Err(Error::BadArgument {
                command: "vmnew",
                index: 0,
                reason: "expected a name".to_string(),
            });
        };
        let handle = self.registry.register(name, (self.engine)())?;
        self.stack.push(StackValue::Handle(handle));
        Ok(())
    }

    /// `vmget name`: push a registered handle.
    fn vmget(&mut self, name: &Value) -> Result<(), Error> {
        let Value::Str(name) = name else {
            return Err(Error::BadArgument {
                command: "vmget",
                index: 0,
                reason: "expected a name".to_string(),
            });
        };
        let handle = self.registry.get(name)?;
        self.stack.push(StackValue::Handle(handle));
        Ok(())
    }

    /// `vmlast handle`: push the VM's cached last output.
    fn vmlast(&mut self, handle: &Value) -> Result<(), Error> {
        let handle = self.handle_arg("vmlast", 0, handle)?;
        let last = handle.borrow().last_output();
        self.stack.push(StackValue::Scalar(last));
        Ok(())
    }

    /// `vmload handle path`: load a program image into the VM.
    fn vmload(&mut self, handle: &Value, path: &Value) -> Result<(), Error> {
        let Value::Str(path) = path else {
            return Err(Error::BadArgument {
                command: "vmload",
                index: 1,
                reason: "expected a file path".to_string(),
            });
        };
        let handle = self.handle_arg("vmload", 0, handle)?;
        handle.borrow_mut().load(Path::new(path))?;
        info!("loaded '{path}'");
        Ok(())
    }

    /// `vmsym rom symbol`: resolve an entry point and push its address.
    fn vmsym(&mut self, rom: &Value, symbol: &Value) -> Result<(), Error> {
        let (Value::Str(rom), Value::Str(symbol)) = (rom, symbol) else {
            return Err(Error::BadArgument {
                command: "vmsym",
                index: 0,
                reason: "expected a rom path and a symbol name".to_string(),
            });
        };
        let addr = vm::resolve_symbol(Path::new(rom), symbol);
        if addr == 0 {
            return Err(Error::SymbolNotFound {
                rom: rom.into(),
                symbol: symbol.clone(),
            });
        }
        self.stack.push(StackValue::Scalar(f32::from(addr)));
        Ok(())
    }

    /// `vmeval handle addr`: resume VM execution at an address.
    fn vmeval(&mut self, handle: &Value, addr: &Value) -> Result<(), Error> {
        // Stack arguments pop right to left.
        let addr = self.address_arg("vmeval", 1, addr)?;
        let handle = self.handle_arg("vmeval", 0, handle)?;
        handle.borrow_mut().eval(addr);
        Ok(())
    }

    /// `vmnode handle addr cond`: build a trigger node and push its
    /// output cable.
    fn vmnode(&mut self, handle: &Value, addr: &Value, cond: &Value) -> Result<(), Error> {
        // Stack arguments pop right to left.
        let cond = self.source_arg("vmnode", 2, cond)?;
        let addr = self.address_arg("vmnode", 1, addr)?;
        let handle = self.handle_arg("vmnode", 0, handle)?;

        // Capacity check up front: a refused build registers nothing.
        self.patch
            .can_alloc(1, 1 + Self::const_cables(&[&cond]))?;

        let cond = self.wire_source(cond)?;
        let out = self.patch.alloc_cable()?;
        let node = TriggerNode::new(&handle, addr, self.patch.sample_rate(), cond, out);
        self.patch.add_node(Box::new(node))?;
        self.stack.push(StackValue::Cable(out));
        info!("trigger node at address {addr}");
        Ok(())
    }

    /// `vmweight handle neg pos`: build a weight node and push its output
    /// cable.
    fn vmweight(&mut self, handle: &Value, neg: &Value, pos: &Value) -> Result<(), Error> {
        // Stack arguments pop right to left.
        let pos = self.source_arg("vmweight", 2, pos)?;
        let neg = self.source_arg("vmweight", 1, neg)?;
        let handle = self.handle_arg("vmweight", 0, handle)?;

        self.patch
            .can_alloc(1, 1 + Self::const_cables(&[&neg, &pos]))?;

        let neg = self.wire_source(neg)?;
        let pos = self.wire_source(pos)?;
        let out = self.patch.alloc_cable()?;
        let node = WeightNode::new(&handle, neg, pos, out);
        self.patch.add_node(Box::new(node))?;
        self.stack.push(StackValue::Cable(out));
        info!("weight node");
        Ok(())
    }

    /// `const value`: push a constant cable.
    fn constant(&mut self, value: &Value) -> Result<(), Error> {
        let source = self.source_arg("const", 0, value)?;
        let cable = self.wire_source(source)?;
        self.stack.push(StackValue::Cable(cable));
        Ok(())
    }

    /// `out source`: mark the patch output.
    fn out(&mut self, source: &Value) -> Result<(), Error> {
        let source = self.source_arg("out", 0, source)?;
        let cable = self.wire_source(source)?;
        self.patch.set_output(cable);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Core {
        Core::new(PatchConfig {
            block_size: 8,
            ..Default::default()
        })
    }

    #[test]
    fn test_unknown_command() {
        let mut core = core();
        assert!(matches!(
            core.run("mystery", &[]),
            Err(Error::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_arity_checked_before_side_effects() {
        let mut core = core();
        let err = core.run("vmnode", &[Value::Pop]).unwrap_err();
        assert!(matches!(
            err,
            Error::Arity {
                command: "vmnode",
                expected: 3,
                got: 1
            }
        ));
        // Nothing was allocated and nothing was popped.
        assert_eq!(core.patch.node_allocations(), 0);
        assert_eq!(core.patch.cables().cable_count(), 0);
        assert!(core.stack.is_empty());
    }

    #[test]
    fn test_vmnew_registers_and_pushes() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();

        assert_eq!(core.registry.len(), 1);
        assert_eq!(core.stack.len(), 1);

        let popped = core.stack.pop_handle().unwrap();
        let registered = core.registry.get("v1").unwrap();
        assert!(std::rc::Rc::ptr_eq(&popped, &registered));
    }

    #[test]
    fn test_vmnew_duplicate_name_fails() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();
        let err = core
            .run("vmnew", &[Value::Str("v1".to_string())])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandle(_)));
        assert_eq!(core.registry.len(), 1);
    }

    #[test]
    fn test_vmnode_consumes_pushed_handle() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();
        core.run("vmnode", &[Value::Pop, Value::Num(1.0), Value::Num(1.0)])
            .unwrap();

        assert_eq!(core.patch.node_count(), 1);
        // The trigger's output cable was pushed for the next consumer.
        assert_eq!(core.stack.len(), 1);
        assert!(core.stack.pop_cable().is_ok());
    }

    #[test]
    fn test_vmnode_unknown_handle_registers_nothing() {
        let mut core = core();
        let err = core
            .run(
                "vmnode",
                &[
                    Value::Str("ghost".to_string()),
                    Value::Num(1.0),
                    Value::Num(1.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownHandle(_)));
        assert_eq!(core.patch.node_allocations(), 0);
        assert_eq!(core.patch.cables().cable_count(), 0);
    }

    #[test]
    fn test_vmnode_full_arena_registers_nothing() {
        let mut core = Core::new(PatchConfig {
            max_nodes: 0,
            ..Default::default()
        });
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();
        let err = core
            .run(
                "vmnode",
                &[
                    Value::Str("v1".to_string()),
                    Value::Num(1.0),
                    Value::Num(1.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Allocation(_)));
        // The capacity check ran before any cable was allocated.
        assert_eq!(core.patch.cables().cable_count(), 0);
    }

    #[test]
    fn test_vmweight_pops_right_to_left() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();

        // Push neg first, then pos; vmweight pops pos, then neg.
        core.run("vmnode", &[Value::Pop, Value::Num(1.0), Value::Num(1.0)])
            .unwrap(); // pushes a cable we use as neg
        core.run("const", &[Value::Num(0.5)]).unwrap(); // pos cable

        core.run(
            "vmweight",
            &[Value::Str("v1".to_string()), Value::Pop, Value::Pop],
        )
        .unwrap();
        assert_eq!(core.patch.node_count(), 2);
    }

    #[test]
    fn test_vmeval_address_validation() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();
        let err = core
            .run(
                "vmeval",
                &[Value::Str("v1".to_string()), Value::Num(1.5)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadArgument { .. }));

        let err = core
            .run(
                "vmeval",
                &[Value::Str("v1".to_string()), Value::Num(70000.0)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadArgument { .. }));
    }

    #[test]
    fn test_vmlast_pushes_scalar() {
        let mut core = core();
        core.run("vmnew", &[Value::Str("v1".to_string())]).unwrap();
        core.stack.clear();

        core.run("vmlast", &[Value::Str("v1".to_string())]).unwrap();
        assert_eq!(core.stack.pop_scalar().unwrap(), 0.0);
    }

    #[test]
    fn test_out_sets_patch_output() {
        let mut core = core();
        core.run("const", &[Value::Num(0.3)]).unwrap();
        core.run("out", &[Value::Pop]).unwrap();
        assert!(core.patch.output().is_some());
    }
}
