//! # Thread Registry
//!
//! Stable handles for target threads and the integer register snapshots the
//! owning collaborator pushes for them.
//!
//! Records are created lazily, the first time a caller asks for a thread's
//! handle or pushes its registers. Nothing here polls the engine for register
//! state: a thread that has never been inspected simply has no snapshot.
//!
//! ## Identifiers
//!
//! - **Live process**: the engine names threads by an identifier address;
//!   system thread ids cannot be translated and are rejected.
//! - **Dump**: system thread ids go through the engine's translation.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::engine::DebugEngine;
use crate::error::{AttachKind, RemoraError, Result};
use crate::types::{Address, Architecture, IntegerRegisters, ThreadId};

/// Handle to one target thread
///
/// Cheap to copy; two handles for the same thread compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle
{
    id: ThreadId,
    architecture: Architecture,
}

impl ThreadHandle
{
    pub fn id(&self) -> ThreadId
    {
        self.id
    }

    /// Architecture whose register layout this thread's snapshots use
    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }
}

#[derive(Debug)]
struct ThreadRecord
{
    handle: ThreadHandle,
    registers: Option<IntegerRegisters>,
}

/// Known threads of the current target
#[derive(Debug)]
pub struct ThreadRegistry
{
    architecture: Architecture,
    threads: BTreeMap<ThreadId, ThreadRecord>,
}

impl ThreadRegistry
{
    /// Empty registry for a target of the given architecture
    pub fn new(architecture: Architecture) -> Self
    {
        Self {
            architecture,
            threads: BTreeMap::new(),
        }
    }

    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    pub fn len(&self) -> usize
    {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.threads.is_empty()
    }

    fn record(&mut self, id: ThreadId) -> &mut ThreadRecord
    {
        let architecture = self.architecture;
        self.threads.entry(id).or_insert_with(|| {
            trace!(thread = id.raw(), "new thread record");
            ThreadRecord {
                handle: ThreadHandle { id, architecture },
                registers: None,
            }
        })
    }

    /// Handle for the thread the engine identifies by `address`
    pub fn wrapper_for_identifier_address(&mut self, address: Address) -> ThreadHandle
    {
        self.record(ThreadId(address.value())).handle
    }

    /// Handle for the thread the operating system calls `system_id`
    ///
    /// ## Errors
    ///
    /// - `Unsupported` on a live process
    /// - whatever the engine reports when translating the id of a dump thread
    pub fn wrapper_for_system_id(
        &mut self,
        kind: AttachKind,
        engine: &mut dyn DebugEngine,
        system_id: u64,
    ) -> Result<ThreadHandle>
    {
        match kind {
            AttachKind::Process => Err(RemoraError::Unsupported(format!(
                "system thread id {system_id}: live processes expose threads only by identifier address"
            ))),
            AttachKind::Dump => {
                let id = engine.thread_id_from_system_id(system_id)?;
                debug!(system_id, thread = id.raw(), "translated system thread id");
                Ok(self.record(id).handle)
            }
        }
    }

    /// Replace the cached register snapshot of `thread`
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the snapshot was taken for a different
    /// architecture than the target's.
    pub fn set_integer_registers(&mut self, thread: ThreadId, registers: IntegerRegisters) -> Result<()>
    {
        if registers.architecture() != self.architecture {
            return Err(RemoraError::InvalidArgument(format!(
                "{} register snapshot for a {} target",
                registers.architecture(),
                self.architecture
            )));
        }
        self.record(thread).registers = Some(registers);
        Ok(())
    }

    /// Cached register snapshot of `thread`, `None` until one is pushed
    pub fn get_integer_registers(&self, thread: ThreadId) -> Option<&IntegerRegisters>
    {
        self.threads.get(&thread).and_then(|record| record.registers.as_ref())
    }

    /// Every known thread, ordered by id
    pub fn threads(&self) -> Vec<ThreadHandle>
    {
        self.threads.values().map(|record| record.handle).collect()
    }

    /// Forget every thread and snapshot
    pub fn clear(&mut self)
    {
        self.threads.clear();
    }
}

#[cfg(test)]
mod tests
{
    use std::path::Path;

    use super::*;
    use crate::types::{MachineDescriptor, OsFamily, ProcessId};

    struct Translating;

    impl DebugEngine for Translating
    {
        fn machine(&self) -> MachineDescriptor
        {
            MachineDescriptor::for_arch(OsFamily::Linux, Architecture::X86_64)
        }

        fn page_size(&self) -> usize
        {
            0x1000
        }

        fn attach_process(&mut self, _pid: ProcessId) -> Result<()>
        {
            Ok(())
        }

        fn attach_dump(&mut self, _executable: &Path, _dump: &Path) -> Result<()>
        {
            Ok(())
        }

        fn detach(&mut self) -> Result<()>
        {
            Ok(())
        }

        fn read_bytes(&mut self, _address: u64, _len: usize) -> Result<Option<Vec<u8>>>
        {
            Ok(None)
        }

        fn thread_id_from_system_id(&mut self, system_id: u64) -> Result<ThreadId>
        {
            Ok(ThreadId(system_id + 0x1000))
        }
    }

    #[test]
    fn identifier_address_handles_are_stable()
    {
        let mut registry = ThreadRegistry::new(Architecture::X86_64);
        let address = Address::new(0x7f00_0000_1000).unwrap();

        let first = registry.wrapper_for_identifier_address(address);
        let second = registry.wrapper_for_identifier_address(address);
        assert_eq!(first, second);
        assert_eq!(first.id(), ThreadId(0x7f00_0000_1000));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn system_id_is_unsupported_on_live_process()
    {
        let mut registry = ThreadRegistry::new(Architecture::X86_64);
        let result = registry.wrapper_for_system_id(AttachKind::Process, &mut Translating, 42);
        assert!(matches!(result, Err(RemoraError::Unsupported(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn system_id_translates_through_engine_on_dump()
    {
        let mut registry = ThreadRegistry::new(Architecture::X86_64);
        let handle = registry.wrapper_for_system_id(AttachKind::Dump, &mut Translating, 42).unwrap();
        assert_eq!(handle.id(), ThreadId(0x102a));
    }

    #[test]
    fn registers_absent_until_pushed()
    {
        let mut registry = ThreadRegistry::new(Architecture::X86_64);
        let thread = ThreadId(7);
        assert!(registry.get_integer_registers(thread).is_none());

        let mut regs = IntegerRegisters::zeroed(Architecture::X86_64);
        regs.set(16, 0x40_1000).unwrap();
        registry.set_integer_registers(thread, regs).unwrap();
        assert_eq!(
            registry.get_integer_registers(thread).and_then(IntegerRegisters::pc),
            Address::new(0x40_1000)
        );

        registry.set_integer_registers(thread, IntegerRegisters::zeroed(Architecture::X86_64)).unwrap();
        assert_eq!(registry.get_integer_registers(thread).and_then(IntegerRegisters::pc), None);
    }

    #[test]
    fn rejects_foreign_architecture_snapshot()
    {
        let mut registry = ThreadRegistry::new(Architecture::X86_64);
        let regs = IntegerRegisters::zeroed(Architecture::Aarch64);
        assert!(matches!(
            registry.set_integer_registers(ThreadId(1), regs),
            Err(RemoraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn clear_forgets_threads()
    {
        let mut registry = ThreadRegistry::new(Architecture::Riscv64);
        registry.wrapper_for_identifier_address(Address::new(0x10).unwrap());
        registry.clear();
        assert!(registry.threads().is_empty());
    }
}
