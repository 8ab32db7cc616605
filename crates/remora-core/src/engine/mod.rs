//! # Debugging Engine Interface
//!
//! The narrow, synchronous interface this crate needs from a low-level
//! debugging engine. A [`crate::DebugSession`] owns exactly one engine and
//! serializes every call into it, so implementations may be stateful and
//! need not be reentrant.
//!
//! ## Implementations
//!
//! - [`procfs::ProcfsEngine`]: live Linux processes through `/proc/<pid>/mem`
//! - [`core_file::CoreFileEngine`]: ELF core dumps parsed with `object`
//!
//! Anything else (a vendor debugger library, a remote stub, a test double)
//! plugs in by implementing [`DebugEngine`].
//!
//! ## What the engine is never asked to do
//!
//! Write target memory. The session rejects writes before they reach the
//! engine, so the trait has no write primitive.

pub mod core_file;
#[cfg(target_os = "linux")]
pub mod procfs;

use std::path::{Path, PathBuf};

use crate::error::{RemoraError, Result};
use crate::types::{Address, MachineDescriptor, ProcessId, ThreadId};

/// A module the engine reports as mapped into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineModule
{
    /// File name or path as the engine knows it
    pub path: PathBuf,
    pub base: Address,
    pub size: u64,
}

/// Low-level debugging engine behind a session
///
/// Methods take `&mut self`: engines are single-threaded and the session
/// holds its lock for the full duration of every call.
pub trait DebugEngine: Send
{
    /// Static description of the target machine
    ///
    /// May change after an attach (a dump can reveal its own architecture);
    /// the session re-reads it on every successful attach.
    fn machine(&self) -> MachineDescriptor;

    /// Hardware page size of the target, fixed for the engine's lifetime
    fn page_size(&self) -> usize;

    /// Attach to a live process
    ///
    /// ## Errors
    ///
    /// `AttachFailed` (or a more specific engine error) on failure.
    fn attach_process(&mut self, pid: ProcessId) -> Result<()>;

    /// Open a post-mortem dump of `executable`
    fn attach_dump(&mut self, executable: &Path, dump: &Path) -> Result<()>;

    /// Release the current target
    fn detach(&mut self) -> Result<()>;

    /// Read exactly `len` bytes at `address`
    ///
    /// Returns `Ok(None)` when any part of the range is unmapped. Only ever
    /// called with one page-aligned, page-sized chunk at a time.
    fn read_bytes(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>;

    /// Native symbol lookup within a module, by the module's short file name
    ///
    /// `Ok(None)` means "not found here", not a failure.
    fn lookup_symbol(&mut self, _module: &str, _symbol: &str) -> Result<Option<Address>>
    {
        Ok(None)
    }

    /// Native nearest-preceding-symbol lookup: `(raw name, byte offset)`
    fn closest_symbol(&mut self, _address: Address) -> Result<Option<(String, u64)>>
    {
        Ok(None)
    }

    /// Translate an operating-system thread id into the engine's thread id
    fn thread_id_from_system_id(&mut self, system_id: u64) -> Result<ThreadId>
    {
        Err(RemoraError::Unsupported(format!(
            "engine cannot translate system thread id {system_id}"
        )))
    }

    /// Modules mapped into the target, consulted once right after attach
    fn loaded_modules(&mut self) -> Result<Vec<EngineModule>>
    {
        Ok(Vec::new())
    }
}

impl<E: DebugEngine + ?Sized> DebugEngine for Box<E>
{
    fn machine(&self) -> MachineDescriptor
    {
        (**self).machine()
    }

    fn page_size(&self) -> usize
    {
        (**self).page_size()
    }

    fn attach_process(&mut self, pid: ProcessId) -> Result<()>
    {
        (**self).attach_process(pid)
    }

    fn attach_dump(&mut self, executable: &Path, dump: &Path) -> Result<()>
    {
        (**self).attach_dump(executable, dump)
    }

    fn detach(&mut self) -> Result<()>
    {
        (**self).detach()
    }

    fn read_bytes(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>
    {
        (**self).read_bytes(address, len)
    }

    fn lookup_symbol(&mut self, module: &str, symbol: &str) -> Result<Option<Address>>
    {
        (**self).lookup_symbol(module, symbol)
    }

    fn closest_symbol(&mut self, address: Address) -> Result<Option<(String, u64)>>
    {
        (**self).closest_symbol(address)
    }

    fn thread_id_from_system_id(&mut self, system_id: u64) -> Result<ThreadId>
    {
        (**self).thread_id_from_system_id(system_id)
    }

    fn loaded_modules(&mut self) -> Result<Vec<EngineModule>>
    {
        (**self).loaded_modules()
    }
}
