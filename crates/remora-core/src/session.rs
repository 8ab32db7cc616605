//! # Debug Session
//!
//! [`DebugSession`] is the front door: it owns one engine, the page cache,
//! and the load-object and thread registries, and it gates every operation
//! on the attach state.
//!
//! ## Locking
//!
//! One session-wide mutex is held for the full duration of every public
//! operation, engine calls included. Sessions can be shared between threads
//! (`Arc<DebugSession>`), but work inside a session never overlaps. A panic
//! while the lock is held does not wedge the session: the next caller
//! recovers the guard.
//!
//! ## Lifecycle
//!
//! ```text
//!            attach_to_process            detach
//! Detached ───────────────────▶ AttachedLive ──────▶ Detached
//!     │       attach_to_dump                 detach
//!     └────────────────────────▶ AttachedDump ──────▶ Detached
//! ```
//!
//! Only the machine metadata accessors work while detached.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::DebugEngine;
use crate::error::{AttachKind, RemoraError, Result};
use crate::loadobj::{LoadObjectInfo, LoadObjectRegistry};
use crate::memory::{AddressSpaceReader, CacheStats, RemotePageCache};
use crate::symbols::{ObjectSymbolLoader, SymbolLoader};
use crate::threads::{ThreadHandle, ThreadRegistry};
use crate::types::{
    Address, Architecture, ClosestSymbol, IntegerRegisters, MachineDescriptor, OsFamily, ProcessId, ThreadId,
};

/// Attach state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState
{
    Detached,
    AttachedLive,
    AttachedDump,
}

impl SessionState
{
    /// Kind of target held, `None` while detached
    pub fn attach_kind(self) -> Option<AttachKind>
    {
        match self {
            SessionState::Detached => None,
            SessionState::AttachedLive => Some(AttachKind::Process),
            SessionState::AttachedDump => Some(AttachKind::Dump),
        }
    }
}

struct SessionInner
{
    engine: Box<dyn DebugEngine>,
    state: SessionState,
    machine: MachineDescriptor,
    cache: RemotePageCache,
    load_objects: LoadObjectRegistry,
    threads: ThreadRegistry,
    config: SessionConfig,
    loader: Arc<dyn SymbolLoader>,
}

impl SessionInner
{
    fn require_attached(&self) -> Result<AttachKind>
    {
        self.state.attach_kind().ok_or(RemoraError::NotAttached)
    }

    fn require_detached(&self) -> Result<()>
    {
        match self.state.attach_kind() {
            Some(kind) => Err(RemoraError::AlreadyAttached(kind)),
            None => Ok(()),
        }
    }

    fn fresh_registry(&self) -> LoadObjectRegistry
    {
        LoadObjectRegistry::new(
            self.config.resolved_search_path(),
            Arc::clone(&self.loader),
            self.config.use_native_lookup,
        )
    }

    /// Reset per-target state after the engine accepted a new target.
    fn enter(&mut self, state: SessionState)
    {
        self.machine = self.engine.machine();
        self.cache.clear();
        self.threads = ThreadRegistry::new(self.machine.cpu());
        self.load_objects = self.fresh_registry();
        self.state = state;
        self.discover_load_objects();
    }

    fn discover_load_objects(&mut self)
    {
        let modules = match self.engine.loaded_modules() {
            Ok(modules) => modules,
            Err(err) => {
                warn!(error = %err, "engine could not list loaded modules");
                return;
            }
        };

        let reported = modules.len();
        for module in modules {
            let name = module.path.to_string_lossy();
            if let Err(err) = self.load_objects.register(&name, module.size, module.base) {
                warn!(module = %name, error = %err, "skipping unreadable load object");
            }
        }
        debug!(reported, tracked = self.load_objects.len(), "discovered load objects");
    }

    fn reader(&mut self) -> AddressSpaceReader<'_, dyn DebugEngine>
    {
        AddressSpaceReader::new(&mut self.cache, &mut *self.engine, &self.machine)
    }
}

/// Sets the session back to `Detached` however the detach sequence ends.
struct DetachedOnDrop<'a>(&'a mut SessionState);

impl Drop for DetachedOnDrop<'_>
{
    fn drop(&mut self)
    {
        *self.0 = SessionState::Detached;
    }
}

fn as_attach_failure(err: RemoraError) -> RemoraError
{
    match err {
        RemoraError::AttachFailed(_) => err,
        other => RemoraError::AttachFailed(other.to_string()),
    }
}

/// A debugging session over one engine
///
/// ## Example
///
/// ```rust,no_run
/// use remora_core::engine::core_file::CoreFileEngine;
/// use remora_core::types::{Architecture, MachineDescriptor, OsFamily};
/// use remora_core::{DebugSession, SessionConfig};
///
/// let engine = CoreFileEngine::new(MachineDescriptor::for_arch(OsFamily::Linux, Architecture::X86_64), 4096);
/// let session = DebugSession::new(engine, SessionConfig::default())?;
/// session.attach_to_dump("/usr/bin/app".as_ref(), "/tmp/core.1234".as_ref())?;
///
/// if let Some(main) = session.lookup_symbol_address("app", "main")? {
///     let word = session.read_u64(main.value())?;
///     println!("{main}: {word:#x}");
/// }
/// session.detach();
/// # Ok::<(), remora_core::RemoraError>(())
/// ```
pub struct DebugSession
{
    inner: Mutex<SessionInner>,
}

impl DebugSession
{
    /// Create a detached session that parses module images with
    /// [`ObjectSymbolLoader`]
    ///
    /// ## Errors
    ///
    /// - `EngineUnavailable` if the configured page size disagrees with the
    ///   engine's
    /// - `InvalidArgument` for an unusable cache geometry
    pub fn new<E>(engine: E, config: SessionConfig) -> Result<Self>
    where
        E: DebugEngine + 'static,
    {
        Self::with_symbol_loader(engine, config, ObjectSymbolLoader)
    }

    /// Create a detached session with a custom module symbol loader
    pub fn with_symbol_loader<E, L>(engine: E, config: SessionConfig, loader: L) -> Result<Self>
    where
        E: DebugEngine + 'static,
        L: SymbolLoader + 'static,
    {
        let page_size = engine.page_size();
        if let Some(expected) = config.cache_page_size {
            if expected != page_size {
                return Err(RemoraError::EngineUnavailable(format!(
                    "configured page size {expected} does not match the target's {page_size}"
                )));
            }
        }

        let cache = RemotePageCache::new(page_size, config.cache_page_count)?;
        let machine = engine.machine();
        let loader: Arc<dyn SymbolLoader> = Arc::new(loader);
        let load_objects =
            LoadObjectRegistry::new(config.resolved_search_path(), Arc::clone(&loader), config.use_native_lookup);

        debug!(
            os = %machine.os(),
            cpu = %machine.cpu(),
            page_size,
            cache_pages = config.cache_page_count,
            native_lookup = config.use_native_lookup,
            "created debug session"
        );

        Ok(Self {
            inner: Mutex::new(SessionInner {
                engine: Box::new(engine),
                state: SessionState::Detached,
                machine,
                cache,
                load_objects,
                threads: ThreadRegistry::new(machine.cpu()),
                config,
                loader,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner>
    {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- lifecycle ----

    /// Attach to the live process `pid`
    ///
    /// ## Errors
    ///
    /// - `AlreadyAttached` if a process or dump is already held
    /// - `AttachFailed` if the engine refuses
    pub fn attach_to_process(&self, pid: ProcessId) -> Result<()>
    {
        let mut inner = self.lock();
        inner.require_detached()?;
        inner.engine.attach_process(pid).map_err(as_attach_failure)?;
        inner.enter(SessionState::AttachedLive);

        info!(pid = pid.0, cpu = %inner.machine.cpu(), "attached to process");
        Ok(())
    }

    /// Open the post-mortem dump `dump` of `executable`
    ///
    /// ## Errors
    ///
    /// Same as [`DebugSession::attach_to_process`].
    pub fn attach_to_dump(&self, executable: &Path, dump: &Path) -> Result<()>
    {
        let mut inner = self.lock();
        inner.require_detached()?;
        inner.engine.attach_dump(executable, dump).map_err(as_attach_failure)?;
        inner.enter(SessionState::AttachedDump);

        info!(
            executable = %executable.display(),
            dump = %dump.display(),
            cpu = %inner.machine.cpu(),
            "attached to dump"
        );
        Ok(())
    }

    /// Release the target
    ///
    /// Returns `false` without doing anything if the session is already
    /// detached. Otherwise every load object is closed, the registries and
    /// the page cache are emptied, the engine is told to detach, and `true`
    /// is returned. An engine failure during detach is logged and ignored;
    /// the session always ends up detached.
    pub fn detach(&self) -> bool
    {
        let mut guard = self.lock();
        if guard.state == SessionState::Detached {
            return false;
        }

        let inner = &mut *guard;
        let _detached = DetachedOnDrop(&mut inner.state);

        inner.load_objects.close();
        inner.threads.clear();
        inner.cache.clear();
        if let Err(err) = inner.engine.detach() {
            warn!(error = %err, "engine failed to detach; session detached anyway");
        }

        info!("detached");
        true
    }

    pub fn state(&self) -> SessionState
    {
        self.lock().state
    }

    pub fn is_attached(&self) -> bool
    {
        self.state() != SessionState::Detached
    }

    // ---- machine metadata (valid while detached) ----

    pub fn machine(&self) -> MachineDescriptor
    {
        self.lock().machine
    }

    pub fn os(&self) -> OsFamily
    {
        self.machine().os()
    }

    pub fn cpu(&self) -> Architecture
    {
        self.machine().cpu()
    }

    /// Target pointer width in bytes
    pub fn address_size(&self) -> u8
    {
        self.machine().address_size()
    }

    // ---- memory ----

    fn with_reader<T>(&self, read: impl FnOnce(&mut AddressSpaceReader<'_, dyn DebugEngine>) -> Result<T>) -> Result<T>
    {
        let mut inner = self.lock();
        inner.require_attached()?;
        read(&mut inner.reader())
    }

    /// Read `length` bytes at `address`
    ///
    /// ## Errors
    ///
    /// - `NotAttached`
    /// - `UnmappedAddress` if any page in the range is unmapped
    pub fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>>
    {
        self.with_reader(|reader| reader.read_bytes(address, length))
    }

    /// Read a `width`-byte scalar subject to the target's alignment rule
    ///
    /// Returns the raw bytes in target order.
    pub fn read_aligned(&self, address: u64, width: usize) -> Result<Vec<u8>>
    {
        self.with_reader(|reader| reader.read_aligned(address, width).map(|bytes| bytes.into_vec()))
    }

    /// Read a target pointer; a null pointer is `Ok(None)`
    pub fn read_pointer(&self, address: u64) -> Result<Option<Address>>
    {
        self.with_reader(|reader| reader.read_pointer(address))
    }

    pub fn read_u8(&self, address: u64) -> Result<u8>
    {
        self.with_reader(|reader| reader.read_u8(address))
    }

    pub fn read_u16(&self, address: u64) -> Result<u16>
    {
        self.with_reader(|reader| reader.read_u16(address))
    }

    pub fn read_u32(&self, address: u64) -> Result<u32>
    {
        self.with_reader(|reader| reader.read_u32(address))
    }

    pub fn read_u64(&self, address: u64) -> Result<u64>
    {
        self.with_reader(|reader| reader.read_u64(address))
    }

    /// Read a NUL-terminated string of at most `max_len` bytes
    pub fn read_c_string(&self, address: u64, max_len: usize) -> Result<String>
    {
        self.with_reader(|reader| reader.read_c_string(address, max_len))
    }

    /// Writing target memory is not supported
    ///
    /// ## Errors
    ///
    /// Always `Unimplemented`.
    pub fn write_bytes(&self, _address: u64, _bytes: &[u8]) -> Result<()>
    {
        Err(RemoraError::Unimplemented("writing target memory"))
    }

    /// Page cache counters
    pub fn cache_stats(&self) -> Result<CacheStats>
    {
        let inner = self.lock();
        inner.require_attached()?;
        Ok(inner.cache.stats())
    }

    /// Drop every cached page so the next reads see current target memory
    pub fn clear_cache(&self) -> Result<()>
    {
        let mut inner = self.lock();
        inner.require_attached()?;
        inner.cache.clear();
        Ok(())
    }

    // ---- load objects and symbols ----

    /// Track the module `file_name` mapped at `base`
    ///
    /// Returns `Ok(false)` if the image cannot be found locally, in which case
    /// nothing is tracked.
    pub fn register_load_object(&self, file_name: &str, size: u64, base: Address) -> Result<bool>
    {
        let mut inner = self.lock();
        inner.require_attached()?;
        inner.load_objects.register(file_name, size, base)
    }

    /// Address of `symbol` in the module with short name `module`
    ///
    /// `Ok(None)` when neither the engine nor the module's table knows it,
    /// including when the module itself is unknown.
    pub fn lookup_symbol_address(&self, module: &str, symbol: &str) -> Result<Option<Address>>
    {
        let mut guard = self.lock();
        guard.require_attached()?;
        let inner = &mut *guard;
        inner.load_objects.lookup_symbol_address(&mut *inner.engine, module, symbol)
    }

    /// Nearest symbol at or before `address`, with the byte offset from it
    pub fn closest_symbol_to_address(&self, address: Address) -> Result<Option<ClosestSymbol>>
    {
        let mut guard = self.lock();
        guard.require_attached()?;
        let inner = &mut *guard;
        inner.load_objects.closest_symbol(&mut *inner.engine, address)
    }

    /// Snapshot of the tracked modules, ordered by base address
    pub fn load_objects(&self) -> Result<Vec<LoadObjectInfo>>
    {
        let inner = self.lock();
        inner.require_attached()?;
        Ok(inner.load_objects.infos())
    }

    // ---- threads ----

    /// Handle for the thread the engine identifies by `address`
    pub fn thread_for_identifier_address(&self, address: Address) -> Result<ThreadHandle>
    {
        let mut inner = self.lock();
        inner.require_attached()?;
        Ok(inner.threads.wrapper_for_identifier_address(address))
    }

    /// Handle for the thread with operating-system id `system_id`
    ///
    /// ## Errors
    ///
    /// `Unsupported` on a live process.
    pub fn thread_for_system_id(&self, system_id: u64) -> Result<ThreadHandle>
    {
        let mut guard = self.lock();
        let kind = guard.require_attached()?;
        let inner = &mut *guard;
        inner.threads.wrapper_for_system_id(kind, &mut *inner.engine, system_id)
    }

    /// Replace the cached integer register snapshot of `thread`
    pub fn set_integer_registers(&self, thread: ThreadId, registers: IntegerRegisters) -> Result<()>
    {
        let mut inner = self.lock();
        inner.require_attached()?;
        inner.threads.set_integer_registers(thread, registers)
    }

    /// Cached integer register snapshot of `thread`, `Ok(None)` if none was
    /// pushed yet
    pub fn get_integer_registers(&self, thread: ThreadId) -> Result<Option<IntegerRegisters>>
    {
        let inner = self.lock();
        inner.require_attached()?;
        Ok(inner.threads.get_integer_registers(thread).cloned())
    }

    /// Every thread the session has handed out a handle for
    pub fn threads(&self) -> Result<Vec<ThreadHandle>>
    {
        let inner = self.lock();
        inner.require_attached()?;
        Ok(inner.threads.threads())
    }
}

impl Drop for DebugSession
{
    fn drop(&mut self)
    {
        self.detach();
    }
}
