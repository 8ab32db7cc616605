//! Simulated debugging engine shared by the integration tests.
//!
//! The engine's target lives behind an `Arc<Mutex<..>>` so a test can keep a
//! [`Target`] handle after moving the engine into a session, then change
//! memory behind the session's back or inspect how many raw reads happened.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use remora_core::error::{RemoraError, Result};
use remora_core::symbols::{ModuleSymbols, SymbolLoader, SymbolTable};
use remora_core::types::{Address, Architecture, MachineDescriptor, OsFamily, ProcessId, ThreadId};
use remora_core::{DebugEngine, DebugSession, EngineModule, SessionConfig};
use tempfile::TempDir;

pub const PAGE_SIZE: usize = 4096;

#[derive(Default)]
struct TargetState
{
    pages: BTreeMap<u64, Vec<u8>>,
    raw_reads: Vec<u64>,
    native_symbols: HashMap<(String, String), u64>,
    native_closest: Option<(String, u64)>,
    modules: Vec<EngineModule>,
    fail_attach: bool,
    fail_detach: bool,
    attaches: usize,
    detaches: usize,
}

/// Test-side handle on the simulated target
#[derive(Clone, Default)]
pub struct Target(Arc<Mutex<TargetState>>);

impl Target
{
    pub fn new() -> Self
    {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TargetState>
    {
        self.0.lock().unwrap()
    }

    /// Write `bytes` at `address`, mapping any page it touches
    pub fn poke(&self, address: u64, bytes: &[u8])
    {
        let mut state = self.state();
        for (i, byte) in bytes.iter().enumerate() {
            let at = address + i as u64;
            let base = at - at % PAGE_SIZE as u64;
            let page = state.pages.entry(base).or_insert_with(|| vec![0; PAGE_SIZE]);
            page[(at - base) as usize] = *byte;
        }
    }

    /// Map `count` zero-filled pages starting at `base`
    pub fn map_pages(&self, base: u64, count: usize)
    {
        let mut state = self.state();
        for i in 0..count as u64 {
            state
                .pages
                .entry(base + i * PAGE_SIZE as u64)
                .or_insert_with(|| vec![0; PAGE_SIZE]);
        }
    }

    /// Number of page reads the engine has served (or refused) so far
    pub fn raw_reads(&self) -> usize
    {
        self.state().raw_reads.len()
    }

    pub fn set_native_symbol(&self, module: &str, symbol: &str, address: u64)
    {
        self.state()
            .native_symbols
            .insert((module.to_string(), symbol.to_string()), address);
    }

    pub fn set_native_closest(&self, name: &str, offset: u64)
    {
        self.state().native_closest = Some((name.to_string(), offset));
    }

    pub fn add_module(&self, path: &Path, base: u64, size: u64)
    {
        self.state().modules.push(EngineModule {
            path: path.to_path_buf(),
            base: Address::new(base).unwrap(),
            size,
        });
    }

    pub fn fail_attach(&self, fail: bool)
    {
        self.state().fail_attach = fail;
    }

    pub fn fail_detach(&self, fail: bool)
    {
        self.state().fail_detach = fail;
    }

    pub fn attaches(&self) -> usize
    {
        self.state().attaches
    }

    pub fn detaches(&self) -> usize
    {
        self.state().detaches
    }

    pub fn engine(&self) -> SimulatedEngine
    {
        SimulatedEngine {
            target: self.clone(),
            machine: MachineDescriptor::for_arch(OsFamily::Linux, Architecture::X86_64),
            attached: false,
        }
    }
}

pub struct SimulatedEngine
{
    target: Target,
    machine: MachineDescriptor,
    attached: bool,
}

impl SimulatedEngine
{
    pub fn with_machine(mut self, machine: MachineDescriptor) -> Self
    {
        self.machine = machine;
        self
    }

    fn attach(&mut self) -> Result<()>
    {
        let mut state = self.target.state();
        if state.fail_attach {
            return Err(RemoraError::Engine("simulated attach failure".into()));
        }
        state.attaches += 1;
        self.attached = true;
        Ok(())
    }
}

impl DebugEngine for SimulatedEngine
{
    fn machine(&self) -> MachineDescriptor
    {
        self.machine
    }

    fn page_size(&self) -> usize
    {
        PAGE_SIZE
    }

    fn attach_process(&mut self, _pid: ProcessId) -> Result<()>
    {
        self.attach()
    }

    fn attach_dump(&mut self, _executable: &Path, _dump: &Path) -> Result<()>
    {
        self.attach()
    }

    fn detach(&mut self) -> Result<()>
    {
        let mut state = self.target.state();
        state.detaches += 1;
        self.attached = false;
        if state.fail_detach {
            return Err(RemoraError::DetachFailed("simulated detach failure".into()));
        }
        Ok(())
    }

    fn read_bytes(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>
    {
        assert!(self.attached, "read while detached");
        assert_eq!(address % PAGE_SIZE as u64, 0, "unaligned raw read at 0x{address:x}");
        assert_eq!(len, PAGE_SIZE, "raw read of {len} bytes");

        let mut state = self.target.state();
        state.raw_reads.push(address);
        Ok(state.pages.get(&address).cloned())
    }

    fn lookup_symbol(&mut self, module: &str, symbol: &str) -> Result<Option<Address>>
    {
        let state = self.target.state();
        Ok(state
            .native_symbols
            .get(&(module.to_string(), symbol.to_string()))
            .and_then(|address| Address::new(*address)))
    }

    fn closest_symbol(&mut self, _address: Address) -> Result<Option<(String, u64)>>
    {
        Ok(self.target.state().native_closest.clone())
    }

    fn thread_id_from_system_id(&mut self, system_id: u64) -> Result<ThreadId>
    {
        Ok(ThreadId(0x7000_0000 + system_id))
    }

    fn loaded_modules(&mut self) -> Result<Vec<EngineModule>>
    {
        Ok(self.target.state().modules.clone())
    }
}

/// Symbol loader serving fixed tables keyed by module file name
pub fn table_loader(tables: &[(&str, &[(&str, u64)])]) -> impl SymbolLoader
{
    let tables: HashMap<String, SymbolTable> = tables
        .iter()
        .map(|(module, symbols)| (module.to_string(), symbols.iter().map(|(n, o)| (*n, *o)).collect()))
        .collect();

    move |path: &Path| -> Result<Box<dyn ModuleSymbols>> {
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(Box::new(tables.get(name.as_ref()).cloned().unwrap_or_default()))
    }
}

/// Directory holding empty files with the given names
pub fn module_dir(names: &[&str]) -> TempDir
{
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    dir
}

pub fn search_path(dir: &TempDir) -> Vec<PathBuf>
{
    vec![dir.path().to_path_buf()]
}

pub fn session_with(target: &Target, config: SessionConfig, loader: impl SymbolLoader + 'static) -> DebugSession
{
    DebugSession::with_symbol_loader(target.engine(), config, loader).unwrap()
}

pub fn attached_session(target: &Target, config: SessionConfig) -> DebugSession
{
    let session = session_with(target, config, table_loader(&[]));
    session.attach_to_process(ProcessId(4242)).unwrap();
    session
}
