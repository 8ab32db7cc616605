//! # Linux `/proc` Engine
//!
//! Reads a live process through `/proc/<pid>/mem` and discovers its mapped
//! modules from `/proc/<pid>/maps`.
//!
//! Opening `/proc/<pid>/mem` needs ptrace-level permission over the target
//! (same user and a permissive `kernel.yama.ptrace_scope`, or
//! `CAP_SYS_PTRACE`), but it does not stop the process. Reads therefore see
//! live memory as of the moment the page is first fetched.
//!
//! Thread ids of a live process are already kernel tids, so the engine keeps
//! the default `Unsupported` answer for system-id translation.
//!
//! See: [proc(5)](https://man7.org/linux/man-pages/man5/proc.5.html)

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{DebugEngine, EngineModule};
use crate::error::{RemoraError, Result};
use crate::memory::host_page_size;
use crate::types::{Address, MachineDescriptor, ProcessId};

/// Engine for live processes on the local Linux machine
pub struct ProcfsEngine
{
    machine: MachineDescriptor,
    page_size: usize,
    target: Option<(ProcessId, File)>,
}

impl ProcfsEngine
{
    /// Create an engine for the local machine
    ///
    /// ## Errors
    ///
    /// `EngineUnavailable` if `/proc` is not mounted or the host architecture
    /// is unsupported.
    pub fn new() -> Result<Self>
    {
        if !Path::new("/proc/self/mem").exists() {
            return Err(RemoraError::EngineUnavailable("/proc is not mounted".into()));
        }

        Ok(Self {
            machine: MachineDescriptor::host()?,
            page_size: host_page_size(),
            target: None,
        })
    }

    fn pid(&self) -> Result<ProcessId>
    {
        self.target.as_ref().map(|(pid, _)| *pid).ok_or(RemoraError::NotAttached)
    }
}

impl DebugEngine for ProcfsEngine
{
    fn machine(&self) -> MachineDescriptor
    {
        self.machine
    }

    fn page_size(&self) -> usize
    {
        self.page_size
    }

    fn attach_process(&mut self, pid: ProcessId) -> Result<()>
    {
        let path = format!("/proc/{}/mem", pid.0);
        let mem = File::open(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => RemoraError::AttachFailed(format!("process {} not found", pid.0)),
            ErrorKind::PermissionDenied => {
                RemoraError::AttachFailed(format!("permission denied opening {path} (ptrace access required)"))
            }
            _ => RemoraError::AttachFailed(format!("{path}: {err}")),
        })?;

        info!(pid = pid.0, "opened process memory");
        self.target = Some((pid, mem));
        Ok(())
    }

    fn attach_dump(&mut self, _executable: &Path, dump: &Path) -> Result<()>
    {
        Err(RemoraError::AttachFailed(format!(
            "{} is a dump; the procfs engine only attaches to live processes",
            dump.display()
        )))
    }

    fn detach(&mut self) -> Result<()>
    {
        match self.target.take() {
            Some((pid, _mem)) => {
                debug!(pid = pid.0, "closed process memory");
                Ok(())
            }
            None => Err(RemoraError::DetachFailed("no process attached".into())),
        }
    }

    fn read_bytes(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>
    {
        let (_, mem) = self.target.as_ref().ok_or(RemoraError::NotAttached)?;
        let mut buffer = vec![0u8; len];
        let mut filled = 0usize;

        while filled < len {
            match mem.read_at(&mut buffer[filled..], address + filled as u64) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                // EIO / EFAULT: the range is not mapped in the target.
                Err(err) if matches!(err.raw_os_error(), Some(libc::EIO | libc::EFAULT)) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Some(buffer))
    }

    fn loaded_modules(&mut self) -> Result<Vec<EngineModule>>
    {
        let pid = self.pid()?;
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid.0))?;
        Ok(parse_maps(&maps))
    }
}

/// Collapse `/proc/<pid>/maps` into one module per backing file
///
/// A module spans from its lowest to its highest mapping. Anonymous and
/// pseudo mappings (`[heap]`, `[stack]`, `[vdso]`, ...) are ignored.
pub(crate) fn parse_maps(maps: &str) -> Vec<EngineModule>
{
    let mut spans: BTreeMap<PathBuf, (u64, u64)> = BTreeMap::new();

    for line in maps.lines() {
        // start-end perms offset dev inode [path]
        let mut fields = line.split_whitespace();
        let Some(range) = fields.next() else { continue };
        let Some(path) = fields.nth(4) else { continue };
        if !path.starts_with('/') {
            continue;
        }
        let Some((start, end)) = range.split_once('-') else { continue };
        let (Ok(start), Ok(end)) = (u64::from_str_radix(start, 16), u64::from_str_radix(end, 16)) else {
            continue;
        };

        spans
            .entry(PathBuf::from(path))
            .and_modify(|span| {
                span.0 = span.0.min(start);
                span.1 = span.1.max(end);
            })
            .or_insert((start, end));
    }

    spans
        .into_iter()
        .filter_map(|(path, (start, end))| {
            Address::new(start).map(|base| EngineModule {
                path,
                base,
                size: end - start,
            })
        })
        .collect()
}
