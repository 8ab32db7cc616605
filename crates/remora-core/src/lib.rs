//! # remora-core
//!
//! Session-gated, cached access to a live process or a post-mortem crash
//! dump: read memory, resolve symbols, and inspect thread registers without
//! paying an engine round trip on every access.
//!
//! ## Components
//!
//! - [`DebugSession`]: attach/detach lifecycle and the single session lock
//! - [`memory::RemotePageCache`]: fixed-capacity, page-granular read cache
//! - [`memory::AddressSpaceReader`]: byte, scalar, and pointer reads over the
//!   cache
//! - [`loadobj::LoadObjectRegistry`]: mapped modules and symbol resolution
//! - [`threads::ThreadRegistry`]: thread handles and register snapshots
//! - [`types::MachineDescriptor`]: OS, CPU, address width, byte order
//!
//! The low-level debugger itself sits behind the [`DebugEngine`] trait. Two
//! engines ship with the crate: [`engine::procfs`] for live Linux processes
//! and [`engine::core_file`] for ELF core dumps.
//!
//! ## Logging
//!
//! Everything is instrumented with `tracing`. The crate never installs a
//! subscriber; use `remora-utils` or your own.

pub mod config;
pub mod engine;
pub mod error;
pub mod loadobj;
pub mod memory;
pub mod session;
pub mod symbols;
pub mod threads;
pub mod types;

pub use config::SessionConfig;
pub use engine::{DebugEngine, EngineModule};
pub use error::{AttachKind, RemoraError, Result};
pub use session::{DebugSession, SessionState};
pub use types::{Address, Architecture, IntegerRegisters, MachineDescriptor, ProcessId, ThreadId};
