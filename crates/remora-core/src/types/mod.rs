//! # Types
//!
//! Target-agnostic value types shared by every component: addresses, the
//! machine descriptor, register snapshots, and symbol names.

pub mod address;
pub mod machine;
pub mod registers;
pub mod symbols;

pub use address::Address;
pub use machine::{AlignmentPolicy, Architecture, Endianness, MachineDescriptor, OsFamily};
pub use registers::{IntegerRegisters, RegisterLayout};
pub use symbols::{ClosestSymbol, Mangling, SymbolName};

/// Identifier the engine uses for a target thread
///
/// In live sessions this is the engine's thread identifier address; in dumps
/// it is whatever the engine maps a system thread id to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

/// Process identifier (PID) of a live target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}
