//! Integer register snapshots and per-architecture register layouts.

use super::machine::Architecture;
use super::Address;
use crate::error::{RemoraError, Result};

/// Ordering and naming of the integer registers for one architecture
///
/// A snapshot is a flat `Vec<u64>` in this order; the layout names each slot
/// and records where the program counter, stack pointer, and frame pointer
/// live.
#[derive(Debug)]
pub struct RegisterLayout
{
    names: &'static [&'static str],
    pc: usize,
    sp: usize,
    fp: usize,
}

impl RegisterLayout
{
    /// Number of integer registers in a snapshot
    pub fn count(&self) -> usize
    {
        self.names.len()
    }

    pub fn names(&self) -> &'static [&'static str]
    {
        self.names
    }

    /// Slot index of the named register, if the layout has it
    pub fn index_of(&self, name: &str) -> Option<usize>
    {
        self.names.iter().position(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}

pub(crate) static X86_LAYOUT: RegisterLayout = RegisterLayout {
    names: &[
        "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eip", "eflags", "cs", "ss", "ds", "es", "fs", "gs",
    ],
    pc: 8,
    sp: 4,
    fp: 5,
};

pub(crate) static X86_64_LAYOUT: RegisterLayout = RegisterLayout {
    names: &[
        "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
        "rip", "rflags",
    ],
    pc: 16,
    sp: 7,
    fp: 6,
};

pub(crate) static AARCH64_LAYOUT: RegisterLayout = RegisterLayout {
    names: &[
        "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14", "x15", "x16",
        "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27", "x28", "fp", "lr", "sp", "pc",
        "pstate",
    ],
    pc: 32,
    sp: 31,
    fp: 29,
};

pub(crate) static ARM_LAYOUT: RegisterLayout = RegisterLayout {
    names: &[
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "fp", "r12", "sp", "lr", "pc",
    ],
    pc: 15,
    sp: 13,
    fp: 11,
};

pub(crate) static RISCV64_LAYOUT: RegisterLayout = RegisterLayout {
    names: &[
        "pc", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "fp", "s1", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7",
        "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
    ],
    pc: 0,
    sp: 2,
    fp: 8,
};

/// Snapshot of a thread's integer registers
///
/// Values are stored in the order given by the architecture's
/// [`RegisterLayout`]. Snapshots are pushed into the session by whoever owns
/// the thread's state; nothing here polls the target.
///
/// ## Example
///
/// ```rust
/// use remora_core::types::{Architecture, IntegerRegisters};
///
/// let mut values = vec![0u64; Architecture::Arm.register_layout().count()];
/// values[15] = 0x8000;
/// let regs = IntegerRegisters::new(Architecture::Arm, values)?;
/// assert_eq!(regs.get_by_name("pc"), Some(0x8000));
/// # Ok::<(), remora_core::error::RemoraError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerRegisters
{
    architecture: Architecture,
    values: Vec<u64>,
}

impl IntegerRegisters
{
    /// Build a snapshot, checking that `values` fills the layout exactly
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the value count does not match the layout.
    pub fn new(architecture: Architecture, values: Vec<u64>) -> Result<Self>
    {
        let expected = architecture.register_layout().count();
        if values.len() != expected {
            return Err(RemoraError::InvalidArgument(format!(
                "{architecture} snapshot needs {expected} registers, got {}",
                values.len()
            )));
        }
        Ok(Self { architecture, values })
    }

    /// A snapshot with every register set to zero
    pub fn zeroed(architecture: Architecture) -> Self
    {
        Self {
            architecture,
            values: vec![0; architecture.register_layout().count()],
        }
    }

    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    pub fn layout(&self) -> &'static RegisterLayout
    {
        self.architecture.register_layout()
    }

    /// Value in slot `index`
    pub fn get(&self, index: usize) -> Option<u64>
    {
        self.values.get(index).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<u64>
    {
        self.layout().index_of(name).and_then(|index| self.get(index))
    }

    /// Overwrite slot `index`
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `index` is outside the layout.
    pub fn set(&mut self, index: usize, value: u64) -> Result<()>
    {
        let count = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| RemoraError::InvalidArgument(format!("register index {index} out of range (0..{count})")))?;
        *slot = value;
        Ok(())
    }

    /// Program counter, or `None` if it holds 0
    pub fn pc(&self) -> Option<Address>
    {
        Address::new(self.values[self.layout().pc])
    }

    /// Stack pointer, or `None` if it holds 0
    pub fn sp(&self) -> Option<Address>
    {
        Address::new(self.values[self.layout().sp])
    }

    /// Frame pointer, or `None` if it holds 0
    pub fn fp(&self) -> Option<Address>
    {
        Address::new(self.values[self.layout().fp])
    }

    /// Iterate `(name, value)` pairs in layout order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_
    {
        self.layout().names().iter().copied().zip(self.values.iter().copied())
    }

    pub fn as_slice(&self) -> &[u64]
    {
        &self.values
    }
}
