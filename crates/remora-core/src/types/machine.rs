//! Static description of the target machine.
//!
//! A [`MachineDescriptor`] answers three questions for the rest of the crate:
//! how wide a pointer is, which byte order scalars use, and which alignment
//! rule fixed-width reads must satisfy. It is pure data and stays valid while
//! the session is detached.

use std::fmt;

use super::registers::{RegisterLayout, AARCH64_LAYOUT, ARM_LAYOUT, RISCV64_LAYOUT, X86_64_LAYOUT, X86_LAYOUT};
use crate::error::{RemoraError, Result};

/// Operating system family of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily
{
    Linux,
    MacOs,
    Windows,
    Bsd,
    Solaris,
    /// Any other operating system
    Unknown,
}

impl OsFamily
{
    /// The operating system this crate was compiled for
    pub const fn host() -> Self
    {
        if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(any(target_os = "freebsd", target_os = "openbsd", target_os = "netbsd")) {
            OsFamily::Bsd
        } else if cfg!(target_os = "solaris") {
            OsFamily::Solaris
        } else {
            OsFamily::Unknown
        }
    }

    pub const fn name(self) -> &'static str
    {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::Windows => "windows",
            OsFamily::Bsd => "bsd",
            OsFamily::Solaris => "solaris",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsFamily
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Byte order of scalar values in target memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness
{
    Little,
    Big,
}

/// Alignment rule applied to fixed-width scalar reads
///
/// - `Strict`: an access of width `n` requires `address % n == 0`.
/// - `RelaxedWide`: like `Strict`, except that an 8-byte access is also
///   accepted at a 4-byte boundary. Only width-8 accesses are relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentPolicy
{
    Strict,
    RelaxedWide,
}

impl AlignmentPolicy
{
    /// Check `address` against `alignment`, failing with
    /// [`RemoraError::UnalignedAddress`] on violation.
    pub fn check(self, address: u64, alignment: usize) -> Result<()>
    {
        if alignment == 0 {
            return Err(RemoraError::InvalidArgument("alignment must be non-zero".into()));
        }

        let align = alignment as u64;
        let relaxed = self == AlignmentPolicy::RelaxedWide && alignment == 8 && address % 4 == 0;
        if address % align == 0 || relaxed {
            Ok(())
        } else {
            Err(RemoraError::UnalignedAddress { address, alignment })
        }
    }
}

/// CPU architecture of the target
///
/// Everything architecture-specific (pointer width, byte order, alignment
/// rule, integer register layout) comes from one static table indexed by this
/// tag, so the choice is made once when the descriptor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    X86,
    X86_64,
    Aarch64,
    Arm,
    Riscv64,
}

struct ArchTraits
{
    name: &'static str,
    pointer_size: u8,
    endianness: Endianness,
    alignment: AlignmentPolicy,
    registers: &'static RegisterLayout,
}

static ARCH_TABLE: [ArchTraits; 5] = [
    ArchTraits {
        name: "x86",
        pointer_size: 4,
        endianness: Endianness::Little,
        alignment: AlignmentPolicy::RelaxedWide,
        registers: &X86_LAYOUT,
    },
    ArchTraits {
        name: "amd64",
        pointer_size: 8,
        endianness: Endianness::Little,
        alignment: AlignmentPolicy::RelaxedWide,
        registers: &X86_64_LAYOUT,
    },
    ArchTraits {
        name: "aarch64",
        pointer_size: 8,
        endianness: Endianness::Little,
        alignment: AlignmentPolicy::Strict,
        registers: &AARCH64_LAYOUT,
    },
    ArchTraits {
        name: "arm",
        pointer_size: 4,
        endianness: Endianness::Little,
        alignment: AlignmentPolicy::Strict,
        registers: &ARM_LAYOUT,
    },
    ArchTraits {
        name: "riscv64",
        pointer_size: 8,
        endianness: Endianness::Little,
        alignment: AlignmentPolicy::Strict,
        registers: &RISCV64_LAYOUT,
    },
];

impl Architecture
{
    /// The architecture this crate was compiled for, if it is one we know
    pub const fn host() -> Option<Self>
    {
        if cfg!(target_arch = "x86_64") {
            Some(Architecture::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Architecture::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Architecture::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Architecture::Arm)
        } else if cfg!(target_arch = "riscv64") {
            Some(Architecture::Riscv64)
        } else {
            None
        }
    }

    fn traits(self) -> &'static ArchTraits
    {
        &ARCH_TABLE[self as usize]
    }

    /// Conventional CPU name (`"amd64"`, `"aarch64"`, ...)
    pub fn name(self) -> &'static str
    {
        self.traits().name
    }

    /// Size of a pointer in bytes
    pub fn pointer_size_bytes(self) -> u8
    {
        self.traits().pointer_size
    }

    pub fn default_endianness(self) -> Endianness
    {
        self.traits().endianness
    }

    pub fn alignment_policy(self) -> AlignmentPolicy
    {
        self.traits().alignment
    }

    /// Integer register layout used for thread register snapshots
    pub fn register_layout(self) -> &'static RegisterLayout
    {
        self.traits().registers
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Address width, byte order, and alignment rule of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineDescriptor
{
    os: OsFamily,
    cpu: Architecture,
    address_size: u8,
    endianness: Endianness,
}

impl MachineDescriptor
{
    /// Describe a target using the architecture's defaults
    pub fn for_arch(os: OsFamily, cpu: Architecture) -> Self
    {
        Self {
            os,
            cpu,
            address_size: cpu.pointer_size_bytes(),
            endianness: cpu.default_endianness(),
        }
    }

    /// Describe the machine this crate is running on
    ///
    /// ## Errors
    ///
    /// `EngineUnavailable` if the host architecture is not one we support.
    pub fn host() -> Result<Self>
    {
        let cpu = Architecture::host().ok_or_else(|| {
            RemoraError::EngineUnavailable(format!("unsupported host architecture {}", std::env::consts::ARCH))
        })?;
        Ok(Self::for_arch(OsFamily::host(), cpu))
    }

    /// Override the byte order (for bi-endian targets)
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self
    {
        self.endianness = endianness;
        self
    }

    pub fn os(&self) -> OsFamily
    {
        self.os
    }

    pub fn cpu(&self) -> Architecture
    {
        self.cpu
    }

    /// Width of a target pointer in bytes (4 or 8)
    pub fn address_size(&self) -> u8
    {
        self.address_size
    }

    pub fn endianness(&self) -> Endianness
    {
        self.endianness
    }

    pub fn alignment_policy(&self) -> AlignmentPolicy
    {
        self.cpu.alignment_policy()
    }

    /// Decode an unsigned integer of up to 8 bytes in target byte order
    pub fn decode_unsigned(&self, bytes: &[u8]) -> u64
    {
        debug_assert!(bytes.len() <= 8);
        let mut buf = [0u8; 8];
        match self.endianness {
            Endianness::Little => {
                buf[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            Endianness::Big => {
                buf[8 - bytes.len()..].copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
        }
    }
}
