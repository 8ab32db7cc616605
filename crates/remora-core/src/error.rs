//! # Error Types
//!
//! General error handling for the debugging backend.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! ## Misses are not errors
//!
//! Symbol lookups, module lookups, and register snapshot queries that find
//! nothing return `Ok(None)`. Probing many candidate names is the normal way
//! callers use those operations, so only infrastructure faults surface here.

use std::fmt;

use thiserror::Error;

/// Which kind of target a session is currently attached to.
///
/// Carried by [`RemoraError::AlreadyAttached`] so the message can tell the
/// caller what is blocking the new attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachKind
{
    /// A live process
    Process,
    /// A post-mortem crash dump
    Dump,
}

impl fmt::Display for AttachKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            AttachKind::Process => f.write_str("a process"),
            AttachKind::Dump => f.write_str("a dump"),
        }
    }
}

/// Main error type for session operations
///
/// ## Error Categories
///
/// 1. **Session state errors**: AlreadyAttached, NotAttached
/// 2. **Address errors**: UnmappedAddress, UnalignedAddress
/// 3. **Capability errors**: Unimplemented, Unsupported
/// 4. **Engine errors**: AttachFailed, DetachFailed, Engine, EngineUnavailable
/// 5. **Caller errors**: InvalidArgument
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum RemoraError
{
    /// An attach was requested while the session already holds a target
    ///
    /// Detach first. The session never switches targets implicitly.
    #[error("Already attached to {0}")]
    AlreadyAttached(AttachKind),

    /// A data operation was requested while the session is detached
    ///
    /// Only the machine metadata accessors (OS, CPU, address size) are usable
    /// without a target.
    #[error("Not attached to a process or dump")]
    NotAttached,

    /// The engine reported that the page containing this address is not mapped
    #[error("Unmapped address 0x{0:016x}")]
    UnmappedAddress(u64),

    /// A fixed-width read was requested at an address that violates the
    /// alignment rule
    #[error("Unaligned address 0x{address:016x} (required alignment {alignment})")]
    UnalignedAddress
    {
        /// The offending address
        address: u64,
        /// The alignment that was required
        alignment: usize,
    },

    /// The operation is a permanent limitation of this backend
    ///
    /// Remote memory writes are the only current example.
    #[error("Unimplemented: {0}")]
    Unimplemented(&'static str),

    /// The operation is not available for the current kind of target
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The engine failed to attach to the requested process or dump
    #[error("Failed to attach: {0}")]
    AttachFailed(String),

    /// The engine failed to detach
    ///
    /// [`crate::DebugSession::detach`] logs and swallows this one; it only
    /// reaches callers that drive an engine directly.
    #[error("Failed to detach: {0}")]
    DetachFailed(String),

    /// Any other failure reported by the debugging engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// The engine could not be brought up at all
    ///
    /// Raised once, when a session or engine is constructed. The session is
    /// unusable afterwards and has to be rebuilt.
    #[error("Debugging engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Invalid argument or configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (opening dumps, `/proc` files, module images)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, RemoraError>`
///
/// ```rust
/// use remora_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, RemoraError>;
