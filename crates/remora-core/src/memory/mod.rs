//! # Target Memory Access
//!
//! Two layers sit between callers and the engine's raw read primitive:
//!
//! - [`RemotePageCache`]: fixed-capacity, page-granular cache. The only code
//!   that issues engine reads for target memory.
//! - [`AddressSpaceReader`]: turns arbitrary reads into page fetches and
//!   enforces the alignment and null-pointer conventions.
//!
//! ## Staleness
//!
//! A cached page is a snapshot. It stays valid until it is evicted or the
//! cache is cleared on detach, even if the live target has since written to
//! that memory.

pub mod cache;
pub mod reader;

pub use cache::{CacheStats, PageSource, RemotePageCache};
pub use reader::AddressSpaceReader;

use once_cell::sync::Lazy;

const FALLBACK_PAGE_SIZE: usize = 4096;

#[cfg(unix)]
static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    #[allow(unsafe_code)]
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(FALLBACK_PAGE_SIZE)
});

#[cfg(not(unix))]
static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| FALLBACK_PAGE_SIZE);

/// Hardware page size of the machine this crate runs on
///
/// Engines that target the local machine report this as their page size.
pub fn host_page_size() -> usize
{
    *SYSTEM_PAGE_SIZE
}
