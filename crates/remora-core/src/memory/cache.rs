//! Fixed-capacity page cache over the target's address space.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::engine::DebugEngine;
use crate::error::{RemoraError, Result};

/// Where the cache gets page contents from
///
/// Every [`DebugEngine`] is a page source. The cache only ever asks for one
/// whole, page-aligned page at a time.
pub trait PageSource
{
    /// Read `len` bytes at `address`, `Ok(None)` if the range is unmapped.
    fn read_page(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>;
}

impl<E: DebugEngine + ?Sized> PageSource for E
{
    fn read_page(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>
    {
        self.read_bytes(address, len)
    }
}

/// Counters describing cache behaviour since the last clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats
{
    pub resident_pages: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CachedPage
{
    data: Box<[u8]>,
    last_access: u64,
}

/// Read-through cache of page-aligned, page-sized chunks of target memory
///
/// ## Invariants
///
/// - every resident page starts at a multiple of `page_size` and holds exactly
///   `page_size` bytes
/// - at most `page_count` pages are resident
/// - a failed fetch leaves nothing behind
///
/// Eviction is least-recently-accessed, ties broken by the lower page address.
/// Every hit or miss stamps the page with the next value of a counter that only
/// grows.
pub struct RemotePageCache
{
    page_size: usize,
    page_count: usize,
    pages: HashMap<u64, CachedPage>,
    // (last_access, page address), oldest first
    recency: BTreeSet<(u64, u64)>,
    sequence: u64,
    stats: CacheStats,
}

impl RemotePageCache
{
    /// Create an empty cache
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `page_size` is not a power of two or `page_count`
    /// is zero.
    pub fn new(page_size: usize, page_count: usize) -> Result<Self>
    {
        if !page_size.is_power_of_two() {
            return Err(RemoraError::InvalidArgument(format!("page size {page_size} is not a power of two")));
        }
        if page_count == 0 {
            return Err(RemoraError::InvalidArgument("cache page count must be at least 1".into()));
        }

        Ok(Self {
            page_size,
            page_count,
            pages: HashMap::new(),
            recency: BTreeSet::new(),
            sequence: 0,
            stats: CacheStats::default(),
        })
    }

    pub fn page_size(&self) -> usize
    {
        self.page_size
    }

    pub fn page_count(&self) -> usize
    {
        self.page_count
    }

    pub fn resident_pages(&self) -> usize
    {
        self.pages.len()
    }

    pub fn resident_bytes(&self) -> usize
    {
        self.pages.len() * self.page_size
    }

    /// Whether the page containing `address` is resident
    pub fn is_resident(&self, address: u64) -> bool
    {
        self.pages.contains_key(&self.page_base(address))
    }

    pub fn stats(&self) -> CacheStats
    {
        CacheStats {
            resident_pages: self.pages.len(),
            ..self.stats
        }
    }

    /// Drop every resident page and reset the counters.
    pub fn clear(&mut self)
    {
        trace!(pages = self.pages.len(), "clearing page cache");
        self.pages.clear();
        self.recency.clear();
        self.stats = CacheStats::default();
    }

    fn page_base(&self, address: u64) -> u64
    {
        address & !(self.page_size as u64 - 1)
    }

    fn next_sequence(&mut self) -> u64
    {
        self.sequence += 1;
        self.sequence
    }

    /// Read `length` bytes at `address`, fetching missing pages from `source`
    ///
    /// ## Errors
    ///
    /// - `UnmappedAddress` carrying the first requested address inside the
    ///   first page the source could not provide
    /// - `InvalidArgument` if the range wraps past the top of the address
    ///   space
    pub fn fetch<S: PageSource + ?Sized>(&mut self, source: &mut S, address: u64, length: usize) -> Result<Vec<u8>>
    {
        if length == 0 {
            return Ok(Vec::new());
        }

        // Inclusive, so a range ending exactly at the top of the address
        // space is still representable.
        let last = address
            .checked_add(length as u64 - 1)
            .ok_or_else(|| RemoraError::InvalidArgument(format!("range 0x{address:x}+{length} wraps")))?;

        let page_size = self.page_size as u64;
        let mut output = Vec::with_capacity(length);
        let mut base = self.page_base(address);
        loop {
            let page = self.resident_page(source, base, address)?;
            let from = address.max(base) - base;
            let to = last.min(base + (page_size - 1)) - base;
            output.extend_from_slice(&page[from as usize..=to as usize]);
            match base.checked_add(page_size) {
                Some(next) if next <= last => base = next,
                _ => break,
            }
        }

        Ok(output)
    }

    fn resident_page<S: PageSource + ?Sized>(&mut self, source: &mut S, base: u64, requested: u64) -> Result<&[u8]>
    {
        let stamp = self.next_sequence();

        if let Some(page) = self.pages.get_mut(&base) {
            self.recency.remove(&(page.last_access, base));
            page.last_access = stamp;
            self.recency.insert((stamp, base));
            self.stats.hits += 1;
        } else {
            let data = match source.read_page(base, self.page_size)? {
                Some(data) if data.len() == self.page_size => data,
                Some(data) => {
                    return Err(RemoraError::Engine(format!(
                        "engine returned {} bytes for the {}-byte page at 0x{base:x}",
                        data.len(),
                        self.page_size
                    )));
                }
                None => return Err(RemoraError::UnmappedAddress(requested.max(base))),
            };
            self.stats.misses += 1;

            if self.pages.len() >= self.page_count {
                self.evict_one();
            }

            trace!(page = format_args!("0x{base:x}"), "page cache miss");
            self.pages.insert(
                base,
                CachedPage {
                    data: data.into_boxed_slice(),
                    last_access: stamp,
                },
            );
            self.recency.insert((stamp, base));
        }

        Ok(&self.pages[&base].data)
    }

    fn evict_one(&mut self)
    {
        if let Some((stamp, victim)) = self.recency.pop_first() {
            self.pages.remove(&victim);
            self.stats.evictions += 1;
            trace!(page = format_args!("0x{victim:x}"), last_access = stamp, "evicted page");
        }
    }
}
