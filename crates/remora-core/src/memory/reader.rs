//! Byte and scalar reads over the page cache.

use smallvec::SmallVec;

use super::cache::{PageSource, RemotePageCache};
use crate::error::{RemoraError, Result};
use crate::types::{Address, MachineDescriptor};

/// Bytes of a single fixed-width scalar read (never more than 8)
pub type ScalarBytes = SmallVec<[u8; 8]>;

/// The read path callers use to get bytes out of the target
///
/// A reader borrows the session's cache, engine, and machine descriptor for
/// the duration of one operation. It adds what the cache does not do:
/// alignment checks on scalar reads, byte-order decoding, and the rule that a
/// zero pointer means "no address".
pub struct AddressSpaceReader<'a, S: PageSource + ?Sized>
{
    cache: &'a mut RemotePageCache,
    source: &'a mut S,
    machine: &'a MachineDescriptor,
}

impl<'a, S: PageSource + ?Sized> AddressSpaceReader<'a, S>
{
    pub fn new(cache: &'a mut RemotePageCache, source: &'a mut S, machine: &'a MachineDescriptor) -> Self
    {
        Self { cache, source, machine }
    }

    /// Read `length` bytes at `address`, possibly spanning several pages
    ///
    /// ## Errors
    ///
    /// `UnmappedAddress` if any page in the range is unmapped.
    pub fn read_bytes(&mut self, address: u64, length: usize) -> Result<Vec<u8>>
    {
        self.cache.fetch(&mut *self.source, address, length)
    }

    /// Read a `width`-byte scalar that must satisfy the target's alignment rule
    ///
    /// The required alignment equals `width`. On targets with the relaxed
    /// policy an 8-byte read is also accepted at a 4-byte boundary.
    ///
    /// ## Errors
    ///
    /// - `UnalignedAddress` on alignment violation, before any engine I/O
    /// - `InvalidArgument` if `width` is 0 or larger than 8
    /// - `UnmappedAddress` from the underlying fetch
    pub fn read_aligned(&mut self, address: u64, width: usize) -> Result<ScalarBytes>
    {
        if width == 0 || width > 8 {
            return Err(RemoraError::InvalidArgument(format!("scalar width {width} not in 1..=8")));
        }
        self.machine.alignment_policy().check(address, width)?;

        let bytes = self.cache.fetch(&mut *self.source, address, width)?;
        Ok(SmallVec::from_vec(bytes))
    }

    fn read_unsigned(&mut self, address: u64, width: usize) -> Result<u64>
    {
        let bytes = self.read_aligned(address, width)?;
        Ok(self.machine.decode_unsigned(&bytes))
    }

    pub fn read_u8(&mut self, address: u64) -> Result<u8>
    {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self, address: u64) -> Result<u16>
    {
        self.read_unsigned(address, 2).map(|value| value as u16)
    }

    pub fn read_u32(&mut self, address: u64) -> Result<u32>
    {
        self.read_unsigned(address, 4).map(|value| value as u32)
    }

    pub fn read_u64(&mut self, address: u64) -> Result<u64>
    {
        self.read_unsigned(address, 8)
    }

    /// Read a target pointer
    ///
    /// Reads `address_size` bytes. A zero value yields `Ok(None)`, never an
    /// address wrapping 0.
    pub fn read_pointer(&mut self, address: u64) -> Result<Option<Address>>
    {
        let width = usize::from(self.machine.address_size());
        self.read_unsigned(address, width).map(Address::new)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes (terminator
    /// excluded)
    ///
    /// Reads page by page so a string ending just before an unmapped page is
    /// still readable. Invalid UTF-8 is replaced lossily.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if no terminator appears within `max_len + 1` bytes.
    pub fn read_c_string(&mut self, address: u64, max_len: usize) -> Result<String>
    {
        let page_size = self.cache.page_size() as u64;
        let limit = max_len.saturating_add(1);
        let mut collected = Vec::new();
        let mut cursor = address;

        while collected.len() < limit {
            let to_page_end = page_size - (cursor & (page_size - 1));
            let chunk = (limit - collected.len()).min(to_page_end as usize);
            let bytes = self.read_bytes(cursor, chunk)?;
            if let Some(nul) = bytes.iter().position(|b| *b == 0) {
                collected.extend_from_slice(&bytes[..nul]);
                return Ok(String::from_utf8_lossy(&collected).into_owned());
            }
            collected.extend_from_slice(&bytes);
            cursor = cursor
                .checked_add(chunk as u64)
                .ok_or_else(|| RemoraError::InvalidArgument("string runs past the end of the address space".into()))?;
        }

        Err(RemoraError::InvalidArgument(format!(
            "no NUL terminator within {max_len} bytes of 0x{address:x}"
        )))
    }
}
