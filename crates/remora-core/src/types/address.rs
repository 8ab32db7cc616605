//! Target address type.

use std::fmt;
use std::num::NonZeroU64;

/// Strongly typed, non-null address in the target's address space
///
/// The value 0 is reserved to mean "no address". Rather than carrying a
/// sentinel around, `Address` wraps a [`NonZeroU64`], so a resolved address can
/// never be null and "no address" is spelled `Option<Address>::None`.
///
/// Addresses are stored as 64-bit values regardless of the target's pointer
/// width; [`crate::types::MachineDescriptor`] says how many of those bytes the
/// target actually uses.
///
/// ## Example
///
/// ```rust
/// use remora_core::types::Address;
///
/// let base = Address::new(0x1000).unwrap();
/// assert_eq!(base.checked_add(0x20).map(Address::value), Some(0x1020));
/// assert!(Address::new(0).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroU64);

impl Address
{
    /// Create an address, returning `None` for the reserved value 0
    pub const fn new(value: u64) -> Option<Self>
    {
        match NonZeroU64::new(value) {
            Some(value) => Some(Address(value)),
            None => None,
        }
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0.get()
    }

    /// Add an offset, returning `None` on overflow or if the result is 0
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.value().checked_add(offset).and_then(Address::new)
    }

    /// Subtract an offset, returning `None` on underflow or if the result is 0
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.value().checked_sub(offset).and_then(Address::new)
    }

    /// Distance in bytes from `base` up to this address
    ///
    /// Returns `None` if `base` lies above `self`.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.value().checked_sub(base.value())
    }

    /// Round down to a multiple of `alignment` (a power of two)
    ///
    /// Returns `None` when rounding lands on 0.
    pub fn align_down(self, alignment: u64) -> Option<Self>
    {
        debug_assert!(alignment.is_power_of_two());
        Address::new(self.value() & !(alignment - 1))
    }
}

impl TryFrom<u64> for Address
{
    type Error = crate::error::RemoraError;

    fn try_from(value: u64) -> Result<Self, Self::Error>
    {
        Address::new(value).ok_or_else(|| crate::error::RemoraError::InvalidArgument("address 0 is reserved".into()))
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.value()
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.value())
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.value(), f)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn zero_is_not_an_address()
    {
        assert!(Address::new(0).is_none());
        assert!(Address::try_from(0u64).is_err());
    }

    #[test]
    fn arithmetic_never_produces_null()
    {
        let addr = Address::new(0x10).unwrap();
        assert_eq!(addr.checked_sub(0x10), None);
        assert_eq!(addr.checked_add(u64::MAX), None);
        assert_eq!(addr.checked_add(0x10).map(Address::value), Some(0x20));
    }

    #[test]
    fn offset_and_alignment()
    {
        let base = Address::new(0x1000).unwrap();
        let inner = Address::new(0x1234).unwrap();
        assert_eq!(inner.offset_from(base), Some(0x234));
        assert_eq!(base.offset_from(inner), None);
        assert_eq!(inner.align_down(0x1000), Some(base));
        assert_eq!(Address::new(0x0fff).unwrap().align_down(0x1000), None);
    }

    #[test]
    fn display_is_zero_padded_hex()
    {
        assert_eq!(Address::new(0xbeef).unwrap().to_string(), "0x000000000000beef");
    }
}
