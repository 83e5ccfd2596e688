use std::borrow::Cow;
use std::fmt;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Fixed-width string field, padded with NUL bytes when the value is shorter
/// than the field.
#[derive(Copy, Clone, FromZeroes, FromBytes, AsBytes)]
#[repr(transparent)]
pub(crate) struct CStringBytes<B>(B);

impl<const N: usize> CStringBytes<[u8; N]> {
    pub(crate) fn as_str(&self) -> Cow<'_, str> {
        c_str_from_bytes(&self.0)
    }
}

impl<const N: usize> fmt::Debug for CStringBytes<[u8; N]> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CStringBytes").field(&self.as_str()).finish()
    }
}

/// Text up to the first NUL (or the whole slice). Invalid UTF-8 is replaced
/// rather than rejected; labels are informational.
pub(crate) fn c_str_from_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let nul_location = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..nul_location])
}
