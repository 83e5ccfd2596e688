//! Decoding of fixed-layout little-endian records out of byte buffers.
//!
//! On-disk structs are declared with `zerocopy` little-endian field types, so
//! a cast is all the decoding they need. The only thing that can go wrong is
//! a buffer that is too short, which always means a truncated image.

use zerocopy::{FromBytes, Ref};

use crate::error::{Error, Result};

/// Casts a slice of bytes to a reference of the given type.
pub(crate) fn try_cast_bytes_ref<T: FromBytes>(bytes: &[u8]) -> Option<&T> {
    Some(Ref::<_, T>::new_from_prefix(bytes)?.0.into_ref())
}

/// Casts a slice of bytes to a reference of the given type, starting at the
/// given offset.
pub(crate) fn try_cast_bytes_ref_offset<T: FromBytes>(bytes: &[u8], offset: usize) -> Option<&T> {
    let bytes = bytes.get(offset..)?;
    try_cast_bytes_ref(bytes)
}

/// Like [`try_cast_bytes_ref_offset`], but an undersized buffer is reported
/// as a corrupt image. `what` names the structure for the error message.
pub(crate) fn cast_bytes_ref_offset<'a, T: FromBytes>(
    bytes: &'a [u8],
    offset: usize,
    what: &str,
) -> Result<&'a T> {
    try_cast_bytes_ref_offset(bytes, offset).ok_or_else(|| {
        Error::corrupt(format!(
            "{what} needs {} bytes at offset {offset}, buffer has {}",
            core::mem::size_of::<T>(),
            bytes.len()
        ))
    })
}
