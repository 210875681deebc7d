//! Little-endian, bounds-checked reading and writing of primitive values.
//!
//! Every structure in a PE image is little-endian and tightly packed, so the parser never
//! casts raw memory into `#[repr(C)]` structs. Instead each field is pulled out of a byte
//! slice through [`crate::file::io::read_le_at`], which advances an offset and fails with
//! [`crate::Error::TruncatedImage`] instead of reading past the end of the slice.
//!
//! # Key Components
//!
//! - [`crate::file::io::ByteIO`] - Conversion between a primitive and its little-endian bytes
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Reading values
//! - [`crate::file::io::write_le_at`] - Writing values
//!
//! # Examples
//!
//! ```rust
//! use ntsyscall::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0x5A4D_u16)?;
//! write_le_at(&mut data, &mut offset, 0x40_u32)?;
//!
//! let mut offset = 0;
//! let magic: u16 = read_le_at(&data, &mut offset)?;
//! let lfanew: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((magic, lfanew, offset), (0x5A4D, 0x40, 6));
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All functions are pure; the offset is caller-owned, so each thread uses its own.

use crate::Result;

/// Trait for primitive types that can be read from and written to little-endian bytes.
///
/// The associated `Bytes` type is the fixed-size array matching the width of the type
/// (e.g. `[u8; 4]` for `u32`).
pub trait ByteIO: Sized {
    /// Byte array representation of this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_byte_io {
    ($($ty:ty),*) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_byte_io!(u8, u16, u32, u64, i32, usize);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::TruncatedImage`] if `data` is shorter than `T`.
pub fn read_le<T: ByteIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances `offset` past it.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Position to read at; advanced by `size_of::<T>()` on success
///
/// # Errors
/// Returns [`crate::Error::TruncatedImage`] if the value does not fit; `offset` is left
/// untouched in that case.
pub fn read_le_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(truncated_error!(*offset, type_len));
    };

    if end > data.len() {
        return Err(truncated_error!(*offset, type_len));
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(truncated_error!(*offset, type_len));
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::TruncatedImage`] if the value does not fit.
pub fn write_le_at<T: ByteIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(truncated_error!(*offset, type_len));
    };

    if end > data.len() {
        return Err(truncated_error!(*offset, type_len));
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;

    Ok(())
}
