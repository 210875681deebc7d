//! Borrowed in-process backend.
//!
//! Views a module that the OS loader has already mapped into this process. Nothing is
//! copied and nothing is written; the view is valid for as long as the module stays
//! loaded.

use super::Backend;
use crate::Result;

/// A read-only view over `len` bytes of process memory starting at `base`.
#[derive(Debug)]
pub struct Mapped {
    data: &'static [u8],
}

impl Mapped {
    /// Create a view over a mapped module.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` readable bytes that stay mapped and unmodified for the
    /// rest of the process lifetime (a module that is never unloaded, such as the
    /// kernel-interface module).
    pub unsafe fn new(base: *const u8, len: usize) -> Mapped {
        Mapped {
            data: unsafe { std::slice::from_raw_parts(base, len) },
        }
    }
}

impl Backend for Mapped {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(truncated_error!(offset, len));
        };

        self.data
            .get(offset..offset_end)
            .ok_or(truncated_error!(offset, len))
    }

    fn data(&self) -> &[u8] {
        self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
