//! Owned in-memory backend.
//!
//! Holds images built by the caller (synthetic test images, fuzz inputs) and images
//! re-laid-out from disk into their virtual layout.

use super::Backend;
use crate::Result;

/// An owned byte buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Take ownership of `data`.
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(truncated_error!(offset, len));
        };

        if offset_end > self.data.len() {
            return Err(truncated_error!(offset, len));
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
