//! Module image access and low-level binary reading.
//!
//! An [`crate::file::Image`] is a byte-range view over one module in its *virtual* layout:
//! offset `n` of the view is RVA `n`. All header parsing in [`crate::pe`] works on such a
//! view, regardless of where the bytes come from.
//!
//! # Architecture
//!
//! Storage is abstracted behind the [`crate::file::Backend`] trait:
//!
//! - **Mapped** - a borrowed view over a module the OS loader mapped into this process
//! - **Memory** - an owned buffer (synthetic images, re-laid-out files, fuzz inputs)
//! - **Physical** - a read-only memory map of a file whose layout already matches its
//!   virtual layout
//!
//! Files on disk are stored in their *file* layout (sections at `pointer_to_raw_data`).
//! [`crate::file::Image::from_file`] maps the file and, unless the two layouts coincide,
//! copies headers and sections to their virtual addresses and zero-fills the rest, the
//! way the OS loader would.
//!
//! # Key Components
//!
//! - [`crate::file::Image`] - The module view
//! - [`crate::file::Backend`] - Storage abstraction
//! - [`crate::file::io`] - Little-endian primitive reads and writes
//! - [`crate::file::parser::Parser`] - Cursor-based structure reader
//!
//! # Examples
//!
//! ```rust,no_run
//! use ntsyscall::{file::Image, pe::PeImage, ResolverConfig};
//! use std::path::Path;
//!
//! let image = Image::from_file(Path::new(r"C:\Windows\System32\ntdll.dll"))?;
//! let pe = PeImage::parse(image, &ResolverConfig::default())?;
//! println!("{} sections", pe.sections().len());
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`crate::file::Image`] is [`Send`] and [`Sync`]; all access is read-only.

pub mod io;
pub mod parser;

mod mapped;
mod memory;
mod physical;

use std::path::Path;

use crate::{pe::headers::Headers, Error, ResolverConfig, Result};
use mapped::Mapped;
use memory::Memory;
use physical::Physical;

/// Storage behind an [`Image`].
///
/// Implementations must be [`Send`] + [`Sync`] so a parsed module can be shared by every
/// thread that resolves syscall numbers.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TruncatedImage`] if the range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A module in its virtual layout.
///
/// Offsets into an `Image` are RVAs. The view never changes after construction.
pub struct Image {
    data: Box<dyn Backend>,
}

impl Image {
    /// Wrap an owned buffer that is already in virtual layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ntsyscall::file::Image;
    ///
    /// let image = Image::from_mem(vec![0x4D, 0x5A, 0x90, 0x00])?;
    /// assert_eq!(image.len(), 4);
    /// assert!(Image::from_mem(Vec::new()).is_err());
    /// # Ok::<(), ntsyscall::Error>(())
    /// ```
    pub fn from_mem(data: Vec<u8>) -> Result<Image> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        Ok(Image {
            data: Box::new(Memory::new(data)),
        })
    }

    /// Map a module file from disk and bring it into virtual layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be mapped, any header error
    /// of [`crate::pe::headers::Headers::parse`], and [`crate::Error::TruncatedImage`] or
    /// [`crate::Error::Malformed`] if a section lies outside the file or the image.
    pub fn from_file(path: &Path) -> Result<Image> {
        let physical = Physical::new(path)?;
        let headers = Headers::parse(physical.data(), ResolverConfig::default().max_sections)?;

        if is_virtually_laid_out(physical.data(), &headers) {
            log::debug!("{} is already in virtual layout", path.display());
            return Ok(Image {
                data: Box::new(physical),
            });
        }

        let laid_out = lay_out_sections(physical.data(), &headers)?;
        log::debug!(
            "{} re-laid-out: {} file bytes -> {} image bytes",
            path.display(),
            physical.len(),
            laid_out.len()
        );

        Ok(Image {
            data: Box::new(Memory::new(laid_out)),
        })
    }

    /// View a module that is mapped in the current process.
    ///
    /// # Safety
    ///
    /// `base` must point to `len` readable bytes that stay mapped and unmodified for the
    /// rest of the process lifetime.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `base` is null or `len` is zero.
    pub unsafe fn from_raw_parts(base: *const u8, len: usize) -> Result<Image> {
        if base.is_null() || len == 0 {
            return Err(Error::Empty);
        }

        Ok(Image {
            data: Box::new(unsafe { Mapped::new(base, len) }),
        })
    }

    /// Size of the view in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The complete view.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes starting at RVA `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if the range leaves the view.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Address of the first byte of the view.
    ///
    /// For an in-process module this is its load address.
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.data.data().as_ptr() as usize
    }
}

/// Returns `true` if every section's file offset equals its RVA and the file covers the
/// whole image.
fn is_virtually_laid_out(raw: &[u8], headers: &Headers) -> bool {
    raw.len() >= headers.windows.size_of_image as usize
        && headers
            .sections
            .iter()
            .all(|section| section.pointer_to_raw_data == section.virtual_address)
}

/// Copy headers and sections of a file-layout module to their virtual addresses.
///
/// Bytes not covered by headers or section data stay zero, which covers both the gaps
/// between sections and the uninitialized tail of a section whose virtual size exceeds
/// its raw size.
///
/// `size_of_image` is only trusted up to the aligned end of the furthest section.
fn lay_out_sections(raw: &[u8], headers: &Headers) -> Result<Vec<u8>> {
    let extent = image_extent(headers);
    if u64::from(headers.windows.size_of_image) > extent {
        return Err(malformed_error!(
            "Image size 0x{:X} exceeds the section extent 0x{:X}",
            headers.windows.size_of_image,
            extent
        ));
    }

    let size_of_image = headers.windows.size_of_image as usize;
    let mut image = vec![0_u8; size_of_image];

    let header_len = (headers.windows.size_of_headers as usize)
        .min(raw.len())
        .min(size_of_image);
    image[..header_len].copy_from_slice(&raw[..header_len]);

    for section in &headers.sections {
        if section.size_of_raw_data == 0 {
            continue;
        }

        let size = section.size_of_raw_data.min(section.memory_size()) as usize;
        let source_start = section.pointer_to_raw_data as usize;
        let target_start = section.virtual_address as usize;

        let Some(source) = raw.get(source_start..source_start.saturating_add(size)) else {
            return Err(truncated_error!(source_start, size));
        };
        let Some(target) = image.get_mut(target_start..target_start.saturating_add(size)) else {
            return Err(malformed_error!(
                "Section {} at RVA 0x{:X} (0x{:X} bytes) exceeds the image size 0x{:X}",
                section.name_str(),
                target_start,
                size,
                size_of_image
            ));
        };

        target.copy_from_slice(source);
    }

    Ok(image)
}

/// End of the headers or of the furthest section in memory, rounded up to the section
/// alignment.
fn image_extent(headers: &Headers) -> u64 {
    let alignment = u64::from(headers.windows.section_alignment.max(1));
    let align_up = |value: u64| value.div_ceil(alignment) * alignment;

    headers
        .sections
        .iter()
        .map(|section| {
            align_up(u64::from(section.virtual_address) + u64::from(section.memory_size()))
        })
        .fold(align_up(u64::from(headers.windows.size_of_headers)), u64::max)
}
