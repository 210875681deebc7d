//! Export directory lookup.
//!
//! The export directory is three parallel tables: the *address table* (one RVA per
//! ordinal), the *name pointer table* (one name RVA per named export, sorted) and the
//! *ordinal table* (for each name, the unbiased index into the address table).
//! Resolving a name is a scan of the name pointer table followed by two indexed reads.
//!
//! An address-table RVA that falls inside the export directory itself does not point at
//! code: it points at a `MODULE.Symbol` string naming where the export is forwarded to.
//! Such exports are reported as [`ExportTarget::Forwarder`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use ntsyscall::{file::Image, pe::{exports, PeImage}, ResolverConfig};
//! use std::path::Path;
//!
//! let image = Image::from_file(Path::new(r"C:\Windows\System32\ntdll.dll"))?;
//! let pe = PeImage::parse(image, &ResolverConfig::default())?;
//!
//! if let Some(export) = exports::resolve(&pe, "NtReadFile")? {
//!     println!("NtReadFile: ordinal {} at RVA 0x{:X}", export.ordinal, export.rva);
//! }
//! # Ok::<(), ntsyscall::Error>(())
//! ```

use crate::{
    file::parser::Parser,
    pe::{
        headers::{DataDirectory, DataDirectoryType},
        PeImage,
    },
    Error, Result,
};

/// Size of the export directory table.
pub const EXPORT_DIRECTORY_SIZE: usize = 40;

/// The fixed-size table at the start of the export data directory.
#[derive(Clone, Copy, Debug)]
pub struct ExportDirectory {
    /// Reserved, must be zero
    pub characteristics: u32,
    /// Creation time of the export data
    pub time_date_stamp: u32,
    /// Major version number
    pub major_version: u16,
    /// Minor version number
    pub minor_version: u16,
    /// RVA of the module's own name
    pub name: u32,
    /// Ordinal of the first address table entry
    pub base: u32,
    /// Entries in the address table
    pub number_of_functions: u32,
    /// Entries in the name pointer and ordinal tables
    pub number_of_names: u32,
    /// RVA of the address table
    pub address_of_functions: u32,
    /// RVA of the name pointer table
    pub address_of_names: u32,
    /// RVA of the ordinal table
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    /// Read the export directory table.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if the table does not fit.
    pub fn read(parser: &mut Parser) -> Result<ExportDirectory> {
        Ok(ExportDirectory {
            characteristics: parser.read_le::<u32>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            major_version: parser.read_le::<u16>()?,
            minor_version: parser.read_le::<u16>()?,
            name: parser.read_le::<u32>()?,
            base: parser.read_le::<u32>()?,
            number_of_functions: parser.read_le::<u32>()?,
            number_of_names: parser.read_le::<u32>()?,
            address_of_functions: parser.read_le::<u32>()?,
            address_of_names: parser.read_le::<u32>()?,
            address_of_name_ordinals: parser.read_le::<u32>()?,
        })
    }
}

/// Where an export leads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportTarget<'a> {
    /// Code in this module, as an absolute address inside the image
    Code(*const u8),
    /// A `MODULE.Symbol` forwarder string
    Forwarder(&'a str),
}

/// One resolved export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Export<'a> {
    /// Export name, `None` for exports reachable by ordinal only
    pub name: Option<&'a str>,
    /// Biased ordinal
    pub ordinal: u32,
    /// Address table entry
    pub rva: u32,
    /// Code address or forwarder
    pub target: ExportTarget<'a>,
}

/// A view over the export directory of one image.
pub struct Exports<'a> {
    pe: &'a PeImage,
    range: DataDirectory,
    directory: ExportDirectory,
}

impl<'a> Exports<'a> {
    /// Open the export directory of `pe`, or `None` if its RVA is zero.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if the directory table lies outside the image.
    pub fn new(pe: &'a PeImage) -> Result<Option<Exports<'a>>> {
        let Some(range) = pe.data_directory(DataDirectoryType::ExportTable) else {
            return Ok(None);
        };

        let bytes = pe.range_from_rva(range.virtual_address, EXPORT_DIRECTORY_SIZE)?;
        let directory = ExportDirectory::read(&mut Parser::new(bytes))?;

        Ok(Some(Exports {
            pe,
            range,
            directory,
        }))
    }

    /// The export directory table.
    #[must_use]
    pub fn directory(&self) -> &ExportDirectory {
        &self.directory
    }

    /// The module name recorded in the directory.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] or [`crate::Error::Malformed`] if the name cannot
    /// be read.
    pub fn module_name(&self) -> Result<&'a str> {
        self.cstr_at(self.directory.name)
    }

    /// Number of named exports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.number_of_names as usize
    }

    /// Returns `true` if the module has no named exports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory.number_of_names == 0
    }

    /// Find the export called `name`.
    ///
    /// The scan compares bytes exactly and stops at the first match; a name that is not
    /// exported yields `Ok(None)`.
    ///
    /// # Errors
    /// - [`crate::Error::CorruptExportTable`] if the matched name maps to an ordinal outside
    ///   the address table
    /// - [`crate::Error::TruncatedImage`] if a table or name lies outside the image
    pub fn resolve(&self, name: &str) -> Result<Option<Export<'a>>> {
        for index in 0..self.len() {
            let candidate = self.name_bytes_at(index)?;
            if candidate == name.as_bytes() {
                let ordinal_index = self.ordinal_index_at(index)?;
                let name = self.utf8(candidate)?;
                return self.export_at(ordinal_index, Some(name)).map(Some);
            }
        }

        Ok(None)
    }

    /// Find the export with the biased `ordinal`.
    ///
    /// Ordinals below the ordinal base, past the address table, or whose address table
    /// slot is empty yield `Ok(None)`.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if a table lies outside the image.
    pub fn resolve_ordinal(&self, ordinal: u32) -> Result<Option<Export<'a>>> {
        let Some(index) = ordinal.checked_sub(self.directory.base) else {
            return Ok(None);
        };
        if index >= self.directory.number_of_functions {
            return Ok(None);
        }

        if self.address_at(index as usize)? == 0 {
            return Ok(None);
        }

        let mut name = None;
        for name_index in 0..self.len() {
            if self.ordinal_index_at(name_index)? == index as usize {
                name = Some(self.utf8(self.name_bytes_at(name_index)?)?);
                break;
            }
        }

        self.export_at(index as usize, name).map(Some)
    }

    /// Iterate over all named exports in name pointer table order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Export<'a>>> + '_ {
        (0..self.len()).map(move |index| {
            let name = self.utf8(self.name_bytes_at(index)?)?;
            let ordinal_index = self.ordinal_index_at(index)?;
            self.export_at(ordinal_index, Some(name))
        })
    }

    /// Iterate over the names of all named exports.
    pub fn names(&self) -> impl Iterator<Item = Result<&'a str>> + '_ {
        (0..self.len()).map(move |index| self.utf8(self.name_bytes_at(index)?))
    }

    fn name_bytes_at(&self, index: usize) -> Result<&'a [u8]> {
        let name_rva = self.read_u32_at(self.directory.address_of_names, index)?;
        let mut parser = Parser::new(self.pe.tail_from_rva(name_rva)?);
        let name = parser.read_cstr()?;
        Ok(name)
    }

    fn ordinal_index_at(&self, index: usize) -> Result<usize> {
        let ordinal_index =
            self.read_u16_at(self.directory.address_of_name_ordinals, index)? as usize;

        if ordinal_index >= self.directory.number_of_functions as usize {
            return Err(Error::CorruptExportTable {
                index: ordinal_index,
                count: self.directory.number_of_functions as usize,
            });
        }

        Ok(ordinal_index)
    }

    fn address_at(&self, index: usize) -> Result<u32> {
        if index >= self.directory.number_of_functions as usize {
            return Err(Error::CorruptExportTable {
                index,
                count: self.directory.number_of_functions as usize,
            });
        }

        self.read_u32_at(self.directory.address_of_functions, index)
    }

    fn export_at(&self, index: usize, name: Option<&'a str>) -> Result<Export<'a>> {
        let rva = self.address_at(index)?;
        // ordinals are 16-bit, so the biased value fits unless the base is absurd
        let ordinal = self.directory.base.wrapping_add(index as u32);

        let target = if self.range.contains(rva) {
            ExportTarget::Forwarder(self.cstr_at(rva)?)
        } else {
            ExportTarget::Code(self.pe.rva(rva)?)
        };

        Ok(Export {
            name,
            ordinal,
            rva,
            target,
        })
    }

    fn read_u16_at(&self, table: u32, index: usize) -> Result<u16> {
        let rva = (table as usize).saturating_add(index.saturating_mul(2));
        let bytes = self.pe.image().data_slice(rva, 2)?;
        Parser::new(bytes).read_le::<u16>()
    }

    fn read_u32_at(&self, table: u32, index: usize) -> Result<u32> {
        let rva = (table as usize).saturating_add(index.saturating_mul(4));
        let bytes = self.pe.image().data_slice(rva, 4)?;
        Parser::new(bytes).read_le::<u32>()
    }

    fn cstr_at(&self, rva: u32) -> Result<&'a str> {
        let mut parser = Parser::new(self.pe.tail_from_rva(rva)?);
        self.utf8(parser.read_cstr()?)
    }

    fn utf8(&self, bytes: &'a [u8]) -> Result<&'a str> {
        std::str::from_utf8(bytes)
            .map_err(|error| malformed_error!("Export name is not valid UTF-8: {}", error))
    }
}

/// Resolve `name` in the export directory of `pe`.
///
/// Returns `Ok(None)` if the module has no export directory or does not export `name`.
///
/// # Errors
/// See [`Exports::resolve`].
pub fn resolve<'a>(pe: &'a PeImage, name: &str) -> Result<Option<Export<'a>>> {
    match Exports::new(pe)? {
        Some(exports) => exports.resolve(name),
        None => Ok(None),
    }
}
