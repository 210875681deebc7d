//! PE/COFF parsing over a module image.
//!
//! [`crate::pe::PeImage`] couples an [`crate::file::Image`] with its parsed
//! [`crate::pe::headers::Headers`] and offers RVA-based access to the module's bytes.
//! Because the image is kept in virtual layout, an RVA is a plain offset into it; no
//! section walk is needed to translate addresses.
//!
//! # Key Components
//!
//! - [`crate::pe::PeImage`] - Parsed module with bounds-checked RVA access
//! - [`crate::pe::headers`] - Header records and the parse gates
//! - [`crate::pe::exports`] - Export directory lookup and enumeration
//!
//! # Examples
//!
//! ```rust,no_run
//! use ntsyscall::{file::Image, pe::PeImage, ResolverConfig};
//! use std::path::Path;
//!
//! let image = Image::from_file(Path::new(r"C:\Windows\System32\ntdll.dll"))?;
//! let pe = PeImage::parse(image, &ResolverConfig::default())?;
//!
//! let address = pe.resolve_export_address("NtClose")?;
//! let text = pe.section_by_name(".text").expect("code section");
//! assert!(text.contains((address as usize - pe.image().base_address()) as u32));
//! # Ok::<(), ntsyscall::Error>(())
//! ```

pub mod exports;
pub mod headers;

use crate::{
    file::Image,
    pe::{
        exports::{Exports, ExportTarget},
        headers::{
            DataDirectory, DataDirectoryType, DosHeader, FileHeader, Headers, Machine,
            OptionalHeader, SectionHeader, WindowsHeader,
        },
    },
    Error, ResolverConfig, Result,
};

/// A parsed PE/COFF module.
///
/// Parsing validates the headers only; export and section data are read lazily through
/// the RVA accessors, each of which is bounds-checked against the image.
pub struct PeImage {
    image: Image,
    headers: Headers,
}

impl PeImage {
    /// Parse the headers of `image`.
    ///
    /// # Errors
    /// Any error of [`crate::pe::headers::Headers::parse`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ntsyscall::{file::Image, pe::PeImage, Error, ResolverConfig};
    ///
    /// let image = Image::from_mem(vec![0x7F, b'E', b'L', b'F'])?;
    /// let result = PeImage::parse(image, &ResolverConfig::default());
    /// assert!(matches!(result, Err(Error::BadLegacyMagic(0x457F))));
    /// # Ok::<(), ntsyscall::Error>(())
    /// ```
    pub fn parse(image: Image, config: &ResolverConfig) -> Result<PeImage> {
        let headers = Headers::parse(image.data(), config.max_sections)?;

        log::debug!(
            "Parsed {:?} image: {} sections, 0x{:X} bytes, export directory {:?}",
            headers.file.machine(),
            headers.sections.len(),
            headers.windows.size_of_image,
            headers.data_directory(DataDirectoryType::ExportTable),
        );

        Ok(PeImage { image, headers })
    }

    /// The underlying image.
    #[must_use]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// All parsed headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Legacy header.
    #[must_use]
    pub fn dos_header(&self) -> &DosHeader {
        &self.headers.dos
    }

    /// COFF file header.
    #[must_use]
    pub fn file_header(&self) -> &FileHeader {
        &self.headers.file
    }

    /// Optional header standard fields.
    #[must_use]
    pub fn optional_header(&self) -> &OptionalHeader {
        &self.headers.optional
    }

    /// Optional header Windows fields.
    #[must_use]
    pub fn windows_header(&self) -> &WindowsHeader {
        &self.headers.windows
    }

    /// Target architecture.
    #[must_use]
    pub fn machine(&self) -> Machine {
        self.headers.file.machine()
    }

    /// Data directories in table order.
    #[must_use]
    pub fn data_directories(&self) -> &[DataDirectory] {
        &self.headers.data_directories
    }

    /// The data directory of `kind`, if present and non-empty.
    #[must_use]
    pub fn data_directory(&self, kind: DataDirectoryType) -> Option<DataDirectory> {
        self.headers.data_directory(kind)
    }

    /// Section table in file order.
    #[must_use]
    pub fn sections(&self) -> &[SectionHeader] {
        &self.headers.sections
    }

    /// The first section called `name`.
    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.headers
            .sections
            .iter()
            .find(|section| section.name_str() == name)
    }

    /// The section whose memory range covers `rva`.
    #[must_use]
    pub fn section_containing(&self, rva: u32) -> Option<&SectionHeader> {
        self.headers
            .sections
            .iter()
            .find(|section| section.contains(rva))
    }

    /// Address of the byte at `rva`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if `rva` lies outside the image.
    pub fn rva(&self, rva: u32) -> Result<*const u8> {
        let offset = rva as usize;
        if offset >= self.image.len() {
            return Err(truncated_error!(offset, 1));
        }

        Ok(self.image.data()[offset..].as_ptr())
    }

    /// The `len` bytes starting at `rva`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if the range leaves the image.
    pub fn range_from_rva(&self, rva: u32, len: usize) -> Result<&[u8]> {
        self.image.data_slice(rva as usize, len)
    }

    /// All bytes from `rva` to the end of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if `rva` lies outside the image.
    pub fn tail_from_rva(&self, rva: u32) -> Result<&[u8]> {
        let offset = rva as usize;
        match self.image.data().get(offset..) {
            Some(tail) if !tail.is_empty() => Ok(tail),
            _ => Err(truncated_error!(offset, 1)),
        }
    }

    /// The export directory view, or `None` if the module exports nothing.
    ///
    /// # Errors
    /// Returns [`crate::Error::TruncatedImage`] if the export directory lies outside the
    /// image.
    pub fn exports(&self) -> Result<Option<Exports<'_>>> {
        Exports::new(self)
    }

    /// Address of the code exported as `name`.
    ///
    /// # Errors
    /// - [`crate::Error::UnknownExportedFunction`] if the module does not export `name`
    ///   (including modules without an export directory)
    /// - [`crate::Error::ForwardedExport`] if the export forwards into another module
    /// - [`crate::Error::CorruptExportTable`] or [`crate::Error::TruncatedImage`] for a
    ///   damaged export table
    pub fn resolve_export_address(&self, name: &str) -> Result<*const u8> {
        let Some(export) = exports::resolve(self, name)? else {
            return Err(Error::UnknownExportedFunction(name.to_string()));
        };

        match export.target {
            ExportTarget::Code(address) => Ok(address),
            ExportTarget::Forwarder(target) => Err(Error::ForwardedExport {
                name: name.to_string(),
                target: target.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::image::PeBuilder;

    fn parse(builder: &PeBuilder) -> PeImage {
        let image = Image::from_mem(builder.build()).unwrap();
        PeImage::parse(image, &ResolverConfig::default()).unwrap()
    }

    #[test]
    fn accessors() {
        let pe = parse(&PeBuilder::pe64().with_stub("NtClose", 0x0F));

        assert_eq!(pe.machine(), Machine::Amd64);
        assert_eq!(pe.dos_header().e_lfanew, 0x40);
        assert_eq!(pe.file_header().number_of_sections, 2);
        assert!(pe.optional_header().is_pe32_plus());
        assert_eq!(pe.windows_header().size_of_image as usize, pe.image().len());
        assert_eq!(pe.data_directories().len(), 16);
        assert_eq!(pe.sections().len(), 2);
    }

    #[test]
    fn sections_by_name_and_rva() {
        let pe = parse(&PeBuilder::pe64().with_stub("NtClose", 0x0F));

        let text = pe.section_by_name(".text").unwrap();
        assert_eq!(text.virtual_address, 0x1000);
        assert!(pe.section_by_name(".reloc").is_none());

        let export_rva = pe
            .data_directory(DataDirectoryType::ExportTable)
            .unwrap()
            .virtual_address;
        assert_eq!(pe.section_containing(export_rva).unwrap().name_str(), ".rdata");
        assert_eq!(pe.section_containing(0x1000).unwrap().name_str(), ".text");
        assert!(pe.section_containing(0x10).is_none());
    }

    #[test]
    fn rva_bounds() {
        let pe = parse(&PeBuilder::pe64().with_stub("NtClose", 0x0F));
        let len = pe.image().len();

        assert_eq!(pe.rva(0).unwrap(), pe.image().data().as_ptr());
        assert_eq!(pe.rva(0x1000).unwrap() as usize, pe.image().base_address() + 0x1000);
        assert!(matches!(
            pe.rva(len as u32),
            Err(Error::TruncatedImage { .. })
        ));

        assert_eq!(pe.range_from_rva(0, 2).unwrap(), b"MZ");
        assert!(pe.range_from_rva(len as u32 - 1, 2).is_err());
        assert_eq!(pe.tail_from_rva(len as u32 - 1).unwrap().len(), 1);
        assert!(pe.tail_from_rva(len as u32).is_err());
    }

    #[test]
    fn resolve_export_address_outcomes() {
        let pe = parse(
            &PeBuilder::pe64()
                .with_stub("NtClose", 0x0F)
                .with_forwarder(
                    "NtFlushProcessWriteBuffers",
                    "KERNELBASE.FlushProcessWriteBuffers",
                ),
        );

        let address = pe.resolve_export_address("NtClose").unwrap();
        assert_eq!(address as usize, pe.image().base_address() + 0x1000);
        assert_eq!(unsafe { *address }, 0x4C);

        assert!(matches!(
            pe.resolve_export_address("NtFoo"),
            Err(Error::UnknownExportedFunction(name)) if name == "NtFoo"
        ));
        assert!(matches!(
            pe.resolve_export_address("NtFlushProcessWriteBuffers"),
            Err(Error::ForwardedExport { target, .. })
                if target == "KERNELBASE.FlushProcessWriteBuffers"
        ));
    }

    #[test]
    fn module_without_exports() {
        let pe = parse(&PeBuilder::pe64().without_exports());

        assert!(pe.exports().unwrap().is_none());
        assert!(matches!(
            pe.resolve_export_address("NtClose"),
            Err(Error::UnknownExportedFunction(_))
        ));
    }

    #[test]
    fn section_cap_from_config() {
        let image = Image::from_mem(PeBuilder::pe64().build()).unwrap();
        let config = ResolverConfig {
            max_sections: 1,
            ..ResolverConfig::default()
        };

        assert!(matches!(
            PeImage::parse(image, &config),
            Err(Error::SectionCountExceeded { count: 2, max: 1 })
        ));
    }
}
