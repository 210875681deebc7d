//! PE/COFF header families.
//!
//! Headers are decoded field by field into owned, `Copy`-able records; nothing is cast
//! from raw memory. Each magic value is checked before any field that depends on it is
//! trusted:
//!
//! 1. [`DosHeader`] - `MZ` magic, then `e_lfanew` at offset 0x3C
//! 2. [`FileHeader`] - `PE\0\0` signature and the 20-byte COFF header
//! 3. [`OptionalHeader`] - PE32 (`0x10B`) or PE32+ (`0x20B`) standard fields
//! 4. [`WindowsHeader`] - platform fields, pointer-width per the optional header magic
//! 5. [`DataDirectory`] table and [`SectionHeader`] table
//!
//! [`Headers::parse`] runs the gates in that order on a byte slice. The slice may be in
//! file or virtual layout: the headers occupy the same leading bytes in both.

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::{file::parser::Parser, Error, Result};

/// `MZ`
pub const DOS_MAGIC: u16 = 0x5A4D;
/// `PE\0\0`
pub const PE_SIGNATURE: u32 = 0x0000_4550;
/// Optional header magic of 32-bit images.
pub const PE32_MAGIC: u16 = 0x10B;
/// Optional header magic of 64-bit images.
pub const PE32_PLUS_MAGIC: u16 = 0x20B;

/// Size of the legacy DOS header.
pub const DOS_HEADER_SIZE: usize = 64;
/// Size of the signature plus the COFF file header.
pub const FILE_HEADER_SIZE: usize = 24;
/// Size of one section table record.
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size of one data directory record.
pub const DATA_DIRECTORY_SIZE: usize = 8;
/// Number of data directories a well-formed image can carry.
pub const MAX_DATA_DIRECTORIES: usize = 16;

const E_LFANEW_OFFSET: usize = 0x3C;

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// COFF file header characteristics
    pub struct FileCharacteristics: u16 {
        /// Relocation information was stripped
        const RELOCS_STRIPPED = 0x0001;
        /// The image is valid and can be run
        const EXECUTABLE_IMAGE = 0x0002;
        /// The application can handle addresses above 2 GiB
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// The machine is based on a 32-bit word architecture
        const MACHINE_32BIT = 0x0100;
        /// Debugging information was removed
        const DEBUG_STRIPPED = 0x0200;
        /// The image is a system file
        const SYSTEM = 0x1000;
        /// The image is a dynamic-link library
        const DLL = 0x2000;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    /// Section table characteristics
    pub struct SectionCharacteristics: u32 {
        /// The section contains executable code
        const CNT_CODE = 0x0000_0020;
        /// The section contains initialized data
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        /// The section contains uninitialized data
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        /// The section can be discarded as needed
        const MEM_DISCARDABLE = 0x0200_0000;
        /// The section cannot be cached
        const MEM_NOT_CACHED = 0x0400_0000;
        /// The section is not pageable
        const MEM_NOT_PAGED = 0x0800_0000;
        /// The section can be shared in memory
        const MEM_SHARED = 0x1000_0000;
        /// The section can be executed as code
        const MEM_EXECUTE = 0x2000_0000;
        /// The section can be read
        const MEM_READ = 0x4000_0000;
        /// The section can be written to
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Target architecture of an image.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Machine {
    /// Intel 386 and compatibles (`0x14C`)
    I386,
    /// x64 (`0x8664`)
    Amd64,
    /// ARM64 little endian (`0xAA64`)
    Arm64,
    /// Anything else
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014C => Machine::I386,
            0x8664 => Machine::Amd64,
            0xAA64 => Machine::Arm64,
            other => Machine::Other(other),
        }
    }
}

/// Index into the data directory table.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, EnumCount)]
pub enum DataDirectoryType {
    /// Export table
    ExportTable = 0,
    /// Import table
    ImportTable = 1,
    /// Resource table
    ResourceTable = 2,
    /// Exception table
    ExceptionTable = 3,
    /// Attribute certificate table
    CertificateTable = 4,
    /// Base relocation table
    BaseRelocationTable = 5,
    /// Debug data
    Debug = 6,
    /// Reserved, must be zero
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage table
    TlsTable = 9,
    /// Load configuration table
    LoadConfigTable = 10,
    /// Bound import table
    BoundImport = 11,
    /// Import address table
    ImportAddressTable = 12,
    /// Delay import descriptor
    DelayImportDescriptor = 13,
    /// CLR runtime header
    ClrRuntimeHeader = 14,
    /// Reserved, must be zero
    Reserved = 15,
}

/// The legacy header at offset 0.
///
/// Only the two fields the loader still reads are kept.
#[derive(Clone, Copy, Debug)]
pub struct DosHeader {
    /// `MZ`
    pub e_magic: u16,
    /// File offset of the PE signature
    pub e_lfanew: u32,
}

impl DosHeader {
    /// Read and verify the DOS header.
    ///
    /// # Errors
    /// [`crate::Error::BadLegacyMagic`] on a wrong magic, [`crate::Error::TruncatedImage`]
    /// if the data is shorter than 64 bytes.
    pub fn parse(data: &[u8]) -> Result<DosHeader> {
        let mut parser = Parser::new(data);

        let e_magic = parser.read_le::<u16>()?;
        if e_magic != DOS_MAGIC {
            return Err(Error::BadLegacyMagic(e_magic));
        }

        if data.len() < DOS_HEADER_SIZE {
            return Err(truncated_error!(0, DOS_HEADER_SIZE));
        }

        // legacy DOS fields up to e_lfanew
        parser.advance_by(E_LFANEW_OFFSET - parser.pos())?;
        let e_lfanew = parser.read_le::<u32>()?;

        Ok(DosHeader { e_magic, e_lfanew })
    }
}

/// The PE signature and COFF file header.
#[derive(Clone, Copy, Debug)]
pub struct FileHeader {
    /// `PE\0\0`
    pub signature: u32,
    /// Raw machine value, see [`FileHeader::machine`]
    pub machine: u16,
    /// Number of section table records
    pub number_of_sections: u16,
    /// Link time
    pub time_date_stamp: u32,
    /// File offset of the COFF symbol table, usually 0
    pub pointer_to_symbol_table: u32,
    /// Number of COFF symbols, usually 0
    pub number_of_symbols: u32,
    /// Size of the optional header including data directories
    pub size_of_optional_header: u16,
    /// Image attributes
    pub characteristics: FileCharacteristics,
}

impl FileHeader {
    /// Read the file header at the parser's position and verify the signature.
    ///
    /// # Errors
    /// [`crate::Error::BadModernMagic`] on a wrong signature,
    /// [`crate::Error::TruncatedImage`] if the header does not fit.
    pub fn read(parser: &mut Parser) -> Result<FileHeader> {
        let signature = parser.read_le::<u32>()?;
        if signature != PE_SIGNATURE {
            return Err(Error::BadModernMagic(signature));
        }

        Ok(FileHeader {
            signature,
            machine: parser.read_le::<u16>()?,
            number_of_sections: parser.read_le::<u16>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            pointer_to_symbol_table: parser.read_le::<u32>()?,
            number_of_symbols: parser.read_le::<u32>()?,
            size_of_optional_header: parser.read_le::<u16>()?,
            characteristics: FileCharacteristics::from_bits_retain(parser.read_le::<u16>()?),
        })
    }

    /// Target architecture.
    #[must_use]
    pub fn machine(&self) -> Machine {
        Machine::from(self.machine)
    }
}

/// Optional header fields common to both shapes.
#[derive(Clone, Copy, Debug)]
pub struct StandardFields {
    /// `0x10B` or `0x20B`
    pub magic: u16,
    /// Linker major version
    pub major_linker_version: u8,
    /// Linker minor version
    pub minor_linker_version: u8,
    /// Size of all code sections
    pub size_of_code: u32,
    /// Size of all initialized data sections
    pub size_of_initialized_data: u32,
    /// Size of all uninitialized data sections
    pub size_of_uninitialized_data: u32,
    /// RVA of the entry point, 0 if there is none
    pub address_of_entry_point: u32,
    /// RVA of the first code section
    pub base_of_code: u32,
    /// RVA of the first data section, PE32 only
    pub base_of_data: Option<u32>,
}

/// The optional header, shaped by its own magic.
#[derive(Clone, Copy, Debug)]
pub enum OptionalHeader {
    /// 32-bit image (`0x10B`), carries `base_of_data`
    Pe32(StandardFields),
    /// 64-bit image (`0x20B`)
    Pe64(StandardFields),
}

impl OptionalHeader {
    /// Read the standard fields, selecting the shape from the magic.
    ///
    /// # Errors
    /// [`crate::Error::BadOptionalMagic`] on an unknown magic,
    /// [`crate::Error::TruncatedImage`] if the fields do not fit.
    pub fn read(parser: &mut Parser) -> Result<OptionalHeader> {
        let magic = parser.read_le::<u16>()?;
        let is_pe32 = match magic {
            PE32_MAGIC => true,
            PE32_PLUS_MAGIC => false,
            other => return Err(Error::BadOptionalMagic(other)),
        };

        let standard = StandardFields {
            magic,
            major_linker_version: parser.read_le::<u8>()?,
            minor_linker_version: parser.read_le::<u8>()?,
            size_of_code: parser.read_le::<u32>()?,
            size_of_initialized_data: parser.read_le::<u32>()?,
            size_of_uninitialized_data: parser.read_le::<u32>()?,
            address_of_entry_point: parser.read_le::<u32>()?,
            base_of_code: parser.read_le::<u32>()?,
            base_of_data: if is_pe32 {
                Some(parser.read_le::<u32>()?)
            } else {
                None
            },
        };

        Ok(if is_pe32 {
            OptionalHeader::Pe32(standard)
        } else {
            OptionalHeader::Pe64(standard)
        })
    }

    /// The standard fields of either shape.
    #[must_use]
    pub fn standard(&self) -> &StandardFields {
        match self {
            OptionalHeader::Pe32(standard) | OptionalHeader::Pe64(standard) => standard,
        }
    }

    /// Returns `true` for PE32+ images.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        matches!(self, OptionalHeader::Pe64(_))
    }
}

/// Windows-specific optional header fields.
///
/// Pointer-width fields are widened to `u64` for both shapes.
#[derive(Clone, Copy, Debug)]
pub struct WindowsHeader {
    /// Preferred load address
    pub image_base: u64,
    /// In-memory section alignment
    pub section_alignment: u32,
    /// On-disk section alignment
    pub file_alignment: u32,
    /// Required OS major version
    pub major_operating_system_version: u16,
    /// Required OS minor version
    pub minor_operating_system_version: u16,
    /// Image major version
    pub major_image_version: u16,
    /// Image minor version
    pub minor_image_version: u16,
    /// Subsystem major version
    pub major_subsystem_version: u16,
    /// Subsystem minor version
    pub minor_subsystem_version: u16,
    /// Reserved, must be zero
    pub win32_version_value: u32,
    /// Size of the image in memory, a multiple of `section_alignment`
    pub size_of_image: u32,
    /// Combined size of all headers, a multiple of `file_alignment`
    pub size_of_headers: u32,
    /// Image checksum
    pub check_sum: u32,
    /// Required subsystem
    pub subsystem: u16,
    /// DLL characteristics bits
    pub dll_characteristics: u16,
    /// Stack reservation size
    pub size_of_stack_reserve: u64,
    /// Stack commit size
    pub size_of_stack_commit: u64,
    /// Heap reservation size
    pub size_of_heap_reserve: u64,
    /// Heap commit size
    pub size_of_heap_commit: u64,
    /// Reserved, must be zero
    pub loader_flags: u32,
    /// Number of data directory records that follow
    pub number_of_rva_and_sizes: u32,
}

impl WindowsHeader {
    /// Read the Windows fields; `pe32_plus` selects 8-byte pointer-width fields.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if the fields do not fit.
    pub fn read(parser: &mut Parser, pe32_plus: bool) -> Result<WindowsHeader> {
        Ok(WindowsHeader {
            image_base: Self::read_pointer(parser, pe32_plus)?,
            section_alignment: parser.read_le::<u32>()?,
            file_alignment: parser.read_le::<u32>()?,
            major_operating_system_version: parser.read_le::<u16>()?,
            minor_operating_system_version: parser.read_le::<u16>()?,
            major_image_version: parser.read_le::<u16>()?,
            minor_image_version: parser.read_le::<u16>()?,
            major_subsystem_version: parser.read_le::<u16>()?,
            minor_subsystem_version: parser.read_le::<u16>()?,
            win32_version_value: parser.read_le::<u32>()?,
            size_of_image: parser.read_le::<u32>()?,
            size_of_headers: parser.read_le::<u32>()?,
            check_sum: parser.read_le::<u32>()?,
            subsystem: parser.read_le::<u16>()?,
            dll_characteristics: parser.read_le::<u16>()?,
            size_of_stack_reserve: Self::read_pointer(parser, pe32_plus)?,
            size_of_stack_commit: Self::read_pointer(parser, pe32_plus)?,
            size_of_heap_reserve: Self::read_pointer(parser, pe32_plus)?,
            size_of_heap_commit: Self::read_pointer(parser, pe32_plus)?,
            loader_flags: parser.read_le::<u32>()?,
            number_of_rva_and_sizes: parser.read_le::<u32>()?,
        })
    }

    fn read_pointer(parser: &mut Parser, pe32_plus: bool) -> Result<u64> {
        if pe32_plus {
            parser.read_le::<u64>()
        } else {
            parser.read_le::<u32>().map(u64::from)
        }
    }
}

/// RVA and size of one data directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataDirectory {
    /// RVA of the table, 0 if absent
    pub virtual_address: u32,
    /// Size of the table in bytes
    pub size: u32,
}

impl DataDirectory {
    /// Read one data directory record.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if the record does not fit.
    pub fn read(parser: &mut Parser) -> Result<DataDirectory> {
        Ok(DataDirectory {
            virtual_address: parser.read_le::<u32>()?,
            size: parser.read_le::<u32>()?,
        })
    }

    /// Returns `true` if the directory is absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.virtual_address == 0
    }

    /// Returns `true` if `rva` lies inside the directory.
    #[must_use]
    pub fn contains(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && u64::from(rva) < u64::from(self.virtual_address) + u64::from(self.size)
    }
}

/// One section table record.
#[derive(Clone, Copy, Debug)]
pub struct SectionHeader {
    /// NUL-padded ASCII name
    pub name: [u8; 8],
    /// Size in memory
    pub virtual_size: u32,
    /// RVA of the section
    pub virtual_address: u32,
    /// Size on disk
    pub size_of_raw_data: u32,
    /// File offset of the section data
    pub pointer_to_raw_data: u32,
    /// File offset of COFF relocations, 0 for images
    pub pointer_to_relocations: u32,
    /// File offset of COFF line numbers, deprecated
    pub pointer_to_linenumbers: u32,
    /// Number of COFF relocations
    pub number_of_relocations: u16,
    /// Number of COFF line numbers
    pub number_of_linenumbers: u16,
    /// Section attributes
    pub characteristics: SectionCharacteristics,
}

impl SectionHeader {
    /// Read one section table record.
    ///
    /// # Errors
    /// [`crate::Error::TruncatedImage`] if the record does not fit.
    pub fn read(parser: &mut Parser) -> Result<SectionHeader> {
        let mut name = [0_u8; 8];
        name.copy_from_slice(parser.read_bytes(8)?);

        Ok(SectionHeader {
            name,
            virtual_size: parser.read_le::<u32>()?,
            virtual_address: parser.read_le::<u32>()?,
            size_of_raw_data: parser.read_le::<u32>()?,
            pointer_to_raw_data: parser.read_le::<u32>()?,
            pointer_to_relocations: parser.read_le::<u32>()?,
            pointer_to_linenumbers: parser.read_le::<u32>()?,
            number_of_relocations: parser.read_le::<u16>()?,
            number_of_linenumbers: parser.read_le::<u16>()?,
            characteristics: SectionCharacteristics::from_bits_retain(parser.read_le::<u32>()?),
        })
    }

    /// The name without its NUL padding, lossily decoded.
    #[must_use]
    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end])
    }

    /// Extent of the section in memory; a zero virtual size falls back to the raw size.
    #[must_use]
    pub fn memory_size(&self) -> u32 {
        match self.virtual_size {
            0 => self.size_of_raw_data,
            size => size,
        }
    }

    /// Returns `true` if `rva` lies inside the section in memory.
    #[must_use]
    pub fn contains(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && u64::from(rva) < u64::from(self.virtual_address) + u64::from(self.memory_size())
    }
}

/// All headers of one image.
#[derive(Clone, Debug)]
pub struct Headers {
    /// Legacy header
    pub dos: DosHeader,
    /// COFF file header
    pub file: FileHeader,
    /// Optional header standard fields
    pub optional: OptionalHeader,
    /// Optional header Windows fields
    pub windows: WindowsHeader,
    /// Data directories, at most [`MAX_DATA_DIRECTORIES`]
    pub data_directories: Vec<DataDirectory>,
    /// Section table in file order
    pub sections: Vec<SectionHeader>,
}

impl Headers {
    /// Parse all headers of the image in `data`.
    ///
    /// `max_sections` is an exclusive upper bound on the section count.
    ///
    /// # Errors
    /// - [`crate::Error::BadLegacyMagic`], [`crate::Error::BadModernMagic`],
    ///   [`crate::Error::BadOptionalMagic`] for wrong magic values
    /// - [`crate::Error::SectionCountExceeded`] if the image has `max_sections` or more
    /// - [`crate::Error::TruncatedImage`] if any structure reaches past `data`
    /// - [`crate::Error::Malformed`] if the optional header is too small for its own
    ///   data directories
    pub fn parse(data: &[u8], max_sections: u16) -> Result<Headers> {
        let dos = DosHeader::parse(data)?;

        let mut parser = Parser::new(data);
        parser.seek(dos.e_lfanew as usize)?;

        let file = FileHeader::read(&mut parser)?;
        if file.number_of_sections >= max_sections {
            return Err(Error::SectionCountExceeded {
                count: file.number_of_sections,
                max: max_sections,
            });
        }

        let optional_start = parser.pos();
        let optional = OptionalHeader::read(&mut parser)?;
        let windows = WindowsHeader::read(&mut parser, optional.is_pe32_plus())?;

        let directory_count =
            (windows.number_of_rva_and_sizes as usize).min(MAX_DATA_DIRECTORIES);
        let mut data_directories = Vec::with_capacity(directory_count);
        for _ in 0..directory_count {
            data_directories.push(DataDirectory::read(&mut parser)?);
        }

        let optional_end = optional_start + file.size_of_optional_header as usize;
        if parser.pos() > optional_end {
            return Err(malformed_error!(
                "Optional header size {} is smaller than its {} bytes of fields",
                file.size_of_optional_header,
                parser.pos() - optional_start
            ));
        }

        parser.seek(optional_end)?;
        parser.calc_end_position(file.number_of_sections as usize * SECTION_HEADER_SIZE)?;

        let mut sections = Vec::with_capacity(file.number_of_sections as usize);
        for _ in 0..file.number_of_sections {
            sections.push(SectionHeader::read(&mut parser)?);
        }

        Ok(Headers {
            dos,
            file,
            optional,
            windows,
            data_directories,
            sections,
        })
    }

    /// The data directory of `kind`, if the image carries it and it is non-empty.
    #[must_use]
    pub fn data_directory(&self, kind: DataDirectoryType) -> Option<DataDirectory> {
        self.data_directories
            .get(kind as usize)
            .copied()
            .filter(|directory| !directory.is_empty())
    }
}
