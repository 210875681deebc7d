//! Factory for synthetic PE images.
//!
//! [`PeBuilder`] lays out a two-section module the way the platform linker does for the
//! kernel-interface module: stubs in `.text` at RVA 0x1000, the export directory in
//! `.rdata` after it. The same builder produces the image in virtual layout
//! ([`PeBuilder::build`]) and in file layout ([`PeBuilder::build_file_layout`]).

use crate::{
    file::io::write_le_at,
    pe::headers::{FILE_HEADER_SIZE, MAX_DATA_DIRECTORIES, SECTION_HEADER_SIZE},
};

/// File offset of the PE signature in every built image.
pub const PE_OFFSET: usize = 0x40;
/// File offset of the optional header in every built image.
pub const OPTIONAL_HEADER_OFFSET: usize = PE_OFFSET + FILE_HEADER_SIZE;
/// RVA of the `.text` section.
pub const TEXT_RVA: u32 = 0x1000;

const SECTION_ALIGNMENT: u32 = 0x1000;
const STUB_ALIGNMENT: usize = 0x20;
const SECTION_COUNT: usize = 2;

/// The stub the platform emits for every kernel service on x86-64.
///
/// `mov r10, rcx; mov eax, number; test byte [0x7FFE0308], 1; jne +3; syscall; ret;
/// int 0x2E; ret`
pub fn nt_stub(number: u32) -> Vec<u8> {
    let mut stub = vec![0x4C, 0x8B, 0xD1, 0xB8];
    stub.extend_from_slice(&number.to_le_bytes());
    stub.extend_from_slice(&[0xF6, 0x04, 0x25, 0x08, 0x03, 0xFE, 0x7F, 0x01]);
    stub.extend_from_slice(&[0x75, 0x03, 0x0F, 0x05, 0xC3, 0xCD, 0x2E, 0xC3]);
    stub
}

#[derive(Clone)]
enum ExportBody {
    Code(Vec<u8>),
    At(u32),
    Forwarder(String),
}

/// Builder for synthetic PE32 and PE32+ modules.
#[derive(Clone)]
pub struct PeBuilder {
    pe32_plus: bool,
    file_alignment: u32,
    exports: Vec<(String, ExportBody)>,
    reversed_ordinals: bool,
    ordinal_base: u32,
    has_export_directory: bool,
}

struct Layout {
    optional_header_size: usize,
    size_of_headers: u32,
    text: Vec<u8>,
    rdata: Vec<u8>,
    rdata_rva: u32,
    export_directory: (u32, u32),
    size_of_image: u32,
}

fn align_up(value: usize, alignment: u32) -> usize {
    let alignment = alignment as usize;
    value.div_ceil(alignment) * alignment
}

impl PeBuilder {
    /// A 64-bit (PE32+, AMD64) module.
    pub fn pe64() -> Self {
        PeBuilder {
            pe32_plus: true,
            file_alignment: 0x200,
            exports: Vec::new(),
            reversed_ordinals: false,
            ordinal_base: 1,
            has_export_directory: true,
        }
    }

    /// A 32-bit (PE32, I386) module.
    pub fn pe32() -> Self {
        PeBuilder {
            pe32_plus: false,
            ..Self::pe64()
        }
    }

    /// Export `name` as a standard x86-64 stub loading `number`.
    pub fn with_stub(self, name: &str, number: u32) -> Self {
        self.with_export(name, &nt_stub(number))
    }

    /// Export `name` as arbitrary code.
    pub fn with_export(mut self, name: &str, code: &[u8]) -> Self {
        self.exports
            .push((name.to_string(), ExportBody::Code(code.to_vec())));
        self
    }

    /// Export `name` at a fixed RVA inside `.text` (filled with `int3`).
    pub fn with_export_at(mut self, name: &str, rva: u32) -> Self {
        self.exports.push((name.to_string(), ExportBody::At(rva)));
        self
    }

    /// Export `name` as a forwarder to `target` (`MODULE.Symbol`).
    pub fn with_forwarder(mut self, name: &str, target: &str) -> Self {
        self.exports
            .push((name.to_string(), ExportBody::Forwarder(target.to_string())));
        self
    }

    /// Store the address table in reverse name order, so ordinal `i` of name `i` is
    /// `n - 1 - i`.
    pub fn with_reversed_ordinals(mut self) -> Self {
        self.reversed_ordinals = true;
        self
    }

    /// Set the ordinal base of the export directory.
    pub fn with_ordinal_base(mut self, base: u32) -> Self {
        self.ordinal_base = base;
        self
    }

    /// Set the on-disk alignment; `0x1000` makes file and virtual layout identical.
    pub fn with_file_alignment(mut self, alignment: u32) -> Self {
        self.file_alignment = alignment;
        self
    }

    /// Leave the export data directory empty.
    pub fn without_exports(mut self) -> Self {
        self.has_export_directory = false;
        self
    }

    /// The module in virtual layout, `size_of_image` bytes.
    pub fn build(&self) -> Vec<u8> {
        let layout = self.layout();
        let mut image = vec![0_u8; layout.size_of_image as usize];

        self.write_headers(&mut image, &layout);
        let text_start = TEXT_RVA as usize;
        image[text_start..text_start + layout.text.len()].copy_from_slice(&layout.text);
        let rdata_start = layout.rdata_rva as usize;
        image[rdata_start..rdata_start + layout.rdata.len()].copy_from_slice(&layout.rdata);

        image
    }

    /// The module in file layout, sections at their raw data pointers.
    pub fn build_file_layout(&self) -> Vec<u8> {
        let layout = self.layout();
        let (text_pointer, _, rdata_pointer, rdata_raw_size) = self.raw_placement(&layout);
        let mut file = vec![0_u8; (rdata_pointer + rdata_raw_size) as usize];

        self.write_headers(&mut file, &layout);
        let text_start = text_pointer as usize;
        file[text_start..text_start + layout.text.len()].copy_from_slice(&layout.text);
        let rdata_start = rdata_pointer as usize;
        file[rdata_start..rdata_start + layout.rdata.len()].copy_from_slice(&layout.rdata);

        file
    }

    fn sorted_exports(&self) -> Vec<(String, ExportBody)> {
        let mut exports = self.exports.clone();
        exports.sort_by(|a, b| a.0.cmp(&b.0));
        exports
    }

    fn layout(&self) -> Layout {
        let exports = self.sorted_exports();

        // .text: stubs at 32-byte boundaries, int3 padding
        let mut text = Vec::new();
        let mut code_rvas = Vec::with_capacity(exports.len());
        let mut fixed_end = 0_usize;
        for (_, body) in &exports {
            match body {
                ExportBody::Code(code) => {
                    text.resize(align_up(text.len(), STUB_ALIGNMENT as u32), 0xCC);
                    code_rvas.push(Some(TEXT_RVA + text.len() as u32));
                    text.extend_from_slice(code);
                }
                ExportBody::At(rva) => {
                    fixed_end = fixed_end.max((*rva - TEXT_RVA) as usize + 0x10);
                    code_rvas.push(Some(*rva));
                }
                ExportBody::Forwarder(_) => code_rvas.push(None),
            }
        }
        if text.len() < fixed_end {
            text.resize(fixed_end, 0xCC);
        }
        if text.is_empty() {
            text.push(0xC3);
        }

        let rdata_rva = TEXT_RVA + align_up(text.len(), SECTION_ALIGNMENT) as u32;

        // .rdata: directory, address table, name pointers, ordinals, strings
        let count = exports.len();
        let functions_offset = 40;
        let names_offset = functions_offset + 4 * count;
        let ordinals_offset = names_offset + 4 * count;
        let mut strings = ordinals_offset + 2 * count;

        let mut rdata = vec![0_u8; strings];
        let module_name_rva = rdata_rva + strings as u32;
        rdata.extend_from_slice(b"ntdll.dll\0");
        strings = rdata.len();

        let mut name_rvas = Vec::with_capacity(count);
        for (name, _) in &exports {
            name_rvas.push(rdata_rva + strings as u32);
            rdata.extend_from_slice(name.as_bytes());
            rdata.push(0);
            strings = rdata.len();
        }

        let mut function_rvas = Vec::with_capacity(count);
        for ((_, body), code_rva) in exports.iter().zip(&code_rvas) {
            match (body, code_rva) {
                (ExportBody::Forwarder(target), _) => {
                    function_rvas.push(rdata_rva + strings as u32);
                    rdata.extend_from_slice(target.as_bytes());
                    rdata.push(0);
                    strings = rdata.len();
                }
                (_, Some(rva)) => function_rvas.push(*rva),
                (_, None) => function_rvas.push(0),
            }
        }

        let mut offset = 0;
        write_le_at(&mut rdata, &mut offset, 0_u32).unwrap();
        write_le_at(&mut rdata, &mut offset, 0x5F3E_1A2B_u32).unwrap();
        write_le_at(&mut rdata, &mut offset, 0_u16).unwrap();
        write_le_at(&mut rdata, &mut offset, 0_u16).unwrap();
        for value in [
            module_name_rva,
            self.ordinal_base,
            count as u32,
            count as u32,
            rdata_rva + functions_offset as u32,
            rdata_rva + names_offset as u32,
            rdata_rva + ordinals_offset as u32,
        ] {
            write_le_at(&mut rdata, &mut offset, value).unwrap();
        }

        for (index, function_rva) in function_rvas.iter().enumerate() {
            let slot = if self.reversed_ordinals {
                count - 1 - index
            } else {
                index
            };

            let mut offset = functions_offset + 4 * slot;
            write_le_at(&mut rdata, &mut offset, *function_rva).unwrap();
            let mut offset = names_offset + 4 * index;
            write_le_at(&mut rdata, &mut offset, name_rvas[index]).unwrap();
            let mut offset = ordinals_offset + 2 * index;
            write_le_at(&mut rdata, &mut offset, slot as u16).unwrap();
        }

        let export_directory = if self.has_export_directory {
            (rdata_rva, rdata.len() as u32)
        } else {
            (0, 0)
        };

        let optional_header_size = if self.pe32_plus { 0xF0 } else { 0xE0 };
        let headers_len = OPTIONAL_HEADER_OFFSET
            + optional_header_size
            + SECTION_COUNT * SECTION_HEADER_SIZE;

        Layout {
            optional_header_size,
            size_of_headers: align_up(headers_len, self.file_alignment) as u32,
            size_of_image: rdata_rva + align_up(rdata.len(), SECTION_ALIGNMENT) as u32,
            text,
            rdata,
            rdata_rva,
            export_directory,
        }
    }

    fn raw_placement(&self, layout: &Layout) -> (u32, u32, u32, u32) {
        let text_pointer = layout.size_of_headers;
        let text_raw_size = align_up(layout.text.len(), self.file_alignment) as u32;
        let rdata_pointer = text_pointer + text_raw_size;
        let rdata_raw_size = align_up(layout.rdata.len(), self.file_alignment) as u32;
        (text_pointer, text_raw_size, rdata_pointer, rdata_raw_size)
    }

    fn write_headers(&self, data: &mut [u8], layout: &Layout) {
        let (text_pointer, text_raw_size, rdata_pointer, rdata_raw_size) =
            self.raw_placement(layout);

        let mut offset = 0;
        write_le_at(data, &mut offset, 0x5A4D_u16).unwrap();
        let mut offset = 0x3C;
        write_le_at(data, &mut offset, PE_OFFSET as u32).unwrap();

        // file header
        let mut offset = PE_OFFSET;
        write_le_at(data, &mut offset, 0x0000_4550_u32).unwrap();
        let (machine, characteristics) = if self.pe32_plus {
            (0x8664_u16, 0x2022_u16)
        } else {
            (0x014C_u16, 0x2102_u16)
        };
        write_le_at(data, &mut offset, machine).unwrap();
        write_le_at(data, &mut offset, SECTION_COUNT as u16).unwrap();
        write_le_at(data, &mut offset, 0x5F3E_1A2B_u32).unwrap();
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, layout.optional_header_size as u16).unwrap();
        write_le_at(data, &mut offset, characteristics).unwrap();

        // optional header, standard fields
        let magic = if self.pe32_plus { 0x20B_u16 } else { 0x10B_u16 };
        write_le_at(data, &mut offset, magic).unwrap();
        write_le_at(data, &mut offset, 14_u8).unwrap();
        write_le_at(data, &mut offset, 30_u8).unwrap();
        write_le_at(data, &mut offset, text_raw_size).unwrap();
        write_le_at(data, &mut offset, rdata_raw_size).unwrap();
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, TEXT_RVA).unwrap();
        if !self.pe32_plus {
            write_le_at(data, &mut offset, layout.rdata_rva).unwrap();
        }

        // optional header, Windows fields
        let write_pointer = |data: &mut [u8], offset: &mut usize, value: u64| {
            if self.pe32_plus {
                write_le_at(data, offset, value).unwrap();
            } else {
                write_le_at(data, offset, value as u32).unwrap();
            }
        };
        let image_base = if self.pe32_plus {
            0x1_8000_0000_u64
        } else {
            0x4B28_0000_u64
        };
        write_pointer(data, &mut offset, image_base);
        write_le_at(data, &mut offset, SECTION_ALIGNMENT).unwrap();
        write_le_at(data, &mut offset, self.file_alignment).unwrap();
        for version in [10_u16, 0, 10, 0, 10, 0] {
            write_le_at(data, &mut offset, version).unwrap();
        }
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, layout.size_of_image).unwrap();
        write_le_at(data, &mut offset, layout.size_of_headers).unwrap();
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, 3_u16).unwrap();
        write_le_at(data, &mut offset, 0x4160_u16).unwrap();
        write_pointer(data, &mut offset, 0x4_0000);
        write_pointer(data, &mut offset, 0x1000);
        write_pointer(data, &mut offset, 0x10_0000);
        write_pointer(data, &mut offset, 0x1000);
        write_le_at(data, &mut offset, 0_u32).unwrap();
        write_le_at(data, &mut offset, MAX_DATA_DIRECTORIES as u32).unwrap();

        // data directories, export first
        write_le_at(data, &mut offset, layout.export_directory.0).unwrap();
        write_le_at(data, &mut offset, layout.export_directory.1).unwrap();
        for _ in 1..MAX_DATA_DIRECTORIES {
            write_le_at(data, &mut offset, 0_u64).unwrap();
        }
        debug_assert_eq!(offset, OPTIONAL_HEADER_OFFSET + layout.optional_header_size);

        // section table
        let sections = [
            (
                *b".text\0\0\0",
                layout.text.len() as u32,
                TEXT_RVA,
                text_raw_size,
                text_pointer,
                0x6000_0020_u32,
            ),
            (
                *b".rdata\0\0",
                layout.rdata.len() as u32,
                layout.rdata_rva,
                rdata_raw_size,
                rdata_pointer,
                0x4000_0040_u32,
            ),
        ];
        for (name, virtual_size, virtual_address, raw_size, raw_pointer, flags) in sections {
            data[offset..offset + 8].copy_from_slice(&name);
            offset += 8;
            for value in [virtual_size, virtual_address, raw_size, raw_pointer, 0, 0] {
                write_le_at(data, &mut offset, value).unwrap();
            }
            write_le_at(data, &mut offset, 0_u16).unwrap();
            write_le_at(data, &mut offset, 0_u16).unwrap();
            write_le_at(data, &mut offset, flags).unwrap();
        }
    }
}
