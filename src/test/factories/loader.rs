//! Factory for synthetic loader lists.
//!
//! [`FakeLoader`] owns a [`LoaderData`] block and a set of [`ModuleRecord`]s linked onto
//! all three circular lists in insertion order, so tests can walk real pointer chains
//! without a live process environment block.

use std::ptr;

use crate::loader::{ListEntry, Loader, LoaderData, ModuleRecord, UnicodeString};

struct FakeModule {
    _record: Box<ModuleRecord>,
    _full_name: Vec<u16>,
    _base_name: Vec<u16>,
    _image: Option<Box<[u8]>>,
}

/// Owner of a synthetic loader data block and its module records.
pub struct FakeLoader {
    data: Box<LoaderData>,
    modules: Vec<FakeModule>,
}

fn counted(units: &mut [u16]) -> UnicodeString {
    let bytes = (units.len() * 2) as u16;
    UnicodeString {
        length: bytes,
        maximum_length: bytes,
        buffer: units.as_mut_ptr(),
    }
}

fn empty_link() -> ListEntry {
    ListEntry {
        flink: ptr::null_mut(),
        blink: ptr::null_mut(),
    }
}

/// Append `node` before `sentinel`.
///
/// # Safety
///
/// Both pointers must be valid and `sentinel` must head a well-formed circular list.
unsafe fn insert_tail(sentinel: *mut ListEntry, node: *mut ListEntry) {
    unsafe {
        let last = (*sentinel).blink;
        (*node).flink = sentinel;
        (*node).blink = last;
        (*last).flink = node;
        (*sentinel).blink = node;
    }
}

impl FakeLoader {
    /// A loader with three empty lists.
    pub fn new() -> Self {
        let mut data = Box::new(LoaderData {
            length: std::mem::size_of::<LoaderData>() as u32,
            initialized: 1,
            ss_handle: ptr::null_mut(),
            in_load_order_module_list: empty_link(),
            in_memory_order_module_list: empty_link(),
            in_initialization_order_module_list: empty_link(),
        });

        for sentinel in [
            &raw mut data.in_load_order_module_list,
            &raw mut data.in_memory_order_module_list,
            &raw mut data.in_initialization_order_module_list,
        ] {
            unsafe {
                (*sentinel).flink = sentinel;
                (*sentinel).blink = sentinel;
            }
        }

        FakeLoader {
            data,
            modules: Vec::new(),
        }
    }

    /// Append a module with the given short name, base and size to all three lists.
    pub fn with_module(mut self, name: &str, base: usize, size: u32) -> Self {
        self.push(name, base, size, None);
        self
    }

    /// Append a module whose memory is `image`; base and size point at the buffer.
    pub fn with_image(mut self, name: &str, image: Vec<u8>) -> Self {
        let image = image.into_boxed_slice();
        let base = image.as_ptr() as usize;
        let size = image.len() as u32;
        self.push(name, base, size, Some(image));
        self
    }

    fn push(&mut self, name: &str, base: usize, size: u32, image: Option<Box<[u8]>>) {
        let mut full_name: Vec<u16> = format!(r"C:\Windows\System32\{name}")
            .encode_utf16()
            .collect();
        let mut base_name: Vec<u16> = name.encode_utf16().collect();

        let mut record = Box::new(ModuleRecord {
            in_load_order_links: empty_link(),
            in_memory_order_links: empty_link(),
            in_initialization_order_links: empty_link(),
            dll_base: base as *mut _,
            entry_point: ptr::null_mut(),
            size_of_image: size,
            full_dll_name: counted(&mut full_name),
            base_dll_name: counted(&mut base_name),
        });

        unsafe {
            insert_tail(
                &raw mut self.data.in_load_order_module_list,
                &raw mut record.in_load_order_links,
            );
            insert_tail(
                &raw mut self.data.in_memory_order_module_list,
                &raw mut record.in_memory_order_links,
            );
            insert_tail(
                &raw mut self.data.in_initialization_order_module_list,
                &raw mut record.in_initialization_order_links,
            );
        }

        self.modules.push(FakeModule {
            _record: record,
            _full_name: full_name,
            _base_name: base_name,
            _image: image,
        });
    }

    /// A loader borrowing the synthetic lists.
    pub fn loader(&self) -> Loader<'_> {
        unsafe { Loader::from_raw(&self.data) }
    }

    /// Leak the lists and return a loader valid for the rest of the process.
    pub fn leak(self) -> Loader<'static> {
        let leaked: &'static FakeLoader = Box::leak(Box::new(self));
        leaked.loader()
    }
}
