//! `#[repr(C)]` mirrors of the loader's bookkeeping structures.
//!
//! The layouts match the 64-bit (and, by pointer width, 32-bit) loader: list sentinels
//! live in [`LoaderData`], every loaded module has one [`ModuleRecord`] threaded onto
//! three circular lists through its three [`ListEntry`] link fields. Only the leading,
//! version-stable fields are mirrored; records are never constructed by the crate
//! outside of tests, only observed through shared references.

use std::ffi::c_void;

use widestring::U16Str;

/// A doubly linked list node embedded in a larger record.
#[repr(C)]
#[derive(Debug)]
pub struct ListEntry {
    /// Next node; the sentinel after the last record
    pub flink: *mut ListEntry,
    /// Previous node; the sentinel before the first record
    pub blink: *mut ListEntry,
}

/// A counted UTF-16 string.
#[repr(C)]
#[derive(Debug)]
pub struct UnicodeString {
    /// Length in bytes, without a terminator
    pub length: u16,
    /// Capacity of `buffer` in bytes
    pub maximum_length: u16,
    /// UTF-16 code units, not necessarily NUL-terminated
    pub buffer: *mut u16,
}

impl UnicodeString {
    /// View the string's code units.
    ///
    /// # Safety
    ///
    /// `buffer` must point to at least `length` readable bytes that outlive the returned
    /// view, or be null.
    pub unsafe fn as_u16str<'a>(&self) -> &'a U16Str {
        if self.buffer.is_null() || self.length == 0 {
            return U16Str::from_slice(&[]);
        }

        let units = unsafe { std::slice::from_raw_parts(self.buffer, self.length as usize / 2) };
        U16Str::from_slice(units)
    }
}

/// The loader data block; the sentinels of the three module lists.
#[repr(C)]
#[derive(Debug)]
pub struct LoaderData {
    /// Size of the structure
    pub length: u32,
    /// Non-zero once the loader finished initializing
    pub initialized: u8,
    /// Reserved
    pub ss_handle: *mut c_void,
    /// Sentinel of the load-order list
    pub in_load_order_module_list: ListEntry,
    /// Sentinel of the memory-order list
    pub in_memory_order_module_list: ListEntry,
    /// Sentinel of the initialization-order list
    pub in_initialization_order_module_list: ListEntry,
}

/// One loaded module.
#[repr(C)]
#[derive(Debug)]
pub struct ModuleRecord {
    /// Link in the load-order list
    pub in_load_order_links: ListEntry,
    /// Link in the memory-order list
    pub in_memory_order_links: ListEntry,
    /// Link in the initialization-order list
    pub in_initialization_order_links: ListEntry,
    /// Load address
    pub dll_base: *mut c_void,
    /// Entry point, null if there is none
    pub entry_point: *mut c_void,
    /// Size of the mapped image
    pub size_of_image: u32,
    /// Full path
    pub full_dll_name: UnicodeString,
    /// File name
    pub base_dll_name: UnicodeString,
}
