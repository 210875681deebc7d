//! Discovery of loaded modules through the process loader lists.
//!
//! The OS loader keeps every module of the process on three circular, intrusive lists
//! (load order, memory order, initialization order). Each list has a sentinel node in
//! the loader data block and threads through a dedicated link field of each
//! [`crate::loader::ModuleRecord`]. Walking a list needs no API call, which is what lets
//! the kernel-interface module be found before anything is imported.
//!
//! # Key Components
//!
//! - [`crate::loader::Loader`] - Entry point, wraps the loader data block
//! - [`crate::loader::Module`] - Borrowed view of one module record
//! - [`crate::loader::ModuleIter`] - Finite, restartable traversal of one list
//! - [`crate::loader::LoaderList`] - Sealed marker trait selecting the list to walk
//!
//! # Examples
//!
//! ```rust,no_run
//! use ntsyscall::loader::{InLoadOrder, Loader};
//!
//! let loader = Loader::current()?;
//! for module in loader.iter::<InLoadOrder>() {
//!     println!("{:#x} {}", module.base(), module.base_name().display());
//! }
//!
//! let ntdll = loader.find_module("ntdll", true).expect("always loaded");
//! assert!(ntdll.contains_address(ntdll.base()));
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! Traversal assumes no module is loaded or unloaded concurrently. The lists are only
//! read; no write is ever made through a discovered pointer.

mod records;

use std::{marker::PhantomData, mem::offset_of};

use widestring::U16Str;

use crate::{file::Image, Result};

pub use records::{ListEntry, LoaderData, ModuleRecord, UnicodeString};

mod sealed {
    pub trait Sealed {}
}

/// Selects one of the three loader lists.
///
/// Implemented only by [`InLoadOrder`], [`InMemoryOrder`] and [`InInitializationOrder`].
pub trait LoaderList: sealed::Sealed {
    /// Offset of this list's link field inside a [`ModuleRecord`]
    const LINK_OFFSET: usize;

    /// This list's sentinel inside the loader data block.
    fn sentinel(data: &LoaderData) -> &ListEntry;
}

/// Modules in the order they were loaded; the executable comes first.
pub struct InLoadOrder;
/// Modules in the order of their placement in memory.
pub struct InMemoryOrder;
/// Modules in the order their initializers ran.
pub struct InInitializationOrder;

impl sealed::Sealed for InLoadOrder {}
impl sealed::Sealed for InMemoryOrder {}
impl sealed::Sealed for InInitializationOrder {}

impl LoaderList for InLoadOrder {
    const LINK_OFFSET: usize = offset_of!(ModuleRecord, in_load_order_links);

    fn sentinel(data: &LoaderData) -> &ListEntry {
        &data.in_load_order_module_list
    }
}

impl LoaderList for InMemoryOrder {
    const LINK_OFFSET: usize = offset_of!(ModuleRecord, in_memory_order_links);

    fn sentinel(data: &LoaderData) -> &ListEntry {
        &data.in_memory_order_module_list
    }
}

impl LoaderList for InInitializationOrder {
    const LINK_OFFSET: usize = offset_of!(ModuleRecord, in_initialization_order_links);

    fn sentinel(data: &LoaderData) -> &ListEntry {
        &data.in_initialization_order_module_list
    }
}

/// Recover the record that embeds `link` as its `L` link field.
///
/// For [`InLoadOrder`] the link is the record's first field and this is a plain cast. The
/// OS links of the other two lists point at the embedded field itself.
///
/// # Safety
///
/// `link` must be a non-sentinel node of list `L`.
unsafe fn record_from_link<'a, L: LoaderList>(link: *const ListEntry) -> &'a ModuleRecord {
    unsafe { &*link.byte_sub(L::LINK_OFFSET).cast::<ModuleRecord>() }
}

/// Follow a link, asserting the list is not broken.
fn follow(link: *mut ListEntry) -> *const ListEntry {
    assert!(!link.is_null(), "malformed loader list: null link");
    link.cast_const()
}

/// The loader data block of a process.
#[derive(Clone, Copy)]
pub struct Loader<'a> {
    data: &'a LoaderData,
}

// SAFETY: a `Loader` only reads the lists, and `from_raw` requires them to stay unmodified
// while borrowed.
unsafe impl Send for Loader<'_> {}
unsafe impl Sync for Loader<'_> {}

impl Loader<'static> {
    /// The loader of the running process, located through its process environment
    /// block.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on targets other than x86-64 Windows.
    pub fn current() -> Result<Loader<'static>> {
        let data = crate::syscall::arch::loader_data()?;

        // The loader data block lives for the whole process.
        Ok(unsafe { Loader::from_raw(&*data) })
    }
}

impl<'a> Loader<'a> {
    /// Wrap an arbitrary loader data block.
    ///
    /// # Safety
    ///
    /// All three lists of `data` must be well-formed circular lists of [`ModuleRecord`]s
    /// (or empty, with the sentinel pointing at itself) that stay valid and unmodified
    /// for `'a`, and every record's name buffers must be valid for `'a`.
    pub unsafe fn from_raw(data: &'a LoaderData) -> Loader<'a> {
        Loader { data }
    }

    /// Walk list `L`, starting after its sentinel.
    ///
    /// Each call starts a fresh traversal.
    #[must_use]
    pub fn iter<L: LoaderList>(&self) -> ModuleIter<'a, L> {
        let sentinel = L::sentinel(self.data);
        ModuleIter {
            sentinel,
            current: follow(sentinel.flink),
            _marker: PhantomData,
        }
    }

    /// Find a module by its short name.
    ///
    /// Names compare like the platform loader compares them: ASCII case-insensitively over
    /// UTF-16 code units. With `ignore_extension` the final `.ext` of the candidate, and of
    /// `name` if needed, is dropped before comparing, so `"ntdll"` and `"ntdll.dll"` both
    /// match `ntdll.dll`.
    #[must_use]
    pub fn find_module(&self, name: &str, ignore_extension: bool) -> Option<Module<'a>> {
        let found = self
            .iter::<InLoadOrder>()
            .find(|module| module.matches_name(name, ignore_extension));

        match &found {
            Some(module) => log::debug!("Found {} at {:#x}", name, module.base()),
            None => log::debug!("{} is not loaded", name),
        }
        found
    }

    /// The executable's record: the last node of the memory-order list.
    ///
    /// # Panics
    /// Panics if the memory-order list is empty or broken.
    #[must_use]
    pub fn executable_module(&self) -> Module<'a> {
        let sentinel = InMemoryOrder::sentinel(self.data);
        let last = follow(sentinel.blink);
        assert!(
            !std::ptr::eq(last, sentinel),
            "malformed loader list: memory-order list is empty"
        );

        Module {
            record: unsafe { record_from_link::<InMemoryOrder>(last) },
        }
    }
}

/// Iterator over the records of one loader list.
pub struct ModuleIter<'a, L: LoaderList> {
    sentinel: *const ListEntry,
    current: *const ListEntry,
    _marker: PhantomData<(&'a LoaderData, L)>,
}

impl<'a, L: LoaderList> Iterator for ModuleIter<'a, L> {
    type Item = Module<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if std::ptr::eq(self.current, self.sentinel) {
            return None;
        }

        let record = unsafe { record_from_link::<L>(self.current) };
        self.current = follow(unsafe { (*self.current).flink });

        Some(Module { record })
    }
}

/// A borrowed view of one loaded module.
#[derive(Clone, Copy)]
pub struct Module<'a> {
    record: &'a ModuleRecord,
}

impl<'a> Module<'a> {
    /// The underlying loader record.
    #[must_use]
    pub fn record(&self) -> &'a ModuleRecord {
        self.record
    }

    /// Load address.
    #[must_use]
    pub fn base(&self) -> usize {
        self.record.dll_base as usize
    }

    /// Size of the mapped image.
    #[must_use]
    pub fn size(&self) -> usize {
        self.record.size_of_image as usize
    }

    /// Entry point, 0 if there is none.
    #[must_use]
    pub fn entry_point(&self) -> usize {
        self.record.entry_point as usize
    }

    /// Full path of the module.
    #[must_use]
    pub fn full_name(&self) -> &'a U16Str {
        unsafe { self.record.full_dll_name.as_u16str() }
    }

    /// File name of the module.
    #[must_use]
    pub fn base_name(&self) -> &'a U16Str {
        unsafe { self.record.base_dll_name.as_u16str() }
    }

    /// Returns `true` if `address` lies inside the mapped image.
    #[must_use]
    pub fn contains_address(&self, address: usize) -> bool {
        let base = self.base();
        address >= base && address - base < self.size()
    }

    /// Compare the short name against `name`, see [`Loader::find_module`].
    #[must_use]
    pub fn matches_name(&self, name: &str, ignore_extension: bool) -> bool {
        let candidate = self.base_name().as_slice();
        let wanted: Vec<u16> = name.encode_utf16().collect();

        if eq_fold_ascii(candidate, &wanted) {
            return true;
        }
        if !ignore_extension {
            return false;
        }

        let candidate = strip_extension(candidate);
        eq_fold_ascii(candidate, &wanted) || eq_fold_ascii(candidate, strip_extension(&wanted))
    }

    /// A view over the module's mapped image.
    ///
    /// # Safety
    ///
    /// The module must stay loaded for the rest of the process lifetime.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if the record has a null base or a zero size.
    pub unsafe fn image(&self) -> Result<Image> {
        unsafe { Image::from_raw_parts(self.record.dll_base.cast_const().cast(), self.size()) }
    }
}

fn fold_ascii(unit: u16) -> u16 {
    if (u16::from(b'A')..=u16::from(b'Z')).contains(&unit) {
        unit + 0x20
    } else {
        unit
    }
}

fn eq_fold_ascii(a: &[u16], b: &[u16]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| fold_ascii(*x) == fold_ascii(*y))
}

/// Drop the final `.ext`, if any.
fn strip_extension(name: &[u16]) -> &[u16] {
    match name.iter().rposition(|unit| *unit == u16::from(b'.')) {
        Some(dot) => &name[..dot],
        None => name,
    }
}
