// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'loader' dereferences the OS loader lists
// - 'file/mapped.rs' and 'file/physical.rs' view foreign memory
// - 'syscall/arch' contains the inline `syscall` and PEB access

//! # ntsyscall
//!
//! Resolve and invoke kernel services directly, without linking against or calling through
//! the platform's kernel-interface module (`ntdll.dll`).
//!
//! Given the name of a kernel service, `ntsyscall` finds the number the running kernel
//! expects for it by reading the module the OS loader already mapped: it walks the loader
//! lists to locate the module, parses its PE/COFF headers and export directory, and decodes
//! the small forwarding stub behind the export. The number is cached per service and the
//! call is made with the `syscall` instruction.
//!
//! ## Features
//!
//! - **Loader list traversal** - Find modules through the three OS loader lists, no API calls
//! - **PE/COFF parsing** - Bounds-checked headers, sections, data directories and exports
//! - **Stub decoding** - A closed, fail-closed decoder for the x86-64 forwarding stub shape
//! - **Lazy, thread-safe cache** - One resolution per service, lock-free reads afterwards
//! - **Offline resolution** - Resolve numbers from an on-disk copy of the module
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ntsyscall::prelude::*;
//!
//! let invoker = ntsyscall::syscall::global();
//! let number = invoker.table().number_for(SyscallTag::Close)?;
//! println!("NtClose is service {}", number);
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! Resolving against a file instead of the live process works on every platform:
//!
//! ```rust,no_run
//! use ntsyscall::{syscall::{FileSource, SyscallTable, SyscallTag}, ResolverConfig};
//!
//! let table = SyscallTable::new(
//!     FileSource("ntdll.dll".into()),
//!     ResolverConfig::default(),
//! );
//! for (name, number) in table.inventory()? {
//!     println!("{} {}", number, name);
//! }
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`loader`] - Loader list records and traversal
//! - [`file`] - Image views and binary readers
//! - [`pe`] - PE/COFF headers and exports
//! - [`stub`] - Stub instruction decoding
//! - [`syscall`] - Resolution cache and invocation
//!
//! ## Platform Support
//!
//! Parsing, decoding and file-based resolution are portable. Loader traversal of the running
//! process and the transition itself exist on x86-64 Windows only; elsewhere they return
//! [`Error::NotSupported`].

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

mod config;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust,no_run
/// use ntsyscall::prelude::*;
///
/// let table = SyscallTable::from_loader()?;
/// let number = table.number_for(SyscallTag::ReadFile)?;
/// # Ok::<(), ntsyscall::Error>(())
/// ```
pub mod prelude;

/// Image access and binary reading primitives
///
/// An [`file::Image`] is a module in its virtual layout, backed by an in-process mapping,
/// an owned buffer or a memory-mapped file. [`file::parser::Parser`] and [`file::io`] read
/// little-endian structures out of it.
pub mod file;

/// Process loader lists
///
/// `#[repr(C)]` mirrors of the loader records and typed traversal over the load-order,
/// memory-order and initialization-order lists.
pub mod loader;

/// PE/COFF parsing
///
/// Header parsing with magic, section-count and bounds gates, RVA access and export
/// directory resolution.
///
/// # Examples
///
/// ```rust,no_run
/// use ntsyscall::{file::Image, pe::PeImage, ResolverConfig};
///
/// let image = Image::from_file(std::path::Path::new("ntdll.dll"))?;
/// let pe = PeImage::parse(image, &ResolverConfig::default())?;
/// if let Some(exports) = pe.exports()? {
///     println!("{} exports {} names", exports.module_name()?, exports.len());
/// }
/// # Ok::<(), ntsyscall::Error>(())
/// ```
pub mod pe;

/// Syscall stub decoding
pub mod stub;

/// Syscall number cache and invocation
pub mod syscall;

/// `ntsyscall` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ntsyscall` Error type
///
/// The error type for all operations in this crate, from header parsing to invocation.
pub use error::Error;

/// Resolver configuration
pub use config::ResolverConfig;

/// Cursor-based little-endian reader
pub use file::parser::Parser;

/// Parsed module
pub use pe::PeImage;

/// Resolution types
pub use syscall::{NtStatus, SyscallNumber, SyscallTable, SyscallTag};
