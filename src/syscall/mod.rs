//! Syscall number resolution, caching and invocation.
//!
//! This is the top of the pipeline. A [`crate::syscall::SyscallTable`] turns a
//! [`crate::syscall::SyscallTag`] into the number the running kernel expects, resolving
//! each tag at most once, and a [`crate::syscall::SyscallInvoker`] enters the kernel
//! with that number.
//!
//! # Resolution
//!
//! On the first request for a tag the table:
//!
//! 1. checks that the export name carries the kernel prefix (`Nt`),
//! 2. locates the kernel-interface module through its [`crate::syscall::ImageSource`]
//!    and parses it (once per table),
//! 3. resolves the tag's export to the stub's address,
//! 4. decodes the stub with [`crate::stub::StubDecoder`],
//! 5. publishes the number in the tag's slot.
//!
//! Every later request is a single atomic load.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ntsyscall::syscall::{self, SyscallTag};
//!
//! let invoker = syscall::global();
//! let number = invoker.table().number_for(SyscallTag::YieldExecution)?;
//! println!("NtYieldExecution = {}", number);
//!
//! let status = unsafe { invoker.invoke(SyscallTag::YieldExecution, &[])? };
//! assert!(status.is_success());
//! # Ok::<(), ntsyscall::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`crate::syscall::SyscallTable`] and [`crate::syscall::SyscallInvoker`] are [`Send`]
//! and [`Sync`]. Concurrent first use of the same tag runs the resolution once; all
//! callers observe the same number.

pub(crate) mod arch;

mod invoke;
mod table;
mod tag;

use std::{fmt, sync::OnceLock};

pub use invoke::{NativeTransition, SyscallInvoker, Transition};
pub use table::{FileSource, ImageSource, LoaderSource, SyscallTable};
pub use tag::SyscallTag;

use crate::{Error, ResolverConfig};

/// Maximum number of arguments forwarded to a kernel service.
pub const MAX_SYSCALL_ARGS: usize = 16;

/// The kernel's identifier for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyscallNumber(u32);

impl SyscallNumber {
    /// Wrap a raw number.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        SyscallNumber(value)
    }

    /// The raw number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SyscallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Status code returned by a kernel service.
///
/// The two high bits carry the severity: success (0), informational (1), warning (2),
/// error (3). Success and informational codes are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(i32);

impl NtStatus {
    /// `STATUS_SUCCESS`
    pub const SUCCESS: NtStatus = NtStatus(0);

    /// Wrap a raw status.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        NtStatus(value)
    }

    /// The raw status.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Severity bits, 0 through 3.
    #[must_use]
    pub const fn severity(self) -> u8 {
        ((self.0 as u32) >> 30) as u8
    }

    /// Success or informational.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Warning severity.
    #[must_use]
    pub const fn is_warning(self) -> bool {
        self.severity() == 2
    }

    /// Error severity.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.severity() == 3
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)
    }
}

/// The process-wide invoker over the live loader lists and the default configuration.
///
/// The kernel-interface module is located and parsed on first use. If it cannot be found
/// the error is logged and the process aborts, since no service could ever be called.
/// Other failures, including an unsupported platform, are logged and surface again from
/// each [`SyscallTable::number_for`] call.
pub fn global() -> &'static SyscallInvoker {
    static GLOBAL: OnceLock<SyscallInvoker> = OnceLock::new();

    GLOBAL.get_or_init(|| {
        let table = SyscallTable::new(LoaderSource, ResolverConfig::default());

        match table.module() {
            Ok(_) => {}
            Err(error) if error.is_fatal() => {
                log::error!("Cannot resolve any syscall: {}", error);
                std::process::abort();
            }
            Err(Error::NotSupported) => {
                log::warn!("Direct syscalls are not supported on this platform");
            }
            Err(error) => log::warn!("Kernel-interface module unusable: {}", error),
        }

        SyscallInvoker::new(table)
    })
}
