//! Per-architecture primitives: the privileged transition and the process environment
//! block read. All inline machine code of the crate lives below this module.

#[cfg(all(windows, target_arch = "x86_64"))]
mod x86_64;

#[cfg(all(windows, target_arch = "x86_64"))]
pub(crate) use x86_64::{loader_data, transition};

#[cfg(not(all(windows, target_arch = "x86_64")))]
mod unsupported {
    use crate::{
        loader::LoaderData,
        syscall::{NtStatus, SyscallNumber, MAX_SYSCALL_ARGS},
        Error, Result,
    };

    pub(crate) fn loader_data() -> Result<*const LoaderData> {
        Err(Error::NotSupported)
    }

    pub(crate) unsafe fn transition(
        _number: SyscallNumber,
        _args: &[usize; MAX_SYSCALL_ARGS],
    ) -> Result<NtStatus> {
        Err(Error::NotSupported)
    }
}

#[cfg(not(all(windows, target_arch = "x86_64")))]
pub(crate) use unsupported::{loader_data, transition};
