//! # ntsyscall Prelude
//!
//! The types needed to resolve and invoke kernel services, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ntsyscall operations
pub use crate::Error;

/// The result type used throughout ntsyscall
pub use crate::Result;

/// Bounds and names used during resolution
pub use crate::ResolverConfig;

// ================================================================================================
// Resolution and Invocation
// ================================================================================================

pub use crate::syscall::{
    global, FileSource, ImageSource, LoaderSource, NtStatus, SyscallInvoker, SyscallNumber,
    SyscallTable, SyscallTag, MAX_SYSCALL_ARGS,
};

// ================================================================================================
// Module Access
// ================================================================================================

pub use crate::file::Image;
pub use crate::loader::{InInitializationOrder, InLoadOrder, InMemoryOrder, Loader, Module};
pub use crate::pe::{exports::ExportTarget, PeImage};
pub use crate::stub::{decode_stub, Instruction};
