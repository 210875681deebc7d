use strum::{EnumCount, EnumIter, IntoStaticStr};

/// Kernel services the runtime calls, each bound to the export of its stub.
///
/// The discriminant indexes the slot array of [`crate::syscall::SyscallTable`].
///
/// # Examples
///
/// ```rust
/// use ntsyscall::syscall::SyscallTag;
///
/// assert_eq!(SyscallTag::ReadFile.symbol(), "NtReadFile");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
#[non_exhaustive]
pub enum SyscallTag {
    // Objects
    /// `NtClose`
    #[strum(serialize = "NtClose")]
    Close,
    /// `NtDuplicateObject`
    #[strum(serialize = "NtDuplicateObject")]
    DuplicateObject,

    // Files
    /// `NtCreateFile`
    #[strum(serialize = "NtCreateFile")]
    CreateFile,
    /// `NtOpenFile`
    #[strum(serialize = "NtOpenFile")]
    OpenFile,
    /// `NtReadFile`
    #[strum(serialize = "NtReadFile")]
    ReadFile,
    /// `NtWriteFile`
    #[strum(serialize = "NtWriteFile")]
    WriteFile,
    /// `NtQueryInformationFile`
    #[strum(serialize = "NtQueryInformationFile")]
    QueryInformationFile,
    /// `NtSetInformationFile`
    #[strum(serialize = "NtSetInformationFile")]
    SetInformationFile,
    /// `NtQueryDirectoryFile`
    #[strum(serialize = "NtQueryDirectoryFile")]
    QueryDirectoryFile,
    /// `NtQueryAttributesFile`
    #[strum(serialize = "NtQueryAttributesFile")]
    QueryAttributesFile,
    /// `NtDeleteFile`
    #[strum(serialize = "NtDeleteFile")]
    DeleteFile,
    /// `NtFlushBuffersFile`
    #[strum(serialize = "NtFlushBuffersFile")]
    FlushBuffersFile,
    /// `NtDeviceIoControlFile`
    #[strum(serialize = "NtDeviceIoControlFile")]
    DeviceIoControlFile,

    // Memory
    /// `NtAllocateVirtualMemory`
    #[strum(serialize = "NtAllocateVirtualMemory")]
    AllocateVirtualMemory,
    /// `NtFreeVirtualMemory`
    #[strum(serialize = "NtFreeVirtualMemory")]
    FreeVirtualMemory,
    /// `NtProtectVirtualMemory`
    #[strum(serialize = "NtProtectVirtualMemory")]
    ProtectVirtualMemory,
    /// `NtQueryVirtualMemory`
    #[strum(serialize = "NtQueryVirtualMemory")]
    QueryVirtualMemory,
    /// `NtCreateSection`
    #[strum(serialize = "NtCreateSection")]
    CreateSection,
    /// `NtMapViewOfSection`
    #[strum(serialize = "NtMapViewOfSection")]
    MapViewOfSection,
    /// `NtUnmapViewOfSection`
    #[strum(serialize = "NtUnmapViewOfSection")]
    UnmapViewOfSection,

    // Synchronization
    /// `NtCreateEvent`
    #[strum(serialize = "NtCreateEvent")]
    CreateEvent,
    /// `NtSetEvent`
    #[strum(serialize = "NtSetEvent")]
    SetEvent,
    /// `NtWaitForSingleObject`
    #[strum(serialize = "NtWaitForSingleObject")]
    WaitForSingleObject,
    /// `NtDelayExecution`
    #[strum(serialize = "NtDelayExecution")]
    DelayExecution,
    /// `NtYieldExecution`
    #[strum(serialize = "NtYieldExecution")]
    YieldExecution,

    // Processes and threads
    /// `NtCreateThreadEx`
    #[strum(serialize = "NtCreateThreadEx")]
    CreateThreadEx,
    /// `NtTerminateThread`
    #[strum(serialize = "NtTerminateThread")]
    TerminateThread,
    /// `NtTerminateProcess`
    #[strum(serialize = "NtTerminateProcess")]
    TerminateProcess,
    /// `NtQueryInformationProcess`
    #[strum(serialize = "NtQueryInformationProcess")]
    QueryInformationProcess,

    // System
    /// `NtQuerySystemInformation`
    #[strum(serialize = "NtQuerySystemInformation")]
    QuerySystemInformation,
    /// `NtQuerySystemTime`
    #[strum(serialize = "NtQuerySystemTime")]
    QuerySystemTime,
    /// `NtQueryPerformanceCounter`
    #[strum(serialize = "NtQueryPerformanceCounter")]
    QueryPerformanceCounter,
}

impl SyscallTag {
    /// Name of the stub export that carries this service's number.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    /// Slot index of the tag.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for SyscallTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}
