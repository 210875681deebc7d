use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! truncated_error {
    ($offset:expr, $len:expr) => {
        crate::Error::TruncatedImage {
            offset: $offset,
            len: $len,
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every fallible operation of the crate, from the lowest byte reader up to
/// [`crate::syscall::SyscallTable`], reports through this single enum. Callers of the
/// syscall layer therefore see one resolution error type, regardless of which stage failed.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::BadLegacyMagic`] - The DOS header does not start with `MZ`
/// - [`Error::BadModernMagic`] - The PE signature is not `PE\0\0`
/// - [`Error::BadOptionalMagic`] - The optional header is neither PE32 nor PE32+
/// - [`Error::SectionCountExceeded`] - More sections than the configured maximum
/// - [`Error::TruncatedImage`] - An offset/size pair reaches past the image
/// - [`Error::CorruptExportTable`] - Ordinal or address-table index out of range
/// - [`Error::Malformed`] - Any other structural inconsistency
///
/// ## Lookup Errors
/// - [`Error::ModuleNotFound`] - The kernel-interface module is not loaded
/// - [`Error::UnknownExportedFunction`] - The export is absent from the module
/// - [`Error::NonPrefixedName`] - The symbol does not carry the kernel prefix
/// - [`Error::ForwardedExport`] - The export forwards into another module
///
/// ## Decode Errors
/// - [`Error::IllegalInstruction`] - A byte outside the recognized stub shapes
/// - [`Error::UnexpectedShortReturn`] - `ret imm16` inside a forwarding stub
/// - [`Error::SyscallNotFound`] - The scan ended without number and transition
/// - [`Error::UnsupportedStubShape`] - A recognized but unsupported stub shape
///
/// # Examples
///
/// ```rust,no_run
/// use ntsyscall::{syscall::{SyscallTable, SyscallTag}, Error};
///
/// let table = SyscallTable::from_loader()?;
/// match table.number_for(SyscallTag::Close) {
///     Ok(number) => println!("NtClose = {}", number),
///     Err(Error::UnknownExportedFunction(name)) => eprintln!("{} is not exported", name),
///     Err(e) if e.is_fatal() => panic!("{}", e),
///     Err(e) => eprintln!("NtClose unavailable: {}", e),
/// }
/// # Ok::<(), ntsyscall::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Format errors
    /// The legacy (DOS) header does not carry the `MZ` magic.
    ///
    /// The associated value is the magic that was found at offset 0.
    #[error("Bad DOS header magic - 0x{0:04X}")]
    BadLegacyMagic(u16),

    /// The modern file header does not carry the `PE\0\0` signature.
    ///
    /// The associated value is the signature that was found at `e_lfanew`.
    #[error("Bad PE signature - 0x{0:08X}")]
    BadModernMagic(u32),

    /// The optional header magic is neither PE32 (`0x10B`) nor PE32+ (`0x20B`).
    #[error("Bad optional header magic - 0x{0:04X}")]
    BadOptionalMagic(u16),

    /// The file header announces more sections than the configured maximum.
    #[error("Section count {count} exceeds the maximum of {max}")]
    SectionCountExceeded {
        /// Section count read from the file header
        count: u16,
        /// Configured upper bound (exclusive)
        max: u16,
    },

    /// A computed offset/size pair reaches past the end of the image.
    ///
    /// This is the single bounds error of the crate; the byte readers, the cursor parser,
    /// the RVA translation and the stub decoder all report it.
    #[error("Truncated image - {len} bytes at offset 0x{offset:X} are out of bounds")]
    TruncatedImage {
        /// Start of the failed access
        offset: usize,
        /// Length of the failed access
        len: usize,
    },

    /// The export directory references an ordinal or address-table slot that does not exist.
    ///
    /// Distinct from a missing name: this indicates export-table corruption.
    #[error("Corrupt export table - index {index} exceeds {count} entries")]
    CorruptExportTable {
        /// Offending index
        index: usize,
        /// Number of entries in the table that was indexed
        count: usize,
    },

    /// The image is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error while mapping a module from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    // Lookup errors
    /// The kernel-interface module could not be located in the loader lists.
    ///
    /// This is the only structural condition of the crate: without the module no call tag
    /// can ever be resolved. See [`Error::is_fatal`].
    #[error("Module not found - {0}")]
    ModuleNotFound(String),

    /// The module does not export the requested function.
    #[error("Unknown exported function - {0}")]
    UnknownExportedFunction(String),

    /// The requested symbol does not start with the kernel API prefix.
    #[error("Symbol does not carry the kernel prefix - {0}")]
    NonPrefixedName(String),

    /// The export is a forwarder into another module, not a code address.
    #[error("Export {name} is forwarded to {target}")]
    ForwardedExport {
        /// Name of the export
        name: String,
        /// The `MODULE.Symbol` forwarder string
        target: String,
    },

    // Decode errors
    /// The stub contains a byte outside the recognized instruction shapes.
    #[error("Illegal instruction 0x{byte:02X} at stub offset {offset}")]
    IllegalInstruction {
        /// Offset within the stub
        offset: usize,
        /// The unrecognized leading byte
        byte: u8,
    },

    /// A `ret imm16` was found where a forwarding stub returns with a plain `ret`.
    #[error("Unexpected short return at stub offset {0}")]
    UnexpectedShortReturn(usize),

    /// The stub terminated without loading a number or without a transition.
    #[error("No syscall number found in stub")]
    SyscallNotFound,

    /// The stub uses a recognized shape this crate does not support (compatibility layer
    /// transitions, legacy interrupt gates).
    #[error("Unsupported stub shape at stub offset {0}")]
    UnsupportedStubShape(usize),

    // Invocation errors
    /// More arguments were passed than the transition primitive forwards.
    #[error("Too many syscall arguments - {count} (max {max})")]
    TooManyArguments {
        /// Number of arguments passed
        count: usize,
        /// Maximum supported
        max: usize,
    },

    /// The operation is not available on this platform or architecture.
    #[error("This operation is not supported on the current platform")]
    NotSupported,
}

impl Error {
    /// Returns `true` for conditions that no retry can fix and that make every call tag
    /// unusable.
    ///
    /// Only a missing kernel-interface module qualifies; all other errors disable a single
    /// tag at most.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ModuleNotFound(_))
    }
}
