use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Mutex, OnceLock,
    },
};

use dashmap::DashMap;
use rayon::prelude::*;
use strum::EnumCount;

use crate::{
    file::Image,
    loader::Loader,
    pe::{exports, exports::ExportTarget, PeImage},
    stub::StubDecoder,
    syscall::{SyscallNumber, SyscallTag},
    Error, ResolverConfig, Result,
};

/// Where a [`SyscallTable`] gets the kernel-interface module from.
///
/// Any `Fn(&ResolverConfig) -> Result<Image>` closure is a source too, which is how tests
/// and embedders supply a module that is not loaded in the current process.
pub trait ImageSource: Send + Sync {
    /// Produce the image of the module named by `config.module_name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] if the module does not exist, or any error
    /// raised while reading it.
    fn locate(&self, config: &ResolverConfig) -> Result<Image>;
}

impl<F> ImageSource for F
where
    F: Fn(&ResolverConfig) -> Result<Image> + Send + Sync,
{
    fn locate(&self, config: &ResolverConfig) -> Result<Image> {
        self(config)
    }
}

/// The module as mapped into the current process, found by walking the loader lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderSource;

impl ImageSource for LoaderSource {
    fn locate(&self, config: &ResolverConfig) -> Result<Image> {
        locate_in(&Loader::current()?, config)
    }
}

/// Find `config.module_name` in `loader` and view its memory.
fn locate_in(loader: &Loader<'static>, config: &ResolverConfig) -> Result<Image> {
    let Some(module) = loader.find_module(config.module_name, false) else {
        return Err(Error::ModuleNotFound(config.module_name.to_string()));
    };

    // Loader<'static> lists only hold modules that outlive the process.
    unsafe { module.image() }
}

impl ImageSource for Loader<'static> {
    fn locate(&self, config: &ResolverConfig) -> Result<Image> {
        locate_in(self, config)
    }
}

/// A copy of the module on disk.
#[derive(Debug, Clone)]
pub struct FileSource(pub PathBuf);

impl ImageSource for FileSource {
    fn locate(&self, _config: &ResolverConfig) -> Result<Image> {
        if !self.0.exists() {
            return Err(Error::ModuleNotFound(self.0.display().to_string()));
        }

        Image::from_file(&self.0)
    }
}

/// One lazily resolved number.
struct Slot {
    ready: AtomicBool,
    value: AtomicU32,
    lock: Mutex<()>,
}

impl Slot {
    fn new() -> Self {
        Slot {
            ready: AtomicBool::new(false),
            value: AtomicU32::new(0),
            lock: Mutex::new(()),
        }
    }

    fn get(&self) -> Option<SyscallNumber> {
        if self.ready.load(Ordering::Acquire) {
            Some(SyscallNumber::new(self.value.load(Ordering::Relaxed)))
        } else {
            None
        }
    }
}

/// Lazily populated map from [`SyscallTag`] to [`SyscallNumber`].
///
/// Each tag has its own slot. A resolved slot is read with a single `Acquire` load; a miss
/// takes the slot's lock, checks again and resolves. Failures are returned and not
/// remembered, so a later call retries. The module is parsed once per table, on the first
/// miss of any tag.
///
/// # Examples
///
/// ```rust,no_run
/// use ntsyscall::{syscall::{FileSource, SyscallTable, SyscallTag}, ResolverConfig};
///
/// let table = SyscallTable::new(
///     FileSource(r"C:\Windows\System32\ntdll.dll".into()),
///     ResolverConfig::default(),
/// );
/// println!("NtClose = {}", table.number_for(SyscallTag::Close)?);
///
/// for (name, number) in table.inventory()? {
///     println!("{:>6} {}", number, name);
/// }
/// # Ok::<(), ntsyscall::Error>(())
/// ```
pub struct SyscallTable {
    config: ResolverConfig,
    source: Box<dyn ImageSource>,
    module: OnceLock<PeImage>,
    module_lock: Mutex<()>,
    slots: [Slot; SyscallTag::COUNT],
    symbols: DashMap<String, SyscallNumber>,
    parse_count: AtomicUsize,
    resolution_count: AtomicUsize,
}

impl SyscallTable {
    /// A table reading the module from `source`.
    pub fn new(source: impl ImageSource + 'static, config: ResolverConfig) -> Self {
        SyscallTable {
            config,
            source: Box::new(source),
            module: OnceLock::new(),
            module_lock: Mutex::new(()),
            slots: std::array::from_fn(|_| Slot::new()),
            symbols: DashMap::new(),
            parse_count: AtomicUsize::new(0),
            resolution_count: AtomicUsize::new(0),
        }
    }

    /// A table over the loader lists of the running process.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on targets other than x86-64 Windows.
    pub fn from_loader() -> Result<Self> {
        Loader::current()?;
        Ok(Self::new(LoaderSource, ResolverConfig::default()))
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The number of `tag`, resolving it on first use.
    ///
    /// # Errors
    /// Any resolution error; see [`SyscallTable::number_for_symbol`].
    pub fn number_for(&self, tag: SyscallTag) -> Result<SyscallNumber> {
        let slot = &self.slots[tag.index()];
        if let Some(number) = slot.get() {
            return Ok(number);
        }

        let _guard = lock!(slot.lock);
        if let Some(number) = slot.get() {
            return Ok(number);
        }

        let number = self.resolve(tag.symbol())?;
        slot.value.store(number.value(), Ordering::Relaxed);
        slot.ready.store(true, Ordering::Release);

        Ok(number)
    }

    /// The number of the stub exported as `name`, resolving it on first use.
    ///
    /// No cache lock is held while resolving. Racing first lookups of one name may each
    /// decode the stub; the first stored number is returned to all of them.
    ///
    /// # Errors
    /// - [`crate::Error::NonPrefixedName`] if `name` lacks the configured prefix
    /// - [`crate::Error::ModuleNotFound`] if the module cannot be located
    /// - [`crate::Error::UnknownExportedFunction`] if the module does not export `name`
    /// - [`crate::Error::ForwardedExport`] if the export forwards elsewhere
    /// - any decode error of [`crate::stub::StubDecoder::decode`]
    pub fn number_for_symbol(&self, name: &str) -> Result<SyscallNumber> {
        if let Some(number) = self.symbols.get(name) {
            return Ok(*number);
        }

        let number = self.resolve(name)?;
        let stored = *self.symbols.entry(name.to_string()).or_insert(number);
        Ok(stored)
    }

    /// Decode every prefixed export of the module.
    ///
    /// Returns `(name, number)` pairs sorted by number, then name. Exports whose stub does
    /// not decode (data exports, forwarders, hooked stubs) are skipped.
    ///
    /// # Errors
    /// Returns an error if the module cannot be located or parsed, or its export table
    /// is corrupt.
    pub fn inventory(&self) -> Result<Vec<(String, SyscallNumber)>> {
        let pe = self.module()?;
        let Some(exports) = pe.exports()? else {
            return Ok(Vec::new());
        };

        let names = exports
            .names()
            .filter(|name| {
                name.as_ref()
                    .map_or(true, |name| name.starts_with(self.config.symbol_prefix))
            })
            .collect::<Result<Vec<&str>>>()?;

        let mut found: Vec<(String, SyscallNumber)> = names
            .par_iter()
            .filter_map(|name| match self.decode_export(pe, name) {
                Ok(number) => Some((name.to_string(), number)),
                Err(error) => {
                    log::debug!("Skipping {}: {}", name, error);
                    None
                }
            })
            .collect();

        found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(found)
    }

    /// How often the module was parsed (0 or 1).
    #[must_use]
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// How often a stub was resolved and decoded for [`Self::number_for`] or
    /// [`Self::number_for_symbol`].
    #[must_use]
    pub fn resolution_count(&self) -> usize {
        self.resolution_count.load(Ordering::Relaxed)
    }

    /// The parsed module, locating and parsing it on first use.
    ///
    /// # Errors
    /// Any error of the [`ImageSource`] or of [`crate::pe::PeImage::parse`]. Failures are
    /// not cached.
    pub fn module(&self) -> Result<&PeImage> {
        if let Some(pe) = self.module.get() {
            return Ok(pe);
        }

        let _guard = lock!(self.module_lock);
        if let Some(pe) = self.module.get() {
            return Ok(pe);
        }

        let image = self.source.locate(&self.config)?;
        let pe = PeImage::parse(image, &self.config)?;
        self.parse_count.fetch_add(1, Ordering::Relaxed);

        Ok(self.module.get_or_init(|| pe))
    }

    fn resolve(&self, name: &str) -> Result<SyscallNumber> {
        let result = self.resolve_uncached(name);
        match &result {
            Ok(number) => log::debug!("Resolved {} = {}", name, number),
            Err(error) => log::warn!("Failed to resolve {}: {}", name, error),
        }
        result
    }

    fn resolve_uncached(&self, name: &str) -> Result<SyscallNumber> {
        if !name.starts_with(self.config.symbol_prefix) {
            return Err(Error::NonPrefixedName(name.to_string()));
        }

        let pe = self.module()?;
        self.resolution_count.fetch_add(1, Ordering::Relaxed);
        self.decode_export(pe, name)
    }

    fn decode_export(&self, pe: &PeImage, name: &str) -> Result<SyscallNumber> {
        let Some(export) = exports::resolve(pe, name)? else {
            return Err(Error::UnknownExportedFunction(name.to_string()));
        };
        if let ExportTarget::Forwarder(target) = export.target {
            return Err(Error::ForwardedExport {
                name: name.to_string(),
                target: target.to_string(),
            });
        }

        let code = pe.tail_from_rva(export.rva)?;
        StubDecoder::new(code, &self.config).decode()
    }
}
