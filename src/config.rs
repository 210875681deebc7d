//! Resolver configuration
//!
//! This module provides the knobs of the resolution pipeline: which module to search, which
//! export prefix marks a kernel service, and the bounds the header parser and the stub
//! decoder enforce on untrusted bytes.

/// Configuration for syscall number resolution
///
/// The defaults match the 64-bit kernel-interface module as shipped by the platform. The
/// bounds only limit how much of an image is trusted; they never change the result for a
/// well-formed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Short name of the module that exports the syscall stubs (default: `ntdll.dll`)
    pub module_name: &'static str,

    /// Prefix every resolvable export name must carry (default: `Nt`)
    pub symbol_prefix: &'static str,

    /// Exclusive upper bound on the section count of a parsed image (default: 96)
    pub max_sections: u16,

    /// Maximum number of instructions decoded per stub before giving up (default: 16)
    pub max_stub_instructions: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            module_name: "ntdll.dll",
            symbol_prefix: "Nt",
            max_sections: 96,
            max_stub_instructions: 16,
        }
    }
}

impl ResolverConfig {
    /// Creates a configuration with tight bounds
    ///
    /// Accepts exactly the stub shape of current platform releases (six instructions up to
    /// the first `ret`) and images with few sections.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_sections: 32,
            max_stub_instructions: 8,
            ..Self::default()
        }
    }

    /// Creates a configuration with loose bounds
    ///
    /// Tolerates padded stubs and images with unusual section counts, e.g. instrumented
    /// builds of the kernel-interface module.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_sections: u16::MAX,
            max_stub_instructions: 64,
            ..Self::default()
        }
    }
}
