use crate::{
    syscall::{arch, NtStatus, SyscallNumber, SyscallTable, SyscallTag, MAX_SYSCALL_ARGS},
    Error, Result,
};

/// The privileged call primitive.
pub trait Transition: Send + Sync {
    /// Enter the kernel with `number` and `args`.
    ///
    /// # Safety
    ///
    /// `args` must be valid arguments for the service identified by `number`; pointers in
    /// them are dereferenced by the kernel.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] where the primitive does not exist.
    unsafe fn transition(&self, number: SyscallNumber, args: &[usize]) -> Result<NtStatus>;
}

/// The `syscall` instruction of the running target.
///
/// Every call returns [`crate::Error::NotSupported`] on targets other than x86-64
/// Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTransition;

impl Transition for NativeTransition {
    unsafe fn transition(&self, number: SyscallNumber, args: &[usize]) -> Result<NtStatus> {
        check_arity(args)?;

        let mut padded = [0_usize; MAX_SYSCALL_ARGS];
        padded[..args.len()].copy_from_slice(args);

        unsafe { arch::transition(number, &padded) }
    }
}

fn check_arity(args: &[usize]) -> Result<()> {
    if args.len() > MAX_SYSCALL_ARGS {
        return Err(Error::TooManyArguments {
            count: args.len(),
            max: MAX_SYSCALL_ARGS,
        });
    }

    Ok(())
}

/// Resolves numbers through a [`SyscallTable`] and performs the call.
pub struct SyscallInvoker<T: Transition = NativeTransition> {
    table: SyscallTable,
    transition: T,
}

impl SyscallInvoker {
    /// An invoker using the native transition.
    #[must_use]
    pub fn new(table: SyscallTable) -> Self {
        SyscallInvoker {
            table,
            transition: NativeTransition,
        }
    }
}

impl<T: Transition> SyscallInvoker<T> {
    /// An invoker using a custom transition.
    pub fn with_transition(table: SyscallTable, transition: T) -> Self {
        SyscallInvoker { table, transition }
    }

    /// The table numbers are taken from.
    #[must_use]
    pub fn table(&self) -> &SyscallTable {
        &self.table
    }

    /// Call the service of `tag` with `args`.
    ///
    /// # Safety
    ///
    /// `args` must be valid arguments for the service; see [`Transition::transition`].
    ///
    /// # Errors
    /// - [`crate::Error::TooManyArguments`] for more than [`MAX_SYSCALL_ARGS`] arguments,
    ///   checked before any resolution
    /// - any resolution error of [`SyscallTable::number_for`]
    /// - [`crate::Error::NotSupported`] on targets without a native transition
    ///
    /// A failed service is reported through the returned [`NtStatus`], not as an error.
    pub unsafe fn invoke(&self, tag: SyscallTag, args: &[usize]) -> Result<NtStatus> {
        check_arity(args)?;
        let number = self.table.number_for(tag)?;

        unsafe { self.transition.transition(number, args) }
    }

    /// Call the service exported as `name` with `args`.
    ///
    /// # Safety
    ///
    /// `args` must be valid arguments for the service; see [`Transition::transition`].
    ///
    /// # Errors
    /// As [`SyscallInvoker::invoke`], with the resolution errors of
    /// [`SyscallTable::number_for_symbol`].
    pub unsafe fn invoke_symbol(&self, name: &str, args: &[usize]) -> Result<NtStatus> {
        check_arity(args)?;
        let number = self.table.number_for_symbol(name)?;

        unsafe { self.transition.transition(number, args) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{file::Image, test::factories::image::PeBuilder, ResolverConfig};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(u32, Vec<usize>)>>,
    }

    impl Transition for Recorder {
        unsafe fn transition(&self, number: SyscallNumber, args: &[usize]) -> Result<NtStatus> {
            lock!(self.calls).push((number.value(), args.to_vec()));
            Ok(NtStatus::SUCCESS)
        }
    }

    fn invoker() -> SyscallInvoker<Recorder> {
        let bytes = PeBuilder::pe64()
            .with_stub("NtClose", 0x0F)
            .with_stub("NtWriteFile", 0x08)
            .build();
        let table = SyscallTable::new(
            move |_: &ResolverConfig| Image::from_mem(bytes.clone()),
            ResolverConfig::default(),
        );
        SyscallInvoker::with_transition(table, Recorder::default())
    }

    #[test]
    fn invoke_passes_number_and_args() {
        let invoker = invoker();

        let status = unsafe { invoker.invoke(SyscallTag::Close, &[0x44]) }.unwrap();
        assert!(status.is_success());

        let args: Vec<usize> = (1..=9).collect();
        unsafe { invoker.invoke_symbol("NtWriteFile", &args) }.unwrap();

        let calls = lock!(invoker.transition.calls);
        assert_eq!(calls[0], (0x0F, vec![0x44]));
        assert_eq!(calls[1], (0x08, args));
    }

    #[test]
    fn too_many_arguments() {
        let invoker = invoker();
        let args = [0_usize; MAX_SYSCALL_ARGS + 1];

        assert!(matches!(
            unsafe { invoker.invoke(SyscallTag::Close, &args) },
            Err(Error::TooManyArguments { count: 17, max: 16 })
        ));
        // rejected before resolution
        assert_eq!(invoker.table().resolution_count(), 0);

        let exact = [0_usize; MAX_SYSCALL_ARGS];
        assert!(unsafe { invoker.invoke(SyscallTag::Close, &exact) }.is_ok());
    }

    #[test]
    fn resolution_error_skips_transition() {
        let invoker = invoker();

        assert!(matches!(
            unsafe { invoker.invoke(SyscallTag::ReadFile, &[]) },
            Err(Error::UnknownExportedFunction(_))
        ));
        assert!(lock!(invoker.transition.calls).is_empty());
    }

    #[test]
    fn native_transition_checks_arity() {
        let args = [0_usize; MAX_SYSCALL_ARGS + 1];
        assert!(matches!(
            unsafe { NativeTransition.transition(SyscallNumber::new(0), &args) },
            Err(Error::TooManyArguments { .. })
        ));
    }

    #[cfg(not(all(windows, target_arch = "x86_64")))]
    #[test]
    fn native_transition_unsupported() {
        assert!(matches!(
            unsafe { NativeTransition.transition(SyscallNumber::new(0), &[]) },
            Err(Error::NotSupported)
        ));
    }
}
