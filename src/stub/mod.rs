//! Syscall number extraction from forwarding stubs.
//!
//! Every kernel service exported by the kernel-interface module is a short, compiler
//! generated stub: it moves the first argument into `r10`, loads the service number into
//! `eax`, optionally probes the shared user data page for the legacy gate, and executes
//! `syscall`. The number therefore sits as an immediate inside the stub bytes.
//!
//! [`crate::stub::StubDecoder`] walks the stub instruction by instruction, accepting only
//! the closed set described by [`crate::stub::Instruction`]. Anything else is rejected,
//! never guessed at.
//!
//! # Decoding States
//!
//! ```text
//! Scanning --mov eax--> MovImmSeen --syscall--> TransitionSeen --ret--> Terminated
//! ```
//!
//! `mov eax, imm32` may appear again (the last one wins); `nop`, `test` and short branches
//! leave the state unchanged. `ret` terminates; the result is the candidate number if both
//! a candidate and a transition were seen.
//!
//! # Examples
//!
//! ```rust
//! use ntsyscall::{stub::decode_stub, ResolverConfig};
//!
//! let stub = [0x4C, 0x8B, 0xD1, 0xB8, 0x0F, 0x00, 0x00, 0x00, 0x0F, 0x05, 0xC3];
//! let number = decode_stub(&stub, &ResolverConfig::default())?;
//! assert_eq!(number.value(), 15);
//! # Ok::<(), ntsyscall::Error>(())
//! ```

mod instruction;

pub use instruction::Instruction;

use crate::{syscall::SyscallNumber, Error, ResolverConfig, Result};

/// Progress of a [`StubDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Neither a number nor a transition seen yet
    Scanning,
    /// A `mov eax, imm32` was decoded
    MovImmSeen,
    /// A `syscall` was decoded
    TransitionSeen,
    /// A `ret` ended the stub
    Terminated,
}

/// Stateful decoder for one stub.
pub struct StubDecoder<'a> {
    code: &'a [u8],
    offset: usize,
    state: DecodeState,
    candidate: Option<u32>,
    transition: bool,
    trace: Vec<Instruction>,
    max_instructions: usize,
}

impl<'a> StubDecoder<'a> {
    /// Create a decoder over `code`, which starts at the stub's first byte.
    ///
    /// `code` may extend past the stub; decoding stops at the first `ret`.
    #[must_use]
    pub fn new(code: &'a [u8], config: &ResolverConfig) -> Self {
        StubDecoder {
            code,
            offset: 0,
            state: DecodeState::Scanning,
            candidate: None,
            transition: false,
            trace: Vec::with_capacity(config.max_stub_instructions),
            max_instructions: config.max_stub_instructions,
        }
    }

    /// Run the decoder to termination.
    ///
    /// # Errors
    /// - [`crate::Error::IllegalInstruction`] for bytes outside the recognized shapes
    /// - [`crate::Error::UnexpectedShortReturn`] for a `ret imm16`
    /// - [`crate::Error::UnsupportedStubShape`] for the compatibility-layer and legacy
    ///   interrupt shapes
    /// - [`crate::Error::SyscallNotFound`] if the stub ends without both a number and a
    ///   transition, or exceeds the configured instruction bound
    /// - [`crate::Error::TruncatedImage`] if the code ends before a `ret`
    pub fn decode(&mut self) -> Result<SyscallNumber> {
        while self.state != DecodeState::Terminated {
            if self.trace.len() >= self.max_instructions {
                log::trace!(
                    "Stub exceeds {} instructions, giving up",
                    self.max_instructions
                );
                return Err(Error::SyscallNotFound);
            }

            let offset = self.offset;
            let instruction = Instruction::classify(self.code, offset)?;
            log::trace!("{:>4}: {:?}", offset, instruction);

            self.trace.push(instruction);
            self.offset += instruction.len();
            self.step(instruction, offset)?;
        }

        match (self.candidate, self.transition) {
            (Some(number), true) => Ok(SyscallNumber::new(number)),
            _ => Err(Error::SyscallNotFound),
        }
    }

    fn step(&mut self, instruction: Instruction, offset: usize) -> Result<()> {
        match instruction {
            Instruction::MovImmToCallReg(number) => {
                self.candidate = Some(number);
                if !self.transition {
                    self.state = DecodeState::MovImmSeen;
                }
            }
            Instruction::Transition => {
                self.transition = true;
                self.state = DecodeState::TransitionSeen;
            }
            Instruction::Return => self.state = DecodeState::Terminated,
            Instruction::ShortReturn(_) => return Err(Error::UnexpectedShortReturn(offset)),
            Instruction::LegacyTransition
            | Instruction::MovImmToEdx(_)
            | Instruction::CallEdx => return Err(Error::UnsupportedStubShape(offset)),
            Instruction::MovArgRegister
            | Instruction::TestSharedData
            | Instruction::BranchShort(_)
            | Instruction::Nop => {}
        }

        Ok(())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// The instructions decoded so far, in order.
    #[must_use]
    pub fn trace(&self) -> &[Instruction] {
        &self.trace
    }

    /// Offset of the next instruction.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Decode the syscall number of the stub at the start of `code`.
///
/// # Errors
/// See [`StubDecoder::decode`].
pub fn decode_stub(code: &[u8], config: &ResolverConfig) -> Result<SyscallNumber> {
    StubDecoder::new(code, config).decode()
}
