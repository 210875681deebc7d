//! The closed set of x86-64 instructions a syscall stub is made of.

use strum::IntoStaticStr;

use crate::{
    file::{io::read_le, parser::Parser},
    Error, Result,
};

/// One instruction of a syscall stub.
///
/// Every variant has a fixed encoding, so the leading byte alone decides how many bytes
/// follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Instruction {
    /// `mov r10, rcx` - `4C 8B D1`
    #[strum(serialize = "mov r10, rcx")]
    MovArgRegister,
    /// `mov eax, imm32` - `B8 id`
    #[strum(serialize = "mov eax, imm32")]
    MovImmToCallReg(u32),
    /// `test byte [0x7FFE0308], 1` - `F6 04 25 08 03 FE 7F 01`
    #[strum(serialize = "test byte [0x7FFE0308], 1")]
    TestSharedData,
    /// `jne rel8` - `75 ib`
    #[strum(serialize = "jne rel8")]
    BranchShort(i8),
    /// `syscall` - `0F 05`
    #[strum(serialize = "syscall")]
    Transition,
    /// `int 0x2E` - `CD 2E`
    #[strum(serialize = "int 0x2E")]
    LegacyTransition,
    /// `nop` - `90`
    #[strum(serialize = "nop")]
    Nop,
    /// `ret` - `C3`
    #[strum(serialize = "ret")]
    Return,
    /// `ret imm16` - `C2 iw`
    #[strum(serialize = "ret imm16")]
    ShortReturn(u16),
    /// `mov edx, imm32` - `BA id`
    #[strum(serialize = "mov edx, imm32")]
    MovImmToEdx(u32),
    /// `call edx` - `FF D2`
    #[strum(serialize = "call edx")]
    CallEdx,
}

impl Instruction {
    /// Encoded length of the instruction starting with `lead`, `None` for a byte that
    /// starts no recognized instruction.
    #[must_use]
    pub fn encoded_len(lead: u8) -> Option<usize> {
        match lead {
            0x90 | 0xC3 => Some(1),
            0x75 | 0x0F | 0xCD | 0xFF => Some(2),
            0x4C | 0xC2 => Some(3),
            0xB8 | 0xBA => Some(5),
            0xF6 => Some(8),
            _ => None,
        }
    }

    /// Encoded length of this instruction.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Instruction::Nop | Instruction::Return => 1,
            Instruction::BranchShort(_)
            | Instruction::Transition
            | Instruction::LegacyTransition
            | Instruction::CallEdx => 2,
            Instruction::MovArgRegister | Instruction::ShortReturn(_) => 3,
            Instruction::MovImmToCallReg(_) | Instruction::MovImmToEdx(_) => 5,
            Instruction::TestSharedData => 8,
        }
    }

    /// Human readable form of the instruction's shape.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }

    /// Decode the instruction at `offset` of `code`.
    ///
    /// An unknown leading byte is rejected before any further byte is read.
    ///
    /// # Errors
    /// - [`crate::Error::IllegalInstruction`] for an unknown leading byte or a known leading
    ///   byte followed by an unrecognized encoding
    /// - [`crate::Error::TruncatedImage`] if `code` ends inside the instruction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ntsyscall::stub::Instruction;
    ///
    /// let code = [0x4C, 0x8B, 0xD1, 0xB8, 0x0F, 0x00, 0x00, 0x00];
    /// assert_eq!(Instruction::classify(&code, 0)?, Instruction::MovArgRegister);
    /// assert_eq!(Instruction::classify(&code, 3)?, Instruction::MovImmToCallReg(15));
    /// # Ok::<(), ntsyscall::Error>(())
    /// ```
    pub fn classify(code: &[u8], offset: usize) -> Result<Instruction> {
        let mut parser = Parser::new(code);
        parser.seek(offset)?;

        let lead = parser.peek_byte()?;
        let Some(len) = Self::encoded_len(lead) else {
            return Err(Error::IllegalInstruction { offset, byte: lead });
        };
        let bytes = parser.read_bytes(len)?;

        let instruction = match bytes {
            [0x4C, 0x8B, 0xD1] => Instruction::MovArgRegister,
            [0xB8, imm @ ..] => Instruction::MovImmToCallReg(read_le::<u32>(imm)?),
            [0x75, rel] => Instruction::BranchShort(i8::from_le_bytes([*rel])),
            [0x0F, 0x05] => Instruction::Transition,
            [0xCD, 0x2E] => Instruction::LegacyTransition,
            [0x90] => Instruction::Nop,
            [0xC3] => Instruction::Return,
            [0xC2, imm @ ..] => Instruction::ShortReturn(read_le::<u16>(imm)?),
            [0xBA, imm @ ..] => Instruction::MovImmToEdx(read_le::<u32>(imm)?),
            [0xFF, 0xD2] => Instruction::CallEdx,
            [0xF6, 0x04, 0x25, 0x08, 0x03, 0xFE, 0x7F, 0x01] => Instruction::TestSharedData,
            _ => return Err(Error::IllegalInstruction { offset, byte: lead }),
        };

        Ok(instruction)
    }
}
