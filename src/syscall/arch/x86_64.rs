//! x86-64 Windows: `syscall` with the kernel's register convention.

use std::arch::asm;

use crate::{
    loader::LoaderData,
    syscall::{NtStatus, SyscallNumber, MAX_SYSCALL_ARGS},
    Result,
};

const REGISTER_ARGS: usize = 4;
const STACK_ARGS: usize = MAX_SYSCALL_ARGS - REGISTER_ARGS;

/// Return slot and home area the kernel skips before the fifth argument.
const STACK_ARGS_OFFSET: usize = 0x28;

/// Bytes reserved below the realigned stack pointer. Leaves `rsp` at 8 mod 16, the
/// alignment a stub sees after its `call`.
const FRAME_SIZE: usize = STACK_ARGS_OFFSET + STACK_ARGS * 8;

const PEB_OFFSET_LDR: usize = 0x18;

/// Address of the loader data block of the running process.
pub(crate) fn loader_data() -> Result<*const LoaderData> {
    let peb: *const u8;
    unsafe {
        asm!("mov {}, gs:[0x60]", out(reg) peb, options(nostack, pure, readonly));
    }
    if peb.is_null() {
        return Err(malformed_error!("Thread has no process environment block"));
    }

    let ldr = unsafe { peb.add(PEB_OFFSET_LDR).cast::<*const LoaderData>().read() };
    if ldr.is_null() {
        return Err(malformed_error!("Process environment block has no loader data"));
    }

    Ok(ldr)
}

/// Enter the kernel with `number` and all `MAX_SYSCALL_ARGS` arguments.
///
/// Arguments 1-4 go in `r10`, `rdx`, `r8`, `r9`; the rest are copied to `[rsp+0x28]`
/// upwards. The kernel ignores arguments the service does not take.
///
/// # Safety
///
/// The service identified by `number` must accept `args` as valid arguments.
pub(crate) unsafe fn transition(
    number: SyscallNumber,
    args: &[usize; MAX_SYSCALL_ARGS],
) -> Result<NtStatus> {
    let status: u64;

    unsafe {
        asm!(
            "mov r12, rsp",
            "and rsp, -16",
            "sub rsp, {frame}",
            "xor ecx, ecx",
            "2:",
            "mov rdx, [r11 + {register_bytes} + rcx*8]",
            "mov [rsp + {stack_offset} + rcx*8], rdx",
            "inc ecx",
            "cmp ecx, {stack_args}",
            "jb 2b",
            "mov r10, [r11]",
            "mov rdx, [r11 + 8]",
            "mov r8, [r11 + 16]",
            "mov r9, [r11 + 24]",
            "syscall",
            "mov rsp, r12",
            frame = const FRAME_SIZE,
            register_bytes = const REGISTER_ARGS * 8,
            stack_offset = const STACK_ARGS_OFFSET,
            stack_args = const STACK_ARGS,
            inout("r11") args.as_ptr() => _,
            inlateout("rax") u64::from(number.value()) => status,
            out("rcx") _,
            out("rdx") _,
            out("r8") _,
            out("r9") _,
            out("r10") _,
            out("r12") _,
        );
    }

    Ok(NtStatus::new(status as u32 as i32))
}
