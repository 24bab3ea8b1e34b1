// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: `backtrace` command of the kernel monitor
//! OWNERS: @kernel-team
//! PUBLIC API: print_backtrace, backtrace, current_frame_pointer
//! DEPENDS_ON: debug::{Unwinder, RawStack}, log

use core::fmt;
use core::ops::Range;

use log::debug;

use super::{DebugInfo, RawStack, StackView, Unwinder};

/// Writes `Stack backtrace:` followed by every frame reachable from `frame_pointer`.
pub fn print_backtrace<W, S, D>(
    out: &mut W,
    stack: S,
    info: D,
    frame_pointer: usize,
) -> fmt::Result
where
    W: fmt::Write + ?Sized,
    S: StackView,
    D: DebugInfo,
{
    writeln!(out, "Stack backtrace:")?;
    let unwinder = Unwinder::new(stack, info);
    let mut depth = 0usize;
    for frame in unwinder.walk(frame_pointer) {
        writeln!(out, "{}", frame)?;
        depth += 1;
    }
    debug!(target: "debug", "backtrace: {} frames from fp={:#x}", depth, frame_pointer);
    Ok(())
}

/// Prints the backtrace of the calling code.
///
/// # Safety
///
/// `stack` must cover the live stack of the caller and be readable in full; see
/// [`RawStack::new`].
#[inline(never)]
pub unsafe fn backtrace<W, D>(out: &mut W, info: D, stack: Range<usize>) -> fmt::Result
where
    W: fmt::Write + ?Sized,
    D: DebugInfo,
{
    let fp = current_frame_pointer();
    // SAFETY: forwarded from this function's contract.
    let stack = unsafe { RawStack::new(stack) };
    print_backtrace(out, stack, info, fp)
}

/// Reads the frame pointer register; zero where the target has no supported register.
///
/// Meaningful only when the kernel is built with frame pointers kept.
#[inline(always)]
pub fn current_frame_pointer() -> usize {
    let fp: usize;
    #[cfg(target_arch = "x86_64")]
    // SAFETY: copies a register; no memory access.
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "x86")]
    // SAFETY: copies a register; no memory access.
    unsafe {
        core::arch::asm!("mov {}, ebp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "aarch64")]
    // SAFETY: copies a register; no memory access.
    unsafe {
        core::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(any(target_arch = "riscv64", target_arch = "riscv32"))]
    // SAFETY: copies a register; no memory access.
    unsafe {
        core::arch::asm!("mv {}, s0", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        target_arch = "aarch64",
        target_arch = "riscv64",
        target_arch = "riscv32"
    )))]
    {
        fp = 0;
    }
    fp
}
