// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared ABI definitions for the single-slot mailbox IPC
//! OWNERS: @runtime
//! PUBLIC API: Pid, Perm, Received, TransferError, errno::*, SYSCALL_* IDs,
//!             ipc_recv/ipc_send/try_ipc_send/ipc_call, Transport, raw::RawTransport
//! DEPENDS_ON: bitflags, log, thiserror (no_std)
//! INVARIANTS: One pending message per process; NotReceiving never escapes the send loop;
//!             raw page arguments at or above UTOP mean "no page"

use core::fmt;

use bitflags::bitflags;

mod ipc;
pub mod raw;

pub use ipc::{ipc_call, ipc_recv, ipc_send, try_ipc_send, RecvError, SendError, Transport};

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// First address above the user-accessible region.
///
/// Raw page arguments at or above this address are decoded as "no page".
pub const UTOP: usize = 0xEEC0_0000;

/// Raw sentinel passed in place of a page address when no page is offered or accepted.
///
/// Zero is a valid place to map a page, so it cannot serve as the sentinel.
pub const NO_PAGE: usize = usize::MAX;

/// Yields the processor to the scheduler.
pub const SYSCALL_YIELD: usize = 0;
/// Attempts a single mailbox delivery: `[to, value, page_or_NO_PAGE, perm]`.
pub const SYSCALL_IPC_TRY_SEND: usize = 1;
/// Posts a receive and suspends until delivery: `[dest_or_NO_PAGE]`.
pub const SYSCALL_IPC_RECV: usize = 2;
/// Returns the caller's process id.
pub const SYSCALL_GETPID: usize = 3;

/// Process identifier.
///
/// PID 0 is reserved for the kernel and doubles as "no sender" in a cleared mailbox.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Kernel PID (reserved, never a message target).
    pub const KERNEL: Self = Self(0);

    /// Creates a PID from a raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw PID value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the PID as an index into process-owned vectors.
    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Page permission bits granted with a transferred page.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Perm: u32 {
        /// Mapping is present.
        const PRESENT = 1 << 0;
        /// Mapping is writable.
        const WRITE = 1 << 1;
        /// Mapping is accessible from user mode.
        const USER = 1 << 2;
        /// Bits left to software.
        const AVAIL = 0b111 << 9;
    }
}

impl Perm {
    /// Present, user-accessible, writable.
    pub const RW: Self = Self::PRESENT.union(Self::USER).union(Self::WRITE);
    /// Present, user-accessible, read-only.
    pub const RO: Self = Self::PRESENT.union(Self::USER);

    /// Returns `true` when the bits are acceptable for a page transfer: `PRESENT | USER`
    /// must be set and nothing outside `PRESENT | WRITE | USER | AVAIL` may be.
    pub const fn is_valid_transfer(self) -> bool {
        self.contains(Self::RO) && Self::all().contains(self)
    }
}

/// Outcome of a completed receive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Word delivered by the sender.
    pub value: u32,
    /// Identity of the sender.
    pub from: Pid,
    /// Permission of the transferred page; empty when no page was mapped.
    pub perm: Perm,
}

/// Negative return codes used by the syscall ABI.
pub mod errno {
    /// Unclassified failure.
    pub const E_UNSPECIFIED: isize = -1;
    /// Target process does not exist or is not alive.
    pub const E_BAD_ENV: isize = -2;
    /// Invalid argument (alignment, range or permission bits).
    pub const E_INVAL: isize = -3;
    /// Page service ran out of memory.
    pub const E_NO_MEM: isize = -4;
    /// Target is not currently blocked in receive.
    pub const E_IPC_NOT_RECV: isize = -7;
    /// Requested permission exceeds the sender's own mapping.
    pub const E_PERM: isize = -9;
    /// Syscall number not implemented.
    pub const E_NOSYS: isize = -10;
}

/// Failure reported by a single delivery or receive attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Target has not posted a receive; the only retryable condition.
    #[error("target not receiving")]
    NotReceiving,
    /// Target process does not exist or has exited.
    #[error("bad target process")]
    BadTarget,
    /// Address, alignment or permission bits were rejected.
    #[error("invalid argument")]
    Invalid,
    /// Page service could not allocate the mapping.
    #[error("out of memory")]
    NoMemory,
    /// Requested permission exceeds the sender's own.
    #[error("permission denied")]
    PermissionDenied,
    /// Kernel does not implement the request.
    #[error("unsupported syscall")]
    Unsupported,
    /// Kernel returned a code this ABI revision does not know.
    #[error("unknown error code {0}")]
    Unknown(isize),
}

impl TransferError {
    /// Encodes the error as a negative syscall return value.
    pub const fn to_errno(self) -> isize {
        match self {
            Self::NotReceiving => errno::E_IPC_NOT_RECV,
            Self::BadTarget => errno::E_BAD_ENV,
            Self::Invalid => errno::E_INVAL,
            Self::NoMemory => errno::E_NO_MEM,
            Self::PermissionDenied => errno::E_PERM,
            Self::Unsupported => errno::E_NOSYS,
            Self::Unknown(code) => code,
        }
    }

    /// Decodes a raw syscall return value; non-negative values are successes.
    pub const fn decode(raw: isize) -> Result<usize, Self> {
        if raw >= 0 {
            return Ok(raw as usize);
        }
        Err(match raw {
            errno::E_IPC_NOT_RECV => Self::NotReceiving,
            errno::E_BAD_ENV => Self::BadTarget,
            errno::E_INVAL => Self::Invalid,
            errno::E_NO_MEM => Self::NoMemory,
            errno::E_PERM => Self::PermissionDenied,
            errno::E_NOSYS => Self::Unsupported,
            other => Self::Unknown(other),
        })
    }
}

/// Encodes an optional page address for a raw syscall argument.
#[inline]
pub const fn encode_page(page: Option<usize>) -> usize {
    match page {
        Some(va) => va,
        None => NO_PAGE,
    }
}

/// Decodes a raw page argument; anything at or above [`UTOP`] means "no page".
#[inline]
pub const fn decode_page(raw: usize) -> Option<usize> {
    if raw >= UTOP {
        None
    } else {
        Some(raw)
    }
}
