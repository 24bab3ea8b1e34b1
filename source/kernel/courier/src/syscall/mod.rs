// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall dispatcher and error handling
//! OWNERS: @kernel-team
//! PUBLIC API: SyscallTable, Args, Error, Handler, SysResult, to_return_value
//! DEPENDS_ON: ipc, syscall::api, courier_abi (syscall IDs, errno)
//! INVARIANTS: Fixed MAX_SYSCALL window; stable IDs; decode/check/execute discipline

pub mod api;

use crate::ipc;
use courier_abi::{errno, TransferError};

pub use courier_abi::{SYSCALL_GETPID, SYSCALL_IPC_RECV, SYSCALL_IPC_TRY_SEND, SYSCALL_YIELD};

/// Maximum number of syscalls supported by the dispatch table.
const MAX_SYSCALL: usize = 16;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Syscall arguments passed in registers.
#[derive(Default, Clone, Copy, Debug)]
pub struct Args {
    regs: [usize; 6],
}

impl Args {
    /// Creates a new argument pack from the provided registers.
    pub const fn new(regs: [usize; 6]) -> Self {
        Self { regs }
    }

    /// Returns the raw register at `index`.
    pub fn get(&self, index: usize) -> usize {
        self.regs[index]
    }
}

/// Error returned by the dispatcher and handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Syscall number not present in the dispatch table.
    #[error("invalid syscall")]
    InvalidSyscall,
    /// No process is running on this CPU.
    #[error("no current process")]
    NoCurrent,
    /// Mailbox primitive failed.
    #[error("ipc: {0}")]
    Ipc(#[from] ipc::IpcError),
}

impl Error {
    /// Encodes the error as the negative value returned to user space.
    pub const fn to_errno(self) -> isize {
        match self {
            Self::InvalidSyscall => errno::E_NOSYS,
            Self::NoCurrent => errno::E_UNSPECIFIED,
            Self::Ipc(err) => match err {
                ipc::IpcError::BadTarget => errno::E_BAD_ENV,
                ipc::IpcError::NotReceiving => errno::E_IPC_NOT_RECV,
                ipc::IpcError::InvalidAddress | ipc::IpcError::InvalidArgument => errno::E_INVAL,
                ipc::IpcError::PermissionDenied => errno::E_PERM,
                ipc::IpcError::NoMemory => errno::E_NO_MEM,
            },
        }
    }
}

impl From<Error> for TransferError {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidSyscall => Self::Unsupported,
            Error::NoCurrent => Self::Unknown(errno::E_UNSPECIFIED),
            Error::Ipc(err) => err.into(),
        }
    }
}

/// Folds a handler result into the value placed in the caller's return register.
pub fn to_return_value(result: SysResult<usize>) -> isize {
    match result {
        Ok(value) => value as isize,
        Err(err) => err.to_errno(),
    }
}

/// Type alias for a syscall handler.
pub type Handler = fn(&mut api::Context<'_>, &Args) -> SysResult<usize>;

/// Dispatch table storing handlers by syscall number.
pub struct SyscallTable {
    handlers: [Option<Handler>; MAX_SYSCALL],
}

impl SyscallTable {
    /// Creates an empty dispatch table.
    pub const fn new() -> Self {
        const NONE: Option<Handler> = None;
        Self { handlers: [NONE; MAX_SYSCALL] }
    }

    /// Registers a handler.
    pub fn register(&mut self, number: usize, handler: Handler) {
        if number < MAX_SYSCALL {
            self.handlers[number] = Some(handler);
        }
    }

    /// Executes the handler referenced by `number`.
    #[must_use]
    pub fn dispatch(
        &self,
        number: usize,
        ctx: &mut api::Context<'_>,
        args: &Args,
    ) -> SysResult<usize> {
        self.handlers
            .get(number)
            .and_then(|entry| *entry)
            .ok_or(Error::InvalidSyscall)
            .and_then(|handler| handler(ctx, args))
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_matches_abi_decoding() {
        let cases = [
            (ipc::IpcError::BadTarget, TransferError::BadTarget),
            (ipc::IpcError::NotReceiving, TransferError::NotReceiving),
            (ipc::IpcError::InvalidAddress, TransferError::Invalid),
            (ipc::IpcError::InvalidArgument, TransferError::Invalid),
            (ipc::IpcError::PermissionDenied, TransferError::PermissionDenied),
            (ipc::IpcError::NoMemory, TransferError::NoMemory),
        ];
        for (kernel, user) in cases {
            let raw = Error::from(kernel).to_errno();
            assert_eq!(TransferError::decode(raw), Err(user));
            assert_eq!(TransferError::from(Error::from(kernel)), user);
        }
        assert_eq!(
            TransferError::decode(Error::InvalidSyscall.to_errno()),
            Err(TransferError::Unsupported)
        );
    }

    #[test]
    fn return_value_passes_success_through() {
        assert_eq!(to_return_value(Ok(5)), 5);
        assert_eq!(to_return_value(Err(Error::InvalidSyscall)), errno::E_NOSYS);
    }
}
