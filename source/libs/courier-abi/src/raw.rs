// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Adapter from the raw syscall ABI to [`Transport`].

use crate::{
    encode_page, Perm, Pid, Received, TransferError, Transport, SYSCALL_GETPID,
    SYSCALL_IPC_RECV, SYSCALL_IPC_TRY_SEND, SYSCALL_YIELD,
};

/// Raw kernel entry used by [`RawTransport`].
pub trait Syscalls {
    /// Issues syscall `number` with up to four register arguments.
    fn syscall(&self, number: usize, args: [usize; 4]) -> isize;

    /// Reads the caller's mailbox as published by the kernel after a receive resumes.
    fn mailbox(&self) -> Received;
}

/// [`Transport`] that packs each primitive into the syscall registers.
pub struct RawTransport<S> {
    sys: S,
}

impl<S: Syscalls> RawTransport<S> {
    /// Wraps a raw syscall entry.
    pub const fn new(sys: S) -> Self {
        Self { sys }
    }

    /// Returns the caller's process id.
    pub fn getpid(&self) -> Result<Pid, TransferError> {
        let raw = TransferError::decode(self.sys.syscall(SYSCALL_GETPID, [0; 4]))?;
        Ok(Pid::from_raw(raw as u32))
    }

    /// Returns the wrapped syscall entry.
    pub fn inner(&self) -> &S {
        &self.sys
    }
}

impl<S: Syscalls> Transport for RawTransport<S> {
    fn try_send(
        &self,
        to: Pid,
        value: u32,
        page: Option<usize>,
        perm: Perm,
    ) -> Result<(), TransferError> {
        let args = [to.as_index(), value as usize, encode_page(page), perm.bits() as usize];
        TransferError::decode(self.sys.syscall(SYSCALL_IPC_TRY_SEND, args)).map(|_| ())
    }

    fn post_receive(&self, dest: Option<usize>) -> Result<Received, TransferError> {
        TransferError::decode(self.sys.syscall(SYSCALL_IPC_RECV, [encode_page(dest), 0, 0, 0]))?;
        Ok(self.sys.mailbox())
    }

    fn yield_now(&self) {
        let _ = self.sys.syscall(SYSCALL_YIELD, [0; 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errno, ipc_recv, ipc_send, NO_PAGE};
    use std::cell::RefCell;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(usize, [usize; 4])>>,
        not_recv_budget: RefCell<usize>,
    }

    impl Syscalls for Recorder {
        fn syscall(&self, number: usize, args: [usize; 4]) -> isize {
            self.calls.borrow_mut().push((number, args));
            match number {
                SYSCALL_IPC_TRY_SEND => {
                    let mut budget = self.not_recv_budget.borrow_mut();
                    if *budget > 0 {
                        *budget -= 1;
                        errno::E_IPC_NOT_RECV
                    } else {
                        0
                    }
                }
                SYSCALL_IPC_RECV if args[0] % crate::PAGE_SIZE != 0 && args[0] != NO_PAGE => {
                    errno::E_INVAL
                }
                SYSCALL_GETPID => 6,
                _ => 0,
            }
        }

        fn mailbox(&self) -> Received {
            Received { value: 0xfeed, from: Pid::from_raw(2), perm: Perm::empty() }
        }
    }

    #[test]
    fn send_packs_registers_and_yields_between_attempts() {
        let transport = RawTransport::new(Recorder::default());
        *transport.inner().not_recv_budget.borrow_mut() = 2;
        ipc_send(&transport, Pid::from_raw(5), 77, None, Perm::empty());
        let calls = transport.inner().calls.borrow();
        let numbers: Vec<usize> = calls.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            numbers,
            [
                SYSCALL_IPC_TRY_SEND,
                SYSCALL_YIELD,
                SYSCALL_IPC_TRY_SEND,
                SYSCALL_YIELD,
                SYSCALL_IPC_TRY_SEND
            ]
        );
        assert_eq!(calls[0].1, [5, 77, NO_PAGE, 0]);
    }

    #[test]
    fn recv_reads_published_mailbox() {
        let transport = RawTransport::new(Recorder::default());
        let received = ipc_recv(&transport, None).unwrap();
        assert_eq!(received.value, 0xfeed);
        assert_eq!(transport.inner().calls.borrow()[0], (SYSCALL_IPC_RECV, [NO_PAGE, 0, 0, 0]));
    }

    #[test]
    fn recv_rejects_unaligned_destination() {
        let transport = RawTransport::new(Recorder::default());
        let err = ipc_recv(&transport, Some(0x1234)).unwrap_err();
        assert_eq!(err.0, TransferError::Invalid);
    }

    #[test]
    fn getpid_decodes_return_value() {
        let transport = RawTransport::new(Recorder::default());
        assert_eq!(transport.getpid(), Ok(Pid::from_raw(6)));
    }
}
