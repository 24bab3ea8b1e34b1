// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: User-level mailbox routines built on the kernel transfer primitives
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests (mock transport) + kernel host harness
//!
//! Sending spins with a cooperative yield until the target has posted a receive. There
//! is no timeout and no backoff: a target that never receives keeps the sender retrying.

use log::{debug, error, trace};

use crate::{Perm, Pid, Received, TransferError};

/// Kernel transfer primitives consumed by the mailbox routines.
pub trait Transport {
    /// Attempts one delivery of `value` (and `page` with `perm`, when present) to `to`.
    fn try_send(
        &self,
        to: Pid,
        value: u32,
        page: Option<usize>,
        perm: Perm,
    ) -> Result<(), TransferError>;

    /// Posts a receive accepting a page at `dest` and returns once a sender has delivered.
    fn post_receive(&self, dest: Option<usize>) -> Result<Received, TransferError>;

    /// Relinquishes the processor; control eventually returns to the caller.
    fn yield_now(&self);
}

/// Receive failed before suspending; the mailbox was left unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("ipc recv error: {0}")]
pub struct RecvError(pub TransferError);

/// Delivery failed with an error other than "not receiving".
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("ipc send error: {error}, target: {target}")]
pub struct SendError {
    /// Process the send was addressed to.
    pub target: Pid,
    /// Non-retryable failure reported by the kernel.
    pub error: TransferError,
}

/// Receives one message, mapping any transferred page at `dest`.
///
/// With `dest == None` no page is accepted and the returned `perm` is always empty.
pub fn ipc_recv<T: Transport + ?Sized>(
    transport: &T,
    dest: Option<usize>,
) -> Result<Received, RecvError> {
    let mut received = transport.post_receive(dest).map_err(RecvError)?;
    if dest.is_none() {
        received.perm = Perm::empty();
    }
    debug!(
        target: "ipc",
        "recv: value={:#x} from={} perm={:#x}",
        received.value,
        received.from,
        received.perm.bits()
    );
    Ok(received)
}

/// Delivers `value` (and `page` with `perm`) to `to`, retrying while the target is not
/// receiving. Any other failure is returned.
pub fn try_ipc_send<T: Transport + ?Sized>(
    transport: &T,
    to: Pid,
    value: u32,
    page: Option<usize>,
    perm: Perm,
) -> Result<(), SendError> {
    loop {
        match transport.try_send(to, value, page, perm) {
            Ok(()) => return Ok(()),
            Err(TransferError::NotReceiving) => {
                trace!(target: "ipc", "send: pid={} not receiving, yielding", to);
                transport.yield_now();
            }
            Err(error) => return Err(SendError { target: to, error }),
        }
    }
}

/// Delivers `value` (and `page` with `perm`) to `to`.
///
/// Returns only once the delivery succeeded.
///
/// # Panics
///
/// Panics on any failure other than the target not receiving yet; those are kernel faults
/// this protocol cannot repair.
pub fn ipc_send<T: Transport + ?Sized>(
    transport: &T,
    to: Pid,
    value: u32,
    page: Option<usize>,
    perm: Perm,
) {
    if let Err(err) = try_ipc_send(transport, to, value, page, perm) {
        error!(target: "ipc", "{}", err);
        panic!("{}", err);
    }
}

/// Sends `request` to `server` and waits for its reply.
///
/// `page` optionally shares a request page with the given permission; `reply_dest` is where
/// a reply page may be mapped. The reply value is returned as a signed status so servers
/// can answer with negative error codes.
pub fn ipc_call<T: Transport + ?Sized>(
    transport: &T,
    server: Pid,
    request: u32,
    page: Option<(usize, Perm)>,
    reply_dest: Option<usize>,
) -> Result<(i32, Received), RecvError> {
    let (va, perm) = match page {
        Some((va, perm)) => (Some(va), perm),
        None => (None, Perm::empty()),
    };
    ipc_send(transport, server, request, va, perm);
    let reply = ipc_recv(transport, reply_dest)?;
    Ok((reply.value as i32, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::vec::Vec;

    /// Scripted transport: replays send outcomes in order and counts yields.
    struct Scripted {
        sends: RefCell<Vec<Result<(), TransferError>>>,
        attempts: Cell<usize>,
        yields: Cell<usize>,
        reply: Result<Received, TransferError>,
    }

    impl Scripted {
        fn new(mut sends: Vec<Result<(), TransferError>>) -> Self {
            sends.reverse();
            Self {
                sends: RefCell::new(sends),
                attempts: Cell::new(0),
                yields: Cell::new(0),
                reply: Ok(Received::default()),
            }
        }

        fn not_receiving_then_ok(n: usize) -> Self {
            let mut script = vec![Err(TransferError::NotReceiving); n];
            script.push(Ok(()));
            Self::new(script)
        }
    }

    impl Transport for Scripted {
        fn try_send(&self, _: Pid, _: u32, _: Option<usize>, _: Perm) -> Result<(), TransferError> {
            self.attempts.set(self.attempts.get() + 1);
            self.sends.borrow_mut().pop().unwrap_or(Err(TransferError::Unknown(-99)))
        }

        fn post_receive(&self, _: Option<usize>) -> Result<Received, TransferError> {
            self.reply
        }

        fn yield_now(&self) {
            self.yields.set(self.yields.get() + 1);
        }
    }

    #[test]
    fn yields_once_per_not_receiving() {
        for n in [0usize, 1, 7, 100] {
            let transport = Scripted::not_receiving_then_ok(n);
            ipc_send(&transport, Pid::from_raw(2), 5, None, Perm::empty());
            assert_eq!(transport.yields.get(), n);
            assert_eq!(transport.attempts.get(), n + 1);
        }
    }

    #[test]
    fn fatal_error_is_returned_without_yielding() {
        let transport = Scripted::new(vec![
            Err(TransferError::NotReceiving),
            Err(TransferError::BadTarget),
            Ok(()),
        ]);
        let err = try_ipc_send(&transport, Pid::from_raw(9), 1, None, Perm::empty()).unwrap_err();
        assert_eq!(err, SendError { target: Pid::from_raw(9), error: TransferError::BadTarget });
        assert_eq!(transport.yields.get(), 1);
        assert_eq!(transport.attempts.get(), 2);
    }

    #[test]
    #[should_panic(expected = "ipc send error: out of memory, target: 3")]
    fn send_aborts_on_fatal_error() {
        let transport = Scripted::new(vec![Err(TransferError::NoMemory)]);
        ipc_send(&transport, Pid::from_raw(3), 1, Some(0x1000), Perm::RW);
    }

    #[test]
    fn recv_without_destination_reports_no_perm() {
        let mut transport = Scripted::new(Vec::new());
        transport.reply = Ok(Received { value: 11, from: Pid::from_raw(4), perm: Perm::RW });
        let received = ipc_recv(&transport, None).unwrap();
        assert_eq!(received.value, 11);
        assert_eq!(received.from, Pid::from_raw(4));
        assert_eq!(received.perm, Perm::empty());
    }

    #[test]
    fn recv_failure_is_not_fatal() {
        let mut transport = Scripted::new(Vec::new());
        transport.reply = Err(TransferError::Invalid);
        assert_eq!(ipc_recv(&transport, Some(0x1001)), Err(RecvError(TransferError::Invalid)));
    }

    #[test]
    fn call_returns_signed_reply() {
        let mut transport = Scripted::not_receiving_then_ok(2);
        transport.reply =
            Ok(Received { value: (-4i32) as u32, from: Pid::from_raw(1), perm: Perm::empty() });
        let (status, reply) =
            ipc_call(&transport, Pid::from_raw(1), 3, Some((0x2000, Perm::RW)), None).unwrap();
        assert_eq!(status, -4);
        assert_eq!(reply.from, Pid::from_raw(1));
        assert_eq!(transport.yields.get(), 2);
    }
}
