// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel mailbox primitives (post receive, single delivery attempt)
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests + proptest + threaded host harness (tests/host_ipc.rs)
//! PUBLIC API: post_recv, try_send, IpcError
//! DEPENDS_ON: task::ProcessTable, mm::PageService
//! INVARIANTS: A delivery consumes exactly one posted receive; the receiving check, page
//!             share and mailbox update all happen under the target's lock

use log::{debug, warn};

use crate::mm::{MapError, PageService};
use crate::task::{BlockReason, Mailbox, ProcessState, ProcessTable};
use crate::types::{Pid, VirtAddr};
use courier_abi::{Perm, TransferError};

/// Error returned by the mailbox primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Target process does not exist or has exited.
    #[error("bad target process")]
    BadTarget,
    /// Target has not posted a receive. Retryable.
    #[error("target not receiving")]
    NotReceiving,
    /// Receive destination is unaligned or outside user space.
    #[error("invalid receive destination")]
    InvalidAddress,
    /// Page address, permission bits or source mapping were rejected.
    #[error("invalid argument")]
    InvalidArgument,
    /// Write access requested for a page the sender maps read-only.
    #[error("permission denied")]
    PermissionDenied,
    /// Page service could not install the mapping.
    #[error("out of memory")]
    NoMemory,
}

impl From<MapError> for IpcError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::PermissionDenied => Self::PermissionDenied,
            MapError::NoMemory => Self::NoMemory,
            MapError::NotMapped | MapError::InvalidPerm | MapError::Unaligned => {
                Self::InvalidArgument
            }
        }
    }
}

impl From<IpcError> for TransferError {
    fn from(value: IpcError) -> Self {
        match value {
            IpcError::BadTarget => Self::BadTarget,
            IpcError::NotReceiving => Self::NotReceiving,
            IpcError::InvalidAddress | IpcError::InvalidArgument => Self::Invalid,
            IpcError::PermissionDenied => Self::PermissionDenied,
            IpcError::NoMemory => Self::NoMemory,
        }
    }
}

/// Posts a receive for `pid`, accepting a page at `dest` when given.
///
/// Overwrites any earlier receive that no sender consumed. The process is left
/// `Blocked(IpcRecv)`; the caller must switch away from it.
pub fn post_recv(tasks: &ProcessTable, pid: Pid, dest: Option<usize>) -> Result<(), IpcError> {
    let dest = match dest {
        Some(raw) => Some(VirtAddr::page_aligned(raw).ok_or(IpcError::InvalidAddress)?),
        None => None,
    };
    let proc = tasks.get(pid).ok_or(IpcError::BadTarget)?;
    let mut inner = proc.lock();
    if inner.state == ProcessState::Dead {
        return Err(IpcError::BadTarget);
    }
    inner.mailbox = Mailbox { receiving: true, dest, ..Mailbox::default() };
    inner.state = ProcessState::Blocked(BlockReason::IpcRecv);
    debug!(
        target: "ipc",
        "recv: pid={} posted dest={}",
        pid,
        dest.map_or(usize::MAX, VirtAddr::raw)
    );
    Ok(())
}

/// Attempts one delivery of `value` from `from` to `to`.
///
/// When `page` is given it must be mapped in `from`; it is shared into `to` only if the
/// receiver posted a destination, otherwise the value alone is delivered with an empty perm.
/// On success the target is `Runnable` again and the caller must wake it in the scheduler.
pub fn try_send(
    tasks: &ProcessTable,
    spaces: &dyn PageService,
    from: Pid,
    to: Pid,
    value: u32,
    page: Option<usize>,
    perm: Perm,
) -> Result<(), IpcError> {
    let target = tasks.get(to).ok_or(IpcError::BadTarget)?;
    let mut inner = target.lock();
    if inner.state == ProcessState::Dead {
        return Err(IpcError::BadTarget);
    }
    if !inner.mailbox.receiving {
        return Err(IpcError::NotReceiving);
    }

    let mut granted = Perm::empty();
    if let Some(raw) = page {
        let src_va = check_page(spaces, from, raw, perm).map_err(|err| {
            warn!(target: "ipc", "send: {} -> {} page {:#x} rejected: {}", from, to, raw, err);
            err
        })?;
        if let Some(dst_va) = inner.mailbox.dest {
            spaces.share(from, src_va, to, dst_va, perm)?;
            granted = perm;
        }
    }

    inner.mailbox.receiving = false;
    inner.mailbox.from = from;
    inner.mailbox.value = value;
    inner.mailbox.perm = granted;
    inner.state = ProcessState::Runnable;
    debug!(
        target: "ipc",
        "send: {} -> {} value={:#x} perm={:#x}",
        from,
        to,
        value,
        granted.bits()
    );
    Ok(())
}

fn check_page(
    spaces: &dyn PageService,
    from: Pid,
    raw: usize,
    perm: Perm,
) -> Result<VirtAddr, IpcError> {
    let va = VirtAddr::page_aligned(raw).ok_or(IpcError::InvalidArgument)?;
    if !perm.is_valid_transfer() {
        return Err(IpcError::InvalidArgument);
    }
    let source = spaces.lookup(from, va).ok_or(IpcError::InvalidArgument)?;
    if perm.contains(Perm::WRITE) && !source.perm.contains(Perm::WRITE) {
        return Err(IpcError::PermissionDenied);
    }
    Ok(va)
}
