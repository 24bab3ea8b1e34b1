// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Page mapping service consumed by mailbox page transfers
//! OWNERS: @kernel-mm-team
//! PUBLIC API: PageService (lookup/share), AddressSpaceManager, Mapping, MapError
//! DEPENDS_ON: types::VirtAddr, courier_abi::Perm, spin
//! INVARIANTS: A shared mapping never carries WRITE unless the source mapping does;
//!             sharing leaves the source mapping untouched; per-process page budget

extern crate alloc;

use alloc::collections::BTreeMap;

use log::debug;
use spin::Mutex;

use crate::types::{Pid, VirtAddr};
use courier_abi::Perm;

pub use courier_abi::PAGE_SIZE;

/// Pages a process may have mapped in the reference service unless configured otherwise.
pub const DEFAULT_PAGE_BUDGET: usize = 256;

/// Physical page backing a user mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Physical address of the page frame.
    pub pa: usize,
    /// Permission bits installed for the mapping.
    pub perm: Perm,
}

/// Error returned by mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// Physical address is not page aligned.
    #[error("unaligned page")]
    Unaligned,
    /// Permission bits are not acceptable for a user mapping.
    #[error("invalid permission bits")]
    InvalidPerm,
    /// Requested permission exceeds the source mapping.
    #[error("permission exceeds source mapping")]
    PermissionDenied,
    /// Source address has no mapping.
    #[error("source page not mapped")]
    NotMapped,
    /// Destination process exhausted its page budget.
    #[error("out of memory")]
    NoMemory,
}

/// Page-table service used by the IPC path.
///
/// Implementations own their synchronisation; both calls take `&self`.
pub trait PageService {
    /// Returns the mapping installed at `va` in `pid`, if any.
    fn lookup(&self, pid: Pid, va: VirtAddr) -> Option<Mapping>;

    /// Maps the page backing `src_va` in `from` at `dst_va` in `to` with `perm`.
    ///
    /// Must refuse `perm` containing `WRITE` when the source mapping is read-only.
    fn share(
        &self,
        from: Pid,
        src_va: VirtAddr,
        to: Pid,
        dst_va: VirtAddr,
        perm: Perm,
    ) -> Result<(), MapError>;
}

/// In-memory page service keyed by `(pid, va)`.
pub struct AddressSpaceManager {
    budget: usize,
    inner: Mutex<BTreeMap<(Pid, VirtAddr), Mapping>>,
}

impl AddressSpaceManager {
    /// Creates a manager with [`DEFAULT_PAGE_BUDGET`] pages per process.
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_PAGE_BUDGET)
    }

    /// Creates a manager allowing `pages` mappings per process.
    pub fn with_budget(pages: usize) -> Self {
        Self { budget: pages, inner: Mutex::new(BTreeMap::new()) }
    }

    /// Installs `pa` at `va` in `pid`, replacing any previous mapping at `va`.
    pub fn map(&self, pid: Pid, va: VirtAddr, pa: usize, perm: Perm) -> Result<(), MapError> {
        if pa % PAGE_SIZE != 0 {
            return Err(MapError::Unaligned);
        }
        if !perm.is_valid_transfer() {
            return Err(MapError::InvalidPerm);
        }
        let mut spaces = self.inner.lock();
        if !spaces.contains_key(&(pid, va)) && Self::count(&spaces, pid) >= self.budget {
            return Err(MapError::NoMemory);
        }
        spaces.insert((pid, va), Mapping { pa, perm });
        Ok(())
    }

    /// Removes the mapping at `va` in `pid`, returning it.
    pub fn unmap(&self, pid: Pid, va: VirtAddr) -> Option<Mapping> {
        self.inner.lock().remove(&(pid, va))
    }

    /// Drops every mapping owned by `pid`.
    pub fn release(&self, pid: Pid) {
        self.inner.lock().retain(|(owner, _), _| *owner != pid);
    }

    /// Number of pages mapped in `pid`.
    pub fn mapped_pages(&self, pid: Pid) -> usize {
        Self::count(&self.inner.lock(), pid)
    }

    fn count(spaces: &BTreeMap<(Pid, VirtAddr), Mapping>, pid: Pid) -> usize {
        spaces.keys().filter(|(owner, _)| *owner == pid).count()
    }
}

impl Default for AddressSpaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageService for AddressSpaceManager {
    fn lookup(&self, pid: Pid, va: VirtAddr) -> Option<Mapping> {
        self.inner.lock().get(&(pid, va)).copied()
    }

    fn share(
        &self,
        from: Pid,
        src_va: VirtAddr,
        to: Pid,
        dst_va: VirtAddr,
        perm: Perm,
    ) -> Result<(), MapError> {
        let source = self.lookup(from, src_va).ok_or(MapError::NotMapped)?;
        if perm.contains(Perm::WRITE) && !source.perm.contains(Perm::WRITE) {
            return Err(MapError::PermissionDenied);
        }
        self.map(to, dst_va, source.pa, perm)?;
        debug!(
            target: "mm",
            "share: pa={:#x} {}@{} -> {}@{} perm={:#x}",
            source.pa,
            from,
            src_va,
            to,
            dst_va,
            perm.bits()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests;
