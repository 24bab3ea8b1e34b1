// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes for decoded syscall arguments
//! OWNERS: @kernel-team
//! PUBLIC API: VirtAddr, Pid (re-export)
//! INVARIANTS: A VirtAddr handed to the IPC path is page aligned and below UTOP

use core::fmt;

use courier_abi::{PAGE_SIZE, UTOP};

pub use courier_abi::Pid;

/// Page-aligned user virtual address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Accepts `addr` if it lies below [`UTOP`].
    #[inline]
    pub fn new(addr: usize) -> Option<Self> {
        if addr < UTOP {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Accepts `addr` if it lies below [`UTOP`] and is page aligned.
    #[inline]
    pub fn page_aligned(addr: usize) -> Option<Self> {
        Self::new(addr).filter(|va| va.0 % PAGE_SIZE == 0)
    }

    #[inline]
    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
