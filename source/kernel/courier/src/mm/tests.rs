// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Unit tests for the reference page service
//! OWNERS: @kernel-mm-team
//! NOTE: Tests only; verify alignment, perm validation, budget, share semantics

use super::{AddressSpaceManager, MapError, Mapping, PageService, PAGE_SIZE};
use crate::types::{Pid, VirtAddr};
use courier_abi::Perm;

fn va(addr: usize) -> VirtAddr {
    VirtAddr::page_aligned(addr).expect("aligned user address")
}

const P1: Pid = Pid::from_raw(1);
const P2: Pid = Pid::from_raw(2);

#[test]
fn rejects_unaligned_frames() {
    let spaces = AddressSpaceManager::new();
    assert_eq!(spaces.map(P1, va(0), 1, Perm::RW), Err(MapError::Unaligned));
}

#[test]
fn rejects_kernel_only_perm() {
    let spaces = AddressSpaceManager::new();
    assert_eq!(
        spaces.map(P1, va(0), 0, Perm::PRESENT | Perm::WRITE),
        Err(MapError::InvalidPerm)
    );
}

#[test]
fn share_keeps_source_mapping() {
    let spaces = AddressSpaceManager::new();
    spaces.map(P1, va(0x1000), 0x8000, Perm::RW).expect("map");
    spaces.share(P1, va(0x1000), P2, va(0x5000), Perm::RO).expect("share");
    assert_eq!(spaces.lookup(P1, va(0x1000)), Some(Mapping { pa: 0x8000, perm: Perm::RW }));
    assert_eq!(spaces.lookup(P2, va(0x5000)), Some(Mapping { pa: 0x8000, perm: Perm::RO }));
}

#[test]
fn share_refuses_write_upgrade() {
    let spaces = AddressSpaceManager::new();
    spaces.map(P1, va(0x1000), 0x8000, Perm::RO).expect("map");
    assert_eq!(
        spaces.share(P1, va(0x1000), P2, va(0x5000), Perm::RW),
        Err(MapError::PermissionDenied)
    );
    assert_eq!(spaces.lookup(P2, va(0x5000)), None);
}

#[test]
fn share_requires_source_page() {
    let spaces = AddressSpaceManager::new();
    assert_eq!(
        spaces.share(P1, va(0x1000), P2, va(0x5000), Perm::RO),
        Err(MapError::NotMapped)
    );
}

#[test]
fn budget_counts_distinct_pages() {
    let spaces = AddressSpaceManager::with_budget(2);
    spaces.map(P1, va(0), 0, Perm::RW).expect("first");
    spaces.map(P1, va(PAGE_SIZE), PAGE_SIZE, Perm::RW).expect("second");
    // Replacing an existing mapping does not consume budget.
    spaces.map(P1, va(0), 2 * PAGE_SIZE, Perm::RO).expect("replace");
    assert_eq!(spaces.map(P1, va(2 * PAGE_SIZE), 0, Perm::RW), Err(MapError::NoMemory));
    assert_eq!(spaces.mapped_pages(P1), 2);
    spaces.release(P1);
    assert_eq!(spaces.mapped_pages(P1), 0);
}
