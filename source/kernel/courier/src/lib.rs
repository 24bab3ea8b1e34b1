// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel core for single-slot mailbox IPC and the monitor backtrace
//! OWNERS: @kernel-team
//! PUBLIC API: task::ProcessTable, ipc::{post_recv, try_send}, sched::Scheduler,
//!             mm::{PageService, AddressSpaceManager}, syscall::{SyscallTable, api},
//!             debug::{Unwinder, StackView, DebugInfo, SymbolTable, monitor}
//! DEPENDS_ON: courier-abi (shared ABI), spin (per-process locks), log
//! INVARIANTS: One pending receive per process; a send completes only against a posted
//!             receive; raw stack reads confined to debug::stack::RawStack

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::unwrap_used)]

extern crate alloc;

pub mod debug;
pub mod ipc;
pub mod mm;
pub mod sched;
pub mod syscall;
pub mod task;
pub mod types;

pub use courier_abi::{Perm, Pid, Received};
