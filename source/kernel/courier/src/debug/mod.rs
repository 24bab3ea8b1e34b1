// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Frame-pointer stack unwinder and debug-info lookup for the kernel monitor
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (synthetic stacks, host memory via RawStack)
//! PUBLIC API: Unwinder, Backtrace, Frame, StackView, SliceStack, RawStack, DebugInfo,
//!             SourceLocation, SymbolTable, monitor::{print_backtrace, backtrace}
//! DEPENDS_ON: log
//! INVARIANTS: A walk ends at frame pointer zero; every frame reports ARG_WORDS arguments;
//!             live memory is read only through RawStack

pub mod monitor;
mod stack;
mod symbols;
mod unwind;

pub use stack::{RawStack, SliceStack, StackView};
pub use symbols::{DebugInfo, ParseError, SourceLocation, Symbol, SymbolTable};
pub use unwind::{Backtrace, Frame, Unwinder};

/// Size of one stack slot.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Argument slots reported per frame, whatever the callee's real arity.
pub const ARG_WORDS: usize = 5;

/// Longest function name reported by a resolver, in bytes.
pub const FN_NAME_MAX: usize = 64;
