// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Frame-pointer chain walker.
//!
//! Frame layout, one word per slot, growing upwards from the frame pointer `fp`:
//!
//! ```text
//! fp + 7*WORD ... caller's locals
//! fp + 2*WORD     arg 0 .. arg 4
//! fp +   WORD     return address
//! fp              saved frame pointer of the caller (0 in the outermost frame)
//! ```

use core::fmt;
use core::iter::FusedIterator;

use super::{DebugInfo, SourceLocation, StackView, ARG_WORDS, WORD};

/// One activation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub frame_pointer: usize,
    pub return_address: usize,
    /// Words at the argument slots; meaningless beyond the callee's real arity.
    pub args: [usize; ARG_WORDS],
    /// `None` when the return address resolved to nothing.
    pub location: Option<SourceLocation<'a>>,
}

impl Frame<'_> {
    /// Distance of the return address into its function; zero when unresolved.
    pub fn offset(&self) -> usize {
        self.location
            .map_or(0, |loc| self.return_address.wrapping_sub(loc.function_start))
    }
}

impl fmt::Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  fp {:08x} ra {:08x}  args", self.frame_pointer, self.return_address)?;
        for arg in self.args {
            write!(f, " {:08x}", arg)?;
        }
        let (file, line, function) = match self.location {
            Some(loc) => (loc.file, loc.line, loc.function),
            None => ("<unknown>", 0, "<unknown>"),
        };
        write!(f, "\n    {}:{}: {}+{}", file, line, function, self.offset())
    }
}

/// Frame-chain walker over a stack view and a resolver.
pub struct Unwinder<S, D> {
    stack: S,
    info: D,
}

impl<S: StackView, D: DebugInfo> Unwinder<S, D> {
    pub fn new(stack: S, info: D) -> Self {
        Self { stack, info }
    }

    /// Walks the chain starting at `frame_pointer`, innermost frame first.
    ///
    /// No return address is taken as input: every frame's return address, the first one
    /// included, is read from `fp + WORD` of that frame.
    ///
    /// The chain is trusted: a cycle never terminates and a garbage pointer yields garbage
    /// frames until a zero is read.
    pub fn walk(&self, frame_pointer: usize) -> Backtrace<'_, S, D> {
        Backtrace { unwinder: self, frame_pointer }
    }

    fn frame_at(&self, fp: usize) -> Frame<'_> {
        let slot = |index: usize| self.stack.read_word(fp.wrapping_add(index * WORD));
        let return_address = slot(1);
        let mut args = [0; ARG_WORDS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = slot(2 + i);
        }
        Frame {
            frame_pointer: fp,
            return_address,
            args,
            location: self.info.resolve(return_address),
        }
    }
}

/// Lazy iterator over [`Frame`]s. Cloning restarts from the same position.
pub struct Backtrace<'u, S, D> {
    unwinder: &'u Unwinder<S, D>,
    frame_pointer: usize,
}

impl<S, D> Clone for Backtrace<'_, S, D> {
    fn clone(&self) -> Self {
        Self { unwinder: self.unwinder, frame_pointer: self.frame_pointer }
    }
}

impl<'u, S: StackView, D: DebugInfo> Iterator for Backtrace<'u, S, D> {
    type Item = Frame<'u>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frame_pointer == 0 {
            return None;
        }
        let frame = self.unwinder.frame_at(self.frame_pointer);
        self.frame_pointer = self.unwinder.stack.read_word(self.frame_pointer);
        Some(frame)
    }
}

impl<S: StackView, D: DebugInfo> FusedIterator for Backtrace<'_, S, D> {}
