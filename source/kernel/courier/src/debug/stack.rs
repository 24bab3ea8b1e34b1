// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Word-granular read access to stack memory.

use core::ops::Range;

use super::WORD;

/// Source of stack words for the unwinder.
///
/// Reads never fail: an address the view cannot serve reads as zero, which the unwinder
/// treats as the end of the frame chain.
pub trait StackView {
    fn read_word(&self, addr: usize) -> usize;
}

impl<T: StackView + ?Sized> StackView for &T {
    fn read_word(&self, addr: usize) -> usize {
        (**self).read_word(addr)
    }
}

/// Stack image held in a slice, mapped at `base`.
#[derive(Clone, Copy, Debug)]
pub struct SliceStack<'a> {
    base: usize,
    words: &'a [usize],
}

impl<'a> SliceStack<'a> {
    pub const fn new(base: usize, words: &'a [usize]) -> Self {
        Self { base, words }
    }

    /// Address one past the last word of the image.
    pub fn end(&self) -> usize {
        self.base + self.words.len() * WORD
    }
}

impl StackView for SliceStack<'_> {
    fn read_word(&self, addr: usize) -> usize {
        let Some(offset) = addr.checked_sub(self.base) else {
            return 0;
        };
        if offset % WORD != 0 {
            return 0;
        }
        self.words.get(offset / WORD).copied().unwrap_or(0)
    }
}

/// Live memory inside a fixed address range.
#[derive(Clone, Debug)]
pub struct RawStack {
    bounds: Range<usize>,
}

impl RawStack {
    /// Creates a view of the memory in `bounds`.
    ///
    /// # Safety
    ///
    /// Every address in `bounds` must be readable for as long as the view is used. The
    /// contents are not validated; a corrupted frame chain produces garbage frames.
    pub unsafe fn new(bounds: Range<usize>) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &Range<usize> {
        &self.bounds
    }
}

impl StackView for RawStack {
    fn read_word(&self, addr: usize) -> usize {
        let end = match addr.checked_add(WORD) {
            Some(end) if addr >= self.bounds.start && end <= self.bounds.end => end,
            _ => return 0,
        };
        debug_assert!(end > addr);
        // SAFETY: `addr..end` lies inside `bounds`, which the constructor's caller
        // guaranteed to be readable.
        unsafe { core::ptr::read_unaligned(addr as *const usize) }
    }
}
