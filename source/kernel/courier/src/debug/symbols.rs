// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Code address to source location lookup.

extern crate alloc;

use alloc::borrow::Cow;
use alloc::string::ToString;
use alloc::vec::Vec;

use super::FN_NAME_MAX;

/// Where a code address comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    pub line: u32,
    /// Function name, at most [`FN_NAME_MAX`] bytes.
    pub function: &'a str,
    /// Address of the function's first instruction.
    pub function_start: usize,
}

/// Debug-info resolver consumed by the unwinder.
pub trait DebugInfo {
    /// Returns the location of `addr`, or `None` when nothing covers it.
    fn resolve(&self, addr: usize) -> Option<SourceLocation<'_>>;
}

impl<T: DebugInfo + ?Sized> DebugInfo for &T {
    fn resolve(&self, addr: usize) -> Option<SourceLocation<'_>> {
        (**self).resolve(addr)
    }
}

/// One function in a [`SymbolTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub start: usize,
    /// Length in bytes; zero means the extent is unknown and the symbol covers everything
    /// up to the next one.
    pub size: usize,
    pub name: Cow<'static, str>,
    pub file: Cow<'static, str>,
    pub line: u32,
}

/// Error returned by [`SymbolTable::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: expected `<start> <size> <function> <file> <line>`")]
    FieldCount { line: usize },
    #[error("line {line}: bad number")]
    Number { line: usize },
}

/// Symbols sorted by start address, resolved by nearest-preceding lookup.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

#[cfg(feature = "trap_symbols")]
#[allow(dead_code)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/trap_symbols.rs"));
}
#[cfg(not(feature = "trap_symbols"))]
mod generated {
    pub static TRAP_SYMBOLS: &[(usize, usize, &str, &str, u32)] = &[];
}

impl SymbolTable {
    pub const fn new() -> Self {
        Self { symbols: Vec::new() }
    }

    /// Builds a table from symbols in any order.
    pub fn from_symbols<I: IntoIterator<Item = Symbol>>(symbols: I) -> Self {
        let mut symbols: Vec<Symbol> = symbols.into_iter().collect();
        symbols.sort_by_key(|sym| sym.start);
        Self { symbols }
    }

    /// The table linked into the kernel image by the `trap_symbols` feature.
    ///
    /// Empty when the feature is off, so every address resolves to unknown.
    pub fn kernel() -> Self {
        Self::from_symbols(generated::TRAP_SYMBOLS.iter().map(|&(start, size, name, file, line)| {
            Symbol {
                start,
                size,
                name: Cow::Borrowed(name),
                file: Cow::Borrowed(file),
                line,
            }
        }))
    }

    /// Parses `<start-hex> <size-hex> <function> <file> <line>` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut symbols = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let mut fields = raw.split_whitespace();
            let (Some(start), Some(size), Some(name), Some(file), Some(line_no), None) = (
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
            ) else {
                return Err(ParseError::FieldCount { line });
            };
            let hex = |field: &str| usize::from_str_radix(field.trim_start_matches("0x"), 16);
            let (Ok(start), Ok(size), Ok(line_no)) = (hex(start), hex(size), line_no.parse::<u32>())
            else {
                return Err(ParseError::Number { line });
            };
            symbols.push(Symbol {
                start,
                size,
                name: Cow::Owned(name.to_string()),
                file: Cow::Owned(file.to_string()),
                line: line_no,
            });
        }
        Ok(Self::from_symbols(symbols))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn nearest(&self, addr: usize) -> Option<&Symbol> {
        let index = self.symbols.partition_point(|sym| sym.start <= addr);
        let sym = self.symbols.get(index.checked_sub(1)?)?;
        if sym.size != 0 && addr - sym.start >= sym.size {
            return None;
        }
        Some(sym)
    }
}

impl DebugInfo for SymbolTable {
    fn resolve(&self, addr: usize) -> Option<SourceLocation<'_>> {
        self.nearest(addr).map(|sym| SourceLocation {
            file: &sym.file,
            line: sym.line,
            function: bounded_name(&sym.name),
            function_start: sym.start,
        })
    }
}

fn bounded_name(name: &str) -> &str {
    if name.len() <= FN_NAME_MAX {
        return name;
    }
    let mut end = FN_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
