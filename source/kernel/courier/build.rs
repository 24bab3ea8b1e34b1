// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::{env, fmt::Write as _, fs, path::PathBuf};

// Emits `trap_symbols.rs` from the file named by COURIER_SYMBOLS.
// Line format: `<start-hex> <size-hex> <function> <file> <line>`; `#` starts a comment.
fn main() {
    println!("cargo:rerun-if-env-changed=COURIER_SYMBOLS");
    let mut entries: Vec<(usize, usize, String, String, u32)> = Vec::new();
    if let Ok(path) = env::var("COURIER_SYMBOLS") {
        println!("cargo:rerun-if-changed={path}");
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                println!("cargo:warning=cannot read COURIER_SYMBOLS file {path}: {err}; symbol table left empty");
                String::new()
            }
        };
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [start, size, name, file, line_no] = fields[..] else {
                println!("cargo:warning=skipping malformed symbol line: {line}");
                continue;
            };
            let (Ok(start), Ok(size), Ok(line_no)) = (
                usize::from_str_radix(start.trim_start_matches("0x"), 16),
                usize::from_str_radix(size.trim_start_matches("0x"), 16),
                line_no.parse::<u32>(),
            ) else {
                println!("cargo:warning=skipping malformed symbol line: {line}");
                continue;
            };
            entries.push((start, size, name.to_string(), file.to_string(), line_no));
        }
    }
    entries.sort_by_key(|e| e.0);

    let mut out = String::from("pub static TRAP_SYMBOLS: &[(usize, usize, &str, &str, u32)] = &[\n");
    for (start, size, name, file, line) in &entries {
        let _ = writeln!(out, "    ({start:#x}, {size:#x}, {name:?}, {file:?}, {line}),");
    }
    out.push_str("];\n");

    let dest = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| ".".into())).join("trap_symbols.rs");
    if let Err(err) = fs::write(&dest, out) {
        panic!("failed to write {}: {err}", dest.display());
    }
}
