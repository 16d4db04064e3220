//! Builds the address -> (file, symbol, instruction) index by running the
//! external objdump over every supplied binary.

use lazy_static::lazy_static;
use regex::Regex;
use std::{
    collections::HashMap,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use thiserror::Error;
use tracing::{debug, warn};

const OBJDUMP: &str = "riscv32-unknown-elf-objdump";

#[derive(Error, Debug)]
pub enum DisasmError {
    #[error("bad offset {offset:?} in {arg:?}")]
    BadOffset {
        arg: String,
        offset: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to launch {0}")]
    Launch(String, #[source] std::io::Error),
    #[error("{0} failed with {1}")]
    Objdump(String, std::process::ExitStatus),
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// One `-e path[:offset]` argument, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSpec {
    pub path: String,
    pub offset: i64,
}

impl ElfSpec {
    /// Splits on the first colon; the offset takes any integer literal base
    /// (`0x`, `0o`, `0b` or decimal) and defaults to 0.
    pub fn parse(arg: &str) -> Result<Self, DisasmError> {
        match arg.split_once(':') {
            Some((path, offset)) => {
                let parsed = parse_int(offset).map_err(|source| DisasmError::BadOffset {
                    arg: arg.to_string(),
                    offset: offset.to_string(),
                    source,
                })?;
                Ok(Self {
                    path: path.to_string(),
                    offset: parsed,
                })
            }
            None => Ok(Self {
                path: arg.to_string(),
                offset: 0,
            }),
        }
    }

    fn basename(&self) -> String {
        Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone())
    }
}

fn parse_int(text: &str) -> Result<i64, std::num::ParseIntError> {
    let text = text.trim();
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text),
    };

    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)?
    } else if let Some(oct) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8)?
    } else if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)?
    } else {
        rest.parse()?
    };

    Ok(sign * value)
}

/// Where the disassembler lives: `$RISCV/bin/` when the toolchain env var is
/// set, otherwise resolved through PATH.
fn objdump_bin() -> PathBuf {
    match std::env::var("RISCV") {
        Ok(prefix) => Path::new(&prefix).join("bin").join(OBJDUMP),
        Err(_) => PathBuf::from(OBJDUMP),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmEntry {
    /// basename of the binary the instruction came from
    pub file: String,
    /// symbol text as printed by objdump, `<>` included
    pub symbol: String,
    pub insn: String,
}

/// Address-keyed disassembly, built once and read-only while the trace is
/// being formatted.
#[derive(Debug, Default)]
pub struct DisasmIndex {
    entries: HashMap<u64, DisasmEntry>,
    duplicates: usize,
}

impl DisasmIndex {
    /// Disassembles every binary and indexes the output. `numeric` and
    /// `no_aliases` are forwarded to objdump as `-M` options.
    pub fn build(elfs: &[ElfSpec], numeric: bool, no_aliases: bool) -> Result<Self, DisasmError> {
        let mut index = Self::default();
        for spec in elfs {
            index.add_elf(spec, numeric, no_aliases)?;
        }
        Ok(index)
    }

    fn add_elf(&mut self, spec: &ElfSpec, numeric: bool, no_aliases: bool) -> Result<(), DisasmError> {
        let objdump = objdump_bin();

        let mut cmd = Command::new(&objdump);
        cmd.args(["-d", "--prefix-addresses", "-C"]);
        if numeric {
            cmd.args(["-M", "numeric"]);
        }
        if no_aliases {
            cmd.args(["-M", "no-aliases"]);
        }
        cmd.arg(&spec.path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());

        debug!("running {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| DisasmError::Launch(objdump.display().to_string(), e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DisasmError::Launch(
                objdump.display().to_string(),
                std::io::Error::other("no stdout pipe"),
            )
        })?;

        let file = spec.basename();
        for line in BufReader::new(stdout).lines() {
            self.add_line(&line?, &file, spec.offset);
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(DisasmError::Objdump(objdump.display().to_string(), status));
        }

        Ok(())
    }

    /// Indexes one objdump output line. Lines that don't look like
    /// `<addr> <symbol> <insn>` (banners, section headings) are skipped.
    fn add_line(&mut self, line: &str, file: &str, offset: i64) {
        lazy_static! {
            static ref DIS: Regex =
                Regex::new(r"^\s*([0-9a-fA-F]+)\s+(<[^>]*>)\s+(.+)$").unwrap();
        }

        let caps = match DIS.captures(line) {
            Some(caps) => caps,
            None => return,
        };

        let address = match u64::from_str_radix(&caps[1], 16) {
            Ok(address) => address,
            Err(_) => return,
        };
        let address = address.wrapping_add(offset as u64);

        self.insert(
            address,
            DisasmEntry {
                file: file.to_string(),
                symbol: caps[2].to_string(),
                insn: caps[3].replace('\t', " ").trim().to_string(),
            },
        );
    }

    /// Later entries win on address collisions; collisions are warned about
    /// and counted.
    pub fn insert(&mut self, address: u64, entry: DisasmEntry) {
        let file = entry.file.clone();
        if let Some(old) = self.entries.insert(address, entry) {
            self.duplicates += 1;
            warn!(
                "duplicate disassembly at {:08x}: {} overwrites {}",
                address, file, old.file
            );
        }
    }

    pub fn lookup(&self, address: u64) -> Option<&DisasmEntry> {
        self.entries.get(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many addresses were overwritten while building the index.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_int, DisasmEntry, DisasmIndex, ElfSpec};

    #[test]
    fn elf_spec_plain() {
        let spec = ElfSpec::parse("build/rot.elf").unwrap();
        assert_eq!(spec.path, "build/rot.elf");
        assert_eq!(spec.offset, 0);
        assert_eq!(spec.basename(), "rot.elf");
    }

    #[test]
    fn elf_spec_offsets() {
        assert_eq!(ElfSpec::parse("a.elf:0x100").unwrap().offset, 0x100);
        assert_eq!(ElfSpec::parse("a.elf:256").unwrap().offset, 256);
        assert_eq!(ElfSpec::parse("a.elf:0b101").unwrap().offset, 5);
        assert_eq!(ElfSpec::parse("a.elf:-4").unwrap().offset, -4);
    }

    #[test]
    fn elf_spec_bad_offset() {
        assert!(ElfSpec::parse("a.elf:nope").is_err());
    }

    #[test]
    fn int_bases() {
        assert_eq!(parse_int("0x20").unwrap(), 32);
        assert_eq!(parse_int("0o20").unwrap(), 16);
        assert_eq!(parse_int("0b100").unwrap(), 4);
        assert_eq!(parse_int("20").unwrap(), 20);
        assert_eq!(parse_int("-0x10").unwrap(), -16);
    }

    #[test]
    fn parses_objdump_lines() {
        let mut index = DisasmIndex::default();

        index.add_line("00010074 <main> addi\tsp,sp,-32", "rot.elf", 0);
        index.add_line("00010078 <main+0x4> sw\tra,28(sp)", "rot.elf", 0);
        // banner and section lines must not match
        index.add_line("rot.elf:     file format elf32-littleriscv", "rot.elf", 0);
        index.add_line("Disassembly of section .text:", "rot.elf", 0);
        index.add_line("", "rot.elf", 0);

        assert_eq!(index.len(), 2);
        let entry = index.lookup(0x10074).unwrap();
        assert_eq!(entry.file, "rot.elf");
        assert_eq!(entry.symbol, "<main>");
        assert_eq!(entry.insn, "addi sp,sp,-32");
    }

    #[test]
    fn applies_offset() {
        let mut index = DisasmIndex::default();
        index.add_line("00000080 <reset> j\t0x80", "boot.elf", 0x20000);
        assert!(index.lookup(0x80).is_none());
        assert!(index.lookup(0x20080).is_some());
    }

    #[test]
    fn duplicate_addresses_warn_and_overwrite() {
        let entry = |file: &str| DisasmEntry {
            file: file.to_string(),
            symbol: "<f>".to_string(),
            insn: "nop".to_string(),
        };

        let mut index = DisasmIndex::default();
        index.insert(0x100, entry("first.elf"));
        index.insert(0x200, entry("first.elf"));
        index.insert(0x100, entry("second.elf"));

        assert_eq!(index.duplicates(), 1);
        assert_eq!(index.lookup(0x100).unwrap().file, "second.elf");
        assert_eq!(index.lookup(0x200).unwrap().file, "first.elf");
    }
}
