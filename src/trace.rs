//! Trace-log reading: column-width detection from the last line, per-line
//! field extraction, and the fallback parse for addresses the disassembly
//! does not cover.

use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

/// Byte offset separating instruction text from register values. A fixed
/// compatibility constant, not a parsed delimiter; the trace format has no
/// explicit marker for where the register dump starts.
pub const REG_SPLIT_COLUMN: usize = 80;

const TAIL_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace file has no usable last line")]
    NoLastLine,
    #[error("line {0}: too few fields: {1:?}")]
    MissingFields(usize, String),
    #[error("line {0}: bad cycle count {1:?}")]
    BadCycle(usize, String),
    #[error("line {0}: bad address {1:?}")]
    BadAddress(usize, String),
    #[error("line {0}: no disassembly and unrecognized instruction text {1:?}")]
    UnknownInstruction(usize, String),
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Widths of the time and cycle columns, measured from the trace itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidths {
    pub time: usize,
    pub cycle: usize,
}

/// Measures the first two fields of the file's last line. The trace is
/// assumed to use uniform field widths throughout; that is not validated.
/// Rewinds the reader to the start afterwards.
pub fn detect_widths<R: Read + Seek>(reader: &mut R) -> Result<ColumnWidths, TraceError> {
    let last = last_line(reader)?;
    reader.seek(SeekFrom::Start(0))?;

    let mut fields = last.split_whitespace();
    let time = fields
        .next()
        .ok_or(TraceError::NoLastLine)?
        .len();
    let cycle = fields
        .next()
        .ok_or(TraceError::NoLastLine)?
        .len();

    Ok(ColumnWidths { time, cycle })
}

/// Reads the last non-empty line by scanning backwards in chunks, so the
/// file is never loaded wholly into memory.
fn last_line<R: Read + Seek>(reader: &mut R) -> Result<String, TraceError> {
    let mut remaining = reader.seek(SeekFrom::End(0))?;
    let mut tail: Vec<u8> = Vec::new();

    loop {
        let content_end = tail
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map(|i| i + 1);

        if let Some(end) = content_end {
            if let Some(newline) = tail[..end].iter().rposition(|&b| b == b'\n') {
                let line = &tail[newline + 1..end];
                return Ok(String::from_utf8_lossy(line).into_owned());
            }
            if remaining == 0 {
                // single-line file
                return Ok(String::from_utf8_lossy(&tail[..end]).into_owned());
            }
        } else if remaining == 0 {
            return Err(TraceError::NoLastLine);
        }

        let step = remaining.min(TAIL_CHUNK as u64);
        remaining -= step;
        reader.seek(SeekFrom::Start(remaining))?;

        let mut chunk = vec![0u8; step as usize];
        reader.read_exact(&mut chunk)?;
        chunk.append(&mut tail);
        tail = chunk;
    }
}

/// One parsed data line of the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRow {
    pub time: String,
    pub cycle: u64,
    pub address: u64,
    /// text up to [`REG_SPLIT_COLUMN`], trimmed; empty on short lines
    pub insn_text: String,
    /// text from [`REG_SPLIT_COLUMN`] on, trimmed; empty on short lines
    pub regs_text: String,
}

impl TraceRow {
    pub fn parse(lineno: usize, line: &str) -> Result<Self, TraceError> {
        let missing = || TraceError::MissingFields(lineno, line.to_string());

        let mut fields = line.split_whitespace();
        let time = fields.next().ok_or_else(missing)?;
        let cycle = fields.next().ok_or_else(missing)?;
        let address = fields.next().ok_or_else(missing)?;

        let cycle = cycle
            .parse()
            .map_err(|_| TraceError::BadCycle(lineno, cycle.to_string()))?;

        // simulators emit `x` for don't-care digits
        let address = address.replace('x', "0");
        let address = u64::from_str_radix(&address, 16)
            .map_err(|_| TraceError::BadAddress(lineno, address))?;

        let (insn_text, regs_text) = split_at_reg_column(line);

        Ok(Self {
            time: time.to_string(),
            cycle,
            address,
            insn_text,
            regs_text,
        })
    }
}

/// Splits a raw line at the fixed register column. Lines at or under the
/// threshold have no register text and yield two empty strings.
pub fn split_at_reg_column(line: &str) -> (String, String) {
    if line.len() <= REG_SPLIT_COLUMN {
        return (String::new(), String::new());
    }

    match (
        line.get(..REG_SPLIT_COLUMN),
        line.get(REG_SPLIT_COLUMN..),
    ) {
        (Some(insn), Some(regs)) => (insn.trim().to_string(), regs.trim().to_string()),
        // byte 80 lands inside a codepoint; give up on the register text
        _ => (line.trim().to_string(), String::new()),
    }
}

/// Secondary parse for trace lines whose address is not in the disassembly
/// index, which is expected whenever the address carried don't-care digits.
/// Expects `<hex><n|u|m>s <count> <hex> <hex> <instruction>` and returns the
/// instruction part.
pub fn parse_raw_insn(lineno: usize, insn_text: &str) -> Result<String, TraceError> {
    lazy_static! {
        static ref RAW: Regex = Regex::new(
            r"^([0-9a-fA-F]+)[num]s\s+(\d+)\s+([0-9a-fA-Fx]+)\s+([0-9a-fA-Fx]+)\s+(.+)$"
        )
        .unwrap();
    }

    RAW.captures(insn_text.trim())
        .map(|caps| caps[5].trim().to_string())
        .ok_or_else(|| TraceError::UnknownInstruction(lineno, insn_text.to_string()))
}
