//! Fixed-width row formatting and the streaming pass over the trace.

use crate::disasm::DisasmIndex;
use crate::regs::AliasTable;
use crate::trace::{self, ColumnWidths, TraceError, TraceRow};
use std::io::{BufRead, Write};

pub const PC_WIDTH: usize = 8;
pub const FILE_WIDTH: usize = 16;
pub const SYMBOL_WIDTH: usize = 40;
pub const INSN_WIDTH: usize = 50;
pub const REGS_WIDTH: usize = 20;

// display caps for --truncate
pub const TRUNC_FILE: usize = 20;
pub const TRUNC_SYMBOL: usize = 40;
pub const TRUNC_INSN: usize = 40;

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub truncate: bool,
    pub numeric: bool,
    pub cycles: bool,
    pub time: bool,
    /// the file column collapses to nothing when only one binary was given
    pub multiple_elfs: bool,
}

/// Caps `text` at `width` characters, marking cut text with `..`.
/// Counts chars, not bytes: demangled symbols can carry multibyte text.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width - 2).collect();
        format!("{kept}..")
    } else {
        text.to_string()
    }
}

/// Turns parsed trace rows into formatted output lines. Holds only shared
/// read-only state; the output sink is a parameter on every call.
pub struct Formatter<'a> {
    pub index: &'a DisasmIndex,
    pub aliases: &'a AliasTable,
    pub widths: ColumnWidths,
    pub opts: FormatOptions,
}

impl Formatter<'_> {
    /// Streams the whole trace: header detection, one formatted row per data
    /// line. The first trace line is the simulator's own header and is
    /// dropped. Flushes the sink before returning.
    pub fn run<R: BufRead, W: Write>(&self, reader: R, out: &mut W) -> Result<(), TraceError> {
        self.write_header(out)?;

        let mut lines = reader.lines();
        if lines.next().transpose()?.is_none() {
            out.flush()?;
            return Ok(());
        }

        for (idx, line) in lines.enumerate() {
            // line 1 was the header
            let lineno = idx + 2;
            let row = TraceRow::parse(lineno, &line?)?;
            self.write_row(out, lineno, &row)?;
        }

        out.flush()?;
        Ok(())
    }

    pub fn write_header<W: Write>(&self, out: &mut W) -> Result<(), TraceError> {
        self.write_fields(out, "time", "cycle", "pc", "file", "symbol", "instruction", "registers")
    }

    pub fn write_row<W: Write>(
        &self,
        out: &mut W,
        lineno: usize,
        row: &TraceRow,
    ) -> Result<(), TraceError> {
        let (file, symbol, insn) = match self.index.lookup(row.address) {
            Some(entry) => {
                if self.opts.truncate {
                    (
                        truncate(&entry.file, TRUNC_FILE),
                        truncate(&entry.symbol, TRUNC_SYMBOL),
                        truncate(&entry.insn, TRUNC_INSN),
                    )
                } else {
                    (entry.file.clone(), entry.symbol.clone(), entry.insn.clone())
                }
            }
            None => {
                let insn = trace::parse_raw_insn(lineno, &row.insn_text)?;
                (String::new(), String::new(), insn)
            }
        };

        let (insn, regs) = if self.opts.numeric {
            (insn, row.regs_text.clone())
        } else {
            (self.aliases.apply(&insn), self.aliases.apply(&row.regs_text))
        };

        let pc = format!("{:08x}", row.address);
        let cycle = row.cycle.to_string();

        self.write_fields(out, &row.time, &cycle, &pc, &file, &symbol, &insn, &regs)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_fields<W: Write>(
        &self,
        out: &mut W,
        time: &str,
        cycle: &str,
        pc: &str,
        file: &str,
        symbol: &str,
        insn: &str,
        regs: &str,
    ) -> Result<(), TraceError> {
        if self.opts.time {
            write!(out, "{:>width$} ", time, width = self.widths.time)?;
        }
        if self.opts.cycles {
            write!(out, "{:>width$} ", cycle, width = self.widths.cycle)?;
        }
        write!(out, "{:>width$} ", pc, width = PC_WIDTH)?;
        if self.opts.multiple_elfs {
            write!(out, "{:<width$} ", file, width = FILE_WIDTH)?;
        }
        write!(out, "{:<width$} ", symbol, width = SYMBOL_WIDTH)?;
        write!(out, "{:<width$} ", insn, width = INSN_WIDTH)?;
        writeln!(out, "{:<width$}", regs, width = REGS_WIDTH)?;
        Ok(())
    }
}
