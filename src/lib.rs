pub mod disasm;
pub mod format;
pub mod regs;
pub mod trace;
