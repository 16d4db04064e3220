//! RISC-V integer register names and ABI-alias substitution.

/// numeric name -> ABI name, indexed by register number
pub const ABI_NAMES: [(&str, &str); 32] = [
    ("x0", "zero"),
    ("x1", "ra"),
    ("x2", "sp"),
    ("x3", "gp"),
    ("x4", "tp"),
    ("x5", "t0"),
    ("x6", "t1"),
    ("x7", "t2"),
    ("x8", "s0"),
    ("x9", "s1"),
    ("x10", "a0"),
    ("x11", "a1"),
    ("x12", "a2"),
    ("x13", "a3"),
    ("x14", "a4"),
    ("x15", "a5"),
    ("x16", "a6"),
    ("x17", "a7"),
    ("x18", "s2"),
    ("x19", "s3"),
    ("x20", "s4"),
    ("x21", "s5"),
    ("x22", "s6"),
    ("x23", "s7"),
    ("x24", "s8"),
    ("x25", "s9"),
    ("x26", "s10"),
    ("x27", "s11"),
    ("x28", "t3"),
    ("x29", "t4"),
    ("x30", "t5"),
    ("x31", "t6"),
];

/// Substitution table turning numeric register tokens into their ABI names.
///
/// Bare substring replacement would turn the `x1` inside `x12` into `ra2`, so
/// every pair carries a boundary marker (leading space or open paren, trailing
/// colon or equals) and the pairs are ordered descending by register index.
pub struct AliasTable {
    subs: Vec<(String, String)>,
}

impl AliasTable {
    pub fn new() -> Self {
        let mut subs = Vec::with_capacity(ABI_NAMES.len() * 4);
        for (numeric, alias) in ABI_NAMES.iter().rev() {
            subs.push((format!(" {numeric}"), format!(" {alias}")));
            subs.push((format!("({numeric}"), format!("({alias}")));
            subs.push((format!("{numeric}:"), format!("{alias}:")));
            subs.push((format!("{numeric}="), format!("{alias}=")));
        }
        Self { subs }
    }

    /// Replaces every boundary-guarded numeric register token in `text`.
    ///
    /// A literal operand that happens to look like a register token is
    /// substituted too; the trace format gives us no way to tell them apart.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (numeric, alias) in &self.subs {
            out = out.replace(numeric, alias);
        }
        out
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}
