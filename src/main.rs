use annotrace::disasm::{DisasmIndex, ElfSpec};
use annotrace::format::{FormatOptions, Formatter};
use annotrace::regs::AliasTable;
use annotrace::trace;
use anyhow::{bail, Context};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};
use tracing_subscriber::EnvFilter;

#[derive(argh::FromArgs)]
/// annotate a RISC-V instruction trace with objdump disassembly
struct Arguments {
    /// the instruction-trace log to annotate
    #[argh(positional)]
    trace_file: PathBuf,

    /// binary to disassemble, with an optional `:offset` (any integer base)
    #[argh(option, short = 'e', long = "elf-file")]
    elf_file: Vec<String>,

    /// write to a file instead of stdout
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// cap file/symbol/instruction widths, marking cut text with `..`
    #[argh(switch, short = 't')]
    truncate: bool,

    /// show numeric register names instead of ABI aliases
    #[argh(switch, short = 'n')]
    numeric: bool,

    /// ask objdump for non-aliased mnemonics
    #[argh(switch)]
    no_aliases: bool,

    /// prepend a cycle-count column
    #[argh(switch)]
    cycles: bool,

    /// prepend a timestamp column
    #[argh(switch)]
    time: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Arguments = argh::from_env();

    if args.elf_file.is_empty() {
        bail!("at least one -e/--elf_file is required");
    }

    let elfs = args
        .elf_file
        .iter()
        .map(|arg| ElfSpec::parse(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let index = DisasmIndex::build(&elfs, args.numeric, args.no_aliases)?;
    let aliases = AliasTable::new();

    let file = File::open(&args.trace_file)
        .with_context(|| format!("opening {}", args.trace_file.display()))?;
    let mut reader = BufReader::new(file);
    let widths = trace::detect_widths(&mut reader)?;

    let formatter = Formatter {
        index: &index,
        aliases: &aliases,
        widths,
        opts: FormatOptions {
            truncate: args.truncate,
            numeric: args.numeric,
            cycles: args.cycles,
            time: args.time,
            multiple_elfs: elfs.len() > 1,
        },
    };

    match args.output {
        Some(path) => {
            let out =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            // scoped so the file is flushed and closed before we return
            let mut out = BufWriter::new(out);
            formatter.run(&mut reader, &mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            formatter.run(&mut reader, &mut stdout.lock())?;
        }
    }

    Ok(())
}
