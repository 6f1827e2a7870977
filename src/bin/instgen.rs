//! RISC-V encoding table generator.
//!
//! Reads riscv-opcodes description files and prints one table row per
//! instruction. With `--check`, compares the descriptors against the
//! built-in table instead and reports every difference.

use archgen::riscv64::inst::{encode, Mnemonic};
use archgen::riscv64::opcodes::{merge, parse_file, table_row, OpcodeLine};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "instgen")]
#[command(about = "Generate RISC-V instruction descriptors from riscv-opcodes files")]
struct Args {
    /// Compare against the built-in table instead of printing rows
    #[arg(long)]
    check: bool,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Opcode description files (rv_i, rv64_i, rv_m, ...)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn read_all(files: &[PathBuf]) -> Vec<OpcodeLine> {
    let mut lines = Vec::new();
    for path in files {
        let src = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("instgen: reading {}: {e}", path.display());
            process::exit(1);
        });
        match parse_file(&src) {
            Ok(parsed) => {
                log::debug!("{}: {} instructions", path.display(), parsed.len());
                lines.extend(parsed);
            }
            Err(e) => {
                eprintln!("instgen: {}: {e}", path.display());
                process::exit(1);
            }
        }
    }
    merge(lines)
}

/// Number of descriptors that disagree with the built-in table.
fn check(lines: &[OpcodeLine]) -> usize {
    let mut bad = 0;
    for line in lines {
        let Some(m) = Mnemonic::from_isa_name(&line.name) else {
            log::info!("{}: not in the built-in table", line.name);
            continue;
        };
        let want = line.inst();
        match encode(m) {
            Some(have) if *have == want => {}
            Some(have) => {
                println!("{}: table has {have:?}, file gives {want:?}", line.name);
                bad += 1;
            }
            None => {
                println!("{}: no descriptor for {m}", line.name);
                bad += 1;
            }
        }
    }
    bad
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let lines = read_all(&args.files);
    if args.check {
        let bad = check(&lines);
        if bad > 0 {
            eprintln!("instgen: {bad} descriptors differ");
            process::exit(1);
        }
        return;
    }
    for line in &lines {
        println!("{}", table_row(line));
    }
}
