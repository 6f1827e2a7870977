//! archgen driver.
//!
//! Selects a target, reads functions in the textual IR form and prints the
//! lowered Prog stream of each one.

use archgen::core::{compile_functions, registry, BuildConfig, CompilationSession, CompileError, FloatAbi};
use archgen::ssa::{parse_funcs, Func};
use archgen::{riscv64, x64};
use clap::Parser;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "archgen")]
#[command(about = "Lower register-assigned SSA functions for one target")]
struct Args {
    /// Target architecture (amd64, loong64, mips64, mips64le, riscv64)
    #[arg(long, env = "ARCHGEN_ARCH")]
    arch: Option<String>,

    /// Float ABI of the mips64 targets (hardfloat or softfloat)
    #[arg(long = "mips64-float")]
    mips64_float: Option<FloatAbi>,

    /// Import path of the package being compiled
    #[arg(long = "local-pkg")]
    local_pkg: Option<String>,

    /// Number of lowering workers
    #[arg(long, short = 'j', default_value_t = 1)]
    jobs: usize,

    /// Also print machine code (amd64 and riscv64)
    #[arg(long)]
    encode: bool,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Functions in textual IR form
    file: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn build_config(args: &Args) -> BuildConfig {
    let mut cfg = BuildConfig::from_env();
    if let Some(arch) = &args.arch {
        cfg.arch = arch.clone();
    }
    if let Some(abi) = args.mips64_float {
        cfg.mips64_float = abi;
    }
    if let Some(pkg) = &args.local_pkg {
        cfg.local_pkg = pkg.clone();
    }
    cfg
}

fn fail(err: &CompileError) -> ! {
    eprintln!("archgen: {err}");
    process::exit(err.exit_code());
}

/// Listing of one function, with machine code when requested.
fn render(arch: &str, func: &Func, pp: &archgen::Progs<'_>, encode: bool) -> Result<String, CompileError> {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", func.name);
    if !encode {
        out.push_str(&pp.to_string());
        return Ok(out);
    }
    match arch {
        "riscv64" => {
            for (i, p) in pp.iter().enumerate() {
                let word = match riscv64::asm::encode_word(p)? {
                    Some(w) => format!("{w:08x}"),
                    None => "........".to_string(),
                };
                let _ = writeln!(out, "{word}  {i:05} {}", p.display(pp.arch()));
            }
        }
        "amd64" => {
            out.push_str(&pp.to_string());
            let code = x64::assemble(&func.name, pp)?;
            let hex: Vec<String> = code.code.iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(out, "  code: {}", hex.join(" "));
            for r in &code.relocs {
                let _ = writeln!(out, "  reloc: {:#x} {}", r.offset, r.sym);
            }
        }
        _ => {
            log::warn!("{arch}: no machine code emitter, printing the listing only");
            out.push_str(&pp.to_string());
        }
    }
    Ok(out)
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let cfg = build_config(&args);
    let arch = registry::init(&cfg).unwrap_or_else(|e| fail(&e));
    println!("{arch}");

    let Some(path) = &args.file else { return };
    let src = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("archgen: reading {}: {e}", path.display());
        process::exit(1);
    });

    let session = CompilationSession::new(&cfg.local_pkg);
    let funcs = parse_funcs(&src, arch.link_arch, session.symtab()).unwrap_or_else(|e| fail(&e));
    log::info!("{}: {} functions from {}", arch.name(), funcs.len(), path.display());

    let listings: Mutex<Vec<Option<String>>> = Mutex::new(vec![None; funcs.len()]);
    let res = compile_functions(&arch, &session, &funcs, args.jobs, |func, pp| {
        let text = render(arch.name(), func, pp, args.encode)?;
        if let Some(i) = funcs.iter().position(|f| std::ptr::eq(f, func)) {
            listings.lock()[i] = Some(text);
        }
        Ok(())
    });
    if let Err(e) = res {
        fail(&e);
    }

    for text in listings.into_inner().into_iter().flatten() {
        println!("{text}");
    }
    print!("{}", session.stats());
}
