//! Lowering many functions on worker threads sharing one session.

use archgen::core::{compile_functions, registry, BuildConfig, CompilationSession, CompileError};
use archgen::ssa::{parse_funcs, Func};
use archgen::symtab::Abi;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;

fn checked_funcs(n: usize) -> String {
    let mut src = String::new();
    for i in 0..n {
        let _ = write!(
            src,
            "
func main.f{i} {{
b1:
  v1 = InitMem <mem>
  v2 = Arg <int64> : R4
  v3 = Const <int64> [{i}] : R5
  Branch Ltu v2 v3 -> b2 b3
b2:
  Ret
b3:
  v4 = PanicBounds <mem> [{kind}] v1 v2 v3
  Exit
}}
",
            kind = i % 4
        );
    }
    src
}

fn parse(arch: &archgen::ArchInfo, session: &CompilationSession, src: &str) -> Vec<Func> {
    parse_funcs(src, arch.link_arch, session.symtab()).unwrap()
}

#[test]
fn test_workers_share_runtime_symbols() {
    let _ = env_logger::builder().is_test(true).try_init();
    let arch = registry::init(&BuildConfig::for_arch("loong64")).unwrap();
    let session = CompilationSession::new("main");
    let funcs = parse(&arch, &session, &checked_funcs(64));

    let callees = Mutex::new(Vec::new());
    compile_functions(&arch, &session, &funcs, 8, |_, pp| {
        let mut found = callees.lock();
        found.extend(pp.iter().filter_map(|p| p.to.sym.clone()));
        Ok(())
    })
    .unwrap();

    let callees = callees.into_inner();
    assert_eq!(callees.len(), 64);
    let index = session.symtab().link_get("runtime.panicIndex", Abi::Internal).unwrap();
    let same: Vec<_> = callees.iter().filter(|s| Arc::ptr_eq(s, &index)).collect();
    assert_eq!(same.len(), 16);

    let stats = session.stats();
    assert_eq!(stats.functions_lowered, 64);
    assert_eq!(stats.runtime_calls, 64);
    assert_eq!(stats.instruction_counts.get("CALL"), Some(&64));
}

#[test]
fn test_results_do_not_depend_on_worker_count() {
    let arch = registry::init(&BuildConfig::for_arch("riscv64")).unwrap();
    let src = checked_funcs(16).replace("R4", "X10").replace("R5", "X11");

    let listings = |workers: usize| {
        let session = CompilationSession::new("main");
        let funcs = parse(&arch, &session, &src);
        let out = Mutex::new(vec![String::new(); funcs.len()]);
        compile_functions(&arch, &session, &funcs, workers, |func, pp| {
            let i = funcs.iter().position(|f| std::ptr::eq(f, func)).unwrap();
            out.lock()[i] = pp.to_string();
            Ok(())
        })
        .unwrap();
        out.into_inner()
    };
    assert_eq!(listings(1), listings(4));
}

#[test]
fn test_first_error_stops_the_pool() {
    let arch = registry::init(&BuildConfig::for_arch("mips64")).unwrap();
    let session = CompilationSession::new("main");
    let mut src = checked_funcs(32);
    src.push_str(
        "
func main.bad {
b1:
  v1 = Arg <int64> : R4
  v2 = Arg <int64> : R5
  v3 = AtomicAdd <int64> v1 v2 : R4
  Ret
}
",
    );
    let funcs = parse(&arch, &session, &src);
    let err = compile_functions(&arch, &session, &funcs, 4, |_, _| Ok(())).unwrap_err();
    match err {
        CompileError::CodeGeneration { func, reason } => {
            assert_eq!(func, "main.bad");
            assert!(reason.contains("overlaps"), "{reason}");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(session.stats().functions_lowered <= 32);
}

#[test]
fn test_emit_errors_propagate() {
    let arch = registry::init(&BuildConfig::for_arch("amd64")).unwrap();
    let session = CompilationSession::new("main");
    let src = checked_funcs(4).replace("R4", "AX").replace("R5", "CX");
    let funcs = parse(&arch, &session, &src);
    let err = compile_functions(&arch, &session, &funcs, 2, |func, _| {
        Err(CompileError::CodeGeneration { func: func.name.clone(), reason: "sink closed".into() })
    })
    .unwrap_err();
    assert!(matches!(err, CompileError::CodeGeneration { .. }));
}
