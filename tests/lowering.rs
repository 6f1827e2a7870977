//! End-to-end lowering of textual IR functions on every target.

use archgen::core::{genssa, registry, AddrType, BuildConfig, CompilationSession, CompileError, FloatAbi};
use archgen::ssa::{parse_funcs, Func};
use archgen::{riscv64, x64, ArchInfo, Progs};
use bumpalo::Bump;

fn setup(arch: &str) -> (ArchInfo, CompilationSession) {
    let _ = env_logger::builder().is_test(true).try_init();
    let arch = registry::init(&BuildConfig::for_arch(arch)).unwrap();
    (arch, CompilationSession::new("main"))
}

fn parse(arch: &ArchInfo, session: &CompilationSession, src: &str) -> Func {
    let mut funcs = parse_funcs(src, arch.link_arch, session.symtab()).unwrap();
    assert_eq!(funcs.len(), 1);
    funcs.remove(0)
}

fn opcodes(pp: &Progs<'_>) -> Vec<String> {
    pp.iter().map(|p| p.as_.to_string()).collect()
}

const RISCV_CHECKED_INC: &str = "
func main.inc {
b1:
  v1 = InitMem <mem>
  v2 = Arg <int64> : X10
  v3 = AddConst <int64> [1] v2 : X10
  v4 = Const <int64> [7] : X11
  Branch Lt v3 v4 -> b2 b3
b2:
  Ret
b3:
  v5 = PanicBounds <mem> [0] v1 v3 v4
  Exit
}
";

#[test]
fn test_riscv64_branch_falls_through_to_taken_successor() {
    let (arch, session) = setup("riscv64");
    let func = parse(&arch, &session, RISCV_CHECKED_INC);
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();

    // The taken edge is laid out next, so the branch tests the inverse.
    assert_eq!(opcodes(&pp), ["ADDI", "MOV", "BGE", "RET", "CALL", "ADD"]);
    let bge = pp.iter().nth(2).unwrap();
    assert_eq!(bge.to.ty, AddrType::Branch);
    assert_eq!(bge.to.target.map(|t| t.0), Some(4));

    let call = pp.iter().nth(4).unwrap();
    assert_eq!(call.to.sym.as_ref().map(|s| &*s.name), Some("runtime.panicIndex"));

    // Every emitted instruction has a table descriptor.
    for p in pp.iter() {
        riscv64::resolve(p).unwrap();
    }
}

#[test]
fn test_riscv64_zeroing_and_register_hooks() {
    let (arch, session) = setup("riscv64");
    let func = parse(
        &arch,
        &session,
        "
func main.frame {
  zero 0 16
  spill X10 int64 0
  result X10 int32 8
b1:
  Ret
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    assert_eq!(
        pp.to_string(),
        "00000 MOV\tZERO, 8(SP)\n\
         00001 MOV\tZERO, 16(SP)\n\
         00002 MOV\tX10, (SP)\n\
         00003 MOVW\t8(SP), X10\n\
         00004 RET\n"
    );
}

#[test]
fn test_riscv64_zeroing_uses_minimal_stores() {
    let (arch, _) = setup("riscv64");
    let arena = Bump::new();

    let mut pp = Progs::new_in(&arena, arch.link_arch);
    arch.gen.zero_range(&mut pp, 0, 24).unwrap();
    assert_eq!(opcodes(&pp), ["MOV", "MOV", "MOV"]);

    let mut pp = Progs::new_in(&arena, arch.link_arch);
    arch.gen.zero_range(&mut pp, 0, 10).unwrap();
    assert_eq!(pp.to_string(), "00000 MOV\tZERO, 8(SP)\n00001 MOVH\tZERO, 16(SP)\n");
}

#[test]
fn test_amd64_lowers_and_assembles() {
    let (arch, session) = setup("amd64");
    let func = parse(
        &arch,
        &session,
        "
func main.add {
b1:
  v1 = Arg <int64> : AX
  v2 = Arg <int64> : CX
  v3 = Add <int64> v1 v2 : AX
  Ret
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    let out = x64::assemble(&func.name, &pp).unwrap();
    assert_eq!(out.code, [0x48, 0x01, 0xC8, 0xC3]);
    assert!(out.relocs.is_empty());
}

#[test]
fn test_loong64_ordered_branch_uses_register_compare() {
    let (arch, session) = setup("loong64");
    let func = parse(
        &arch,
        &session,
        "
func main.max {
b1:
  v1 = Arg <int64> : R4
  v2 = Arg <int64> : R5
  Branch Ltu v1 v2 -> b3 b2
b2:
  Ret
b3:
  v3 = Copy <int64> v2 : R4
  Ret
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    assert_eq!(opcodes(&pp), ["BLTU", "RET", "MOVV", "RET"]);
}

#[test]
fn test_mips64_atomic_add_loop() {
    let (arch, session) = setup("mips64le");
    let func = parse(
        &arch,
        &session,
        "
func main.incr {
b1:
  v1 = Arg <ptr> : R4
  v2 = Arg <int64> : R5
  v3 = AtomicAdd <int64> v1 v2 : R6
  Ret
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    assert_eq!(opcodes(&pp), ["SYNC", "LLV", "ADDVU", "SCV", "BEQ", "SYNC", "ADDVU", "RET"]);
    let beq = pp.iter().nth(4).unwrap();
    assert_eq!(beq.to.target.map(|t| t.0), Some(1));
}

#[test]
fn test_mips64_ordered_branch_through_sgt() {
    let (arch, session) = setup("mips64");
    let func = parse(
        &arch,
        &session,
        "
func main.cmp {
b1:
  v1 = Arg <int64> : R4
  v2 = Arg <int64> : R5
  Branch Ge v1 v2 -> b2 b3
b2:
  Ret
b3:
  Exit
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    // TMP = v2 > v1; Ge holds when TMP is zero, so the fallthrough branch takes BNE.
    assert_eq!(opcodes(&pp), ["SGT", "BNE", "RET", "NOOP"]);
    assert_eq!(pp.iter().nth(1).map(|p| p.from.reg), Some(archgen::mips64::REG_TMP));
}

#[test]
fn test_mips64_soft_float_rejects_float_ops() {
    let mut cfg = BuildConfig::for_arch("mips64");
    cfg.mips64_float = FloatAbi::Soft;
    let arch = registry::init(&cfg).unwrap();
    let session = CompilationSession::new("main");
    let func = parse(
        &arch,
        &session,
        "
func main.f {
b1:
  v1 = ConstFloat <float64> [1.5] : F0
  Ret
}
",
    );
    let arena = Bump::new();
    let err = genssa(&arch, &session, &func, &arena).unwrap_err();
    assert!(matches!(err, CompileError::UnhandledValue { arch: "mips64", .. }), "{err}");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_unsigned_float_conversion_unhandled_on_amd64() {
    let (arch, session) = setup("amd64");
    let func = parse(
        &arch,
        &session,
        "
func main.conv {
b1:
  v1 = Arg <float64> : X0
  v2 = FloatToInt <uint64> v1 : AX
  Ret
}
",
    );
    let arena = Bump::new();
    let err = genssa(&arch, &session, &func, &arena).unwrap_err();
    match err {
        CompileError::UnhandledValue { arch, func, value, op } => {
            assert_eq!(arch, "amd64");
            assert_eq!(func, "main.conv");
            assert_eq!(value, "v2");
            assert_eq!(op, "FloatToInt");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_jump_to_exit_block_lands_on_trailing_nop() {
    let (arch, session) = setup("loong64");
    let func = parse(
        &arch,
        &session,
        "
func main.exit {
b1:
  Plain -> b3
b2:
  Ret
b3:
  Exit
}
",
    );
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &func, &arena).unwrap();
    assert_eq!(opcodes(&pp), ["JMP", "RET", "NOOP"]);
    assert_eq!(pp.iter().next().and_then(|p| p.to.target).map(|t| t.0), Some(2));
}
