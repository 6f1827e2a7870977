//! RISC-V descriptor table and instruction selection for emitted Progs.

use archgen::core::{genssa, registry, Addr, As, Backend, BuildConfig, CompilationSession, Prog, Progs};
use archgen::riscv64::inst::{encodings, sign_extend_12, Inst};
use archgen::riscv64::opcodes::{merge, parse_file, table_row};
use archgen::riscv64::{self, encode, ImmSlot, Mnemonic};
use archgen::ssa::parse_funcs;
use archgen::x64::{self, backend::Amd64Backend};
use bumpalo::Bump;
use strum::IntoEnumIterator;

const OPCODES: &str = "
# rv_i
add     rd rs1 rs2 31..25=0  14..12=0 6..2=0x0C 1..0=3
sub     rd rs1 rs2 31..25=32 14..12=0 6..2=0x0C 1..0=3
ecall   11..7=0 19..15=0 31..20=0x000 14..12=0 6..2=0x1C 1..0=3
# rv64_d
fcvt.l.d rd rs1 24..20=2 31..27=0x18 rm 26..25=1 6..2=0x14 1..0=3
# rv_zicsr pseudo-ops
$pseudo_op zicsr::csrrs rdcycle rd 19..15=0 31..20=0xC00 14..12=2 6..2=0x1C 1..0=3
";

fn fields(inst: &Inst) -> (u32, u32, u32, i64, u32) {
    (inst.opcode, inst.funct3, inst.rs2, inst.csr, inst.funct7)
}

#[test]
fn test_descriptor_fixtures() {
    let cases = [
        (Mnemonic::Add, (0x33, 0x0, 0x0, 0, 0x0)),
        (Mnemonic::AmoaddD, (0x2f, 0x3, 0x0, 0, 0x0)),
        (Mnemonic::FcvtDL, (0x53, 0x0, 0x2, -734, 0x69)),
    ];
    for (m, want) in cases {
        let inst = encode(m).unwrap();
        assert_eq!(fields(inst), want, "{m}");
    }
}

#[test]
fn test_encode_is_pure() {
    for m in Mnemonic::iter() {
        let first = encode(m).copied();
        let second = encode(m).copied();
        assert_eq!(first, second, "{m}");
    }
}

#[test]
fn test_float_to_int_conversion_truncates() {
    let arch = registry::init(&BuildConfig::for_arch("riscv64")).unwrap();
    let session = CompilationSession::new("main");
    let src = "
func main.trunc {
b1:
  v1 = Arg <float64> : F1
  v2 = FloatToInt <int64> v1 : X10
  Ret
}
";
    let funcs = parse_funcs(src, arch.link_arch, session.symtab()).unwrap();
    let arena = Bump::new();
    let pp = genssa(&arch, &session, &funcs[0], &arena).unwrap();

    let cvt = pp.iter().find(|p| p.as_ == As::Riscv(Mnemonic::FcvtLD)).unwrap();
    let word = riscv64::asm::encode_word(cvt).unwrap().unwrap();
    // rm = RTZ
    assert_eq!((word >> 12) & 0x7, 1);
    assert_eq!(word, 0xc220_9553);

    // Conversions from an integer keep the table's rm bits.
    let mut p = Prog::new(As::Riscv(Mnemonic::FcvtDL));
    p.from = Addr::reg(riscv64::x(10));
    p.to = Addr::reg(riscv64::f(1));
    let word = riscv64::asm::encode_word(&p).unwrap().unwrap();
    assert_eq!((word >> 12) & 0x7, 0);
}

#[test]
fn test_immediate_slot_matches_funct7_and_rs2() {
    for (m, inst) in encodings() {
        let packed = (inst.funct7 << 5) | inst.rs2;
        assert_eq!(inst.csr, sign_extend_12(packed), "{m}");
    }
}

#[test]
fn test_opcode_file_agrees_with_table() {
    let lines = merge(parse_file(OPCODES).unwrap());
    let names: Vec<&str> = lines.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["add", "ecall", "fcvt.l.d", "rdcycle", "sub"]);
    for line in &lines {
        let m = Mnemonic::from_isa_name(&line.name).unwrap();
        assert_eq!(Some(&line.inst()), encode(m), "{}", line.name);
    }
    assert_eq!(table_row(&lines[4]), "Sub \"sub\" => (0x33, 0x0, 0x0, 1024, 0x20),");
    assert_eq!(table_row(&lines[3]), "Rdcycle \"rdcycle\" => (0x73, 0x2, 0x0, -1024, 0x60),");
}

#[test]
fn test_csr_instructions_name_their_register() {
    let rdcycle = encode(Mnemonic::Rdcycle).unwrap();
    assert_eq!(rdcycle.imm_slot(), ImmSlot::CsrAddress(0xc00));
    assert_eq!(encode(Mnemonic::Ecall).map(|i| i.imm_slot()), Some(ImmSlot::Funct12(0)));
}

#[test]
fn test_every_pseudo_resolves_to_a_real_instruction() {
    for m in Mnemonic::iter().filter(|m| m.is_pseudo()) {
        let mut p = Prog::new(As::Riscv(m));
        p.from = Addr::reg(riscv64::x(5));
        p.to = match m {
            Mnemonic::Movb | Mnemonic::Movh | Mnemonic::Movw | Mnemonic::Mov => Addr::mem(riscv64::REG_SP, 8),
            _ => Addr::reg(riscv64::x(6)),
        };
        if matches!(m, Mnemonic::Movf | Mnemonic::Movd | Mnemonic::Fnegd) {
            p.from = Addr::reg(riscv64::f(1));
            p.to = Addr::reg(riscv64::f(2));
        }
        let (real, inst) = riscv64::resolve(&p).unwrap();
        assert!(!real.is_pseudo(), "{m} resolved to {real}");
        assert_eq!(encode(real), Some(inst));
    }
}

#[test]
fn test_generic_ops_have_encodings() {
    for as_ in [As::Jmp, As::Call, As::Ret, As::Undef] {
        let (m, _) = riscv64::resolve(&Prog::new(as_)).unwrap();
        assert!(!m.is_pseudo());
    }
    let word = riscv64::asm::encode_word(&Prog::new(As::Undef)).unwrap();
    assert_eq!(word, Some(0x00100073));
}

#[test]
fn test_amd64_frame_zeroing_bytes() {
    let arena = Bump::new();
    let mut pp = Progs::new_in(&arena, &x64::LINK_AMD64);
    Amd64Backend.zero_range(&mut pp, 0, 16).unwrap();
    // movups [rsp], xmm15
    assert_eq!(x64::assemble("f", &pp).unwrap().code, [0x44, 0x0F, 0x11, 0x3C, 0x24]);
}
