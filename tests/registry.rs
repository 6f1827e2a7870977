//! Target selection and capability tables.

use archgen::core::{registry, BuildConfig, CompileError, FloatAbi};
use bumpalo::Bump;

#[test]
fn test_capabilities_per_target() {
    let cases = [
        ("amd64", object::Architecture::X86_64, object::Endianness::Little, 1, 0, true),
        ("loong64", object::Architecture::LoongArch64, object::Endianness::Little, 4, 8, true),
        ("mips64", object::Architecture::Mips64, object::Endianness::Big, 4, 8, false),
        ("mips64le", object::Architecture::Mips64, object::Endianness::Little, 4, 8, false),
        ("riscv64", object::Architecture::Riscv64, object::Endianness::Little, 4, 8, true),
    ];
    for (name, arch, endian, min_lc, frame, hooks) in cases {
        let info = registry::init(&BuildConfig::for_arch(name)).unwrap();
        let la = info.link_arch;
        assert_eq!(la.name, name);
        assert_eq!(la.arch, arch, "{name}");
        assert_eq!(la.endian, endian, "{name}");
        assert_eq!((la.ptr_size, la.reg_size), (8, 8), "{name}");
        assert_eq!(la.min_lc, min_lc, "{name}");
        assert_eq!(la.fixed_frame_size, frame, "{name}");
        assert_eq!(info.max_width, 1 << 50);
        assert!(!info.soft_float);
        assert_eq!(info.gen.load_reg_result().is_some(), hooks, "{name}");
        assert_eq!(info.gen.spill_arg_reg().is_some(), hooks, "{name}");
    }
}

#[test]
fn test_stack_pointer_names() {
    let sp = |name: &str| {
        let info = registry::init(&BuildConfig::for_arch(name)).unwrap();
        info.link_arch.reg_name(info.reg_sp)
    };
    assert_eq!(sp("amd64"), "SP");
    assert_eq!(sp("riscv64"), "SP");
    assert_eq!(sp("loong64"), "R3");
    assert_eq!(sp("mips64"), "R29");
}

#[test]
fn test_soft_float_only_affects_mips64() {
    for name in registry::supported_archs() {
        let mut cfg = BuildConfig::for_arch(name);
        cfg.mips64_float = FloatAbi::Soft;
        let info = registry::init(&cfg).unwrap();
        assert_eq!(info.soft_float, name.starts_with("mips64"), "{name}");
    }
}

#[test]
fn test_unknown_target_is_a_config_error() {
    let err = registry::init(&BuildConfig::for_arch("sparc64")).unwrap_err();
    assert!(err.is_config_error());
    assert_eq!(err.exit_code(), 2);
    assert_eq!(format!("archgen: {err}"), "archgen: unknown architecture \"sparc64\"");
    assert!(matches!(err, CompileError::UnknownArch { .. }));
}

#[test]
fn test_every_target_emits_one_nop() {
    let arena = Bump::new();
    for name in registry::supported_archs() {
        let info = registry::init(&BuildConfig::for_arch(name)).unwrap();
        let mut pp = archgen::Progs::new_in(&arena, info.link_arch);
        let id = info.gen.ginsnop(&mut pp);
        assert_eq!(id.0, 0);
        assert_eq!(pp.len(), 1, "{name}");
    }
}

#[test]
fn test_riscv64_nop_is_a_real_addi() {
    let arena = Bump::new();
    let info = registry::init(&BuildConfig::for_arch("riscv64")).unwrap();
    let mut pp = archgen::Progs::new_in(&arena, info.link_arch);
    info.gen.ginsnop(&mut pp);
    assert_eq!(pp.to_string(), "00000 ADD\t$0, ZERO, ZERO\n");

    let nop = pp.iter().next().unwrap();
    let (m, _) = archgen::riscv64::resolve(nop).unwrap();
    assert_eq!(m, archgen::riscv64::Mnemonic::Addi);
    assert_eq!(archgen::riscv64::asm::encode_word(nop).unwrap(), Some(0x0000_0013));
}

#[test]
fn test_summary_lists_hooks() {
    let info = registry::init(&BuildConfig::for_arch("mips64")).unwrap();
    let text = info.to_string();
    assert!(text.starts_with("arch: mips64 (Mips64, Big endian)"), "{text}");
    assert!(text.contains("stack pointer: R29"));
    assert!(text.contains("load_reg_result: no"));
}
