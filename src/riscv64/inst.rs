// This module holds the RISC-V instruction encoding table. Every machine instruction the
// riscv64 backend or assembler can produce is a distinct Mnemonic variant: width suffixes
// (ADD/ADDW), signedness (DIV/DIVU), atomic widths (AMOADD.W/AMOADD.D) and float precisions
// (FADD.S/FADD.D/FADD.Q) are separate entries, each with its own fixed-field descriptor, never
// a base encoding combined with modifier flags. The table is generated from the riscv-opcodes
// description (see the opcodes module and the instgen binary) and expanded by the
// instructions! macro into the enum and a static slice indexed by discriminant, so the two
// cannot drift apart. Assembler pseudo-instructions share the enum but have no descriptor;
// the asm module maps them to the real instruction they expand to.

//! RISC-V mnemonics and their encoding descriptors.
//!
//! # Immediate/CSR slot
//!
//! [`Inst::csr`] is one signed 12-bit field whose meaning depends on the
//! opcode class (see [`Inst::imm_slot`]):
//!
//! | class              | meaning                                         |
//! |--------------------|-------------------------------------------------|
//! | SYSTEM, funct3 ≠ 0 | CSR address (`csrrs`, `frcsr`, `rdcycle`, ...)  |
//! | SYSTEM, funct3 = 0 | funct12 selector (`ebreak`, `mret`, `wfi`, ...) |
//! | MISC-MEM           | fence mode and ordering bits                    |
//! | everything else    | `funct7 << 5 \| rs2`, sign-extended             |
//!
//! In the last group the slot packs the upper discriminant together with the
//! fixed second-source selector, which for float conversions is the
//! source/destination shape code. Both readings are kept; the assembler picks
//! the one matching the instruction format it emits.

use crate::core::error::{CompileError, CompileResult};
use std::fmt;
use strum::{EnumCount, EnumIter};

/// Fixed-field encoding of one RISC-V instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inst {
    /// Major opcode, bits 6..0.
    pub opcode: u32,
    /// Minor opcode, bits 14..12.
    pub funct3: u32,
    /// Fixed value of the rs2 field when it selects an operation.
    pub rs2: u32,
    /// Immediate/CSR slot, bits 31..20 sign-extended.
    pub csr: i64,
    /// Upper discriminant, bits 31..25.
    pub funct7: u32,
}

macro_rules! instructions {
    (
        encoded {
            $( $enc:ident $isa:literal => ($op:expr, $f3:expr, $rs2:expr, $csr:expr, $f7:expr), )*
        }
        pseudo {
            $( $ps:ident $pname:literal, )*
        }
    ) => {
        /// A RISC-V instruction variant, real or assembler pseudo-instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
        pub enum Mnemonic {
            $( $enc, )*
            $( $ps, )*
        }

        static ENCODINGS: &[(Mnemonic, &str, Inst)] = &[
            $( (
                Mnemonic::$enc,
                $isa,
                Inst { opcode: $op, funct3: $f3, rs2: $rs2, csr: $csr, funct7: $f7 },
            ), )*
        ];

        static PSEUDOS: &[(Mnemonic, &str)] = &[
            $( (Mnemonic::$ps, $pname), )*
        ];
    };
}

instructions! {
    encoded {
        Add "add" => (0x33, 0x0, 0x0, 0, 0x0),
        Addi "addi" => (0x13, 0x0, 0x0, 0, 0x0),
        Addiw "addiw" => (0x1b, 0x0, 0x0, 0, 0x0),
        Addw "addw" => (0x3b, 0x0, 0x0, 0, 0x0),
        AmoaddD "amoadd.d" => (0x2f, 0x3, 0x0, 0, 0x0),
        AmoaddW "amoadd.w" => (0x2f, 0x2, 0x0, 0, 0x0),
        AmoandD "amoand.d" => (0x2f, 0x3, 0x0, 1536, 0x30),
        AmoandW "amoand.w" => (0x2f, 0x2, 0x0, 1536, 0x30),
        AmomaxD "amomax.d" => (0x2f, 0x3, 0x0, -1536, 0x50),
        AmomaxW "amomax.w" => (0x2f, 0x2, 0x0, -1536, 0x50),
        AmomaxuD "amomaxu.d" => (0x2f, 0x3, 0x0, -512, 0x70),
        AmomaxuW "amomaxu.w" => (0x2f, 0x2, 0x0, -512, 0x70),
        AmominD "amomin.d" => (0x2f, 0x3, 0x0, -2048, 0x40),
        AmominW "amomin.w" => (0x2f, 0x2, 0x0, -2048, 0x40),
        AmominuD "amominu.d" => (0x2f, 0x3, 0x0, -1024, 0x60),
        AmominuW "amominu.w" => (0x2f, 0x2, 0x0, -1024, 0x60),
        AmoorD "amoor.d" => (0x2f, 0x3, 0x0, 1024, 0x20),
        AmoorW "amoor.w" => (0x2f, 0x2, 0x0, 1024, 0x20),
        AmoswapD "amoswap.d" => (0x2f, 0x3, 0x0, 128, 0x4),
        AmoswapW "amoswap.w" => (0x2f, 0x2, 0x0, 128, 0x4),
        AmoxorD "amoxor.d" => (0x2f, 0x3, 0x0, 512, 0x10),
        AmoxorW "amoxor.w" => (0x2f, 0x2, 0x0, 512, 0x10),
        And "and" => (0x33, 0x7, 0x0, 0, 0x0),
        Andi "andi" => (0x13, 0x7, 0x0, 0, 0x0),
        Auipc "auipc" => (0x17, 0x0, 0x0, 0, 0x0),
        Beq "beq" => (0x63, 0x0, 0x0, 0, 0x0),
        Bge "bge" => (0x63, 0x5, 0x0, 0, 0x0),
        Bgeu "bgeu" => (0x63, 0x7, 0x0, 0, 0x0),
        Blt "blt" => (0x63, 0x4, 0x0, 0, 0x0),
        Bltu "bltu" => (0x63, 0x6, 0x0, 0, 0x0),
        Bne "bne" => (0x63, 0x1, 0x0, 0, 0x0),
        Csrrc "csrrc" => (0x73, 0x3, 0x0, 0, 0x0),
        Csrrci "csrrci" => (0x73, 0x7, 0x0, 0, 0x0),
        Csrrs "csrrs" => (0x73, 0x2, 0x0, 0, 0x0),
        Csrrsi "csrrsi" => (0x73, 0x6, 0x0, 0, 0x0),
        Csrrw "csrrw" => (0x73, 0x1, 0x0, 0, 0x0),
        Csrrwi "csrrwi" => (0x73, 0x5, 0x0, 0, 0x0),
        Div "div" => (0x33, 0x4, 0x0, 32, 0x1),
        Divu "divu" => (0x33, 0x5, 0x0, 32, 0x1),
        Divuw "divuw" => (0x3b, 0x5, 0x0, 32, 0x1),
        Divw "divw" => (0x3b, 0x4, 0x0, 32, 0x1),
        Dret "dret" => (0x73, 0x0, 0x12, 1970, 0x3d),
        Ebreak "ebreak" => (0x73, 0x0, 0x1, 1, 0x0),
        Ecall "ecall" => (0x73, 0x0, 0x0, 0, 0x0),
        FaddD "fadd.d" => (0x53, 0x0, 0x0, 32, 0x1),
        FaddQ "fadd.q" => (0x53, 0x0, 0x0, 96, 0x3),
        FaddS "fadd.s" => (0x53, 0x0, 0x0, 0, 0x0),
        FclassD "fclass.d" => (0x53, 0x1, 0x0, -480, 0x71),
        FclassQ "fclass.q" => (0x53, 0x1, 0x0, -416, 0x73),
        FclassS "fclass.s" => (0x53, 0x1, 0x0, -512, 0x70),
        FcvtDL "fcvt.d.l" => (0x53, 0x0, 0x2, -734, 0x69),
        FcvtDLu "fcvt.d.lu" => (0x53, 0x0, 0x3, -733, 0x69),
        FcvtDQ "fcvt.d.q" => (0x53, 0x0, 0x3, 1059, 0x21),
        FcvtDS "fcvt.d.s" => (0x53, 0x0, 0x0, 1056, 0x21),
        FcvtDW "fcvt.d.w" => (0x53, 0x0, 0x0, -736, 0x69),
        FcvtDWu "fcvt.d.wu" => (0x53, 0x0, 0x1, -735, 0x69),
        FcvtLD "fcvt.l.d" => (0x53, 0x0, 0x2, -990, 0x61),
        FcvtLQ "fcvt.l.q" => (0x53, 0x0, 0x2, -926, 0x63),
        FcvtLS "fcvt.l.s" => (0x53, 0x0, 0x2, -1022, 0x60),
        FcvtLuD "fcvt.lu.d" => (0x53, 0x0, 0x3, -989, 0x61),
        FcvtLuQ "fcvt.lu.q" => (0x53, 0x0, 0x3, -925, 0x63),
        FcvtLuS "fcvt.lu.s" => (0x53, 0x0, 0x3, -1021, 0x60),
        FcvtQD "fcvt.q.d" => (0x53, 0x0, 0x1, 1121, 0x23),
        FcvtQL "fcvt.q.l" => (0x53, 0x0, 0x2, -670, 0x6b),
        FcvtQLu "fcvt.q.lu" => (0x53, 0x0, 0x3, -669, 0x6b),
        FcvtQS "fcvt.q.s" => (0x53, 0x0, 0x0, 1120, 0x23),
        FcvtQW "fcvt.q.w" => (0x53, 0x0, 0x0, -672, 0x6b),
        FcvtQWu "fcvt.q.wu" => (0x53, 0x0, 0x1, -671, 0x6b),
        FcvtSD "fcvt.s.d" => (0x53, 0x0, 0x1, 1025, 0x20),
        FcvtSL "fcvt.s.l" => (0x53, 0x0, 0x2, -766, 0x68),
        FcvtSLu "fcvt.s.lu" => (0x53, 0x0, 0x3, -765, 0x68),
        FcvtSQ "fcvt.s.q" => (0x53, 0x0, 0x3, 1027, 0x20),
        FcvtSW "fcvt.s.w" => (0x53, 0x0, 0x0, -768, 0x68),
        FcvtSWu "fcvt.s.wu" => (0x53, 0x0, 0x1, -767, 0x68),
        FcvtWD "fcvt.w.d" => (0x53, 0x0, 0x0, -992, 0x61),
        FcvtWQ "fcvt.w.q" => (0x53, 0x0, 0x0, -928, 0x63),
        FcvtWS "fcvt.w.s" => (0x53, 0x0, 0x0, -1024, 0x60),
        FcvtWuD "fcvt.wu.d" => (0x53, 0x0, 0x1, -991, 0x61),
        FcvtWuQ "fcvt.wu.q" => (0x53, 0x0, 0x1, -927, 0x63),
        FcvtWuS "fcvt.wu.s" => (0x53, 0x0, 0x1, -1023, 0x60),
        FdivD "fdiv.d" => (0x53, 0x0, 0x0, 416, 0xd),
        FdivQ "fdiv.q" => (0x53, 0x0, 0x0, 480, 0xf),
        FdivS "fdiv.s" => (0x53, 0x0, 0x0, 384, 0xc),
        Fence "fence" => (0xf, 0x0, 0x0, 0, 0x0),
        FenceTso "fence.tso" => (0xf, 0x0, 0x13, -1997, 0x41),
        FeqD "feq.d" => (0x53, 0x2, 0x0, -1504, 0x51),
        FeqQ "feq.q" => (0x53, 0x2, 0x0, -1440, 0x53),
        FeqS "feq.s" => (0x53, 0x2, 0x0, -1536, 0x50),
        Fld "fld" => (0x7, 0x3, 0x0, 0, 0x0),
        FleD "fle.d" => (0x53, 0x0, 0x0, -1504, 0x51),
        FleQ "fle.q" => (0x53, 0x0, 0x0, -1440, 0x53),
        FleS "fle.s" => (0x53, 0x0, 0x0, -1536, 0x50),
        Flq "flq" => (0x7, 0x4, 0x0, 0, 0x0),
        FltD "flt.d" => (0x53, 0x1, 0x0, -1504, 0x51),
        FltQ "flt.q" => (0x53, 0x1, 0x0, -1440, 0x53),
        FltS "flt.s" => (0x53, 0x1, 0x0, -1536, 0x50),
        Flw "flw" => (0x7, 0x2, 0x0, 0, 0x0),
        FmaddD "fmadd.d" => (0x43, 0x0, 0x0, 32, 0x1),
        FmaddQ "fmadd.q" => (0x43, 0x0, 0x0, 96, 0x3),
        FmaddS "fmadd.s" => (0x43, 0x0, 0x0, 0, 0x0),
        FmaxD "fmax.d" => (0x53, 0x1, 0x0, 672, 0x15),
        FmaxQ "fmax.q" => (0x53, 0x1, 0x0, 736, 0x17),
        FmaxS "fmax.s" => (0x53, 0x1, 0x0, 640, 0x14),
        FminD "fmin.d" => (0x53, 0x0, 0x0, 672, 0x15),
        FminQ "fmin.q" => (0x53, 0x0, 0x0, 736, 0x17),
        FminS "fmin.s" => (0x53, 0x0, 0x0, 640, 0x14),
        FmsubD "fmsub.d" => (0x47, 0x0, 0x0, 32, 0x1),
        FmsubQ "fmsub.q" => (0x47, 0x0, 0x0, 96, 0x3),
        FmsubS "fmsub.s" => (0x47, 0x0, 0x0, 0, 0x0),
        FmulD "fmul.d" => (0x53, 0x0, 0x0, 288, 0x9),
        FmulQ "fmul.q" => (0x53, 0x0, 0x0, 352, 0xb),
        FmulS "fmul.s" => (0x53, 0x0, 0x0, 256, 0x8),
        FmvDX "fmv.d.x" => (0x53, 0x0, 0x0, -224, 0x79),
        FmvSX "fmv.s.x" => (0x53, 0x0, 0x0, -256, 0x78),
        FmvWX "fmv.w.x" => (0x53, 0x0, 0x0, -256, 0x78),
        FmvXD "fmv.x.d" => (0x53, 0x0, 0x0, -480, 0x71),
        FmvXS "fmv.x.s" => (0x53, 0x0, 0x0, -512, 0x70),
        FmvXW "fmv.x.w" => (0x53, 0x0, 0x0, -512, 0x70),
        FnmaddD "fnmadd.d" => (0x4f, 0x0, 0x0, 32, 0x1),
        FnmaddQ "fnmadd.q" => (0x4f, 0x0, 0x0, 96, 0x3),
        FnmaddS "fnmadd.s" => (0x4f, 0x0, 0x0, 0, 0x0),
        FnmsubD "fnmsub.d" => (0x4b, 0x0, 0x0, 32, 0x1),
        FnmsubQ "fnmsub.q" => (0x4b, 0x0, 0x0, 96, 0x3),
        FnmsubS "fnmsub.s" => (0x4b, 0x0, 0x0, 0, 0x0),
        Frcsr "frcsr" => (0x73, 0x2, 0x3, 3, 0x0),
        Frflags "frflags" => (0x73, 0x2, 0x1, 1, 0x0),
        Frrm "frrm" => (0x73, 0x2, 0x2, 2, 0x0),
        Fscsr "fscsr" => (0x73, 0x1, 0x3, 3, 0x0),
        Fsd "fsd" => (0x27, 0x3, 0x0, 0, 0x0),
        Fsflags "fsflags" => (0x73, 0x1, 0x1, 1, 0x0),
        Fsflagsi "fsflagsi" => (0x73, 0x5, 0x1, 1, 0x0),
        FsgnjD "fsgnj.d" => (0x53, 0x0, 0x0, 544, 0x11),
        FsgnjQ "fsgnj.q" => (0x53, 0x0, 0x0, 608, 0x13),
        FsgnjS "fsgnj.s" => (0x53, 0x0, 0x0, 512, 0x10),
        FsgnjnD "fsgnjn.d" => (0x53, 0x1, 0x0, 544, 0x11),
        FsgnjnQ "fsgnjn.q" => (0x53, 0x1, 0x0, 608, 0x13),
        FsgnjnS "fsgnjn.s" => (0x53, 0x1, 0x0, 512, 0x10),
        FsgnjxD "fsgnjx.d" => (0x53, 0x2, 0x0, 544, 0x11),
        FsgnjxQ "fsgnjx.q" => (0x53, 0x2, 0x0, 608, 0x13),
        FsgnjxS "fsgnjx.s" => (0x53, 0x2, 0x0, 512, 0x10),
        Fsq "fsq" => (0x27, 0x4, 0x0, 0, 0x0),
        FsqrtD "fsqrt.d" => (0x53, 0x0, 0x0, 1440, 0x2d),
        FsqrtQ "fsqrt.q" => (0x53, 0x0, 0x0, 1504, 0x2f),
        FsqrtS "fsqrt.s" => (0x53, 0x0, 0x0, 1408, 0x2c),
        Fsrm "fsrm" => (0x73, 0x1, 0x2, 2, 0x0),
        Fsrmi "fsrmi" => (0x73, 0x5, 0x2, 2, 0x0),
        FsubD "fsub.d" => (0x53, 0x0, 0x0, 160, 0x5),
        FsubQ "fsub.q" => (0x53, 0x0, 0x0, 224, 0x7),
        FsubS "fsub.s" => (0x53, 0x0, 0x0, 128, 0x4),
        Fsw "fsw" => (0x27, 0x2, 0x0, 0, 0x0),
        Jal "jal" => (0x6f, 0x0, 0x0, 0, 0x0),
        Jalr "jalr" => (0x67, 0x0, 0x0, 0, 0x0),
        Lb "lb" => (0x3, 0x0, 0x0, 0, 0x0),
        Lbu "lbu" => (0x3, 0x4, 0x0, 0, 0x0),
        Ld "ld" => (0x3, 0x3, 0x0, 0, 0x0),
        Lh "lh" => (0x3, 0x1, 0x0, 0, 0x0),
        Lhu "lhu" => (0x3, 0x5, 0x0, 0, 0x0),
        LrD "lr.d" => (0x2f, 0x3, 0x0, 256, 0x8),
        LrW "lr.w" => (0x2f, 0x2, 0x0, 256, 0x8),
        Lui "lui" => (0x37, 0x0, 0x0, 0, 0x0),
        Lw "lw" => (0x3, 0x2, 0x0, 0, 0x0),
        Lwu "lwu" => (0x3, 0x6, 0x0, 0, 0x0),
        Mret "mret" => (0x73, 0x0, 0x2, 770, 0x18),
        Mul "mul" => (0x33, 0x0, 0x0, 32, 0x1),
        Mulh "mulh" => (0x33, 0x1, 0x0, 32, 0x1),
        Mulhsu "mulhsu" => (0x33, 0x2, 0x0, 32, 0x1),
        Mulhu "mulhu" => (0x33, 0x3, 0x0, 32, 0x1),
        Mulw "mulw" => (0x3b, 0x0, 0x0, 32, 0x1),
        Or "or" => (0x33, 0x6, 0x0, 0, 0x0),
        Ori "ori" => (0x13, 0x6, 0x0, 0, 0x0),
        Pause "pause" => (0xf, 0x0, 0x10, 16, 0x0),
        Rdcycle "rdcycle" => (0x73, 0x2, 0x0, -1024, 0x60),
        Rdcycleh "rdcycleh" => (0x73, 0x2, 0x0, -896, 0x64),
        Rdinstret "rdinstret" => (0x73, 0x2, 0x2, -1022, 0x60),
        Rdinstreth "rdinstreth" => (0x73, 0x2, 0x2, -894, 0x64),
        Rdtime "rdtime" => (0x73, 0x2, 0x1, -1023, 0x60),
        Rdtimeh "rdtimeh" => (0x73, 0x2, 0x1, -895, 0x64),
        Rem "rem" => (0x33, 0x6, 0x0, 32, 0x1),
        Remu "remu" => (0x33, 0x7, 0x0, 32, 0x1),
        Remuw "remuw" => (0x3b, 0x7, 0x0, 32, 0x1),
        Remw "remw" => (0x3b, 0x6, 0x0, 32, 0x1),
        Sb "sb" => (0x23, 0x0, 0x0, 0, 0x0),
        Sbreak "sbreak" => (0x73, 0x0, 0x1, 1, 0x0),
        ScD "sc.d" => (0x2f, 0x3, 0x0, 384, 0xc),
        ScW "sc.w" => (0x2f, 0x2, 0x0, 384, 0xc),
        Scall "scall" => (0x73, 0x0, 0x0, 0, 0x0),
        Sd "sd" => (0x23, 0x3, 0x0, 0, 0x0),
        SfenceVma "sfence.vma" => (0x73, 0x0, 0x0, 288, 0x9),
        Sh "sh" => (0x23, 0x1, 0x0, 0, 0x0),
        Sll "sll" => (0x33, 0x1, 0x0, 0, 0x0),
        Slli "slli" => (0x13, 0x1, 0x0, 0, 0x0),
        Slliw "slliw" => (0x1b, 0x1, 0x0, 0, 0x0),
        Sllw "sllw" => (0x3b, 0x1, 0x0, 0, 0x0),
        Slt "slt" => (0x33, 0x2, 0x0, 0, 0x0),
        Slti "slti" => (0x13, 0x2, 0x0, 0, 0x0),
        Sltiu "sltiu" => (0x13, 0x3, 0x0, 0, 0x0),
        Sltu "sltu" => (0x33, 0x3, 0x0, 0, 0x0),
        Sra "sra" => (0x33, 0x5, 0x0, 1024, 0x20),
        Srai "srai" => (0x13, 0x5, 0x0, 1024, 0x20),
        Sraiw "sraiw" => (0x1b, 0x5, 0x0, 1024, 0x20),
        Sraw "sraw" => (0x3b, 0x5, 0x0, 1024, 0x20),
        Sret "sret" => (0x73, 0x0, 0x2, 258, 0x8),
        Srl "srl" => (0x33, 0x5, 0x0, 0, 0x0),
        Srli "srli" => (0x13, 0x5, 0x0, 0, 0x0),
        Srliw "srliw" => (0x1b, 0x5, 0x0, 0, 0x0),
        Srlw "srlw" => (0x3b, 0x5, 0x0, 0, 0x0),
        Sub "sub" => (0x33, 0x0, 0x0, 1024, 0x20),
        Subw "subw" => (0x3b, 0x0, 0x0, 1024, 0x20),
        Sw "sw" => (0x23, 0x2, 0x0, 0, 0x0),
        Wfi "wfi" => (0x73, 0x0, 0x5, 261, 0x8),
        Xor "xor" => (0x33, 0x4, 0x0, 0, 0x0),
        Xori "xori" => (0x13, 0x4, 0x0, 0, 0x0),
    }
    pseudo {
        Mov "MOV",
        Movb "MOVB",
        Movh "MOVH",
        Movw "MOVW",
        Movbu "MOVBU",
        Movhu "MOVHU",
        Movwu "MOVWU",
        Movf "MOVF",
        Movd "MOVD",
        Neg "NEG",
        Negw "NEGW",
        Not "NOT",
        Seqz "SEQZ",
        Snez "SNEZ",
        Beqz "BEQZ",
        Bnez "BNEZ",
        Fnegd "FNEGD",
    }
}

/// Descriptor for `m`, or `None` for pseudo-instructions.
pub fn encode(m: Mnemonic) -> Option<&'static Inst> {
    ENCODINGS.get(m as usize).map(|(_, _, inst)| inst)
}

/// Like [`encode`], treating a missing descriptor as an assembler defect.
pub fn encode_or_err(m: Mnemonic) -> CompileResult<&'static Inst> {
    encode(m).ok_or_else(|| CompileError::MissingEncoding {
        arch: "riscv64",
        mnemonic: m.to_string(),
    })
}

/// Every real mnemonic with its descriptor, in table order.
pub fn encodings() -> impl Iterator<Item = (Mnemonic, &'static Inst)> {
    ENCODINGS.iter().map(|(m, _, inst)| (*m, inst))
}

impl Mnemonic {
    /// Whether this is an assembler pseudo-instruction without a descriptor.
    pub fn is_pseudo(self) -> bool {
        self as usize >= ENCODINGS.len()
    }

    /// Dotted ISA manual name (`fcvt.d.l`); `None` for pseudo-instructions.
    pub fn isa_name(self) -> Option<&'static str> {
        ENCODINGS.get(self as usize).map(|(_, name, _)| *name)
    }

    /// Look up a real mnemonic by its ISA manual name.
    pub fn from_isa_name(name: &str) -> Option<Mnemonic> {
        ENCODINGS.iter().find(|(_, n, _)| *n == name).map(|(m, _, _)| *m)
    }

    /// Look up any mnemonic by its assembler name (`FCVTDL`, `MOV`).
    pub fn from_asm_name(name: &str) -> Option<Mnemonic> {
        let upper = name.to_ascii_uppercase();
        ENCODINGS
            .iter()
            .find(|(_, n, _)| asm_name_eq(n, &upper))
            .map(|(m, _, _)| *m)
            .or_else(|| PSEUDOS.iter().find(|(_, n)| *n == upper).map(|(m, _)| *m))
    }
}

fn asm_name_eq(isa: &str, upper: &str) -> bool {
    isa.bytes()
        .filter(|&c| c != b'.')
        .map(|c| c.to_ascii_uppercase())
        .eq(upper.bytes())
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.isa_name() {
            Some(isa) => {
                for c in isa.chars().filter(|&c| c != '.') {
                    write!(f, "{}", c.to_ascii_uppercase())?;
                }
                Ok(())
            }
            None => {
                let idx = *self as usize - ENCODINGS.len();
                f.write_str(PSEUDOS.get(idx).map_or("?", |(_, name)| *name))
            }
        }
    }
}

/// RISC-V major opcode groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    Load,
    LoadFp,
    MiscMem,
    OpImm,
    Auipc,
    OpImm32,
    Store,
    StoreFp,
    Amo,
    Op,
    Lui,
    Op32,
    Madd,
    Msub,
    Nmsub,
    Nmadd,
    OpFp,
    Branch,
    Jalr,
    Jal,
    System,
}

impl OpcodeClass {
    pub fn from_opcode(opcode: u32) -> Option<OpcodeClass> {
        use OpcodeClass::*;
        Some(match opcode {
            0x03 => Load,
            0x07 => LoadFp,
            0x0f => MiscMem,
            0x13 => OpImm,
            0x17 => Auipc,
            0x1b => OpImm32,
            0x23 => Store,
            0x27 => StoreFp,
            0x2f => Amo,
            0x33 => Op,
            0x37 => Lui,
            0x3b => Op32,
            0x43 => Madd,
            0x47 => Msub,
            0x4b => Nmsub,
            0x4f => Nmadd,
            0x53 => OpFp,
            0x63 => Branch,
            0x67 => Jalr,
            0x6f => Jal,
            0x73 => System,
            _ => return None,
        })
    }
}

/// What the immediate/CSR slot of a descriptor encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmSlot {
    /// The slot carries an operand immediate filled in by the assembler.
    Unused,
    /// CSR number of a Zicsr instruction.
    CsrAddress(u16),
    /// funct12 of an environment or privileged instruction.
    Funct12(u16),
    /// fm/pred/succ bits of a fence.
    FenceBits(u16),
    /// Upper discriminant and fixed rs2 selector.
    Funct7Rs2 { funct7: u32, rs2: u32 },
}

const REG_MASK: u32 = 0x1f;
const IMM12_MASK: i64 = 0xfff;

/// Sign-extend the low 12 bits of `v`.
pub fn sign_extend_12(v: u32) -> i64 {
    (((v & 0xfff) as i32) << 20 >> 20) as i64
}

impl Inst {
    /// Build a descriptor from the fixed match bits of an instruction word.
    pub fn from_match(bits: u32) -> Inst {
        Inst {
            opcode: bits & 0x7f,
            funct3: (bits >> 12) & 0x7,
            rs2: (bits >> 20) & REG_MASK,
            csr: sign_extend_12(bits >> 20),
            funct7: (bits >> 25) & 0x7f,
        }
    }

    pub fn class(&self) -> Option<OpcodeClass> {
        OpcodeClass::from_opcode(self.opcode)
    }

    /// Per-class interpretation of [`Inst::csr`].
    pub fn imm_slot(&self) -> ImmSlot {
        let slot = (self.csr & IMM12_MASK) as u16;
        match self.class() {
            Some(OpcodeClass::System) if self.funct3 != 0 => ImmSlot::CsrAddress(slot),
            Some(OpcodeClass::System) => ImmSlot::Funct12(slot),
            Some(OpcodeClass::MiscMem) => ImmSlot::FenceBits(slot),
            // Only the shifts use the upper immediate bits as a selector.
            Some(OpcodeClass::OpImm | OpcodeClass::OpImm32) if self.funct3 != 1 && self.funct3 != 5 => {
                ImmSlot::Unused
            }
            Some(
                OpcodeClass::Load
                | OpcodeClass::LoadFp
                | OpcodeClass::Store
                | OpcodeClass::StoreFp
                | OpcodeClass::Branch
                | OpcodeClass::Jal
                | OpcodeClass::Jalr
                | OpcodeClass::Lui
                | OpcodeClass::Auipc,
            )
            | None => ImmSlot::Unused,
            Some(_) => ImmSlot::Funct7Rs2 { funct7: self.funct7, rs2: self.rs2 },
        }
    }

    /// Assemble an R-type word. A fixed rs2 selector is merged into `rs2`.
    pub fn encode_r(&self, rd: u32, rs1: u32, rs2: u32) -> u32 {
        self.funct7 << 25
            | ((self.rs2 | rs2) & REG_MASK) << 20
            | (rs1 & REG_MASK) << 15
            | self.funct3 << 12
            | (rd & REG_MASK) << 7
            | self.opcode
    }

    /// Assemble an I-type word. Fixed slot bits are merged into `imm`.
    pub fn encode_i(&self, rd: u32, rs1: u32, imm: i64) -> u32 {
        let imm = ((imm | self.csr) & IMM12_MASK) as u32;
        imm << 20 | (rs1 & REG_MASK) << 15 | self.funct3 << 12 | (rd & REG_MASK) << 7 | self.opcode
    }
}
