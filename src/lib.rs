//! archgen - multi-architecture code generation backend.
//!
//! Lowers register-assigned SSA functions into per-target instruction
//! streams and names everything the linker sees.
//!
//! ```ignore
//! use archgen::core::{registry, BuildConfig, CompilationSession};
//! use bumpalo::Bump;
//!
//! let cfg = BuildConfig::for_arch("riscv64");
//! let arch = registry::init(&cfg)?;
//! let session = CompilationSession::new(&cfg.local_pkg);
//! let funcs = archgen::ssa::parse_funcs(src, arch.link_arch, session.symtab())?;
//!
//! let arena = Bump::new();
//! let progs = archgen::core::genssa(&arch, &session, &funcs[0], &arena)?;
//! print!("{progs}");
//! ```
//!
//! # Architecture
//!
//! - [`core`] - registry, lowering driver, Prog streams, session and errors
//! - [`symtab`] - packages, symbols, interned strings and linker symbols
//! - [`ssa`] - the register-assigned IR consumed by the backends
//! - [`riscv64`], [`loong64`], [`mips64`], [`x64`] - the targets

pub mod core;
pub mod loong64;
pub mod mips64;
pub mod riscv64;
pub mod ssa;
pub mod symtab;
pub mod x64;

pub use crate::core::registry::{self, supported_archs};
pub use crate::core::{
    ArchInfo, Backend, BuildConfig, CompilationSession, CompileError, CompileResult, FloatAbi, Progs,
};
pub use crate::symtab::SymbolTable;
