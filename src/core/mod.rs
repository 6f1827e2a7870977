// This module gathers the target-independent infrastructure of archgen: the error type
// shared by every layer, the build configuration read at startup, the compilation session
// that owns the symbol table and statistics, the Prog instruction stream the backends append
// to, the lowering driver with the Backend trait every target implements, and the registry
// that maps a target name to its capability table.

//! Core infrastructure shared by all targets.

pub mod compiler;
pub mod config;
pub mod error;
pub mod prog;
pub mod registry;
pub mod session;

pub use compiler::{compile_functions, genssa, ArchInfo, Backend, RegSlotHook, State};
pub use config::{BuildConfig, FloatAbi};
pub use error::{CompileError, CompileResult};
pub use prog::{Addr, AddrName, AddrType, As, LinkArch, Prog, ProgId, Progs, RegId, REG_NONE};
pub use session::{CompilationSession, SessionStats};
