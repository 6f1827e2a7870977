// This module defines the error types for archgen using the thiserror crate. CompileError is
// the single error enum shared by every layer: the target registry (unknown architecture
// names, the only configuration error), the symbol table (conflicting package registrations,
// redeclared symbols, over-long numbered prefixes, non UTF-8 names), the RISC-V encoder
// (mnemonics without a descriptor) and the lowering backends (IR operations or block kinds a
// target has no case for, register-assignment contract violations, bad zeroing ranges). Each
// variant carries the identity of what failed so the driver can report it before aborting.
// CompileResult<T> is the usual alias for Result<T, CompileError>.

//! Error types for archgen.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for target selection, encoding, lowering and symbol management.
///
/// Everything except [`CompileError::UnknownArch`] signals a compiler defect and
/// must abort the compilation; none of these failures are transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown architecture {name:?}")]
    UnknownArch { name: String },

    #[error("conflicting package names {existing} and {requested} for path {path:?}")]
    ConflictingPackage {
        path: String,
        existing: String,
        requested: String,
    },

    #[error("{arch}: no encoding for instruction {mnemonic}")]
    MissingEncoding {
        arch: &'static str,
        mnemonic: String,
    },

    #[error("{arch}: {func}: unhandled value {value} ({op})")]
    UnhandledValue {
        arch: &'static str,
        func: String,
        value: String,
        op: String,
    },

    #[error("{arch}: {func}: unhandled block {block} of kind {kind}")]
    UnhandledBlock {
        arch: &'static str,
        func: String,
        block: String,
        kind: String,
    },

    #[error("symbol {sym} is already bound to a declaration")]
    SymbolRedeclared { sym: String },

    #[error("numbered symbol prefix {prefix:?} exceeds {max} bytes")]
    PrefixTooLong { prefix: String, max: usize },

    #[error("invalid symbol name: {reason}")]
    InvalidName { reason: String },

    #[error("invalid zeroing range: offset {off}, length {cnt}")]
    InvalidZeroRange { off: i64, cnt: i64 },

    #[error("code generation failed in {func}: {reason}")]
    CodeGeneration { func: String, reason: String },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl CompileError {
    /// Whether this error comes from user configuration rather than a compiler defect.
    pub fn is_config_error(&self) -> bool {
        matches!(self, CompileError::UnknownArch { .. })
    }

    /// Process exit status the driver uses for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_config_error() {
            2
        } else {
            1
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config = CompileError::UnknownArch { name: "vax".into() };
        assert!(config.is_config_error());
        assert_eq!(config.exit_code(), 2);
        assert_eq!(config.to_string(), "unknown architecture \"vax\"");

        let internal = CompileError::ConflictingPackage {
            path: "a/b".into(),
            existing: "b".into(),
            requested: "c".into(),
        };
        assert!(!internal.is_config_error());
        assert_eq!(internal.exit_code(), 1);
        assert_eq!(
            internal.to_string(),
            "conflicting package names b and c for path \"a/b\""
        );
    }
}
