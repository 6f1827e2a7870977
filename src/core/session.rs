// This module provides the compilation session shared by every lowering worker. A
// CompilationSession owns the SymbolTable (packages, symbols, interned strings and linker
// symbols) and the session statistics. Unlike per-function state, which lives in a worker's
// bumpalo arena and is thrown away after each function, the session outlives all functions of
// one compilation and is only ever borrowed immutably; everything it mutates sits behind a
// parking_lot lock so workers on different threads can record results and resolve runtime
// helpers concurrently. SessionStats tracks functions lowered, instructions emitted, the
// per-opcode breakdown and the largest function, and renders itself for the CLI.

//! Compilation session shared across lowering workers.

use crate::symtab::SymbolTable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// State shared by all functions of one compilation.
///
/// The session is `Sync`; lowering workers hold `&CompilationSession`.
#[derive(Debug)]
pub struct CompilationSession {
    symtab: SymbolTable,
    stats: Mutex<SessionStats>,
}

impl CompilationSession {
    /// Create a session compiling the package at `local_path`.
    ///
    /// The local package's declared name is the last path element.
    pub fn new(local_path: &str) -> Self {
        let name = local_path.rsplit('/').next().unwrap_or(local_path);
        Self {
            symtab: SymbolTable::new(local_path, name),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    /// Package and symbol registry of this compilation.
    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    /// Intern a string in the session pool.
    pub fn intern_str(&self, s: &str) -> Arc<str> {
        self.symtab.intern(s)
    }

    /// Record that a function was lowered.
    ///
    /// `opcodes` lists the mnemonic of every emitted instruction.
    pub fn record_function_lowered<'a, I>(&self, name: &str, opcodes: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut local: HashMap<&str, usize> = HashMap::new();
        let mut progs = 0;
        for op in opcodes {
            *local.entry(op).or_insert(0) += 1;
            progs += 1;
        }

        let mut stats = self.stats.lock();
        stats.functions_lowered += 1;
        stats.progs_emitted += progs;
        for (op, count) in local {
            *stats.instruction_counts.entry(op.to_string()).or_insert(0) += count;
        }
        if stats.largest_function_progs < progs {
            stats.largest_function_progs = progs;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record a call to a runtime helper.
    pub fn record_runtime_call(&self, helper: &str) {
        self.stats.lock().runtime_calls += 1;
        log::trace!("runtime call to {}", helper);
    }

    /// Snapshot of the statistics gathered so far.
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions lowered.
    pub functions_lowered: usize,

    /// Number of instructions emitted over all functions.
    pub progs_emitted: usize,

    /// Count of each emitted mnemonic.
    pub instruction_counts: HashMap<String, usize>,

    pub largest_function_progs: usize,
    pub largest_function_name: String,

    /// Calls to runtime helpers inserted by the backends.
    pub runtime_calls: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Instructions emitted: {}", self.progs_emitted)?;
        writeln!(f, "  Runtime calls: {}", self.runtime_calls)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_progs
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then(a.cmp(b)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = CompilationSession::new("example.com/cmd/tool");
        assert_eq!(session.symtab().local_pkg().name(), "tool");
        assert_eq!(session.symtab().local_pkg().path(), "example.com/cmd/tool");

        let stats = session.stats();
        assert_eq!(stats.functions_lowered, 0);
        assert_eq!(stats.progs_emitted, 0);
    }

    #[test]
    fn test_string_interning() {
        let session = CompilationSession::new("main");
        let s1 = session.intern_str("hello");
        let s2 = session.intern_str("hello");
        let s3 = session.intern_str("world");
        assert!(Arc::ptr_eq(&s1, &s2));
        assert!(!Arc::ptr_eq(&s1, &s3));
    }

    #[test]
    fn test_session_statistics() {
        let session = CompilationSession::new("main");
        session.record_function_lowered("small", ["ADD", "RET"]);
        session.record_function_lowered("big", ["ADD", "ADD", "SUB", "RET"]);
        session.record_runtime_call("runtime.panicIndex");

        let stats = session.stats();
        assert_eq!(stats.functions_lowered, 2);
        assert_eq!(stats.progs_emitted, 6);
        assert_eq!(stats.instruction_counts["ADD"], 3);
        assert_eq!(stats.instruction_counts["RET"], 2);
        assert_eq!(stats.largest_function_name, "big");
        assert_eq!(stats.runtime_calls, 1);

        let output = stats.to_string();
        assert!(output.contains("Functions lowered: 2"));
        assert!(output.contains("big (4 instructions)"));
        assert!(output.contains("ADD: 3"));
    }
}
