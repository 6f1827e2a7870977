//! Packages: the first level of the symbol namespace.

use super::intern::InternPool;
use super::link::path_to_prefix;
use super::sym::Sym;
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Longest prefix accepted by [`Pkg::lookup_num`].
pub const MAX_NUM_PREFIX: usize = 20;

/// Path of the builtin package holding shape types. Its prefix is never escaped
/// because shape names show up inside instantiated function names.
pub const SHAPE_PKG_PATH: &str = "go.shape";

/// One imported or compiled package.
///
/// There is exactly one `Pkg` per path in a [`super::SymbolTable`]; it is never
/// dropped before the table.
pub struct Pkg {
    path: Arc<str>,
    name: Arc<str>,
    prefix: Arc<str>,
    syms: Mutex<HashMap<Arc<str>, Arc<Sym>>>,
    direct: AtomicBool,
    pool: Arc<InternPool>,
}

impl Pkg {
    pub(super) fn new(path: &str, name: &str, pool: Arc<InternPool>) -> Self {
        let prefix = if path == SHAPE_PKG_PATH {
            pool.intern(path)
        } else {
            pool.intern(&path_to_prefix(path))
        };
        Self {
            path: pool.intern(path),
            name: pool.intern(name),
            prefix,
            syms: Mutex::new(HashMap::new()),
            direct: AtomicBool::new(false),
            pool,
        }
    }

    /// Import path, e.g. `runtime/internal/sys`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared package name, e.g. `sys`. May be empty if never declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Escaped path used as the prefix of linker symbol names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(super) fn path_arc(&self) -> Arc<str> {
        Arc::clone(&self.path)
    }

    pub(super) fn prefix_arc(&self) -> Arc<str> {
        Arc::clone(&self.prefix)
    }

    /// Whether the package is imported directly by the compiled package.
    pub fn is_direct(&self) -> bool {
        self.direct.load(Ordering::Acquire)
    }

    pub fn mark_direct(&self) {
        self.direct.store(true, Ordering::Release);
    }

    pub(super) fn check_name(&self, name: &str) -> CompileResult<()> {
        if !name.is_empty() && *self.name != *name {
            return Err(CompileError::ConflictingPackage {
                path: self.path.to_string(),
                existing: self.name.to_string(),
                requested: name.to_string(),
            });
        }
        Ok(())
    }

    /// Unique symbol for `name` in this package, created on first use.
    pub fn lookup(self: &Arc<Self>, name: &str) -> Arc<Sym> {
        self.lookup_existing(name).0
    }

    /// Like [`Pkg::lookup`], also reporting whether the symbol existed before.
    pub fn lookup_existing(self: &Arc<Self>, name: &str) -> (Arc<Sym>, bool) {
        // Lock order: package symbols, then the intern pool.
        let mut syms = self.syms.lock();
        if let Some(sym) = syms.get(name) {
            return (Arc::clone(sym), true);
        }
        let name = self.pool.intern(name);
        let sym = Arc::new(Sym::new(Arc::clone(&name), self));
        syms.insert(name, Arc::clone(&sym));
        (sym, false)
    }

    /// Lookup by raw name bytes; nothing is allocated when the symbol exists.
    pub fn lookup_bytes(self: &Arc<Self>, name: &[u8]) -> CompileResult<Arc<Sym>> {
        let name = std::str::from_utf8(name).map_err(|e| CompileError::InvalidName {
            reason: e.to_string(),
        })?;
        Ok(self.lookup(name))
    }

    /// Symbol named `prefix` followed by the decimal form of `n`, used for
    /// compiler-generated temporaries.
    pub fn lookup_num(self: &Arc<Self>, prefix: &str, n: i64) -> CompileResult<Arc<Sym>> {
        if prefix.len() > MAX_NUM_PREFIX {
            return Err(CompileError::PrefixTooLong {
                prefix: prefix.to_string(),
                max: MAX_NUM_PREFIX,
            });
        }
        let name = format!("{prefix}{n}");
        self.lookup_bytes(name.as_bytes())
    }

    /// Existing symbol for `name`, without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<Sym>> {
        self.syms.lock().get(name).cloned()
    }

    /// All symbols of the package in [`Sym::less`] order.
    pub fn syms(&self) -> Vec<Arc<Sym>> {
        let mut syms: Vec<_> = self.syms.lock().values().cloned().collect();
        syms.sort_by(|a, b| a.compare(b));
        syms
    }

    pub fn sym_count(&self) -> usize {
        self.syms.lock().len()
    }
}

impl fmt::Debug for Pkg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkg")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("direct", &self.is_direct())
            .finish()
    }
}
