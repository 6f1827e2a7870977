// This module implements the two-level symbol namespace shared by every function compiled in
// one session. SymbolTable owns the intern pool, the package registry (exactly one Pkg per
// import path, with conflicting registrations reported as errors), the distinguished local
// package that exported selector names are redirected to, and the linker symbol table that
// resolves each Sym to one LinkSym per ABI. All first insertions (package, symbol, interned
// string, linker symbol) happen under parking_lot mutexes so lowering workers can resolve
// runtime helpers concurrently; lookups of existing entries take the same locks. Lock order
// is registry, then package symbols, then linker symbols, then intern pool. The pool is a leaf
// lock: it is taken while the others are held and never takes another lock itself.

//! Package and symbol registry.
//!
//! # Key Components
//!
//! - [`InternPool`] - canonical string instances
//! - [`Pkg`] - per-path package with its symbol map
//! - [`Sym`] - unique (package, name) symbol with flags and bindings
//! - [`LinkSym`] - linker-visible name and ABI for a symbol
//! - [`hard_coded_pkg_id`] - fixed coverage ids for runtime packages

pub mod intern;
pub mod link;
pub mod pkg;
pub mod pkid;
pub mod sym;

pub use intern::InternPool;
pub use link::{path_to_prefix, pkg_link_name, Abi, LinkSym};
pub use pkg::{Pkg, MAX_NUM_PREFIX, SHAPE_PKG_PATH};
pub use pkid::{hard_coded_pkg_id, NOT_HARD_CODED};
pub use sym::{is_exported, sym_less, Decl, DeclKind, Sym, SymFlags};

use crate::core::error::CompileResult;
use hashbrown::HashMap;
use object::SymbolKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Package name attributed to symbols that carry an explicit link name.
const LINKNAME_PKG: &str = "_";

/// Registry of all packages, symbols and linker symbols of one compilation.
pub struct SymbolTable {
    pool: Arc<InternPool>,
    pkgs: Mutex<HashMap<Arc<str>, Arc<Pkg>>>,
    local: Arc<Pkg>,
    linksyms: Mutex<[HashMap<Arc<str>, Arc<LinkSym>>; Abi::COUNT]>,
}

impl SymbolTable {
    /// Create a table whose local package has the given path and name.
    pub fn new(local_path: &str, local_name: &str) -> Self {
        let pool = Arc::new(InternPool::new());
        let local = Arc::new(Pkg::new(local_path, local_name, Arc::clone(&pool)));
        let mut pkgs = HashMap::new();
        pkgs.insert(pool.intern(local_path), Arc::clone(&local));
        Self {
            pool,
            pkgs: Mutex::new(pkgs),
            local,
            linksyms: Mutex::new([HashMap::new(), HashMap::new()]),
        }
    }

    /// The unique package for `path`, created on first use.
    ///
    /// A non-empty `name` must match the name the package was created with;
    /// an empty `name` is always compatible.
    pub fn new_pkg(&self, path: &str, name: &str) -> CompileResult<Arc<Pkg>> {
        let mut pkgs = self.pkgs.lock();
        if let Some(pkg) = pkgs.get(path) {
            pkg.check_name(name)?;
            return Ok(Arc::clone(pkg));
        }
        let pkg = Arc::new(Pkg::new(path, name, Arc::clone(&self.pool)));
        pkgs.insert(pkg.path_arc(), Arc::clone(&pkg));
        log::debug!("new package {:?} (name {:?}, prefix {:?})", path, name, pkg.prefix());
        Ok(pkg)
    }

    /// Existing package for `path`.
    pub fn pkg(&self, path: &str) -> Option<Arc<Pkg>> {
        self.pkgs.lock().get(path).cloned()
    }

    /// The package being compiled.
    pub fn local_pkg(&self) -> &Arc<Pkg> {
        &self.local
    }

    /// All packages, ordered by path.
    pub fn packages(&self) -> Vec<Arc<Pkg>> {
        let mut pkgs: Vec<_> = self.pkgs.lock().values().cloned().collect();
        pkgs.sort_by(|a, b| a.path().cmp(b.path()));
        pkgs
    }

    /// Symbol for a selector (field or method) name declared in `pkg`.
    ///
    /// Exported names are looked up in the local package so identity
    /// comparison tells whether two selectors name the same member.
    pub fn selector(&self, pkg: &Arc<Pkg>, name: &str) -> Arc<Sym> {
        if is_exported(name) {
            self.local.lookup(name)
        } else {
            pkg.lookup(name)
        }
    }

    pub fn intern(&self, s: &str) -> Arc<str> {
        self.pool.intern(s)
    }

    pub fn intern_bytes(&self, b: &[u8]) -> CompileResult<Arc<str>> {
        self.pool.intern_bytes(b)
    }

    pub fn pool(&self) -> &InternPool {
        &self.pool
    }

    /// Declare `sym` as an imported function.
    pub fn import_func(&self, sym: &Sym) -> CompileResult<()> {
        sym.bind(Decl { kind: DeclKind::Func })?;
        sym.set_func(true);
        Ok(())
    }

    /// Declare `sym` as an imported package-level variable.
    pub fn import_var(&self, sym: &Sym) -> CompileResult<()> {
        sym.bind(Decl { kind: DeclKind::Var })
    }

    /// Linker symbol for `sym`, using the register ABI for functions.
    pub fn linksym(&self, sym: &Sym) -> Arc<LinkSym> {
        let abi = if sym.is_func() { Abi::Internal } else { Abi::Abi0 };
        self.linksym_abi(sym, abi)
    }

    /// Linker symbol for `sym` under an explicit ABI.
    pub fn linksym_abi(&self, sym: &Sym, abi: Abi) -> Arc<LinkSym> {
        let kind = if sym.is_func() { SymbolKind::Text } else { SymbolKind::Data };
        match sym.linkname() {
            Some(linkname) => self.lookup_link(linkname, abi, LINKNAME_PKG, kind),
            None => {
                let name = pkg_link_name(sym.pkg_prefix(), sym.name());
                self.lookup_link(&name, abi, sym.pkg_prefix(), kind)
            }
        }
    }

    /// Linker symbol for a function in package `runtime`.
    pub fn runtime_func(&self, name: &str) -> CompileResult<Arc<LinkSym>> {
        let runtime = self.new_pkg("runtime", "runtime")?;
        let sym = runtime.lookup(name);
        sym.set_func(true);
        Ok(self.linksym(&sym))
    }

    /// Existing linker symbol by name and ABI.
    pub fn link_get(&self, name: &str, abi: Abi) -> Option<Arc<LinkSym>> {
        self.linksyms.lock()[abi.index()].get(name).cloned()
    }

    /// All linker symbols, ordered by name then ABI.
    pub fn linksyms(&self) -> Vec<Arc<LinkSym>> {
        let tables = self.linksyms.lock();
        let mut all: Vec<_> = tables.iter().flat_map(|t| t.values().cloned()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.abi.cmp(&b.abi)));
        all
    }

    fn lookup_link(&self, name: &str, abi: Abi, pkg: &str, kind: SymbolKind) -> Arc<LinkSym> {
        let pkg = self.pool.intern(pkg);
        let mut tables = self.linksyms.lock();
        let table = &mut tables[abi.index()];
        if let Some(ls) = table.get(name) {
            return Arc::clone(ls);
        }
        let name = self.pool.intern(name);
        let ls = Arc::new(LinkSym {
            name: Arc::clone(&name),
            abi,
            pkg,
            kind,
        });
        table.insert(name, Arc::clone(&ls));
        ls
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("local", &self.local.path())
            .field("packages", &self.pkgs.lock().len())
            .field("interned", &self.pool.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CompileError;

    #[test]
    fn test_local_pkg_registered() {
        let table = SymbolTable::new("main", "main");
        let local = table.new_pkg("main", "").unwrap();
        assert!(Arc::ptr_eq(&local, table.local_pkg()));
    }

    #[test]
    fn test_linksym_abi_follows_func_flag() {
        let table = SymbolTable::new("main", "main");
        let fmt = table.new_pkg("fmt", "fmt").unwrap();

        let v = fmt.lookup("debug");
        let ls = table.linksym(&v);
        assert_eq!(&*ls.name, "fmt.debug");
        assert_eq!(ls.abi, Abi::Abi0);
        assert_eq!(ls.kind, SymbolKind::Data);

        let f = fmt.lookup("Println");
        table.import_func(&f).unwrap();
        let ls = table.linksym(&f);
        assert_eq!(&*ls.name, "fmt.Println");
        assert_eq!(ls.abi, Abi::Internal);
        assert_eq!(ls.kind, SymbolKind::Text);
        assert!(Arc::ptr_eq(&ls, &table.linksym(&f)));
    }

    #[test]
    fn test_linkname_override() {
        let table = SymbolTable::new("main", "main");
        let s = table.local_pkg().lookup("nanotime");
        s.set_linkname("runtime.nanotime").unwrap();
        s.set_linkname("runtime.nanotime").unwrap();
        assert!(s.set_linkname("runtime.walltime").is_err());

        let ls = table.linksym(&s);
        assert_eq!(&*ls.name, "runtime.nanotime");
        assert_eq!(&*ls.pkg, "_");
    }

    #[test]
    fn test_import_twice_fails() {
        let table = SymbolTable::new("main", "main");
        let s = table.local_pkg().lookup("x");
        table.import_var(&s).unwrap();
        assert_eq!(s.def().map(|d| d.kind), Some(DeclKind::Var));
        assert!(matches!(
            table.import_func(&s),
            Err(CompileError::SymbolRedeclared { .. })
        ));
        assert!(!s.is_func());
    }

    #[test]
    fn test_runtime_func() {
        let table = SymbolTable::new("main", "main");
        let ls = table.runtime_func("panicIndex").unwrap();
        assert_eq!(&*ls.name, "runtime.panicIndex");
        assert_eq!(ls.abi, Abi::Internal);
        assert!(table.link_get("runtime.panicIndex", Abi::Internal).is_some());
        assert!(table.link_get("runtime.panicIndex", Abi::Abi0).is_none());
        assert!(table.pkg("runtime").is_some());
    }

    #[test]
    fn test_linksyms_and_interning_from_many_threads() {
        let table = SymbolTable::new("main", "main");
        let names = ["panicIndex", "panicSlice", "morestack", "gcWriteBarrier"];
        let resolved: Vec<Vec<Arc<LinkSym>>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        names
                            .iter()
                            .map(|n| {
                                // Interning while other workers hold the linker symbol lock.
                                table.intern(n);
                                table.runtime_func(n).unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        for per_worker in &resolved[1..] {
            for (a, b) in per_worker.iter().zip(&resolved[0]) {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        let name = table.pool().get("runtime.panicIndex").unwrap();
        assert!(Arc::ptr_eq(&name, &resolved[0][0].name));
        assert_eq!(table.linksyms().len(), names.len());
    }
}
