//! Symbols: names in the segmented (package, name) namespace.
//!
//! A [`Sym`] is created once per (package, name) pair and handed out as an
//! `Arc<Sym>`; pointer identity is the equality downstream passes rely on.
//! Exported field and method names are registered in the local package
//! instead of their declaring package (see [`super::SymbolTable::selector`]),
//! so identity alone decides whether two selector expressions name the same
//! member.

use super::pkg::Pkg;
use crate::core::error::{CompileError, CompileResult};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, Weak};

/// Per-symbol boolean marks, one bit each.
///
/// Bit positions are stable; later passes test them individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymFlags(u8);

impl SymFlags {
    /// Already added to the export list.
    pub const ON_EXPORT_LIST: SymFlags = SymFlags(1 << 0);
    pub const UNIQ: SymFlags = SymFlags(1 << 1);
    /// Type symbol has been generated.
    pub const SIGGEN: SymFlags = SymFlags(1 << 2);
    /// On the assembly header list.
    pub const ASM: SymFlags = SymFlags(1 << 3);
    /// Function symbol.
    pub const FUNC: SymFlags = SymFlags(1 << 4);

    pub const fn empty() -> Self {
        SymFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: SymFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SymFlags {
    type Output = SymFlags;

    fn bitor(self, rhs: SymFlags) -> SymFlags {
        SymFlags(self.0 | rhs.0)
    }
}

/// Kind of declaration a symbol is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Func,
    Var,
    Type,
    Const,
}

/// The declaration a symbol names in the current scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub kind: DeclKind,
}

/// An object name within one package.
pub struct Sym {
    name: Arc<str>,
    pkg: Weak<Pkg>,
    pkg_path: Arc<str>,
    pkg_prefix: Arc<str>,
    linkname: OnceLock<Arc<str>>,
    def: OnceLock<Decl>,
    flags: AtomicU8,
}

impl Sym {
    pub(super) fn new(name: Arc<str>, pkg: &Arc<Pkg>) -> Self {
        Self {
            name,
            pkg: Arc::downgrade(pkg),
            pkg_path: pkg.path_arc(),
            pkg_prefix: pkg.prefix_arc(),
            linkname: OnceLock::new(),
            def: OnceLock::new(),
            flags: AtomicU8::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Owning package. Packages live as long as the symbol table, so this only
    /// fails once the table itself has been dropped.
    pub fn pkg(&self) -> Option<Arc<Pkg>> {
        self.pkg.upgrade()
    }

    pub fn pkg_path(&self) -> &str {
        &self.pkg_path
    }

    pub fn pkg_prefix(&self) -> &str {
        &self.pkg_prefix
    }

    /// Explicit linker name override, if one was set.
    pub fn linkname(&self) -> Option<&str> {
        self.linkname.get().map(|s| &**s)
    }

    /// Bind an explicit linker name. Setting the same name twice is allowed.
    pub fn set_linkname(&self, linkname: &str) -> CompileResult<()> {
        let current = self.linkname.get_or_init(|| Arc::from(linkname));
        if &**current != linkname {
            return Err(CompileError::InvalidName {
                reason: format!("{self} already has link name {current}, cannot use {linkname}"),
            });
        }
        Ok(())
    }

    /// Declaration this symbol is bound to.
    pub fn def(&self) -> Option<&Decl> {
        self.def.get()
    }

    /// Bind the symbol to a declaration. Each symbol is bound at most once.
    pub fn bind(&self, decl: Decl) -> CompileResult<()> {
        self.def
            .set(decl)
            .map_err(|_| CompileError::SymbolRedeclared { sym: self.to_string() })
    }

    pub fn flags(&self) -> SymFlags {
        SymFlags(self.flags.load(AtomicOrdering::Acquire))
    }

    pub fn has_flag(&self, flag: SymFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set_flag(&self, flag: SymFlags, on: bool) {
        if on {
            self.flags.fetch_or(flag.bits(), AtomicOrdering::AcqRel);
        } else {
            self.flags.fetch_and(!flag.bits(), AtomicOrdering::AcqRel);
        }
    }

    pub fn on_export_list(&self) -> bool {
        self.has_flag(SymFlags::ON_EXPORT_LIST)
    }

    pub fn uniq(&self) -> bool {
        self.has_flag(SymFlags::UNIQ)
    }

    pub fn siggen(&self) -> bool {
        self.has_flag(SymFlags::SIGGEN)
    }

    pub fn asm(&self) -> bool {
        self.has_flag(SymFlags::ASM)
    }

    pub fn is_func(&self) -> bool {
        self.has_flag(SymFlags::FUNC)
    }

    pub fn set_on_export_list(&self, b: bool) {
        self.set_flag(SymFlags::ON_EXPORT_LIST, b);
    }

    pub fn set_uniq(&self, b: bool) {
        self.set_flag(SymFlags::UNIQ, b);
    }

    pub fn set_siggen(&self, b: bool) {
        self.set_flag(SymFlags::SIGGEN, b);
    }

    pub fn set_asm(&self, b: bool) {
        self.set_flag(SymFlags::ASM, b);
    }

    pub fn set_func(&self, b: bool) {
        self.set_flag(SymFlags::FUNC, b);
    }

    pub fn is_blank(&self) -> bool {
        &*self.name == "_"
    }

    pub fn is_exported(&self) -> bool {
        is_exported(&self.name)
    }

    /// Reports whether `self` is ordered before `other`.
    ///
    /// Exported symbols come first, then symbols are ordered by name and
    /// finally, for unexported names, by package path.
    pub fn less(&self, other: &Sym) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Total order behind [`Sym::less`], usable with `sort_by`.
    pub fn compare(&self, other: &Sym) -> Ordering {
        if std::ptr::eq(self, other) {
            return Ordering::Equal;
        }
        let ea = self.is_exported();
        let eb = other.is_exported();
        if ea != eb {
            return if ea { Ordering::Less } else { Ordering::Greater };
        }
        match self.name.cmp(&other.name) {
            Ordering::Equal if !ea => self.pkg_path.cmp(&other.pkg_path),
            ord => ord,
        }
    }
}

/// [`Sym::less`] extended to absent symbols, which sort first.
pub fn sym_less(a: Option<&Sym>, b: Option<&Sym>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.less(b),
        (None, Some(_)) => true,
        _ => false,
    }
}

/// Whether `name` is exported, that is, begins with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pkg_path.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.pkg_path, self.name)
        }
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sym")
            .field("pkg", &self.pkg_path)
            .field("name", &self.name)
            .field("linkname", &self.linkname())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Foo"));
        assert!(is_exported("Ärger"));
        assert!(!is_exported("foo"));
        assert!(!is_exported("_"));
        assert!(!is_exported("ärger"));
        assert!(!is_exported(""));
    }

    #[test]
    fn test_flag_bits_are_stable() {
        assert_eq!(SymFlags::ON_EXPORT_LIST.bits(), 0x01);
        assert_eq!(SymFlags::UNIQ.bits(), 0x02);
        assert_eq!(SymFlags::SIGGEN.bits(), 0x04);
        assert_eq!(SymFlags::ASM.bits(), 0x08);
        assert_eq!(SymFlags::FUNC.bits(), 0x10);
        assert!((SymFlags::ASM | SymFlags::FUNC).contains(SymFlags::FUNC));
        assert!(!SymFlags::empty().contains(SymFlags::UNIQ));
    }

    #[test]
    fn test_nil_sorts_first() {
        assert!(!sym_less(None, None));
    }
}
