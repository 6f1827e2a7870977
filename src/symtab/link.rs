//! Linker-visible symbols.
//!
//! Every [`super::Sym`] resolves on demand to exactly one [`LinkSym`] per ABI.
//! The linker name is either the symbol's explicit link name or is derived
//! from the owning package's escaped prefix and the symbol name; downstream
//! tools match these names byte for byte.

use object::SymbolKind;
use std::fmt;
use std::sync::Arc;

/// Calling convention tag attached to a linker symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Abi {
    /// Stable stack-based convention used by assembly.
    Abi0,
    /// Register-based convention used by compiled functions.
    Internal,
}

impl Abi {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        match self {
            Abi::Abi0 => 0,
            Abi::Internal => 1,
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abi::Abi0 => write!(f, "ABI0"),
            Abi::Internal => write!(f, "ABIInternal"),
        }
    }
}

/// A symbol as the object writer and linker see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSym {
    pub name: Arc<str>,
    pub abi: Abi,
    /// Package prefix the symbol is attributed to (`_` for link-named symbols).
    pub pkg: Arc<str>,
    pub kind: SymbolKind,
}

impl fmt::Display for LinkSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.abi)
    }
}

/// Prefixes whose symbols use `:` instead of `.` as the separator.
const RESERVED_PREFIXES: [&str; 2] = ["go", "type"];

/// Linker name for `name` declared in the package with the given prefix.
pub fn pkg_link_name(prefix: &str, name: &str) -> String {
    if name == "_" {
        return "_".to_string();
    }
    let sep = if RESERVED_PREFIXES.contains(&prefix) { ':' } else { '.' };
    format!("{prefix}{sep}{name}")
}

/// Escape an import path for use as a linker symbol prefix.
///
/// Control characters, space, `%`, `"`, non-ASCII bytes and any `.` after the
/// last `/` are written as `%xx` with lower-case hex digits.
pub fn path_to_prefix(path: &str) -> String {
    let bytes = path.as_bytes();
    let last_slash = bytes.iter().rposition(|&c| c == b'/');
    let needs_escape = |i: usize, c: u8| {
        c <= b' '
            || (c == b'.' && last_slash.map_or(true, |slash| i > slash))
            || c == b'%'
            || c == b'"'
            || c >= 0x7f
    };

    if !bytes.iter().enumerate().any(|(i, &c)| needs_escape(i, c)) {
        return path.to_string();
    }

    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = Vec::with_capacity(bytes.len() + 8);
    for (i, &c) in bytes.iter().enumerate() {
        if needs_escape(i, c) {
            out.push(b'%');
            out.push(HEX[(c >> 4) as usize]);
            out.push(HEX[(c & 0xf) as usize]);
        } else {
            out.push(c);
        }
    }
    // Only ASCII is left once every byte >= 0x7f is escaped.
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_prefix() {
        assert_eq!(path_to_prefix("runtime"), "runtime");
        assert_eq!(path_to_prefix("encoding/json"), "encoding/json");
        assert_eq!(path_to_prefix("gopkg.in/yaml.v2"), "gopkg.in/yaml%2ev2");
        assert_eq!(path_to_prefix("a b"), "a%20b");
        assert_eq!(path_to_prefix("100%"), "100%25");
        assert_eq!(path_to_prefix("q\"uote"), "q%22uote");
        assert_eq!(path_to_prefix("caf\u{e9}"), "caf%c3%a9");
        assert_eq!(path_to_prefix("go.shape"), "go%2eshape");
    }

    #[test]
    fn test_pkg_link_name() {
        assert_eq!(pkg_link_name("main", "main"), "main.main");
        assert_eq!(pkg_link_name("go", "itab"), "go:itab");
        assert_eq!(pkg_link_name("type", "int"), "type:int");
        assert_eq!(pkg_link_name("main", "_"), "_");
        assert_eq!(
            pkg_link_name("gopkg.in/yaml%2ev2", "Marshal"),
            "gopkg.in/yaml%2ev2.Marshal"
        );
    }
}
