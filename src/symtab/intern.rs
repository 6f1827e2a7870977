//! String interning.
//!
//! Every symbol name goes through one [`InternPool`] so equal names share a
//! single allocation for the lifetime of the compilation session.

use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashSet;
use parking_lot::Mutex;
use std::sync::Arc;

/// Canonicalizing map from string content to one shared instance.
#[derive(Debug, Default)]
pub struct InternPool {
    strings: Mutex<HashSet<Arc<str>>>,
}

impl InternPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical instance for `s`, inserting it on first use.
    pub fn intern(&self, s: &str) -> Arc<str> {
        let mut strings = self.strings.lock();
        if let Some(interned) = strings.get(s) {
            return Arc::clone(interned);
        }
        let interned: Arc<str> = Arc::from(s);
        strings.insert(Arc::clone(&interned));
        interned
    }

    /// Intern raw name bytes. Names must be valid UTF-8.
    ///
    /// No allocation happens when the content is already interned.
    pub fn intern_bytes(&self, b: &[u8]) -> CompileResult<Arc<str>> {
        let s = std::str::from_utf8(b).map_err(|e| CompileError::InvalidName {
            reason: e.to_string(),
        })?;
        Ok(self.intern(s))
    }

    /// Canonical instance for `s` if it was interned before.
    pub fn get(&self, s: &str) -> Option<Arc<str>> {
        self.strings.lock().get(s).cloned()
    }

    pub fn len(&self) -> usize {
        self.strings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning() {
        let pool = InternPool::new();

        let s1 = pool.intern("hello");
        let s2 = pool.intern_bytes(b"hello").unwrap();
        let s3 = pool.intern("world");

        assert!(Arc::ptr_eq(&s1, &s2));
        assert!(!Arc::ptr_eq(&s1, &s3));
        assert_eq!(pool.len(), 2);
        assert!(pool.get("hello").is_some());
        assert!(pool.get("missing").is_none());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let pool = InternPool::new();
        let err = pool.intern_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, CompileError::InvalidName { .. }));
        assert!(pool.is_empty());
    }
}
