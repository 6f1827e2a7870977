//! Hard-coded package ids for coverage instrumentation of the runtime.
//!
//! Coverage counters are normally registered by a package's init function,
//! but the runtime and the packages it depends on can run code before their
//! own init has finished. Those packages get fixed ids instead. If the
//! runtime's dependency list changes, this list must change with it or the
//! coverage runtime reports a mismatch.

/// Pseudo-id for packages that do not need a hard-coded id.
pub const NOT_HARD_CODED: i32 = -1;

const RUNTIME_PKGS: [&str; 12] = [
    "internal/cpu",
    "internal/goarch",
    "runtime/internal/atomic",
    "internal/goos",
    "internal/chacha8rand",
    "runtime/internal/sys",
    "internal/abi",
    "runtime/internal/math",
    "internal/bytealg",
    "internal/goexperiment",
    "runtime/internal/syscall",
    "runtime",
];

/// Hard-coded id for `pkg_path`, or [`NOT_HARD_CODED`].
///
/// Ids start at -2 and decrease in list order.
pub fn hard_coded_pkg_id(pkg_path: &str) -> i32 {
    RUNTIME_PKGS
        .iter()
        .position(|&p| p == pkg_path)
        .map_or(NOT_HARD_CODED, |k| -(k as i32) - 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_coded_ids() {
        assert_eq!(hard_coded_pkg_id("internal/cpu"), -2);
        assert_eq!(hard_coded_pkg_id("internal/goarch"), -3);
        assert_eq!(hard_coded_pkg_id("runtime"), -13);
        assert_eq!(hard_coded_pkg_id("fmt"), NOT_HARD_CODED);
    }
}
