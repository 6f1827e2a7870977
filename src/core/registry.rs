//! Target registry.
//!
//! Maps a target name to the function that builds its [`ArchInfo`]. The
//! table is fixed at compile time and consulted once at startup.

use super::compiler::ArchInfo;
use super::config::BuildConfig;
use super::error::{CompileError, CompileResult};

type ArchInit = fn(&BuildConfig) -> ArchInfo;

/// Supported targets, sorted by name.
static ARCH_INITS: &[(&str, ArchInit)] = &[
    ("amd64", crate::x64::init),
    ("loong64", crate::loong64::init),
    ("mips64", crate::mips64::init),
    ("mips64le", crate::mips64::init),
    ("riscv64", crate::riscv64::init),
];

/// Build the capability table for `cfg.arch`.
pub fn init(cfg: &BuildConfig) -> CompileResult<ArchInfo> {
    let init = ARCH_INITS
        .iter()
        .find(|(name, _)| *name == cfg.arch)
        .map(|&(_, init)| init)
        .ok_or_else(|| CompileError::UnknownArch { name: cfg.arch.clone() })?;
    let info = init(cfg);
    log::debug!("selected target {} (soft float: {})", info.name(), info.soft_float);
    Ok(info)
}

/// Names accepted by [`init`].
pub fn supported_archs() -> impl Iterator<Item = &'static str> {
    ARCH_INITS.iter().map(|&(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_target_reports_its_own_name() {
        for name in supported_archs() {
            let info = init(&BuildConfig::for_arch(name)).unwrap();
            assert_eq!(info.name(), name);
        }
    }

    #[test]
    fn test_unknown_target() {
        let err = init(&BuildConfig::for_arch("vax")).unwrap_err();
        assert_eq!(err, CompileError::UnknownArch { name: "vax".into() });
        assert!(init(&BuildConfig::for_arch("")).is_err());
    }

    #[test]
    fn test_table_is_sorted() {
        let names: Vec<_> = supported_archs().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
