//! Build configuration read once at startup.
//!
//! The target name and the mips64 float ABI come from the environment
//! (`ARCHGEN_ARCH`, `ARCHGEN_MIPS64`) unless the command line overrides them.

use std::env;
use std::fmt;
use std::str::FromStr;

pub const ENV_ARCH: &str = "ARCHGEN_ARCH";
pub const ENV_MIPS64: &str = "ARCHGEN_MIPS64";

/// Float ABI of the mips64 targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatAbi {
    #[default]
    Hard,
    Soft,
}

impl FromStr for FloatAbi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardfloat" => Ok(FloatAbi::Hard),
            "softfloat" => Ok(FloatAbi::Soft),
            _ => Err(format!("invalid float ABI {s:?} (want hardfloat or softfloat)")),
        }
    }
}

impl fmt::Display for FloatAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatAbi::Hard => f.write_str("hardfloat"),
            FloatAbi::Soft => f.write_str("softfloat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Target architecture name.
    pub arch: String,
    pub mips64_float: FloatAbi,
    /// Import path of the package being compiled.
    pub local_pkg: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            arch: String::new(),
            mips64_float: FloatAbi::Hard,
            local_pkg: "main".to_string(),
        }
    }
}

impl BuildConfig {
    /// Configuration for `arch` with default settings.
    pub fn for_arch(arch: &str) -> Self {
        Self { arch: arch.to_string(), ..Self::default() }
    }

    /// Read the configuration from the environment.
    ///
    /// An unparsable `ARCHGEN_MIPS64` value is reported and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(arch) = env::var(ENV_ARCH) {
            cfg.arch = arch;
        }
        if let Ok(abi) = env::var(ENV_MIPS64) {
            match abi.parse() {
                Ok(abi) => cfg.mips64_float = abi,
                Err(e) => log::warn!("{}: {}", ENV_MIPS64, e),
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_abi_parse() {
        assert_eq!("softfloat".parse::<FloatAbi>(), Ok(FloatAbi::Soft));
        assert_eq!("hardfloat".parse::<FloatAbi>(), Ok(FloatAbi::Hard));
        assert!("soft".parse::<FloatAbi>().is_err());
        assert_eq!(FloatAbi::Soft.to_string(), "softfloat");
    }

    #[test]
    fn test_defaults() {
        let cfg = BuildConfig::for_arch("riscv64");
        assert_eq!(cfg.arch, "riscv64");
        assert_eq!(cfg.local_pkg, "main");
        assert_eq!(cfg.mips64_float, FloatAbi::Hard);
    }
}
