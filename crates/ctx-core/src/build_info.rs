//! Build-time metadata embedded by the build script.
//!
//! Surfaces in `ctx --version` and in the session start log line.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("CTX_GIT_HASH");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("CTX_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string shown by `ctx --version`, e.g. `"0.1.0 (abc1234, release)"`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CTX_GIT_HASH"),
    ", ",
    env!("CTX_BUILD_PROFILE"),
    ")"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_version_layout() {
        assert_eq!(LONG_VERSION, format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})"));
    }

    #[test]
    fn test_git_hash_not_empty() {
        assert!(!GIT_HASH.is_empty());
    }

    #[test]
    fn test_build_profile() {
        assert!(matches!(BUILD_PROFILE, "debug" | "release"), "{BUILD_PROFILE}");
    }
}
