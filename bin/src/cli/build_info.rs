//! Reconciler binary build info

/// Generated by the build script.
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// `Option` unwrapping usable in a const context.
macro_rules! const_unwrap_or {
    ($opt:expr, $default:expr) => {
        match $opt {
            Some(v) => v,
            None => $default,
        }
    };
}

/// Formatted build info shown by `--version`.
pub(crate) const BUILD_INFO: &str = const_format::formatcp!(
    "{}
    git commit: {}
    compiler: {}
    target: {}
    build time: {}",
    built_info::PKG_VERSION,
    const_unwrap_or!(built_info::GIT_COMMIT_HASH_SHORT, "unknown"),
    built_info::RUSTC_VERSION,
    built_info::TARGET,
    built_info::BUILT_TIME_UTC
);
