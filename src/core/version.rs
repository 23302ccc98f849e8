//! Build metadata generated by the build script

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Version of the on-disk layout (filename encoding and message body format)
pub fn layout_version() -> u32 {
    LAYOUT_VERSION.parse().unwrap_or(2)
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

/// One-line version banner used by `--version`
pub fn version_banner() -> String {
    format!(
        "{} (layout v{}, built {}, git {})",
        env!("CARGO_PKG_VERSION"),
        layout_version(),
        build_time(),
        git_hash()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_banner_mentions_package_version() {
        let banner = version_banner();
        assert!(banner.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(banner.contains("layout v"));
    }
}
