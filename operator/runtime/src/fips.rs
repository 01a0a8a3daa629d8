//! Host FIPS-mode detection.
//!
//! Read once at startup and threaded through the operator configuration;
//! nothing else consults the sysctl again.

use std::path::Path;

const FIPS_SYSCTL: &str = "/proc/sys/crypto/fips_enabled";

pub fn enabled() -> bool {
    enabled_at(Path::new(FIPS_SYSCTL))
}

/// Hosts without the sysctl, or with unreadable contents, are treated as
/// non-FIPS.
fn enabled_at(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|raw| raw.trim() == "1")
        .unwrap_or(false)
}
