//! Protocol version constants and the supported-range check

pub use semver::Version;
use semver::VersionReq;

/// Version this node announces in its `hello`
pub const PROTOCOL_VERSION: &str = "0.5.1";

/// Range of peer versions this node talks to
pub const SUPPORTED_VERSION_RANGE: &str = "0.5.x";

/// Agent string this node announces in its `hello`
pub const NODE_AGENT: &str = concat!("birdman/", env!("CARGO_PKG_VERSION"));

/// Parse a `MAJOR.MINOR.PATCH[-pre][+build]` version string.
pub fn parse_version(version: &str) -> Option<Version> {
    Version::parse(version).ok()
}

/// Returns true if `version` parses and satisfies [`SUPPORTED_VERSION_RANGE`].
///
/// Pre-releases never satisfy an `x`-range.
pub fn is_supported_version(version: &str) -> bool {
    let Ok(range) = VersionReq::parse(SUPPORTED_VERSION_RANGE) else {
        return false;
    };
    parse_version(version).map_or(false, |v| range.matches(&v))
}
