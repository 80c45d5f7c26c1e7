//! Extension version ordering
//!
//! Marketplace versions are mostly semver, but the ecosystem also publishes
//! four-segment versions (`1.2.3.4`) and ad-hoc strings. Parsing is tolerant
//! of both; anything unparseable falls back to string inequality so that an
//! unknown version is treated as "different" and gets updated.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

/// `major.minor.patch[.build][-prerelease]`, optional leading `v`
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:\.(\d+))?(?:-([0-9A-Za-z.\-]+))?(?:\+[0-9A-Za-z.\-]+)?$")
        .expect("version regex is valid")
});

/// A parsed extension version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
    pub prerelease: Option<String>,
}

impl ParsedVersion {
    /// Parse a version string, returning `None` if it does not look like one
    pub fn parse(input: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(input.trim())?;
        let num = |i: usize| -> Option<u64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };

        Some(Self {
            major: num(1)?,
            minor: num(2)?,
            patch: num(3)?,
            build: num(4)?,
            prerelease: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }

    fn tuple(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.build)
    }
}

impl Ord for ParsedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tuple()
            .cmp(&other.tuple())
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // A release outranks any prerelease of the same tuple
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for ParsedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings
///
/// Returns `None` when either side cannot be parsed.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = ParsedVersion::parse(a)?;
    let b = ParsedVersion::parse(b)?;
    Some(a.cmp(&b))
}

/// Check whether `candidate` supersedes `current`
///
/// Fails open: if either version is unparseable, any difference counts as newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match compare_versions(candidate, current) {
        Some(ordering) => ordering == Ordering::Greater,
        None => candidate != current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_three_segments() {
        let v = ParsedVersion::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (1, 2, 3, 0));
        assert!(v.prerelease.is_none());
    }

    #[test]
    fn test_parse_four_segments_and_prerelease() {
        let v = ParsedVersion::parse("v2.0.1.7-beta.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (2, 0, 1, 7));
        assert_eq!(v.prerelease.as_deref(), Some("beta.1"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ParsedVersion::parse("latest").is_none());
        assert!(ParsedVersion::parse("1.2").is_none());
        assert!(ParsedVersion::parse("").is_none());
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(is_newer("1.10.0", "1.9.0"));
        assert!(is_newer("2.0.0", "1.99.99"));
        assert!(is_newer("1.0.0.2", "1.0.0"));
        assert!(!is_newer("1.0.0", "1.0.0.1"));
    }

    #[test]
    fn test_release_beats_prerelease() {
        assert!(is_newer("1.0.0", "1.0.0-rc.1"));
        assert!(!is_newer("1.0.0-rc.1", "1.0.0"));
        assert!(is_newer("1.0.0-rc.2", "1.0.0-rc.1"));
    }

    #[test]
    fn test_equal_is_not_newer() {
        assert!(!is_newer("1.2.3", "1.2.3"));
        assert!(!is_newer("v1.2.3", "1.2.3"));
    }

    #[test]
    fn test_unparseable_fails_open() {
        assert!(is_newer("nightly", "1.0.0"));
        assert!(is_newer("1.0.0", "nightly"));
        assert!(!is_newer("nightly", "nightly"));
    }

    proptest! {
        #[test]
        fn prop_exactly_one_direction_is_newer(
            a in (0u64..50, 0u64..50, 0u64..50),
            b in (0u64..50, 0u64..50, 0u64..50),
        ) {
            let a = format!("{}.{}.{}", a.0, a.1, a.2);
            let b = format!("{}.{}.{}", b.0, b.1, b.2);
            prop_assume!(a != b);
            prop_assert!(is_newer(&a, &b) ^ is_newer(&b, &a));
        }

        #[test]
        fn prop_never_newer_than_itself(
            v in (0u64..1000, 0u64..1000, 0u64..1000, proptest::option::of("[a-z]{1,6}")),
        ) {
            let version = match v.3 {
                Some(pre) => format!("{}.{}.{}-{}", v.0, v.1, v.2, pre),
                None => format!("{}.{}.{}", v.0, v.1, v.2),
            };
            prop_assert!(!is_newer(&version, &version));
        }
    }
}
