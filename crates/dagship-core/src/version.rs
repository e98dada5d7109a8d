//! Runtime version comparison.
//!
//! Runtime versions are semantic versions (`4.2.5`), optionally with a
//! pre-release suffix (`5.0.0-rc1`) or build metadata (`4.2.5+build.3`).
//! Strings that do not parse are compared lexically rather than rejected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

/// A parsed runtime version. A leading `v` is accepted.
///
/// Ordering follows semver precedence: build metadata is ignored and a
/// pre-release sorts before the release it precedes.
#[derive(Debug, Clone)]
pub struct RuntimeVersion(Version);

impl RuntimeVersion {
    pub fn is_pre_release(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl FromStr for RuntimeVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        Version::parse(trimmed).map(Self)
    }
}

impl Ord for RuntimeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.0, &other.0);
        (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
    }
}

impl PartialOrd for RuntimeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RuntimeVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RuntimeVersion {}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compare two version strings, falling back to lexical order when either
/// side does not parse.
pub fn compare_runtime_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<RuntimeVersion>(), b.parse::<RuntimeVersion>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Whether moving from `current` to `candidate` is allowed: the candidate
/// must not be older. An empty `current` permits anything.
pub fn is_valid_upgrade(current: &str, candidate: &str) -> bool {
    if current.is_empty() {
        return true;
    }
    if candidate.is_empty() {
        return false;
    }
    compare_runtime_versions(current, candidate) != Ordering::Greater
}

/// Whether `tag` is one of `known_tags`. Exact match only.
pub fn is_valid_tag<S: AsRef<str>>(known_tags: &[S], tag: &str) -> bool {
    known_tags.iter().any(|known| known.as_ref() == tag)
}

/// Newest stable (non pre-release) version in `versions`.
pub fn latest_stable<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|v| v.parse::<RuntimeVersion>().ok().map(|parsed| (v, parsed)))
        .filter(|(_, parsed)| !parsed.is_pre_release())
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_upgrade() {
        assert!(is_valid_upgrade("4.2.5", "4.2.6"));
        assert!(!is_valid_upgrade("4.2.6", "4.2.5"));
        assert!(is_valid_upgrade("", "4.2.6"));
    }

    #[test]
    fn test_is_valid_upgrade_same_version() {
        assert!(is_valid_upgrade("4.2.5", "4.2.5"));
    }

    #[test]
    fn test_is_valid_upgrade_empty_candidate() {
        assert!(!is_valid_upgrade("4.2.5", ""));
        assert!(is_valid_upgrade("", ""));
    }

    #[test]
    fn test_is_valid_upgrade_compares_numerically() {
        // Lexically "4.10.0" < "4.9.0"; numerically it is newer
        assert!(is_valid_upgrade("4.9.0", "4.10.0"));
        assert!(!is_valid_upgrade("4.10.0", "4.9.0"));
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(!is_valid_tag(&["4.2.5", "4.2.6"], "4.2.7"));
        assert!(is_valid_tag(&["4.2.5", "4.2.6"], "4.2.6"));
    }

    #[test]
    fn test_is_valid_tag_no_normalization() {
        assert!(!is_valid_tag(&["4.2.5"], "v4.2.5"));
        assert!(!is_valid_tag(&["4.2.5"], "4.2.5 "));
        let owned = vec!["4.2.5".to_string()];
        assert!(is_valid_tag(&owned, "4.2.5"));
    }

    #[test]
    fn test_parse_runtime_version() {
        let v: RuntimeVersion = "4.2.5".parse().unwrap();
        assert!(!v.is_pre_release());
        assert_eq!(v.to_string(), "4.2.5");

        let v: RuntimeVersion = "v5.0.0-rc1+build.7".parse().unwrap();
        assert!(v.is_pre_release());
        assert_eq!(v.to_string(), "5.0.0-rc1+build.7");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<RuntimeVersion>().is_err());
        assert!("4.x.1".parse::<RuntimeVersion>().is_err());
        assert!("4.2".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_build_metadata_ignored_in_ordering() {
        let a: RuntimeVersion = "4.2.5+build.1".parse().unwrap();
        let b: RuntimeVersion = "4.2.5+build.9".parse().unwrap();
        assert_eq!(a, b);
        assert!(is_valid_upgrade("4.2.5+build.9", "4.2.5"));
    }

    #[test]
    fn test_pre_release_sorts_before_release() {
        assert_eq!(compare_runtime_versions("5.0.0-rc1", "5.0.0"), Ordering::Less);
        assert_eq!(compare_runtime_versions("5.0.0-rc1", "4.9.9"), Ordering::Greater);
        assert!(is_valid_upgrade("5.0.0-rc1", "5.0.0"));
    }

    #[test]
    fn test_malformed_falls_back_to_lexical() {
        assert_eq!(compare_runtime_versions("abc", "abd"), Ordering::Less);
        assert_eq!(compare_runtime_versions("4.2.x", "4.2.5"), Ordering::Greater);
    }

    #[test]
    fn test_latest_stable_skips_pre_releases_and_garbage() {
        let versions = ["4.2.5", "4.10.0", "5.0.0-rc1", "nightly", "4.9.1"];
        assert_eq!(latest_stable(versions), Some("4.10.0"));
        assert_eq!(latest_stable(Vec::<&str>::new()), None);
    }
}
