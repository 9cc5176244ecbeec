//! Request version numbers for optimistic concurrency control.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version number of a request.
///
/// A request is created at version 1 and every successful mutation increments the version by
/// exactly one. Because each mutation also appends exactly one audit entry, a request's version
/// always equals the length of its audit history.
///
/// Callers echo back the last version they observed; the repository rejects the write with a
/// version conflict if the stored version has moved on since.
///
/// # Examples
///
/// ```
/// use request_desk_core::version::Version;
///
/// let v1 = Version::INITIAL;
/// assert_eq!(v1.value(), 1);
/// assert_eq!(v1.next(), Version::new(2));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version a freshly created draft is stored at.
    pub const INITIAL: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_version_is_one() {
        assert_eq!(Version::INITIAL.value(), 1);
    }

    #[test]
    fn next_increments() {
        assert_eq!(Version::new(41).next(), Version::new(42));
    }

    #[test]
    fn versions_order() {
        assert!(Version::new(2) > Version::INITIAL);
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Version::new(7)).unwrap_or_default();
        assert_eq!(json, "7");
    }
}
