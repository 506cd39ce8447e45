//! Tool versions and their total order.
//!
//! Versions are compared numerically component by component, never as
//! strings (`1.10.0` is newer than `1.2.0`). Parsing is lenient so that any
//! historical `orionVersion` value can be ordered:
//! - missing components default to `0` (`"3"` == `"3.0.0"`)
//! - each component is the run of leading digits (`"1-beta"` → `1`)
//! - a component with no leading digits counts as `0`
//! - a component too large for `u32` saturates to `u32::MAX`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A `major.minor.patch` version of the tool that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this build.
    pub fn current() -> Self {
        Self::parse(env!("CARGO_PKG_VERSION"))
    }

    /// Parse a version string. Never fails; see the module docs for the rules.
    pub fn parse(s: &str) -> Self {
        let mut parts = s.trim().split('.').map(leading_number);
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }
}

fn leading_number(component: &str) -> u32 {
    let digits = component
        .find(|c: char| !c.is_ascii_digit())
        .map_or(component, |end| &component[..end]);
    match digits.parse() {
        Ok(n) => n,
        Err(_) if digits.is_empty() => 0,
        Err(_) => u32::MAX,
    }
}

impl FromStr for ToolVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for ToolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ToolVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Legacy files may carry `null` or an empty string.
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}
