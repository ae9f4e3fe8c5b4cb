//! Dotted numeric versions
//!
//! `1.2` and `1.2.0` are the same version: missing trailing components
//! compare as zero.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A dotted numeric version (`1.0.3`)
#[derive(Debug, Clone, Eq)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    /// Build from components
    ///
    /// # Errors
    /// Returns [`VersionError::Empty`] if `parts` is empty
    pub fn from_parts(parts: Vec<u64>) -> Result<Self, VersionError> {
        if parts.is_empty() {
            return Err(VersionError::Empty);
        }
        Ok(Self { parts })
    }

    /// The version every fresh document starts from
    #[inline]
    #[must_use]
    pub fn initial() -> Self {
        Self {
            parts: vec![0, 0, 0],
        }
    }

    /// Components as written
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Next patch version (`1.2.3` -> `1.2.4`)
    #[must_use]
    pub fn bump_patch(&self) -> Self {
        let mut parts = self.parts.clone();
        while parts.len() < 3 {
            parts.push(0);
        }
        if let Some(last) = parts.last_mut() {
            *last += 1;
        }
        Self { parts }
    }

    fn significant(&self) -> &[u64] {
        let end = self
            .parts
            .iter()
            .rposition(|p| *p != 0)
            .map_or(0, |i| i + 1);
        &self.parts[..end]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        let parts = s
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| VersionError::InvalidComponent {
                    version: s.to_string(),
                    component: part.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a version string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// No components
    #[error("empty version")]
    Empty,

    /// A component is not a non-negative integer
    #[error("invalid component '{component}' in version '{version}'")]
    InvalidComponent { version: String, component: String },
}
