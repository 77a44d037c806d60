use crate::types::ArchitectError;

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// pacman style `[epoch:]version[-release]` version.
///
/// Equality is literal: an absent epoch is not epoch 0, and an absent release
/// is not release 0. Ordering treats both as 0 and compares `version` as a raw
/// string. Two values that order equally but are not literally equal have no
/// ordering at all: `partial_cmp` returns `None` for them.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct PkgVersion {
    epoch: Option<u64>,
    version: String,
    // Always finite and non-negative, so Eq and Hash hold
    release: Option<f64>,
}

impl PkgVersion {
    /// Release defaults to 0 when constructed directly
    pub fn new(epoch: Option<u64>, version: impl Into<String>) -> Self {
        PkgVersion {
            epoch,
            version: version.into(),
            release: Some(0.0),
        }
    }

    /// Same checks on `release` as `parse`
    #[cfg(test)]
    pub fn with_release(
        epoch: Option<u64>,
        version: impl Into<String>,
        release: f64,
    ) -> Result<Self, ArchitectError> {
        let version = version.into();
        if !release.is_finite() || release < 0.0 {
            return Err(ArchitectError::MalformedVersion(format!(
                "{}-{}",
                version, release
            )));
        }
        Ok(PkgVersion {
            epoch,
            version,
            release: Some(release + 0.0),
        })
    }

    pub fn parse(s: &str) -> Result<Self, ArchitectError> {
        let malformed = || ArchitectError::MalformedVersion(s.to_owned());

        let (epoch, rest) = match s.split_once(':') {
            Some((epoch, rest)) => (Some(epoch.parse::<u64>().map_err(|_| malformed())?), rest),
            None => (None, s),
        };
        let (version, release) = match rest.split_once('-') {
            Some((version, release)) => {
                let release: f64 = release.parse().map_err(|_| malformed())?;
                if !release.is_finite() || release < 0.0 {
                    return Err(malformed());
                }
                // Fold -0.0 into 0.0
                (version, Some(release + 0.0))
            }
            None => (rest, None),
        };

        Ok(PkgVersion {
            epoch,
            version: version.to_owned(),
            release,
        })
    }

    #[cfg(test)]
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    #[cfg(test)]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[cfg(test)]
    pub fn release(&self) -> Option<f64> {
        self.release
    }

    /// The ordering rule on its own, without the literal equality check
    pub fn compare(&self, other: &Self) -> Ordering {
        self.epoch
            .unwrap_or(0)
            .cmp(&other.epoch.unwrap_or(0))
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| {
                self.release
                    .unwrap_or(0.0)
                    .total_cmp(&other.release.unwrap_or(0.0))
            })
    }
}

impl PartialEq for PkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch && self.version == other.version && self.release == other.release
    }
}

impl Eq for PkgVersion {}

impl Hash for PkgVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.version.hash(state);
        self.release.map(f64::to_bits).hash(state);
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            Ordering::Equal if self != other => None,
            ord => Some(ord),
        }
    }
}

impl FromStr for PkgVersion {
    type Err = ArchitectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PkgVersion::parse(s)
    }
}

impl TryFrom<&str> for PkgVersion {
    type Error = ArchitectError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        PkgVersion::parse(s)
    }
}

impl TryFrom<String> for PkgVersion {
    type Error = ArchitectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PkgVersion::parse(&s)
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        f.write_str(&self.version)?;
        // f64's Display already drops the fraction of integral values
        if let Some(release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Serialize for PkgVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
