//! Core types for gantry

use serde::{Deserialize, Serialize};

use crate::error::VersionError;

/// Magnitude of a version bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    /// Major version bump (breaking changes)
    Major,
    /// Minor version bump (new features)
    Minor,
    /// Patch version bump (bug fixes)
    Patch,
    /// Pre-release bump
    Prerelease,
    /// No bump needed
    None,
}

impl BumpType {
    /// Returns the string representation of the bump
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Prerelease => "prerelease",
            Self::None => "none",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Prerelease => 1,
            Self::Patch => 2,
            Self::Minor => 3,
            Self::Major => 4,
        }
    }

    /// Get the higher priority bump type
    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Whether this bump changes the version at all
    pub fn is_bump(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for BumpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BumpType {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            "prerelease" | "pre" => Ok(Self::Prerelease),
            "none" => Ok(Self::None),
            _ => Err(VersionError::InvalidBumpType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_type_max() {
        assert_eq!(BumpType::Patch.max(BumpType::Minor), BumpType::Minor);
        assert_eq!(BumpType::Minor.max(BumpType::Major), BumpType::Major);
        assert_eq!(BumpType::None.max(BumpType::Patch), BumpType::Patch);
        assert_eq!(BumpType::Prerelease.max(BumpType::Patch), BumpType::Patch);
        assert_eq!(BumpType::None.max(BumpType::None), BumpType::None);
    }

    #[test]
    fn test_bump_type_from_str() {
        assert_eq!("MINOR".parse::<BumpType>().unwrap(), BumpType::Minor);
        assert_eq!("pre".parse::<BumpType>().unwrap(), BumpType::Prerelease);
        assert!("huge".parse::<BumpType>().is_err());
    }
}
