use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

/// First Darwin release carrying the access-control database.
pub const MIN_ACCESS_CONTROL_DARWIN: u32 = 12;
/// First Darwin release carrying location services.
pub const MIN_LOCATION_DARWIN: u32 = 10;

/// Major Darwin kernel version, e.g. `13` for a `13.4.0` release string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DarwinVersion(u32);

impl DarwinVersion {
    #[must_use]
    pub const fn new(major: u32) -> Self {
        Self(major)
    }

    #[must_use]
    pub const fn major(self) -> u32 {
        self.0
    }

    /// Parses the leading component of a `uname -r` style release string.
    pub fn parse_release(release: &str) -> Result<Self> {
        let major = release
            .trim()
            .split('.')
            .next()
            .filter(|part| !part.is_empty())
            .ok_or_else(|| anyhow!("empty OS release string"))?;
        let major = major
            .parse::<u32>()
            .with_context(|| format!("unrecognised OS release '{release}'"))?;
        Ok(Self(major))
    }
}

impl fmt::Display for DarwinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Darwin {}", self.0)
    }
}

/// On-disk layout of the `access` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SchemaGeneration {
    /// Five columns, no code-requirement blob.
    V12,
    /// Six columns with a trailing nullable `csreq` blob.
    V13Plus,
}

impl SchemaGeneration {
    /// Returns `None` for releases predating the access-control database.
    #[must_use]
    pub fn for_darwin(version: DarwinVersion) -> Option<Self> {
        match version.major() {
            major if major < MIN_ACCESS_CONTROL_DARWIN => None,
            12 => Some(Self::V12),
            _ => Some(Self::V13Plus),
        }
    }

    #[must_use]
    pub fn access_columns(self) -> usize {
        match self {
            Self::V12 => 5,
            Self::V13Plus => 6,
        }
    }

    #[must_use]
    pub fn has_csreq(self) -> bool {
        matches!(self, Self::V13Plus)
    }
}

/// Key name of the machine-wide location switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationFlagKey {
    Legacy,
    Modern,
}

impl LocationFlagKey {
    #[must_use]
    pub fn for_darwin(version: DarwinVersion) -> Self {
        if version.major() < 14 {
            Self::Legacy
        } else {
            Self::Modern
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "LocationServicesEnabled",
            Self::Modern => "LocationServicesEnabledIn7.0",
        }
    }
}
