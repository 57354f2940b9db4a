use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Platform tags accepted by the `--platform` filter.
///
/// Each tag owns a fixed set of extensions and no extension belongs to two tags,
/// even where the on-disk format is shared between consoles (a Saturn or Sega CD
/// dump is also a `.cue`). Ownership is policy, not inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Psx,
    Ps2,
    Dreamcast,
    Psp,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Psx,
        Platform::Ps2,
        Platform::Dreamcast,
        Platform::Psp,
    ];

    /// Lowercase extensions (without the dot) owned by this platform
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Platform::Psx => &["cue", "toc", "ccd"],
            Platform::Ps2 => &["iso"],
            Platform::Dreamcast => &["gdi", "cdi"],
            Platform::Psp => &["cso", "pbp"],
        }
    }

    /// Find the platform owning an extension, if any
    pub fn for_extension(ext: &str) -> Option<Platform> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.extensions().contains(&ext.as_str()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Psx => "psx",
            Platform::Ps2 => "ps2",
            Platform::Dreamcast => "dreamcast",
            Platform::Psp => "psp",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown platform '{0}' (expected one of: psx, ps2, dreamcast, psp, none)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psx" | "ps1" | "playstation" => Ok(Platform::Psx),
            "ps2" | "playstation2" => Ok(Platform::Ps2),
            "dc" | "dreamcast" => Ok(Platform::Dreamcast),
            "psp" => Ok(Platform::Psp),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

/// Parse a command-line filter value where `none` (or empty) disables filtering
pub fn parse_filter(s: &str) -> Result<Option<Platform>, UnknownPlatform> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        trimmed.parse().map(Some)
    }
}
