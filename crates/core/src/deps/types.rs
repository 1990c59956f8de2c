//! Types for the dependency provisioner.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::error::ProvisionError;

const BUILTIN_DESCRIPTORS: &str = include_str!("dependencies.json");

/// Host platforms that have prebuilt tool archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    Windows,
}

impl Platform {
    /// Detects the platform this binary is running on.
    pub fn detect() -> Result<Self, ProvisionError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` value to a platform.
    pub fn from_os(os: &str) -> Result<Self, ProvisionError> {
        match os {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(ProvisionError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// The key used for this platform in descriptor files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }

    /// File name of an executable on this platform.
    pub fn executable_name(&self, stem: &str) -> String {
        match self {
            Self::Linux => stem.to_string(),
            Self::Windows => format!("{}.exe", stem),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External tools this system knows how to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Transcoder and metadata probe.
    Ffmpeg,
    /// Acoustic fingerprint calculator.
    Chromaprint,
}

impl Tool {
    /// Descriptor key for this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Chromaprint => "chromaprint",
        }
    }

    /// Base names of the executables this tool's archive must provide.
    pub fn executables(&self) -> &'static [&'static str] {
        match self {
            Self::Ffmpeg => &["ffmpeg", "ffprobe"],
            Self::Chromaprint => &["fpcalc"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "chromaprint" | "fpcalc" => Ok(Self::Chromaprint),
            other => Err(format!("unknown tool: {}", other)),
        }
    }
}

/// How to fetch and verify one tool for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    pub tool: Tool,
    pub platform: Platform,
    pub url: String,
    /// Hex-encoded SHA-256 of the archive.
    pub checksum: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct DescriptorEntry {
    url: String,
    checksum: String,
}

/// Descriptor lookup table keyed by tool name, then platform name.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    entries: HashMap<String, HashMap<String, DescriptorEntry>>,
}

impl DescriptorTable {
    /// Returns the table compiled into the binary.
    pub fn builtin() -> Result<Self, ProvisionError> {
        Self::from_json(BUILTIN_DESCRIPTORS)
    }

    /// Parses a descriptor table from JSON.
    pub fn from_json(json: &str) -> Result<Self, ProvisionError> {
        let entries = serde_json::from_str(json).map_err(|e| ProvisionError::DescriptorParse {
            reason: e.to_string(),
        })?;
        Ok(Self { entries })
    }

    /// Reads and parses a descriptor file.
    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let json = std::fs::read_to_string(path).map_err(|e| ProvisionError::DescriptorFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Looks up the descriptor for `tool` on `platform`.
    pub fn lookup(&self, tool: Tool, platform: Platform) -> Result<DependencyDescriptor, ProvisionError> {
        let entry = self
            .entries
            .get(tool.name())
            .and_then(|platforms| platforms.get(platform.as_str()))
            .ok_or_else(|| ProvisionError::MissingDescriptor {
                tool: tool.name().to_string(),
                platform: platform.as_str().to_string(),
            })?;

        Ok(DependencyDescriptor {
            tool,
            platform,
            url: entry.url.clone(),
            checksum: entry.checksum.clone(),
        })
    }
}
