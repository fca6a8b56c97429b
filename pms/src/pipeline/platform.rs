//! Source platform detection.

use serde::{Deserialize, Serialize};
use url::Url;

/// Hosting platform of a source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Soundcloud,
    Bandcamp,
    /// Parsed, but not a recognized host.
    Other,
    /// Not a parsable URL.
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Soundcloud => "soundcloud",
            Self::Bandcamp => "bandcamp",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `url` by its lower-cased host.
pub fn detect_platform(url: &str) -> Platform {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return Platform::Unknown;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    if host.contains("youtube") || host.contains("youtu.be") {
        Platform::Youtube
    } else if host.contains("soundcloud") {
        Platform::Soundcloud
    } else if host.contains("bandcamp") {
        Platform::Bandcamp
    } else {
        Platform::Other
    }
}
