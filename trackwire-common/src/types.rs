//! Shared domain enums
//!
//! Single authoritative definitions of the code kinds, the supported platform
//! set, and the per-platform status values. The handlers, the release store,
//! and the distributor all consume these; adding or removing a platform is a
//! one-place change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of catalog identifier code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum CodeKind {
    /// Universal Product Code — per-release, 12 digits
    Upc,
    /// International Standard Recording Code — per-track, CC-XXX-YY-NNNNN
    Isrc,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Upc => "UPC",
            CodeKind::Isrc => "ISRC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPC" => Some(CodeKind::Upc),
            "ISRC" => Some(CodeKind::Isrc),
            _ => None,
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported external distribution platforms (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Spotify,
    Soundcloud,
}

impl Platform {
    /// All supported platforms, in schema column order
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Spotify, Platform::Soundcloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Soundcloud => "soundcloud",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(Platform::Youtube),
            "spotify" => Some(Platform::Spotify),
            "soundcloud" => Some(Platform::Soundcloud),
            _ => None,
        }
    }

    /// Name of the status column for this platform in `distributions`
    ///
    /// Static strings from a closed enum, safe to splice into SQL.
    pub fn status_column(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube_status",
            Platform::Spotify => "spotify_status",
            Platform::Soundcloud => "soundcloud_status",
        }
    }

    /// Name of the published-URL column for this platform in `distributions`
    pub fn url_column(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube_url",
            Platform::Spotify => "spotify_url",
            Platform::Soundcloud => "soundcloud_url",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-platform distribution status
///
/// Legal transitions: `pending → processing → {completed, failed}`.
/// `cancelled` is reachable from any non-terminal state. `completed`,
/// `failed`, and `cancelled` are terminal; a terminal status accepts only
/// idempotent re-application of itself. The bulk cancel operation is a policy
/// exception and overrides any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PlatformStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PlatformStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Pending => "pending",
            PlatformStatus::Processing => "processing",
            PlatformStatus::Completed => "completed",
            PlatformStatus::Failed => "failed",
            PlatformStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PlatformStatus::Pending),
            "processing" => Some(PlatformStatus::Processing),
            "completed" => Some(PlatformStatus::Completed),
            "failed" => Some(PlatformStatus::Failed),
            "cancelled" => Some(PlatformStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether no further transition is expected from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlatformStatus::Completed | PlatformStatus::Failed | PlatformStatus::Cancelled
        )
    }

    /// Statuses from which a single-platform update to `self` is legal
    ///
    /// The empty slice for `pending` means a platform never returns to
    /// `pending` once it leaves it.
    pub fn allowed_from(&self) -> &'static [PlatformStatus] {
        match self {
            PlatformStatus::Pending => &[],
            PlatformStatus::Processing => &[PlatformStatus::Pending],
            PlatformStatus::Completed => &[PlatformStatus::Processing, PlatformStatus::Completed],
            PlatformStatus::Failed => &[PlatformStatus::Processing, PlatformStatus::Failed],
            PlatformStatus::Cancelled => &[
                PlatformStatus::Pending,
                PlatformStatus::Processing,
                PlatformStatus::Cancelled,
            ],
        }
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
