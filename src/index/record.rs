//! Media record types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Extension used when the upstream format is empty but the item is a video.
pub const VIDEO_FALLBACK_EXTENSION: &str = "mov";

/// Resolution status of a media record.
///
/// Legacy checkpoints wrote an empty string for pending items and `started`
/// for in-flight ones; both spellings are accepted when loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MediaStatus {
    /// Not yet attempted in the current resolution cycle.
    #[default]
    Pending,
    /// A worker currently holds this record.
    InProgress,
    /// File is on disk and passed the size check.
    Done,
    /// Last attempt failed; retried only in retry mode.
    Failed,
}

impl MediaStatus {
    /// Returns the checkpoint string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "pending" => Ok(Self::Pending),
            "in_progress" | "started" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("invalid media status: {other}")),
        }
    }
}

impl TryFrom<String> for MediaStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of media as reported by the upstream service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    /// Still image.
    Photo,
    /// Video clip.
    Video,
    /// Anything else, kept verbatim so it survives a checkpoint round trip.
    Other(String),
    /// Field was missing or empty.
    #[default]
    Unknown,
}

impl MediaType {
    /// Returns true when the upstream marked this item as a video.
    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl From<String> for MediaType {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::Unknown
        } else if trimmed.eq_ignore_ascii_case("photo") {
            Self::Photo
        } else if trimmed.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Other(trimmed.to_string())
        }
    }
}

impl From<MediaType> for String {
    fn from(value: MediaType) -> Self {
        match value {
            MediaType::Photo => "photo".to_string(),
            MediaType::Video => "video".to_string(),
            MediaType::Other(raw) => raw,
            MediaType::Unknown => String::new(),
        }
    }
}

/// One downloadable item from the upstream library.
///
/// Field names are part of the checkpoint format and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Opaque upstream identifier; unique within an index.
    pub id: String,
    /// Upstream media kind, used only for the extension fallback.
    #[serde(default)]
    pub media_type: MediaType,
    /// Upstream file format (e.g. `jpeg`, `png`, `mp4`).
    #[serde(default)]
    pub format: String,
    /// Current resolution status.
    #[serde(default)]
    pub status: MediaStatus,
    /// Number of fetch attempts ever made for this record.
    #[serde(default)]
    pub retries: u32,
}

impl MediaRecord {
    /// Creates a fresh pending record.
    #[must_use]
    pub fn new(id: impl Into<String>, media_type: MediaType, format: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_type,
            format: format.into(),
            status: MediaStatus::Pending,
            retries: 0,
        }
    }

    /// Returns the normalized local file extension, if any.
    ///
    /// The format is lowercased and `jpeg` becomes `jpg`. An empty format
    /// falls back to [`VIDEO_FALLBACK_EXTENSION`] for videos and to no
    /// extension otherwise.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let normalized = normalize_format(&self.format);
        if !normalized.is_empty() {
            return Some(normalized);
        }
        self.media_type
            .is_video()
            .then(|| VIDEO_FALLBACK_EXTENSION.to_string())
    }

    /// Returns the local filename for this record: `{id}.{ext}` or `{id}`.
    ///
    /// `%`, `/`, `\` and NUL are percent-encoded in both parts, and `.` is
    /// also encoded in the id, so distinct ids never share a file and no
    /// name can leave the media directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        let stem = encode_name_part(&self.id, true);
        match self.extension() {
            Some(ext) => format!("{stem}.{}", encode_name_part(&ext, false)),
            None => stem,
        }
    }
}

fn encode_name_part(raw: &str, encode_dots: bool) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            '\0' => encoded.push_str("%00"),
            '.' if encode_dots => encoded.push_str("%2E"),
            _ => encoded.push(ch),
        }
    }
    encoded
}

fn normalize_format(format: &str) -> String {
    let lower = format.trim().to_lowercase();
    if lower == "jpeg" {
        "jpg".to_string()
    } else {
        lower
    }
}
