use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Accepted image extensions, lowercase, without the leading dot.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Accepted archive extensions, lowercase, without the leading dot.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz"];

/// Accepted image MIME types.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// Accepted archive MIME types.
pub const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "application/x-tar",
    "application/gzip",
];

/// Broad category of an uploaded file, fixed at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Archive,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Archive => "archive",
        }
    }

    /// Classify by file extension alone.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Archive)
        } else {
            None
        }
    }

    /// Classify by MIME type alone.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if IMAGE_MIME_TYPES.contains(&mime.as_str()) {
            Some(Self::Image)
        } else if ARCHIVE_MIME_TYPES.contains(&mime.as_str()) {
            Some(Self::Archive)
        } else {
            None
        }
    }

    /// Classify an upload from its file name and declared MIME type.
    ///
    /// A file is accepted when either its extension or its MIME type is in
    /// the allowed sets. The extension wins when both resolve, so a
    /// mislabeled `Content-Type` cannot change how a file is categorized.
    pub fn classify(file_name: &str, mime: &str) -> Option<Self> {
        extension_of(file_name)
            .and_then(|ext| Self::from_extension(&ext))
            .or_else(|| Self::from_mime(mime))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "archive" => Ok(Self::Archive),
            _ => Err(format!(
                "Invalid file kind '{s}'. Must be 'image' or 'archive'"
            )),
        }
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}
