use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use common::FileKind;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Maximum number of files in one upload batch.
pub const MAX_FILES_PER_UPLOAD: usize = 20;
/// Combined size cap for the image files of one upload batch.
pub const MAX_IMAGE_BATCH_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum remark length in characters.
pub const MAX_REMARK_CHARS: usize = 500;
/// Lifetime cap on remark edits per file.
pub const MAX_REMARK_EDITS: i32 = 10;
/// Upper bound for a client-supplied file name.
pub const MAX_FILE_NAME_CHARS: usize = 255;

/// Visibility status of an uploaded file. Stored as a string column.
///
/// Deleted files are soft-deleted: the row and the bytes on disk are kept
/// so the owner can restore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Deleted,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merchant-side fulfilment state of a file. Stored as a string column.
///
/// Transitions are unrestricted: a merchant may move a file between any
/// two states in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Received,
    Processing,
    Shipped,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            _ => Err(format!(
                "Invalid process status '{s}'. Must be one of: received, processing, shipped"
            )),
        }
    }
}

/// Metadata for one file of an upload batch, before anything is persisted.
#[derive(Debug)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub kind: FileKind,
    pub size_bytes: u64,
}

/// Validate a full upload batch.
///
/// The whole batch is rejected when any single file fails, so a partial
/// upload can never be mistaken for a complete one.
pub fn validate_batch(files: &[IncomingFile]) -> Result<(), AppError> {
    if files.is_empty() {
        return Err(AppError::Validation("At least one file is required".into()));
    }
    if files.len() > MAX_FILES_PER_UPLOAD {
        return Err(AppError::Validation(format!(
            "At most {MAX_FILES_PER_UPLOAD} files can be uploaded at once"
        )));
    }

    let mut seen = HashSet::new();
    for file in files {
        let name_chars = file.original_name.chars().count();
        if file.original_name.trim().is_empty() {
            return Err(AppError::Validation("File name is required".into()));
        }
        if name_chars > MAX_FILE_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "File name must be at most {MAX_FILE_NAME_CHARS} characters"
            )));
        }
        if !seen.insert(file.original_name.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate file name '{}' in upload",
                file.original_name
            )));
        }
    }

    let image_total: u64 = files
        .iter()
        .filter(|f| f.kind == FileKind::Image)
        .map(|f| f.size_bytes)
        .sum();
    if image_total > MAX_IMAGE_BATCH_BYTES {
        return Err(AppError::Validation(format!(
            "Combined image size exceeds the {}MB limit",
            MAX_IMAGE_BATCH_BYTES / (1024 * 1024)
        )));
    }

    Ok(())
}

/// Validate remark text from any write path.
pub fn validate_remarks(remarks: &str) -> Result<(), AppError> {
    if remarks.chars().count() > MAX_REMARK_CHARS {
        return Err(AppError::Validation(format!(
            "Remarks must be at most {MAX_REMARK_CHARS} characters"
        )));
    }
    Ok(())
}
