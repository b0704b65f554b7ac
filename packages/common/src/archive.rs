use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Errors that abort an archive build.
///
/// A missing source file is not an error; it is reported per entry in
/// [`ArchiveReport::missing`].
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// One file requested for inclusion in a batch archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Caller-side identifier carried through to the report.
    pub id: i32,
    /// Name the file should have inside the archive.
    pub entry_name: String,
    /// Source path on disk.
    pub source: PathBuf,
}

/// Outcome of building a batch archive.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Ids of entries written into the archive, in input order.
    pub included: Vec<i32>,
    /// Ids of entries whose source file was missing on disk.
    pub missing: Vec<i32>,
}

impl ArchiveReport {
    /// True when no entry made it into the archive.
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Build a ZIP archive at `dest` from `entries`, processed in order.
///
/// Entries whose source file no longer exists on disk are skipped and
/// reported as missing; any other I/O failure aborts the build and removes
/// the partial archive. When every entry is missing, the file at `dest` is
/// removed again and the empty report is returned.
pub fn build_archive(entries: &[ArchiveEntry], dest: &Path) -> Result<ArchiveReport, ArchiveError> {
    let file = std::fs::File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut report = ArchiveReport::default();
    let mut used_names: HashSet<String> = HashSet::new();

    for entry in entries {
        let mut source = match std::fs::File::open(&entry.source) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.missing.push(entry.id);
                continue;
            }
            Err(e) => {
                let _ = std::fs::remove_file(dest);
                return Err(e.into());
            }
        };

        let name = uniquify(&entry.entry_name, &mut used_names);
        if let Err(e) = write_entry(&mut writer, &name, &mut source, options) {
            let _ = std::fs::remove_file(dest);
            return Err(e);
        }
        report.included.push(entry.id);
    }

    if let Err(e) = writer.finish() {
        let _ = std::fs::remove_file(dest);
        return Err(e.into());
    }

    if report.included.is_empty() {
        let _ = std::fs::remove_file(dest);
    }

    Ok(report)
}

fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    source: &mut impl Read,
    options: SimpleFileOptions,
) -> Result<(), ArchiveError> {
    writer.start_file(name, options)?;
    std::io::copy(source, writer)?;
    Ok(())
}

/// Make `name` unique within the archive by inserting ` (n)` before the
/// extension when a collision occurs.
fn uniquify(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{name} ({n})"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
