use chrono::{DateTime, Utc};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::SamplerError;

/// Read a newline-delimited file, trimming lines and dropping blank ones.
pub fn read_lines(path: &Path) -> Result<Vec<String>, SamplerError> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write one item per line, creating parent directories as needed.
///
/// Returns the number of lines written.
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<usize, SamplerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ensure_parent(path)?;
    let mut writer = BufWriter::new(fs::File::create(path)?);
    let mut written = 0usize;
    for line in lines {
        writer.write_all(line.as_ref().as_bytes())?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Create the parent directory of `path` when it has one.
pub fn ensure_parent(path: &Path) -> Result<(), SamplerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Best-effort file modified time.
pub fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
