use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use time::OffsetDateTime;
use time::format_description::FormatItem;

static STAMP_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    time::format_description::parse("[year][month][day][hour][minute][second]").unwrap()
});

/// Generates file names for one logical log stream.
///
/// Pure naming, no concurrency concerns: the owning writer serializes calls.
pub trait FileNamingPolicy: Send + Sync {
    /// The stable path the writer always opens for live writes.
    fn initial_name(&self) -> PathBuf;

    /// A fresh, not-yet-existing path to rename the just-closed file to.
    fn next_name(&self) -> PathBuf;

    /// Every file (live and rotated) belonging to this logical stream.
    fn list_files(&self) -> io::Result<Vec<PathBuf>>;
}

/// Names rotated files by generation timestamp: `<base>.<YYYYMMDDHHMMSS>`.
///
/// Two rotations inside the same second would collide on the timestamp
/// alone, so `next_name` probes for existence and appends a monotonic
/// numeric suffix (`.1`, `.2`, …) until the name is free.
#[derive(Debug, Clone)]
pub struct TimestampNaming {
    base: PathBuf,
}

impl TimestampNaming {
    /// Create a naming policy rooted at `base`, the live file path.
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    fn parent(&self) -> &Path {
        match self.base.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl FileNamingPolicy for TimestampNaming {
    fn initial_name(&self) -> PathBuf {
        self.base.clone()
    }

    fn next_name(&self) -> PathBuf {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now.format(&*STAMP_FORMAT).unwrap();

        let mut candidate = PathBuf::from(format!("{}.{}", self.base.display(), stamp));
        let mut generation = 0u32;
        while candidate.exists() {
            generation += 1;
            candidate = PathBuf::from(format!("{}.{}.{}", self.base.display(), stamp, generation));
        }
        candidate
    }

    fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        let Some(prefix) = self.base.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(self.parent())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}
