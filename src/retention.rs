use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};

/// A stat snapshot of one file belonging to a log stream.
#[derive(Debug, Clone)]
pub struct LogFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub len: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl LogFile {
    /// Stat `path` into a snapshot.
    pub fn stat<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified()?,
            path,
        })
    }
}

/// Given the files of one log stream, decides which are eligible for deletion.
///
/// Policies only select; the periodic checker performs the deletions. The
/// live file is passed explicitly and every implementation filters it out
/// before selection — its protection is structural, never an accident of
/// sort order, since a slow trickle of writes can leave the live file older
/// than the rotated ones.
pub trait RetentionPolicy: Send + Sync {
    /// Short policy name used in failure reports.
    fn name(&self) -> &'static str;

    /// The subset of `files` to delete. `active` is the currently-open file
    /// and must never be selected, regardless of its age.
    fn files_to_delete(&self, files: &[LogFile], active: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The rotated files (live file excluded), oldest first.
fn rotated_oldest_first<'a>(files: &'a [LogFile], active: &Path) -> Vec<&'a LogFile> {
    let mut rotated: Vec<&LogFile> = files.iter().filter(|f| f.path != active).collect();
    rotated.sort_by_key(|f| f.modified);
    rotated
}

/// Keep the newest N rotated files, delete the rest.
#[derive(Debug, Clone, Copy)]
pub struct FileCountRetentionPolicy {
    number_of_files: usize,
}

impl FileCountRetentionPolicy {
    /// Keep the `number_of_files` most recently modified rotated files.
    pub fn new(number_of_files: usize) -> Result<Self> {
        if number_of_files == 0 {
            return Err(Error::Config(
                "file-count retention must keep at least one file".to_string(),
            ));
        }
        Ok(Self { number_of_files })
    }
}

impl RetentionPolicy for FileCountRetentionPolicy {
    fn name(&self) -> &'static str {
        "file count"
    }

    fn files_to_delete(&self, files: &[LogFile], active: &Path) -> io::Result<Vec<PathBuf>> {
        let rotated = rotated_oldest_first(files, active);
        if rotated.len() <= self.number_of_files {
            return Ok(Vec::new());
        }
        let excess = rotated.len() - self.number_of_files;
        Ok(rotated[..excess].iter().map(|f| f.path.clone()).collect())
    }
}

/// Cap the total bytes the stream occupies on disk.
///
/// Deletes oldest rotated files until the summed size (live file included in
/// the sum) is back under the cap.
#[derive(Debug, Clone, Copy)]
pub struct DiskSpaceRetentionPolicy {
    limit: u64,
}

impl DiskSpaceRetentionPolicy {
    /// Cap the stream at `limit` bytes. Zero is rejected.
    pub fn new(limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(Error::Config(
                "disk-space retention cap must be non-zero".to_string(),
            ));
        }
        Ok(Self { limit })
    }
}

impl RetentionPolicy for DiskSpaceRetentionPolicy {
    fn name(&self) -> &'static str {
        "disk space used"
    }

    fn files_to_delete(&self, files: &[LogFile], active: &Path) -> io::Result<Vec<PathBuf>> {
        let mut total: u64 = files.iter().map(|f| f.len).sum();
        if total <= self.limit {
            return Ok(Vec::new());
        }

        let mut selected = Vec::new();
        for file in rotated_oldest_first(files, active) {
            if total <= self.limit {
                break;
            }
            total = total.saturating_sub(file.len);
            selected.push(file.path.clone());
        }
        Ok(selected)
    }
}

/// Keep a minimum amount of free space on the stream's volume.
///
/// Queries the volume holding the live file; when free space is below the
/// floor, deletes oldest rotated files until the projected free space clears
/// it.
#[derive(Debug, Clone, Copy)]
pub struct FreeDiskSpaceRetentionPolicy {
    floor: u64,
}

impl FreeDiskSpaceRetentionPolicy {
    /// Require at least `floor` free bytes. Zero is rejected.
    pub fn new(floor: u64) -> Result<Self> {
        if floor == 0 {
            return Err(Error::Config(
                "free-space retention floor must be non-zero".to_string(),
            ));
        }
        Ok(Self { floor })
    }
}

impl RetentionPolicy for FreeDiskSpaceRetentionPolicy {
    fn name(&self) -> &'static str {
        "free disk space"
    }

    fn files_to_delete(&self, files: &[LogFile], active: &Path) -> io::Result<Vec<PathBuf>> {
        let volume = match active.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut free = fs2::available_space(volume)?;
        if free >= self.floor {
            return Ok(Vec::new());
        }

        let mut selected = Vec::new();
        for file in rotated_oldest_first(files, active) {
            if free >= self.floor {
                break;
            }
            free = free.saturating_add(file.len);
            selected.push(file.path.clone());
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn file(name: &str, len: u64, age_secs: u64) -> LogFile {
        LogFile {
            path: PathBuf::from(name),
            len,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        }
    }

    #[test]
    fn test_file_count_keeps_newest() {
        // live file plus five rotated files, keep three
        let files = vec![
            file("app.log", 10, 0),
            file("app.log.1", 10, 100),
            file("app.log.2", 10, 200),
            file("app.log.3", 10, 300),
            file("app.log.4", 10, 400),
            file("app.log.5", 10, 500),
        ];
        let policy = FileCountRetentionPolicy::new(3).unwrap();
        let doomed = policy
            .files_to_delete(&files, Path::new("app.log"))
            .unwrap();

        assert_eq!(
            doomed,
            vec![PathBuf::from("app.log.5"), PathBuf::from("app.log.4")]
        );
    }

    #[test]
    fn test_file_count_under_limit_deletes_nothing() {
        let files = vec![file("app.log", 10, 0), file("app.log.1", 10, 100)];
        let policy = FileCountRetentionPolicy::new(3).unwrap();
        assert!(
            policy
                .files_to_delete(&files, Path::new("app.log"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_file_count_never_selects_live_file() {
        // the live file is the oldest by modification time
        let files = vec![
            file("app.log", 10, 900),
            file("app.log.1", 10, 100),
            file("app.log.2", 10, 200),
        ];
        let policy = FileCountRetentionPolicy::new(1).unwrap();
        let doomed = policy
            .files_to_delete(&files, Path::new("app.log"))
            .unwrap();

        assert_eq!(doomed, vec![PathBuf::from("app.log.2")]);
    }

    #[test]
    fn test_disk_space_deletes_oldest_until_under_cap() {
        let files = vec![
            file("app.log", 50, 0),
            file("app.log.1", 40, 100),
            file("app.log.2", 40, 200),
            file("app.log.3", 40, 300),
        ];
        // total 170, cap 100: dropping the two oldest rotated gets to 90
        let policy = DiskSpaceRetentionPolicy::new(100).unwrap();
        let doomed = policy
            .files_to_delete(&files, Path::new("app.log"))
            .unwrap();

        assert_eq!(
            doomed,
            vec![PathBuf::from("app.log.3"), PathBuf::from("app.log.2")]
        );
    }

    #[test]
    fn test_disk_space_live_file_alone_over_cap() {
        let files = vec![file("app.log", 500, 0), file("app.log.1", 10, 100)];
        let policy = DiskSpaceRetentionPolicy::new(100).unwrap();
        let doomed = policy
            .files_to_delete(&files, Path::new("app.log"))
            .unwrap();

        // everything deletable goes, the live file never does
        assert_eq!(doomed, vec![PathBuf::from("app.log.1")]);
    }

    #[test]
    fn test_free_space_satisfied_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join("app.log");
        let files = vec![LogFile {
            path: active.clone(),
            len: 10,
            modified: SystemTime::now(),
        }];

        // one byte of free space is always available
        let policy = FreeDiskSpaceRetentionPolicy::new(1).unwrap();
        assert!(policy.files_to_delete(&files, &active).unwrap().is_empty());
    }

    #[test]
    fn test_free_space_starved_selects_rotated_only() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join("app.log");
        let files = vec![
            LogFile {
                path: active.clone(),
                len: 10,
                modified: SystemTime::UNIX_EPOCH,
            },
            LogFile {
                path: dir.path().join("app.log.1"),
                len: 10,
                modified: SystemTime::now(),
            },
        ];

        // a floor no volume can satisfy forces selection of every rotated file
        let policy = FreeDiskSpaceRetentionPolicy::new(u64::MAX).unwrap();
        let doomed = policy.files_to_delete(&files, &active).unwrap();

        assert_eq!(doomed, vec![dir.path().join("app.log.1")]);
    }

    #[test]
    fn test_constructors_reject_zero() {
        assert!(FileCountRetentionPolicy::new(0).is_err());
        assert!(DiskSpaceRetentionPolicy::new(0).is_err());
        assert!(FreeDiskSpaceRetentionPolicy::new(0).is_err());
    }
}
