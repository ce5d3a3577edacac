//! Temporary run management.
//!
//! Runs are sorted chunks spilled to the temporary directory. Their names are derived from the
//! destination base name and a sequence number, so `people.csv` spills to `people.csv0`, `people.csv1`, ...

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::logging::JobLog;

/// Checks that `dir` exists and is a writable directory.
///
/// Writability is verified by creating an anonymous file inside `dir`, so read-only mounts and
/// directories owned by another user are rejected along with read-only permission bits.
pub(crate) fn check_tmp_dir(dir: &Path) -> Result<(), ConfigError> {
    check_tmp_dir_with(dir, |dir| tempfile::tempfile_in(dir).map(drop))
}

fn check_tmp_dir_with<P>(dir: &Path, probe_write: P) -> Result<(), ConfigError>
where
    P: FnOnce(&Path) -> io::Result<()>,
{
    let metadata = fs::metadata(dir).map_err(|_| ConfigError::TmpDirNotFound(dir.to_path_buf()))?;

    if !metadata.is_dir() {
        return Err(ConfigError::TmpDirNotDirectory(dir.to_path_buf()));
    }
    if metadata.permissions().readonly() || probe_write(dir).is_err() {
        return Err(ConfigError::TmpDirReadOnly(dir.to_path_buf()));
    }

    return Ok(());
}

/// Temporary run location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    path: PathBuf,
    sequence: usize,
}

impl RunHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of runs no longer present on storage.
    pub removed: usize,
    /// Runs that could not be deleted and may require manual cleanup.
    pub undeletable: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.undeletable.is_empty()
    }
}

/// Allocates, tracks and deletes the temporary runs of a single job.
///
/// Every tracked run is visited exactly once by [`TmpRunManager::cleanup_all`]. Runs still tracked when the
/// manager is dropped are cleaned up at that point.
pub struct TmpRunManager {
    dir: PathBuf,
    base_name: OsString,
    runs: Vec<RunHandle>,
    log: JobLog,
}

impl TmpRunManager {
    /// Creates a run manager placing runs named after `base_name` inside `dir`.
    pub fn new(dir: &Path, base_name: &OsStr, log: JobLog) -> Result<Self, ConfigError> {
        check_tmp_dir(dir)?;

        return Ok(TmpRunManager {
            dir: dir.to_path_buf(),
            base_name: base_name.to_os_string(),
            runs: Vec::new(),
            log,
        });
    }

    /// Derives the location of the run with the given sequence number without tracking it.
    pub fn allocate(&self, sequence: usize) -> Result<RunHandle, ConfigError> {
        if !self.dir.is_dir() {
            return Err(ConfigError::TmpDirNotFound(self.dir.clone()));
        }

        let mut file_name = self.base_name.clone();
        file_name.push(sequence.to_string());
        let path = self.dir.join(file_name);

        if path.exists() {
            self.log.warn(format_args!(
                "temporary file, '{}' already exists, did a previous cleanup operation fail?",
                path.display()
            ));
        }

        return Ok(RunHandle { path, sequence });
    }

    /// Registers a run for cleanup. Registering the same run twice has no effect.
    pub fn track(&mut self, handle: RunHandle) {
        if !self.runs.contains(&handle) {
            self.runs.push(handle);
        }
    }

    /// Allocates the next run in sequence and tracks it before anything is written to it.
    pub fn next_run(&mut self) -> Result<RunHandle, ConfigError> {
        let handle = self.allocate(self.runs.len())?;
        self.track(handle.clone());

        return Ok(handle);
    }

    /// Tracked runs in creation order.
    pub fn runs(&self) -> &[RunHandle] {
        &self.runs
    }

    /// Deletes every tracked run. Deletion failures are logged and reported, never raised.
    pub fn cleanup_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.runs.is_empty() {
            return report;
        }

        self.log.info(format_args!("cleaning up temporary files..."));
        for run in self.runs.drain(..) {
            match fs::remove_file(&run.path) {
                Ok(()) => report.removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => report.removed += 1,
                Err(err) => {
                    self.log.warn(format_args!(
                        "couldn't delete temporary file: '{}' ({}), additional cleanup may be required",
                        run.path.display(),
                        err
                    ));
                    report.undeletable.push(run.path);
                }
            }
        }
        self.log.info(format_args!("done cleaning up temporary files"));

        return report;
    }
}

impl Drop for TmpRunManager {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod test {
    use std::ffi::OsStr;
    use std::fs;

    use log::Level;
    use rstest::*;

    use std::io;

    use super::{check_tmp_dir, check_tmp_dir_with, TmpRunManager};
    use crate::error::ConfigError;
    use crate::logging::test::capture;
    use crate::logging::JobLog;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_run_names(tmp_dir: tempfile::TempDir) {
        let mut manager = TmpRunManager::new(tmp_dir.path(), OsStr::new("people.csv"), JobLog::default()).unwrap();

        let first = manager.next_run().unwrap();
        let second = manager.next_run().unwrap();

        assert_eq!(first.path(), tmp_dir.path().join("people.csv0"));
        assert_eq!(second.path(), tmp_dir.path().join("people.csv1"));
        assert_eq!(second.sequence(), 1);
        assert_eq!(manager.runs().len(), 2);

        manager.track(first.clone());
        assert_eq!(manager.runs().len(), 2);
    }

    #[rstest]
    fn test_cleanup_all(tmp_dir: tempfile::TempDir) {
        let mut manager = TmpRunManager::new(tmp_dir.path(), OsStr::new("out"), JobLog::default()).unwrap();

        let written = manager.next_run().unwrap();
        fs::write(written.path(), b"run").unwrap();
        let never_written = manager.next_run().unwrap();

        let report = manager.cleanup_all();
        assert_eq!(report.removed, 2);
        assert!(report.is_clean());
        assert!(!written.path().exists());
        assert!(!never_written.path().exists());
        assert!(manager.runs().is_empty());

        assert_eq!(manager.cleanup_all().removed, 0);
    }

    #[rstest]
    fn test_cleanup_continues_after_failure(tmp_dir: tempfile::TempDir) {
        let (sink, log) = capture();
        let mut manager = TmpRunManager::new(tmp_dir.path(), OsStr::new("out"), log).unwrap();

        // a non-empty directory in place of a run can't be removed as a file
        let blocked = manager.next_run().unwrap();
        fs::create_dir(blocked.path()).unwrap();
        fs::write(blocked.path().join("inner"), b"x").unwrap();
        let regular = manager.next_run().unwrap();
        fs::write(regular.path(), b"run").unwrap();

        let report = manager.cleanup_all();
        assert_eq!(report.removed, 1);
        assert_eq!(report.undeletable, vec![blocked.path().to_path_buf()]);
        assert!(!regular.path().exists());

        let warnings = sink.messages(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("out0"));
    }

    #[rstest]
    fn test_drop_cleans_up(tmp_dir: tempfile::TempDir) {
        let path = {
            let mut manager = TmpRunManager::new(tmp_dir.path(), OsStr::new("out"), JobLog::default()).unwrap();
            let run = manager.next_run().unwrap();
            fs::write(run.path(), b"run").unwrap();
            run.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[rstest]
    fn test_existing_run_warns(tmp_dir: tempfile::TempDir) {
        let (sink, log) = capture();
        fs::write(tmp_dir.path().join("out0"), b"stale").unwrap();

        let manager = TmpRunManager::new(tmp_dir.path(), OsStr::new("out"), log).unwrap();
        manager.allocate(0).unwrap();

        assert_eq!(sink.messages(Level::Warn).len(), 1);
    }

    #[rstest]
    fn test_invalid_tmp_dir(tmp_dir: tempfile::TempDir) {
        let missing = tmp_dir.path().join("missing");
        assert_eq!(
            TmpRunManager::new(&missing, OsStr::new("out"), JobLog::default()).err(),
            Some(ConfigError::TmpDirNotFound(missing.clone()))
        );

        let file = tmp_dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert_eq!(
            TmpRunManager::new(&file, OsStr::new("out"), JobLog::default()).err(),
            Some(ConfigError::TmpDirNotDirectory(file.clone()))
        );

        let read_only = tmp_dir.path().join("read-only");
        fs::create_dir(&read_only).unwrap();
        let mut permissions = fs::metadata(&read_only).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&read_only, permissions.clone()).unwrap();
        assert_eq!(
            TmpRunManager::new(&read_only, OsStr::new("out"), JobLog::default()).err(),
            Some(ConfigError::TmpDirReadOnly(read_only.clone()))
        );
        permissions.set_readonly(false);
        fs::set_permissions(&read_only, permissions).unwrap();
    }

    #[rstest]
    fn test_unwritable_tmp_dir(tmp_dir: tempfile::TempDir) {
        // permission bits allow writing but the file system refuses, as on a read-only mount
        let result = check_tmp_dir_with(tmp_dir.path(), |_| {
            Err(io::Error::new(io::ErrorKind::Other, "Read-only file system (os error 30)"))
        });
        assert_eq!(result, Err(ConfigError::TmpDirReadOnly(tmp_dir.path().to_path_buf())));

        // the real write check leaves nothing behind
        assert_eq!(check_tmp_dir(tmp_dir.path()), Ok(()));
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_allocate_after_dir_removed(tmp_dir: tempfile::TempDir) {
        let dir = tmp_dir.path().join("runs");
        fs::create_dir(&dir).unwrap();
        let manager = TmpRunManager::new(&dir, OsStr::new("out"), JobLog::default()).unwrap();

        fs::remove_dir(&dir).unwrap();
        assert_eq!(manager.allocate(0).err(), Some(ConfigError::TmpDirNotFound(dir.clone())));
    }
}
