//! Where a run's database lives, and removing it afterwards.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Side files SQLite may leave next to the main database file.
const SIDE_FILE_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

/// Database location for one run.
///
/// Without an explicit path the database goes into a fresh temporary
/// directory that is removed when the workspace is dropped.
#[derive(Debug)]
pub struct RunWorkspace {
    db_path: PathBuf,
    temp_dir: Option<TempDir>,
}

impl RunWorkspace {
    /// Use `db_path` when given, otherwise `run.db` in a new temporary
    /// directory.
    pub fn new(db_path: Option<&Path>) -> io::Result<Self> {
        match db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Self {
                    db_path: path.to_path_buf(),
                    temp_dir: None,
                })
            }
            None => {
                let temp_dir = tempfile::Builder::new().prefix("sqlload-").tempdir()?;
                Ok(Self {
                    db_path: temp_dir.path().join("run.db"),
                    temp_dir: Some(temp_dir),
                })
            }
        }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }
}

/// Remove a database file and its WAL/SHM/journal side files.
///
/// Files that do not exist are skipped, so calling this twice is harmless.
pub fn remove_database_files(path: &Path) -> io::Result<()> {
    remove_if_present(path)?;
    for suffix in SIDE_FILE_SUFFIXES {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        remove_if_present(Path::new(&side))?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
