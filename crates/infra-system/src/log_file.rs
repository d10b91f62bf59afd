// Engine log file
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tracing::debug;

use omlink_core::port::EngineLog;

/// Per-session file receiving engine stdout and stderr
///
/// The handle stays open until `close`; the content is re-read from disk
/// whenever an error needs to quote it.
pub struct EngineLogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl EngineLogFile {
    /// Create (truncate) the log file
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "Engine log opened");

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Stdout/stderr handles for a child process writing into the log
    pub fn stdio(&self) -> std::io::Result<(Stdio, Stdio)> {
        let guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let file = guard.as_ref().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "engine log is closed")
        })?;
        Ok((Stdio::from(file.try_clone()?), Stdio::from(file.try_clone()?)))
    }

    pub fn is_closed(&self) -> bool {
        self.file
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl EngineLog for EngineLogFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contents(&self) -> String {
        fs::read(&self.path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    fn close(&self) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!(path = %self.path.display(), "Engine log closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_contents_and_close_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = EngineLogFile::create(dir.path().join("engine.log")).unwrap();

        {
            let guard = log.file.lock().unwrap();
            let mut file = guard.as_ref().unwrap();
            file.write_all(b"Error: no license\n").unwrap();
        }
        assert_eq!(log.contents(), "Error: no license\n");

        log.close();
        assert!(log.is_closed());
        log.close();
        assert!(log.stdio().is_err());
        // Still readable after close
        assert_eq!(log.contents(), "Error: no license\n");
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EngineLogFile::create(dir.path().join("engine.log")).unwrap();
        fs::remove_file(log.path()).unwrap();
        assert_eq!(log.contents(), "");
    }
}
