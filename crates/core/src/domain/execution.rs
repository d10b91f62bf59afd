// Execution Descriptor for compiled model executables

use crate::domain::args::{ArgInput, ArgumentSet, RESULT_FILE_KEY};
use crate::domain::identity::posix_string;
use crate::error::{AppError, Result};
use crate::port::model_runner::{ExecutionError, ModelRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default hard timeout of a model run
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a compiled model runs, as reported by the engine session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionTarget {
    /// Tokens in front of the executable (container exec, remote shell)
    pub prefix: Vec<String>,
    /// Executable runs on this host
    pub local: bool,
    /// Windows-style target (`.exe`, generated batch file)
    pub windows: bool,
}

impl ExecutionTarget {
    pub fn local() -> Self {
        Self {
            prefix: Vec::new(),
            local: true,
            windows: cfg!(windows),
        }
    }
}

/// Builder for one compiled model executable
///
/// Collects arguments and derives an [`ExecutionDescriptor`] on demand.
#[derive(Debug, Clone)]
pub struct ModelExecution {
    run_path: PathBuf,
    model_name: String,
    target: ExecutionTarget,
    timeout: Duration,
    args: ArgumentSet,
}

impl ModelExecution {
    /// # Errors
    /// `AppError::InvalidArgument` if the model name is empty.
    pub fn new(
        run_path: impl Into<PathBuf>,
        model_name: impl Into<String>,
        target: ExecutionTarget,
    ) -> Result<Self> {
        let model_name = model_name.into();
        if model_name.trim().is_empty() {
            return Err(AppError::InvalidArgument("missing model name".to_string()));
        }

        Ok(Self {
            run_path: run_path.into(),
            model_name,
            target,
            timeout: DEFAULT_MODEL_TIMEOUT,
            args: ArgumentSet::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn arg_set(&mut self, key: &str, value: impl Into<ArgInput>) -> Result<()> {
        self.args.set(key, value)
    }

    pub fn args_set<I, K, V>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ArgInput>,
    {
        self.args.set_all(args)
    }

    pub fn args(&self) -> &ArgumentSet {
        &self.args
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Derive the immutable invocation plan
    ///
    /// # Errors
    /// `ExecutionError::BatchFileNotFound` for a Windows-style local target without
    /// the generated `<model>.bat` next to the executable.
    pub fn definition(&self) -> std::result::Result<ExecutionDescriptor, ExecutionError> {
        let run_path = posix_string(&self.run_path);

        let result_file = match self.args.value(RESULT_FILE_KEY) {
            Some(explicit) => explicit.to_string(),
            None => format!("{}/{}.mat", run_path, self.model_name),
        };

        let (executable, library_path) = if self.target.local && self.target.windows {
            let batch = self.run_path.join(format!("{}.bat", self.model_name));
            let library_path = read_batch_library_path(&batch)?;
            (format!("{}/{}.exe", run_path, self.model_name), Some(library_path))
        } else {
            (format!("{}/{}", run_path, self.model_name), None)
        };

        let cwd_local = self.target.local.then(|| self.run_path.clone());

        Ok(ExecutionDescriptor {
            run_path,
            model_name: self.model_name.clone(),
            prefix: self.target.prefix.clone(),
            executable,
            args: self.args.serialize(),
            result_file,
            timeout: self.timeout,
            library_path,
            cwd_local,
        })
    }
}

/// Read the `SET PATH=` line of a generated batch file
fn read_batch_library_path(batch: &Path) -> std::result::Result<String, ExecutionError> {
    if !batch.is_file() {
        return Err(ExecutionError::BatchFileNotFound(batch.display().to_string()));
    }
    let content =
        fs::read_to_string(batch).map_err(|e| ExecutionError::IoError(e.to_string()))?;
    Ok(parse_batch_library_path(&content).unwrap_or_default())
}

/// Library search path from batch file content; the last matching line wins
pub fn parse_batch_library_path(content: &str) -> Option<String> {
    const PREFIX: &str = "SET PATH=";

    content
        .lines()
        .filter_map(|line| {
            let head = line.get(..PREFIX.len())?;
            head.eq_ignore_ascii_case(PREFIX)
                .then(|| &line[PREFIX.len()..])
        })
        .map(|value| {
            // Stop at the first %VAR% reference
            let value = value.split('%').next().unwrap_or_default();
            value.trim_matches(';').to_string()
        })
        .last()
}

/// Fully resolved plan for invoking a compiled model
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDescriptor {
    /// Work directory as seen by the engine
    pub run_path: String,
    pub model_name: String,
    pub prefix: Vec<String>,
    pub executable: String,
    pub args: Vec<String>,
    pub result_file: String,
    pub timeout: Duration,
    /// Prepended to the child's search path
    pub library_path: Option<String>,
    /// Working directory on this host, local targets only
    pub cwd_local: Option<PathBuf>,
}

impl ExecutionDescriptor {
    /// `prefix + executable + args`
    pub fn command(&self) -> Vec<String> {
        let mut command = self.prefix.clone();
        command.push(self.executable.clone());
        command.extend(self.args.iter().cloned());
        command
    }

    /// Execute with the given runner and return the exit code
    pub async fn run(&self, runner: &dyn ModelRunner) -> std::result::Result<i32, ExecutionError> {
        debug!(
            command = ?self.command(),
            run_path = %self.run_path,
            "Running model executable"
        );
        let outcome = runner.run(self).await?;
        Ok(outcome.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::args::OVERRIDE_KEY;
    use crate::port::model_runner::mocks::MockModelRunner;

    fn posix_target() -> ExecutionTarget {
        ExecutionTarget {
            prefix: Vec::new(),
            local: true,
            windows: false,
        }
    }

    #[test]
    fn test_empty_model_name() {
        let result = ModelExecution::new("/work", " ", posix_target());
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn test_default_result_file_and_executable() {
        let mut exec = ModelExecution::new("/work", "M", posix_target()).unwrap();
        exec.arg_set("noRestart", ArgInput::Flag).unwrap();
        let desc = exec.definition().unwrap();

        assert_eq!(desc.result_file, "/work/M.mat");
        assert_eq!(desc.executable, "/work/M");
        assert_eq!(desc.cwd_local, Some(PathBuf::from("/work")));
        assert_eq!(desc.command(), vec!["/work/M", "-noRestart"]);
        assert_eq!(desc.library_path, None);
    }

    #[test]
    fn test_explicit_result_file() {
        let mut exec = ModelExecution::new("/work", "M", posix_target()).unwrap();
        exec.arg_set("r", "/data/out.mat").unwrap();
        assert_eq!(exec.definition().unwrap().result_file, "/data/out.mat");
    }

    #[test]
    fn test_container_prefix_no_local_cwd() {
        let target = ExecutionTarget {
            prefix: vec!["docker".into(), "exec".into(), "cid".into()],
            local: false,
            windows: false,
        };
        let mut exec = ModelExecution::new("/work", "M", target).unwrap();
        exec.arg_set(OVERRIDE_KEY, ArgInput::overrides([("a", Some(1.into()))]))
            .unwrap();
        let desc = exec.definition().unwrap();

        assert_eq!(desc.cwd_local, None);
        assert_eq!(
            desc.command(),
            vec!["docker", "exec", "cid", "/work/M", "-override=a=1"]
        );
    }

    #[test]
    fn test_windows_local_needs_batch_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExecutionTarget {
            prefix: Vec::new(),
            local: true,
            windows: true,
        };
        let exec = ModelExecution::new(dir.path(), "M", target).unwrap();

        let result = exec.definition();
        assert!(matches!(result, Err(ExecutionError::BatchFileNotFound(_))));

        std::fs::write(
            dir.path().join("M.bat"),
            "@echo off\r\nset PATH=C:/OM/bin;C:/OM/lib;%PATH%\r\nM.exe %*\r\n",
        )
        .unwrap();
        let desc = exec.definition().unwrap();
        assert_eq!(desc.library_path.as_deref(), Some("C:/OM/bin;C:/OM/lib"));
        assert!(desc.executable.ends_with("/M.exe"));
    }

    #[test]
    fn test_parse_batch_library_path() {
        assert_eq!(parse_batch_library_path("echo hi"), None);
        assert_eq!(
            parse_batch_library_path("SET PATH=C:/a;;\n"),
            Some("C:/a".to_string())
        );
    }

    #[tokio::test]
    async fn test_run_returns_exit_code() {
        let exec = ModelExecution::new("/work", "M", posix_target()).unwrap();
        let desc = exec.definition().unwrap();
        let runner = MockModelRunner::new_success();

        assert_eq!(desc.run(&runner).await.unwrap(), 0);
        assert_eq!(runner.call_count(), 1);
    }
}
