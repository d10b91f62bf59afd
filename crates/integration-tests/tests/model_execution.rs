//! Model execution scenarios
//!
//! Execution descriptors run through the subprocess runner.

use std::sync::Arc;

use omlink_core::domain::{ArgInput, ExecutionTarget, ModelExecution, OVERRIDE_KEY};
use omlink_core::port::time_provider::SystemTimeProvider;
use omlink_core::port::ExecutionError;
use omlink_infra_system::SubprocessRunner;

fn runner() -> SubprocessRunner {
    SubprocessRunner::new(Arc::new(SystemTimeProvider))
}

#[tokio::test]
async fn test_absent_executable_always_same_error() {
    let dir = tempfile::tempdir().unwrap();
    let execution = ModelExecution::new(dir.path(), "NoSuchModel", ExecutionTarget::local()).unwrap();
    let runner = runner();

    for _ in 0..3 {
        let descriptor = execution.definition();
        // Windows-style targets fail earlier on the missing batch file
        let result = match descriptor {
            Ok(descriptor) => descriptor.run(&runner).await,
            Err(e) => Err(e),
        };
        assert!(matches!(
            result,
            Err(ExecutionError::ExecutableNotFound(_)) | Err(ExecutionError::BatchFileNotFound(_))
        ));
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn write_model(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_stderr_output_fails_even_with_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "Warn", "echo 'assertion triggered' >&2\nexit 0");

        let descriptor = ModelExecution::new(dir.path(), "Warn", ExecutionTarget::local())
            .unwrap()
            .definition()
            .unwrap();

        let result = descriptor.run(&runner()).await;
        match result {
            Err(ExecutionError::Stderr { stderr, command }) => {
                assert_eq!(stderr, "assertion triggered\n");
                assert!(command.ends_with("/Warn"));
            }
            other => panic!("expected stderr failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_override_arguments_reach_executable() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "M", "printf '%s\\n' \"$@\" > received.txt");

        let mut execution =
            ModelExecution::new(dir.path(), "M", ExecutionTarget::local()).unwrap();
        execution
            .args_set([
                (
                    OVERRIDE_KEY,
                    ArgInput::overrides([("stopTime", Some("2.5".into())), ("a", Some(1.into()))]),
                ),
                ("noEventEmit", ArgInput::Flag),
            ])
            .unwrap();
        execution.arg_set(OVERRIDE_KEY, "b=false").unwrap();

        let descriptor = execution.definition().unwrap();
        assert_eq!(
            descriptor.result_file,
            format!("{}/M.mat", dir.path().display())
        );
        assert_eq!(descriptor.run(&runner()).await.unwrap(), 0);

        let received = std::fs::read_to_string(dir.path().join("received.txt")).unwrap();
        assert_eq!(received, "-noEventEmit\n-override=a=1,b=false,stopTime=2.5\n");
    }
}
