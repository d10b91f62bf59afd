// Engine Log Port
// Per-session file receiving the engine's stdout/stderr

use std::path::Path;

/// Engine log trait
///
/// The log stays open for the whole session; its content is quoted in launch
/// and transport errors.
pub trait EngineLog: Send + Sync {
    fn path(&self) -> &Path;

    /// Full log content, empty if it cannot be read
    fn contents(&self) -> String;

    /// Close the log; later calls are no-ops
    fn close(&self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockEngineLog {
        path: PathBuf,
        contents: String,
        close_calls: AtomicUsize,
    }

    impl MockEngineLog {
        pub fn new(contents: impl Into<String>) -> Self {
            Self {
                path: PathBuf::from("/tmp/mock-engine.log"),
                contents: contents.into(),
                close_calls: AtomicUsize::new(0),
            }
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }
    }

    impl EngineLog for MockEngineLog {
        fn path(&self) -> &Path {
            &self.path
        }

        fn contents(&self) -> String {
            self.contents.clone()
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}
