//! Shared test utilities.
//!
//! Only compiled when running tests.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::config::Settings;
use crate::workspace::Workspace;

/// Creates a temporary workspace directory for testing.
///
/// Returns (TempDir, PathBuf); keep the TempDir alive for the test duration.
/// The workspace scan skips hidden directories, and on some systems temp
/// directories land under paths like `/tmp/.tmpXXXXX`, so the documents go
/// into a non-hidden "ws" subdirectory.
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let ws_dir = temp_dir.path().join("ws");
    fs::create_dir(&ws_dir).expect("Failed to create workspace subdirectory");
    (temp_dir, ws_dir)
}

/// Creates a test workspace with default settings. The closure gets the
/// workspace directory and writes files before the scan runs.
pub fn create_test_workspace<F>(setup_fn: F) -> (TempDir, PathBuf, Workspace)
where
    F: FnOnce(&PathBuf),
{
    let (temp_dir, ws_dir) = create_test_workspace_dir();
    setup_fn(&ws_dir);
    let settings = Settings::default();
    let workspace =
        Workspace::construct(&settings, &ws_dir).expect("Failed to construct test workspace");
    (temp_dir, ws_dir, workspace)
}
