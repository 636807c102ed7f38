//! Startup checks for hevcify
//!
//! Verifies that the external tools are reachable before any work starts:
//! - probing binary (ffprobe)
//! - encoding binary (ffmpeg)

use crate::config::Config;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    /// The binary could not be located on the search path.
    #[error("{tool} is not installed or not on PATH")]
    ToolNotInstalled { tool: String },
}

/// Locates a tool by name on PATH, or checks an explicit path.
///
/// # Returns
/// The resolved path of the executable.
pub fn locate_tool(tool: &str) -> Result<PathBuf, StartupError> {
    match which::which(tool) {
        Ok(path) => {
            debug!(tool, path = %path.display(), "tool located");
            Ok(path)
        }
        Err(_) => Err(StartupError::ToolNotInstalled {
            tool: tool.to_string(),
        }),
    }
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. Probing binary
/// 2. Encoding binary
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    locate_tool(&cfg.tools.probe_binary)?;
    locate_tool(&cfg.tools.encode_binary)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let err = locate_tool("hevcify-definitely-not-a-real-tool").unwrap_err();
        assert!(err.to_string().contains("hevcify-definitely-not-a-real-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_is_found() {
        assert!(locate_tool("sh").is_ok());
    }

    #[test]
    fn test_startup_checks_report_first_missing_tool() {
        let mut cfg = Config::default();
        cfg.tools.probe_binary = "hevcify-missing-probe".to_string();
        cfg.tools.encode_binary = "hevcify-missing-encoder".to_string();

        match run_startup_checks(&cfg) {
            Err(StartupError::ToolNotInstalled { tool }) => {
                assert_eq!(tool, "hevcify-missing-probe")
            }
            other => panic!("expected ToolNotInstalled, got {:?}", other),
        }
    }
}
