//! Host shell command lines.
//!
//! Both external tools are started through the host shell so the encoder's
//! stderr can be folded into stdout with `2>&1`. Paths are escaped
//! character-by-character for the dialect. This is not a general-purpose
//! quoting scheme; other shell metacharacters pass through.

use std::path::Path;
use tokio::process::Command;

/// Shell dialect used to run external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    /// `sh -c`
    Posix,
    /// `cmd /C`
    Windows,
}

impl ShellDialect {
    /// Dialect of the host the binary was built for.
    pub fn host() -> Self {
        if cfg!(windows) {
            ShellDialect::Windows
        } else {
            ShellDialect::Posix
        }
    }

    /// Escapes a path for inclusion in a command line of this dialect.
    ///
    /// - Windows: the whole path is double-quoted and each embedded `"`
    ///   becomes `^^"`.
    /// - POSIX: `'`, `[`, `]`, `(`, `)` and space are each prefixed with a
    ///   backslash; no outer quotes are added.
    pub fn escape_path(&self, path: &Path) -> String {
        let raw = path.to_string_lossy();
        match self {
            ShellDialect::Windows => format!("\"{}\"", raw.replace('"', "^^\"")),
            ShellDialect::Posix => {
                let mut escaped = String::with_capacity(raw.len() + 8);
                for c in raw.chars() {
                    if matches!(c, '\'' | '[' | ']' | '(' | ')' | ' ') {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                escaped
            }
        }
    }

    /// Builds a command that runs `line` through this dialect's shell.
    pub fn command(&self, line: &str) -> Command {
        let mut cmd = match self {
            ShellDialect::Posix => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c");
                cmd
            }
            ShellDialect::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                cmd
            }
        };
        cmd.arg(line);
        cmd
    }
}

/// Quotes a binary path if it contains spaces; bare names are left alone.
pub(crate) fn program_token(dialect: ShellDialect, program: &str) -> String {
    if program.contains(' ') {
        dialect.escape_path(Path::new(program))
    } else {
        program.to_string()
    }
}
