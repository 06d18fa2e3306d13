//! Pre-exec compatibility checks.
//!
//! Each OS-specific check inspects the target binary's headers against the
//! probed [`HostInfo`] and is a no-op on other hosts. Error-severity issues
//! block the launch; anything lower is printed and execution continues.

pub mod advisories;
pub mod binary;
pub mod host;
pub mod linux;
pub mod macos;
pub mod windows;

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::ui;

pub use binary::{BinaryFormat, OsVersion};
pub use host::HostInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub hint: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            hint: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n{}", hint)?;
        }
        Ok(())
    }
}

/// Inspect `binary` and report everything that may stop it running on `host`
pub fn check(binary: &Path, host: &HostInfo) -> Vec<Issue> {
    match BinaryFormat::read(binary) {
        Ok(format) => check_format(&format, host),
        Err(err) => {
            tracing::debug!("cannot inspect {:?}: {}", binary, err);
            Vec::new()
        }
    }
}

pub fn check_format(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    let mut issues = generic(format, host);
    issues.extend(linux::check(format, host));
    issues.extend(macos::check(format, host));
    issues.extend(windows::check(format, host));
    issues.extend(advisories::check(format, host));
    issues
}

/// Checks that hold regardless of host OS
fn generic(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    let mut issues = Vec::new();

    match format {
        BinaryFormat::Script { interpreter } if host.os != "windows" => {
            if !interpreter.exists() {
                issues.push(
                    Issue::error(format!(
                        "script interpreter {} does not exist",
                        interpreter.display()
                    ))
                    .with_hint("Install the interpreter or fix the #! line"),
                );
            }
        }
        BinaryFormat::Elf(_) if host.os == "darwin" || host.os == "windows" => {
            issues.push(Issue::error(format!(
                "this is a Linux (ELF) binary and cannot run on {}",
                host.os
            )));
        }
        BinaryFormat::MachO(_) | BinaryFormat::FatMachO if host.os != "darwin" => {
            issues.push(Issue::error(format!(
                "this is a macOS (Mach-O) binary and cannot run on {}",
                host.os
            )));
        }
        BinaryFormat::Pe(_) if host.os != "windows" && !host.wsl => {
            issues.push(Issue::error(format!(
                "this is a Windows (PE) binary and cannot run on {}",
                host.os
            )));
        }
        _ => {}
    }

    issues
}

/// Check `binary` before it is launched as `command`.
///
/// The inspection runs once per session; advisories are printed that one time,
/// while a blocking result is replayed on every later call.
pub fn preflight(session: &Session, command: &str, binary: &Path) -> Result<()> {
    let blocked = session.check_outcome(binary, || report(binary, session.host()));

    match blocked {
        Some(reason) => Err(Error::BinaryCompatibilityBlocking {
            command: command.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Print advisories and return the first blocking issue, rendered
fn report(binary: &Path, host: &HostInfo) -> Option<String> {
    let mut blocking = None;
    for issue in check(binary, host) {
        match issue.severity {
            Severity::Error => {
                if blocking.is_none() {
                    blocking = Some(issue.to_string());
                }
            }
            Severity::Warning => ui::warn(&issue),
            Severity::Info => ui::note(&issue),
        }
    }
    blocking
}
