use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::resolver::VersionSource;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A spec resolved from `origin` names a version that is not in the installed set.
    #[error("{}", not_installed_message(.version, .origin, .installed))]
    VersionNotInstalled {
        version: String,
        origin: VersionSource,
        installed: Vec<String>,
    },

    /// One or more elements of a colon-separated version list are missing.
    #[error("{}", partially_installed_message(.missing, .origin, .available))]
    VersionsNotInstalled {
        missing: Vec<String>,
        available: Vec<String>,
        origin: VersionSource,
    },

    #[error("goenv: no Go version is installed and no system Go was found on PATH\n  Install one with: goenv install <version>")]
    NoVersionResolvable,

    #[error("goenv: system version not found in PATH")]
    SystemVersionNotFound,

    #[error("goenv: '{command}' command not found in Go {version}")]
    CommandNotFound { command: String, version: String },

    #[error("goenv: cannot write shims directory {}", .dir.display())]
    ShimDirectoryUnwritable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("goenv: no go version directive found in {}", .path.display())]
    ModuleDescriptorUnparseable { path: PathBuf },

    #[error("goenv: {command} cannot run on this system: {reason}")]
    BinaryCompatibilityBlocking { command: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

fn not_installed_line(version: &str, origin: &VersionSource) -> String {
    format!("goenv: version '{version}' is not installed (set by {origin})")
}

fn installed_hint(installed: &[String]) -> String {
    if installed.is_empty() {
        "  No Go versions are installed yet".to_string()
    } else {
        format!("  Installed versions: {}", installed.join(", "))
    }
}

fn not_installed_message(version: &str, origin: &VersionSource, installed: &[String]) -> String {
    let mut lines = vec![not_installed_line(version, origin)];
    lines.push(format!("  Install it with: goenv install {version}"));
    if let Some(nearest) = installed.last() {
        lines.push(format!("  Or use an installed version: goenv local {nearest}"));
    }
    lines.push(installed_hint(installed));
    lines.join("\n")
}

fn partially_installed_message(
    missing: &[String],
    origin: &VersionSource,
    available: &[String],
) -> String {
    let mut lines: Vec<String> = missing
        .iter()
        .map(|version| not_installed_line(version, origin))
        .collect();
    if !available.is_empty() {
        lines.push(format!("  Resolvable: {}", available.join(", ")));
    }
    lines.join("\n")
}
