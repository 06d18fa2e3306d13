use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const VERSION_FILE: &str = ".go-version";
pub const TOOL_VERSIONS_FILE: &str = ".tool-versions";
pub const GO_MOD_FILE: &str = "go.mod";

const MAX_ENTRY_LEN: usize = 255;

/// Reasons a version-file entry is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEntry {
    TooLong,
    PathSeparator,
    ParentDirectory,
    Hidden,
    ControlCharacter,
    DriveLetter,
}

impl std::fmt::Display for InvalidEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            InvalidEntry::TooLong => "longer than 255 characters",
            InvalidEntry::PathSeparator => "contains a path separator",
            InvalidEntry::ParentDirectory => "refers to a parent directory",
            InvalidEntry::Hidden => "starts with '.'",
            InvalidEntry::ControlCharacter => "contains control characters",
            InvalidEntry::DriveLetter => "looks like a drive path",
        };
        f.write_str(reason)
    }
}

/// Version names end up as directory names under root/versions, so anything
/// that could escape that directory is rejected.
pub fn validate_entry(entry: &str) -> std::result::Result<(), InvalidEntry> {
    if entry.len() > MAX_ENTRY_LEN {
        return Err(InvalidEntry::TooLong);
    }
    if entry.chars().any(char::is_control) {
        return Err(InvalidEntry::ControlCharacter);
    }
    if entry.contains("..") {
        return Err(InvalidEntry::ParentDirectory);
    }
    if entry.contains('/') || entry.contains('\\') {
        return Err(InvalidEntry::PathSeparator);
    }
    if entry.starts_with('.') {
        return Err(InvalidEntry::Hidden);
    }
    let bytes = entry.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(InvalidEntry::DriveLetter);
    }
    Ok(())
}

/// Keep the entries that are safe to use, logging the ones that are not
pub fn valid_entries<'a>(entries: impl IntoIterator<Item = &'a str>, origin: &Path) -> Vec<String> {
    entries
        .into_iter()
        .filter(|entry| match validate_entry(entry) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!("ignoring version {:?} in {:?}: {}", entry, origin, reason);
                false
            }
        })
        .map(str::to_string)
        .collect()
}

/// Entries of a `.go-version` style file: one version per line, first word only
pub fn parse_version_file(contents: &str) -> Vec<&str> {
    contents
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .collect()
}

/// The Go entry of an asdf `.tool-versions` file
pub fn parse_tool_versions(contents: &str) -> Option<&str> {
    contents
        .trim_start_matches('\u{feff}')
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .find_map(|line| {
            let mut words = line.split_whitespace();
            match words.next() {
                Some("golang") | Some("go") => words.next(),
                _ => None,
            }
        })
}

/// Read a version file and join its valid entries with ':'
///
/// Returns None when the file is missing, unreadable or has no usable entries.
pub fn read_version_file(path: &Path) -> Option<String> {
    let contents = read_optional(path)?;
    let entries = if path.file_name().is_some_and(|name| name == TOOL_VERSIONS_FILE) {
        parse_tool_versions(&contents).into_iter().collect()
    } else {
        parse_version_file(&contents)
    };

    let entries = valid_entries(entries, path);
    if entries.is_empty() {
        tracing::debug!("version file {:?} has no usable entries", path);
        return None;
    }
    Some(entries.join(":"))
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!("failed to read {:?}: {}", path, err);
            None
        }
    }
}

fn go_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^go\s+(\d+\.\d+(?:\.\d+)?(?:(?:rc|beta|alpha)\d+)?)$")
            .unwrap_or_else(|err| panic!("invalid go directive pattern: {err}"))
    })
}

fn toolchain_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^toolchain\s+(\S+)$")
            .unwrap_or_else(|err| panic!("invalid toolchain directive pattern: {err}"))
    })
}

/// Effective Go version declared by go.mod text
///
/// A `toolchain goX` directive wins over `go X` unless it says `default`.
pub fn parse_go_mod(contents: &str) -> Option<String> {
    let mut go = None;
    let mut toolchain = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with("//") {
            continue;
        }
        let line = match line.find("//") {
            Some(comment) => line[..comment].trim_end(),
            None => line,
        };

        if let Some(captures) = go_directive().captures(line) {
            go.get_or_insert_with(|| captures[1].to_string());
        } else if let Some(captures) = toolchain_directive().captures(line) {
            let value = &captures[1];
            if value == "default" {
                continue;
            }
            if let Some(version) = value
                .strip_prefix("go")
                .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
            {
                toolchain.get_or_insert_with(|| version.to_string());
            }
        }
    }

    toolchain.or(go)
}

/// Read go.mod, distinguishing "missing" (Ok(None)) from "no directive" (Err)
pub fn read_go_mod(path: &Path) -> Result<Option<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::io(format!("Failed to read {:?}", path), err)),
    };

    parse_go_mod(&contents)
        .map(Some)
        .ok_or_else(|| Error::ModuleDescriptorUnparseable {
            path: path.to_path_buf(),
        })
}
