use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use crate::config::{Config, RootPath};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::resolver::VersionSource;

/// Sentinel for "whatever go is on PATH outside the shims directory"
pub const SYSTEM: &str = "system";

pub const LATEST: &str = "latest";

/// Pre-release channel, ordered so that later channels sort higher
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Channel {
    Alpha,
    Beta,
    Rc,
}

/// A parsed Go release number such as `1.22.3`, `1.21` or `1.23rc2`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoVersion {
    parts: Vec<u64>,
    pre: Option<(Channel, u64)>,
}

impl GoVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let input = normalize(input);
        let release_end = input
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(input.len());
        let (release, suffix) = input.split_at(release_end);
        if release.is_empty() || release.ends_with('.') {
            return None;
        }

        let parts = release
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let pre = if suffix.is_empty() {
            None
        } else {
            let digits_at = suffix
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(suffix.len());
            let (label, number) = suffix.split_at(digits_at);
            let channel = match label {
                "alpha" => Channel::Alpha,
                "beta" => Channel::Beta,
                "rc" => Channel::Rc,
                _ => return None,
            };
            let number = if number.is_empty() {
                0
            } else {
                number.parse().ok()?
            };
            Some((channel, number))
        };

        Some(Self { parts, pre })
    }

    /// Component `index`, treating absent components as 0
    pub fn part(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.part(0)
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// True when the leading components equal `prefix`
    pub fn starts_with(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(index, want)| self.part(index) == *want)
    }
}

impl Ord for GoVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.parts.len().max(other.parts.len()).max(3);
        for index in 0..width {
            match self.part(index).cmp(&other.part(index)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        // A final release sorts above any pre-release of the same number.
        match (self.pre, other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for GoVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Strip a `go` or `v` prefix: `go1.21.3` and `v1.21.3` both mean `1.21.3`
pub fn normalize(spec: &str) -> &str {
    let spec = spec.trim();
    spec.strip_prefix("go")
        .or_else(|| spec.strip_prefix('v'))
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(spec)
}

/// Compare two version strings, falling back to text order for unparseable names
pub fn compare(a: &str, b: &str) -> Ordering {
    match (GoVersion::parse(a), GoVersion::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| compare(a, b));
}

/// Versions present under root/versions, in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    versions: Vec<String>,
}

impl Inventory {
    /// A version counts as installed when its bin directory holds a go executable
    pub fn scan(config: &Config, platform: &dyn Platform) -> Self {
        let versions_dir = config.path(RootPath::Versions);
        let Ok(entries) = fs::read_dir(&versions_dir) else {
            tracing::debug!("no versions directory at {:?}", versions_dir);
            return Self::default();
        };

        let versions = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| has_go_binary(&entry.path().join("bin"), platform))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        Self::from_versions(versions)
    }

    pub fn from_versions(mut versions: Vec<String>) -> Self {
        sort_versions(&mut versions);
        versions.dedup();
        Self { versions }
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn latest(&self) -> Option<&str> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.as_str() != SYSTEM)
            .map(String::as_str)
    }
}

fn has_go_binary(bin: &Path, platform: &dyn Platform) -> bool {
    platform
        .executable_candidates("go")
        .iter()
        .any(|name| platform.is_executable(&bin.join(name)))
}

/// Outcome of matching every element of a version list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub available: Vec<String>,
    pub missing: Vec<String>,
}

impl MatchReport {
    /// Fail when any element is missing, still carrying the resolvable ones
    pub fn into_result(self, origin: &VersionSource) -> Result<Vec<String>> {
        if self.missing.is_empty() {
            Ok(self.available)
        } else {
            Err(Error::VersionsNotInstalled {
                missing: self.missing,
                available: self.available,
                origin: origin.clone(),
            })
        }
    }
}

/// Maps version specs onto the installed set
#[derive(Debug, Clone)]
pub struct Matcher<'a> {
    inventory: &'a Inventory,
    system_available: bool,
}

impl<'a> Matcher<'a> {
    pub fn new(inventory: &'a Inventory, system_available: bool) -> Self {
        Self {
            inventory,
            system_available,
        }
    }

    /// Concrete version for `spec`, or None when nothing installed satisfies it
    pub fn find(&self, spec: &str) -> Option<String> {
        let spec = spec.trim();
        if spec == SYSTEM {
            return self.system_available.then(|| SYSTEM.to_string());
        }
        if self.inventory.contains(spec) {
            return Some(spec.to_string());
        }

        let spec = normalize(spec);
        if self.inventory.contains(spec) {
            return Some(spec.to_string());
        }
        if spec == LATEST {
            return self.inventory.latest().map(str::to_string);
        }

        let prefix = spec
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        self.inventory
            .versions()
            .iter()
            .filter_map(|v| GoVersion::parse(v).map(|parsed| (v, parsed)))
            .filter(|(_, parsed)| parsed.starts_with(&prefix))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(v, _)| v.clone())
    }

    pub fn resolve(&self, spec: &str, origin: &VersionSource) -> Result<String> {
        self.find(spec).ok_or_else(|| Error::VersionNotInstalled {
            version: spec.to_string(),
            origin: origin.clone(),
            installed: self.inventory.versions().to_vec(),
        })
    }

    /// Match each element of a colon-separated list independently
    pub fn match_list<'s>(&self, specs: impl IntoIterator<Item = &'s str>) -> MatchReport {
        let mut report = MatchReport::default();
        for spec in specs {
            match self.find(spec) {
                Some(version) if !report.available.contains(&version) => {
                    report.available.push(version)
                }
                Some(_) => {}
                None => report.missing.push(spec.to_string()),
            }
        }
        report
    }
}
