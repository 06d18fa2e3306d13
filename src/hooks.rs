use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Points around a command launch where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    PreExec,
    PostExec,
}

impl HookPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::PreExec => "pre-exec",
            HookPoint::PostExec => "post-exec",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext<'a> {
    pub version: &'a str,
    pub command: &'a str,
}

/// Receives pre/post exec notifications. Failures never affect the launched command.
pub trait HookDispatcher: Send + Sync {
    fn dispatch(&self, point: HookPoint, context: &HookContext<'_>) -> Result<()>;
}

/// Installs a missing version on request
pub trait Installer: Send + Sync {
    /// Returns true when `version` was installed and resolution should be retried
    fn offer_install(&self, version: &str) -> Result<bool>;
}

/// Default dispatcher: records each hook point in the debug log
pub struct TracingHooks;

impl HookDispatcher for TracingHooks {
    fn dispatch(&self, point: HookPoint, context: &HookContext<'_>) -> Result<()> {
        tracing::debug!(
            hook = point.as_str(),
            version = context.version,
            command = context.command,
            "hook"
        );
        Ok(())
    }
}

/// Default installer: never installs anything
pub struct NoInstaller;

impl Installer for NoInstaller {
    fn offer_install(&self, version: &str) -> Result<bool> {
        tracing::debug!("no installer configured for {}", version);
        Ok(false)
    }
}

/// Read-only view of root/aliases (`name = version` per line)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasStore {
    aliases: BTreeMap<String, String>,
}

impl AliasStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read aliases file {:?}", path))?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let aliases = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(name, version)| (name.trim().to_string(), version.trim().to_string()))
            .filter(|(name, version)| !name.is_empty() && !version.is_empty())
            .collect();
        Self { aliases }
    }

    /// Alias names that point at `version`, for display only
    pub fn names_for(&self, version: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(_, target)| target.as_str() == version)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
