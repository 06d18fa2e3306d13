use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::compat::HostInfo;
use crate::config::Config;
use crate::hooks::{HookDispatcher, Installer, NoInstaller, TracingHooks};
use crate::platform::{self, Platform};

/// Per-invocation context threaded through resolve, build, check and exec.
///
/// Holds the outcome of every compatibility check made during this process so
/// nested work never repeats one, plus the collaborators goenv delegates to.
pub struct Session {
    config: Config,
    platform: &'static dyn Platform,
    /// Blocking reason per inspected binary; `None` means it passed
    checked: Mutex<HashMap<PathBuf, Option<String>>>,
    abi_defaults: Mutex<HashMap<PathBuf, HashMap<String, String>>>,
    host: OnceLock<HostInfo>,
    hooks: Box<dyn HookDispatcher>,
    installer: Box<dyn Installer>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self::with_platform(config, platform::host())
    }

    pub fn with_platform(config: Config, platform: &'static dyn Platform) -> Self {
        Self {
            config,
            platform,
            checked: Mutex::new(HashMap::new()),
            abi_defaults: Mutex::new(HashMap::new()),
            host: OnceLock::new(),
            hooks: Box::new(TracingHooks),
            installer: Box::new(NoInstaller),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn HookDispatcher>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_installer(mut self, installer: Box<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    /// Use a fixed host description instead of probing the machine
    pub fn with_host(self, host: HostInfo) -> Self {
        let _ = self.host.set(host);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &'static dyn Platform {
        self.platform
    }

    /// Host facts, probed on first use
    pub fn host(&self) -> &HostInfo {
        self.host.get_or_init(|| HostInfo::probe(&self.config))
    }

    pub fn hooks(&self) -> &dyn HookDispatcher {
        self.hooks.as_ref()
    }

    pub fn installer(&self) -> &dyn Installer {
        self.installer.as_ref()
    }

    /// Blocking reason for `binary`, running `check` only the first time it is asked
    pub fn check_outcome(
        &self,
        binary: &Path,
        check: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        let mut checked = match self.checked.lock() {
            Ok(checked) => checked,
            Err(poisoned) => poisoned.into_inner(),
        };
        checked
            .entry(binary.to_path_buf())
            .or_insert_with(check)
            .clone()
    }

    pub fn has_checked(&self, binary: &Path) -> bool {
        match self.checked.lock() {
            Ok(checked) => checked.contains_key(binary),
            Err(poisoned) => poisoned.into_inner().contains_key(binary),
        }
    }

    /// ABI defaults reported by a toolchain, computed at most once per binary
    pub fn abi_defaults(
        &self,
        go_binary: &Path,
        discover: impl FnOnce() -> HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut cache = match self.abi_defaults.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry(go_binary.to_path_buf())
            .or_insert_with(discover)
            .clone()
    }
}
