use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::platform;

pub const ROOT_VAR: &str = "GOENV_ROOT";
pub const VERSION_VAR: &str = "GOENV_VERSION";
pub const DIR_VAR: &str = "GOENV_DIR";
pub const DISABLE_GOROOT_VAR: &str = "GOENV_DISABLE_GOROOT";
pub const DISABLE_GOPATH_VAR: &str = "GOENV_DISABLE_GOPATH";
pub const DISABLE_GOCACHE_VAR: &str = "GOENV_DISABLE_GOCACHE";
pub const DISABLE_GOMODCACHE_VAR: &str = "GOENV_DISABLE_GOMODCACHE";
pub const GOPATH_PREFIX_VAR: &str = "GOENV_GOPATH_PREFIX";
pub const APPEND_GOPATH_VAR: &str = "GOENV_APPEND_GOPATH";
pub const PREPEND_GOPATH_VAR: &str = "GOENV_PREPEND_GOPATH";
pub const GOCACHE_DIR_VAR: &str = "GOENV_GOCACHE_DIR";
pub const NO_AUTO_REHASH_VAR: &str = "GOENV_NO_AUTO_REHASH";
pub const DEBUG_VAR: &str = "GOENV_DEBUG";

const CONFIG_FILE: &str = "config.toml";

/// Locations under the goenv root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPath {
    /// Root directory: $GOENV_ROOT or ~/.goenv
    Root,
    /// Installed toolchains: root/versions
    Versions,
    /// Generated shims: root/shims
    Shims,
    /// Global version file: root/version
    GlobalVersionFile,
    /// Alias definitions: root/aliases
    Aliases,
    /// Tools installed for the host rather than a version: root/hosts/<goos>-<goarch>/gopath/bin
    HostBin,
    /// Module cache shared by every version: root/shared/go-mod
    SharedModCache,
    /// Advisory lock serializing rehash: root/.rehash.lock
    RehashLock,
    /// Optional settings file: root/config.toml
    ConfigFile,
}

/// Where a pre-existing GOPATH goes relative to the managed entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GopathPlacement {
    /// Managed entry first, existing entries after it
    #[default]
    Append,
    /// Existing entries first, managed entry last
    Prepend,
}

/// Defaults read from root/config.toml. Environment variables override every key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    disable_goroot: Option<bool>,
    disable_gopath: Option<bool>,
    disable_gocache: Option<bool>,
    disable_gomodcache: Option<bool>,
    gopath_prefix: Option<String>,
    gocache_dir: Option<String>,
    auto_rehash: Option<bool>,
    gopath_placement: Option<GopathPlacement>,
}

impl SettingsFile {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}

/// Effective switches after merging config.toml with the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub disable_goroot: bool,
    pub disable_gopath: bool,
    pub disable_gocache: bool,
    pub disable_gomodcache: bool,
    pub gopath_prefix: Option<PathBuf>,
    pub gocache_dir: Option<PathBuf>,
    pub auto_rehash: bool,
    pub gopath_placement: GopathPlacement,
}

#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    home: PathBuf,
    current_dir: PathBuf,
    vars: BTreeMap<String, String>,
    settings: Settings,
}

impl Config {
    /// Build a config from the process environment and working directory
    pub fn load() -> Result<Self> {
        let vars = env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        let current_dir = env::current_dir().context("Failed to determine current directory")?;
        Self::from_vars(vars, current_dir)
    }

    /// Build a config from an explicit environment snapshot
    pub fn from_vars(vars: BTreeMap<String, String>, current_dir: PathBuf) -> Result<Self> {
        let home = home_dir(&vars)?;
        let root = match non_empty(&vars, ROOT_VAR) {
            Some(root) => expand_with_home(root, &home),
            None => home.join(".goenv"),
        };

        let file = SettingsFile::load(&root.join(CONFIG_FILE))?;
        let settings = merge_settings(&vars, &home, file);

        Ok(Self {
            root,
            home,
            current_dir,
            vars,
            settings,
        })
    }

    /// Get path for a specific location under the root
    pub fn path(&self, path_type: RootPath) -> PathBuf {
        match path_type {
            RootPath::Root => self.root.clone(),
            RootPath::Versions => self.root.join("versions"),
            RootPath::Shims => self.root.join("shims"),
            RootPath::GlobalVersionFile => self.root.join("version"),
            RootPath::Aliases => self.root.join("aliases"),
            RootPath::HostBin => self
                .root
                .join("hosts")
                .join(format!("{}-{}", platform::goos(), platform::goarch()))
                .join("gopath")
                .join("bin"),
            RootPath::SharedModCache => self.root.join("shared").join("go-mod"),
            RootPath::RehashLock => self.root.join(".rehash.lock"),
            RootPath::ConfigFile => self.root.join(CONFIG_FILE),
        }
    }

    /// Legacy global version files, consulted when root/version is absent
    pub fn legacy_global_files(&self) -> [PathBuf; 2] {
        [self.root.join("global"), self.root.join("default")]
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Full environment snapshot this config was built from
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Value of an environment variable, treating empty as unset
    pub fn var(&self, key: &str) -> Option<&str> {
        non_empty(&self.vars, key)
    }

    /// Directory named by GOENV_DIR, resolved against the working directory
    pub fn dir_override(&self) -> Option<PathBuf> {
        self.var(DIR_VAR)
            .map(|dir| self.current_dir.join(expand_with_home(dir, &self.home)))
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.path(RootPath::Versions).join(version)
    }

    /// Parent of every managed per-version GOPATH
    pub fn gopath_base(&self) -> PathBuf {
        self.settings
            .gopath_prefix
            .clone()
            .unwrap_or_else(|| self.home.join("go"))
    }

    /// Managed GOPATH for a version: <prefix>/<version>
    pub fn gopath_for(&self, version: &str) -> PathBuf {
        self.gopath_base().join(version)
    }

    /// Expand a leading `~` against this config's home directory
    pub fn expand(&self, path: &str) -> PathBuf {
        expand_with_home(path, &self.home)
    }
}

fn non_empty<'a>(vars: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn flag(vars: &BTreeMap<String, String>, key: &str) -> Option<bool> {
    non_empty(vars, key).map(|value| matches!(value.trim(), "1" | "true" | "yes"))
}

fn home_dir(vars: &BTreeMap<String, String>) -> Result<PathBuf> {
    if let Some(home) = non_empty(vars, "HOME").or_else(|| non_empty(vars, "USERPROFILE")) {
        return Ok(PathBuf::from(home));
    }
    directories::BaseDirs::new()
        .context("Failed to get home directory")
        .map(|bd| bd.home_dir().to_path_buf())
}

fn expand_with_home(path: &str, home: &Path) -> PathBuf {
    let home = home.to_string_lossy();
    PathBuf::from(shellexpand::tilde_with_context(path, || Some(home.as_ref())).into_owned())
}

fn merge_settings(vars: &BTreeMap<String, String>, home: &Path, file: SettingsFile) -> Settings {
    let append = flag(vars, APPEND_GOPATH_VAR).unwrap_or(false);
    let prepend = flag(vars, PREPEND_GOPATH_VAR).unwrap_or(false);
    let gopath_placement = match (append, prepend) {
        (true, true) => {
            tracing::warn!(
                "{} and {} are both set; keeping the managed GOPATH first",
                APPEND_GOPATH_VAR,
                PREPEND_GOPATH_VAR
            );
            GopathPlacement::Append
        }
        (true, false) => GopathPlacement::Append,
        (false, true) => GopathPlacement::Prepend,
        (false, false) => file.gopath_placement.unwrap_or_default(),
    };

    let path_setting = |key: &str, fallback: Option<String>| {
        non_empty(vars, key)
            .map(str::to_string)
            .or(fallback)
            .map(|value| expand_with_home(&value, home))
    };

    Settings {
        disable_goroot: flag(vars, DISABLE_GOROOT_VAR)
            .or(file.disable_goroot)
            .unwrap_or(false),
        disable_gopath: flag(vars, DISABLE_GOPATH_VAR)
            .or(file.disable_gopath)
            .unwrap_or(false),
        disable_gocache: flag(vars, DISABLE_GOCACHE_VAR)
            .or(file.disable_gocache)
            .unwrap_or(false),
        disable_gomodcache: flag(vars, DISABLE_GOMODCACHE_VAR)
            .or(file.disable_gomodcache)
            .unwrap_or(false),
        gopath_prefix: path_setting(GOPATH_PREFIX_VAR, file.gopath_prefix),
        gocache_dir: path_setting(GOCACHE_DIR_VAR, file.gocache_dir),
        auto_rehash: match flag(vars, NO_AUTO_REHASH_VAR) {
            Some(disabled) => !disabled,
            None => file.auto_rehash.unwrap_or(true),
        },
        gopath_placement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_with(temp: &TempDir, extra: &[(&str, &str)]) -> Config {
        let mut env = vars(&[("HOME", temp.path().to_str().unwrap())]);
        env.extend(vars(extra));
        Config::from_vars(env, temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_default_root_under_home() {
        let temp = TempDir::new().unwrap();
        let config = config_with(&temp, &[]);

        assert_eq!(config.path(RootPath::Root), temp.path().join(".goenv"));
        assert_eq!(
            config.path(RootPath::Versions),
            temp.path().join(".goenv/versions")
        );
        assert_eq!(config.path(RootPath::Shims), temp.path().join(".goenv/shims"));
        assert_eq!(
            config.path(RootPath::SharedModCache),
            temp.path().join(".goenv/shared/go-mod")
        );
    }

    #[test]
    fn test_root_override_expands_tilde() {
        let temp = TempDir::new().unwrap();
        let config = config_with(&temp, &[(ROOT_VAR, "~/custom-root")]);

        assert_eq!(config.path(RootPath::Root), temp.path().join("custom-root"));
        assert_eq!(
            config.path(RootPath::GlobalVersionFile),
            temp.path().join("custom-root/version")
        );
    }

    #[test]
    fn test_host_bin_is_keyed_by_platform() {
        let temp = TempDir::new().unwrap();
        let config = config_with(&temp, &[]);
        let host_bin = config.path(RootPath::HostBin);

        let expected = format!("{}-{}", platform::goos(), platform::goarch());
        assert!(host_bin.to_string_lossy().contains(&expected));
        assert!(host_bin.ends_with("gopath/bin"));
    }

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("0", false)]
    #[case("false", false)]
    fn test_disable_switches(#[case] value: &str, #[case] expected: bool) {
        let temp = TempDir::new().unwrap();
        let config = config_with(
            &temp,
            &[
                (DISABLE_GOROOT_VAR, value),
                (DISABLE_GOPATH_VAR, value),
                (DISABLE_GOCACHE_VAR, value),
                (DISABLE_GOMODCACHE_VAR, value),
            ],
        );

        let settings = config.settings();
        assert_eq!(settings.disable_goroot, expected);
        assert_eq!(settings.disable_gopath, expected);
        assert_eq!(settings.disable_gocache, expected);
        assert_eq!(settings.disable_gomodcache, expected);
    }

    #[test]
    fn test_gopath_prefix_and_placement() {
        let temp = TempDir::new().unwrap();
        let config = config_with(
            &temp,
            &[(GOPATH_PREFIX_VAR, "/opt/gopaths"), (PREPEND_GOPATH_VAR, "1")],
        );

        assert_eq!(config.gopath_for("1.22.1"), PathBuf::from("/opt/gopaths/1.22.1"));
        assert_eq!(config.settings().gopath_placement, GopathPlacement::Prepend);
    }

    #[test]
    fn test_conflicting_placement_keeps_default() {
        let temp = TempDir::new().unwrap();
        let config = config_with(
            &temp,
            &[(APPEND_GOPATH_VAR, "1"), (PREPEND_GOPATH_VAR, "1")],
        );

        assert_eq!(config.settings().gopath_placement, GopathPlacement::Append);
        assert_eq!(config.gopath_for("1.21.0"), temp.path().join("go/1.21.0"));
    }

    #[test]
    fn test_config_file_supplies_defaults() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".goenv");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join(CONFIG_FILE),
            "disable_gocache = true\nauto_rehash = false\ngopath_placement = \"prepend\"\n",
        )
        .unwrap();

        let config = config_with(&temp, &[]);
        assert!(config.settings().disable_gocache);
        assert!(!config.settings().auto_rehash);
        assert_eq!(config.settings().gopath_placement, GopathPlacement::Prepend);
    }

    #[test]
    fn test_environment_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".goenv");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(CONFIG_FILE), "disable_gocache = true\n").unwrap();

        let config = config_with(&temp, &[(DISABLE_GOCACHE_VAR, "0")]);
        assert!(!config.settings().disable_gocache);
    }

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".goenv");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(CONFIG_FILE), "disable_gocache = \"maybe\"\n").unwrap();

        let env = vars(&[("HOME", temp.path().to_str().unwrap())]);
        let err = Config::from_vars(env, temp.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_auto_rehash_switch() {
        let temp = TempDir::new().unwrap();
        assert!(config_with(&temp, &[]).settings().auto_rehash);
        assert!(!config_with(&temp, &[(NO_AUTO_REHASH_VAR, "1")]).settings().auto_rehash);
    }

    #[test]
    fn test_dir_override_is_relative_to_current_dir() {
        let temp = TempDir::new().unwrap();
        let config = config_with(&temp, &[(DIR_VAR, "project")]);

        assert_eq!(config.dir_override(), Some(temp.path().join("project")));
        assert_eq!(config_with(&temp, &[(DIR_VAR, "")]).dir_override(), None);
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() {
        let temp = TempDir::new().unwrap();
        let previous = env::var_os(ROOT_VAR);
        env::set_var(ROOT_VAR, temp.path().join("custom-root"));

        let config = Config::load().unwrap();
        assert_eq!(config.path(RootPath::Root), temp.path().join("custom-root"));
        assert_eq!(config.var(ROOT_VAR), temp.path().join("custom-root").to_str());

        match previous {
            Some(value) => env::set_var(ROOT_VAR, value),
            None => env::remove_var(ROOT_VAR),
        }
    }
}
