use fs2::FileExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, RootPath};
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::version::Inventory;

/// Generates and inspects the shims directory
pub struct ShimManager<'a> {
    config: &'a Config,
    platform: &'a dyn Platform,
}

impl<'a> ShimManager<'a> {
    pub fn new(config: &'a Config, platform: &'a dyn Platform) -> Self {
        Self { config, platform }
    }

    pub fn shims_dir(&self) -> PathBuf {
        self.config.path(RootPath::Shims)
    }

    /// Directories whose executables get shims for `version`
    pub fn binary_dirs(&self, version: &str) -> Vec<PathBuf> {
        let mut dirs = vec![self.config.version_dir(version).join("bin")];
        if !self.config.settings().disable_gopath {
            dirs.push(self.config.gopath_for(version).join("bin"));
        }
        dirs
    }

    /// Every command name provided by an installed version, deduplicated
    pub fn collect_commands(&self, inventory: &Inventory) -> BTreeSet<String> {
        inventory
            .versions()
            .iter()
            .flat_map(|version| self.binary_dirs(version))
            .flat_map(|dir| executables_in(&dir, self.platform))
            .map(|(command, _)| command)
            .collect()
    }

    /// Regenerate shims, waiting for any concurrent rehash to finish
    pub fn rehash(&self, inventory: &Inventory) -> Result<usize> {
        let lock = self.open_lock()?;
        lock.lock_exclusive().map_err(|err| {
            Error::io(format!("Failed to lock {:?}", self.lock_path()), err)
        })?;
        let count = self.rehash_locked(inventory);
        let _ = FileExt::unlock(&lock);
        count
    }

    /// Regenerate shims unless another process is already doing it
    pub fn try_rehash(&self, inventory: &Inventory) -> Result<Option<usize>> {
        let lock = self.open_lock()?;
        match lock.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                tracing::debug!("rehash already in progress; skipping");
                return Ok(None);
            }
            Err(err) => {
                return Err(Error::io(format!("Failed to lock {:?}", self.lock_path()), err))
            }
        }
        let count = self.rehash_locked(inventory);
        let _ = FileExt::unlock(&lock);
        count.map(Some)
    }

    fn lock_path(&self) -> PathBuf {
        self.config.path(RootPath::RehashLock)
    }

    fn open_lock(&self) -> Result<File> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.unwritable(err))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| Error::io(format!("Failed to open {:?}", path), err))
    }

    fn unwritable(&self, source: io::Error) -> Error {
        Error::ShimDirectoryUnwritable {
            dir: self.shims_dir(),
            source,
        }
    }

    fn rehash_locked(&self, inventory: &Inventory) -> Result<usize> {
        let shims_dir = self.shims_dir();
        fs::create_dir_all(&shims_dir).map_err(|err| self.unwritable(err))?;

        let desired: BTreeMap<String, String> = self
            .collect_commands(inventory)
            .into_iter()
            .map(|command| {
                (
                    self.platform.shim_file_name(&command),
                    self.platform.shim_script(&command),
                )
            })
            .collect();

        let mut present = BTreeSet::new();
        let entries = fs::read_dir(&shims_dir).map_err(|err| self.unwritable(err))?;
        for entry in entries {
            let entry = entry.map_err(|err| self.unwritable(err))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            match desired.get(&name) {
                Some(script) => {
                    if fs::read_to_string(&path).ok().as_deref() != Some(script.as_str()) {
                        self.write_shim(&path, script)?;
                    }
                    present.insert(name);
                }
                None if path.is_dir() => {
                    tracing::warn!("leaving unexpected directory {:?} in shims", path);
                }
                None => {
                    tracing::debug!("removing stale shim {:?}", path);
                    fs::remove_file(&path).map_err(|err| self.unwritable(err))?;
                }
            }
        }

        for (name, script) in &desired {
            if !present.contains(name) {
                self.write_shim(&shims_dir.join(name), script)?;
            }
        }

        tracing::debug!("rehashed {} shims in {:?}", desired.len(), shims_dir);
        Ok(desired.len())
    }

    fn write_shim(&self, path: &Path, script: &str) -> Result<()> {
        fs::write(path, script).map_err(|err| self.unwritable(err))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))
                .map_err(|err| self.unwritable(err))?;
        }

        Ok(())
    }

    /// Current shims as (command, path), sorted by command
    pub fn list(&self) -> Result<Vec<(String, PathBuf)>> {
        let shims_dir = self.shims_dir();
        if !shims_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&shims_dir)
            .map_err(|err| Error::io(format!("Failed to read {:?}", shims_dir), err))?;
        let mut shims: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let command = self.platform.shim_command(&name)?;
                Some((command, entry.path()))
            })
            .collect();
        shims.sort();
        Ok(shims)
    }

    /// Installed versions providing `command`, with the matching binary
    pub fn whence(&self, inventory: &Inventory, command: &str) -> Vec<(String, PathBuf)> {
        inventory
            .versions()
            .iter()
            .filter_map(|version| {
                self.binary_dirs(version)
                    .iter()
                    .find_map(|dir| find_executable(dir, command, self.platform))
                    .map(|path| (version.clone(), path))
            })
            .collect()
    }
}

/// Executable files directly inside `dir`; a missing directory yields nothing
pub fn executables_in(dir: &Path, platform: &dyn Platform) -> Vec<(String, PathBuf)> {
    if !dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("skipping unreadable entry in {:?}: {}", dir, err);
                None
            }
        })
        .filter(|entry| platform.is_executable(entry.path()))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            let command = platform.command_name(name)?;
            Some((command, entry.path().to_path_buf()))
        })
        .collect()
}

/// First executable named `command` in `dir`
pub fn find_executable(dir: &Path, command: &str, platform: &dyn Platform) -> Option<PathBuf> {
    platform
        .executable_candidates(command)
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| platform.is_executable(path))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::DISABLE_GOPATH_VAR;
    use crate::platform::Unix;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn config(temp: &TempDir, extra: &[(&str, &str)]) -> Config {
        let mut vars: BTreeMap<String, String> = BTreeMap::new();
        vars.insert("HOME".into(), temp.path().to_string_lossy().into_owned());
        vars.insert(
            "GOENV_ROOT".into(),
            temp.path().join("root").to_string_lossy().into_owned(),
        );
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Config::from_vars(vars, temp.path().to_path_buf()).unwrap()
    }

    fn install_tool(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho tool\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn install_version(config: &Config, version: &str, tools: &[&str]) {
        let bin = config.version_dir(version).join("bin");
        for tool in tools {
            install_tool(&bin, tool);
        }
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| {
                (
                    e.file_name().to_string_lossy().into_owned(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_one_shim_per_unique_command() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.21.0", &["go", "gofmt"]);
        install_version(&config, "1.22.0", &["go", "gofmt"]);
        install_tool(&config.gopath_for("1.22.0").join("bin"), "gopls");

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        assert_eq!(manager.rehash(&inventory).unwrap(), 3);

        let names: Vec<String> = snapshot(&manager.shims_dir()).into_keys().collect();
        assert_eq!(names, ["go", "gofmt", "gopls"]);
    }

    #[test]
    fn test_rehash_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go", "gofmt"]);

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        manager.rehash(&inventory).unwrap();
        let first = snapshot(&manager.shims_dir());
        for _ in 0..3 {
            manager.rehash(&inventory).unwrap();
            assert_eq!(snapshot(&manager.shims_dir()), first);
        }
    }

    #[test]
    fn test_removed_binaries_lose_their_shims() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go", "gofmt", "vet-helper"]);

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        assert_eq!(manager.rehash(&inventory).unwrap(), 3);

        fs::remove_file(config.version_dir("1.22.0").join("bin/vet-helper")).unwrap();
        fs::write(manager.shims_dir().join("leftover"), "junk").unwrap();
        assert_eq!(manager.rehash(&inventory).unwrap(), 2);

        let names: Vec<String> = snapshot(&manager.shims_dir()).into_keys().collect();
        assert_eq!(names, ["go", "gofmt"]);
    }

    #[test]
    fn test_stale_shim_content_is_rewritten() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go"]);

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        manager.rehash(&inventory).unwrap();
        fs::write(manager.shims_dir().join("go"), "old shim").unwrap();
        manager.rehash(&inventory).unwrap();

        let contents = fs::read_to_string(manager.shims_dir().join("go")).unwrap();
        assert_eq!(contents, Unix.shim_script("go"));
        let mode = fs::metadata(manager.shims_dir().join("go"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_disabled_gopath_skips_tool_directory() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[(DISABLE_GOPATH_VAR, "1")]);
        install_version(&config, "1.22.0", &["go"]);
        install_tool(&config.gopath_for("1.22.0").join("bin"), "gopls");

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        assert_eq!(
            manager.collect_commands(&inventory).into_iter().collect::<Vec<_>>(),
            ["go"]
        );
    }

    #[test]
    fn test_non_executables_are_ignored() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go"]);
        fs::write(config.version_dir("1.22.0").join("bin/README"), "docs").unwrap();

        let inventory = Inventory::scan(&config, &Unix);
        let commands = ShimManager::new(&config, &Unix).collect_commands(&inventory);
        assert!(!commands.contains("README"));
    }

    #[test]
    fn test_unwritable_shims_directory_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go"]);
        fs::write(config.path(RootPath::Shims), "not a directory").unwrap();

        let inventory = Inventory::scan(&config, &Unix);
        let err = ShimManager::new(&config, &Unix)
            .rehash(&inventory)
            .unwrap_err();
        assert!(matches!(err, Error::ShimDirectoryUnwritable { .. }));
        assert!(err.to_string().contains("shims"));
    }

    #[test]
    fn test_try_rehash_runs_when_uncontended() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.22.0", &["go", "gofmt"]);

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        assert_eq!(manager.try_rehash(&inventory).unwrap(), Some(2));
    }

    #[test]
    fn test_list_and_whence() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, &[]);
        install_version(&config, "1.21.0", &["go"]);
        install_version(&config, "1.22.0", &["go", "gofmt"]);

        let inventory = Inventory::scan(&config, &Unix);
        let manager = ShimManager::new(&config, &Unix);
        assert!(manager.list().unwrap().is_empty());
        manager.rehash(&inventory).unwrap();

        let listed: Vec<String> = manager.list().unwrap().into_iter().map(|(c, _)| c).collect();
        assert_eq!(listed, ["go", "gofmt"]);

        let versions: Vec<String> = manager
            .whence(&inventory, "gofmt")
            .into_iter()
            .map(|(v, _)| v)
            .collect();
        assert_eq!(versions, ["1.22.0"]);
        assert_eq!(manager.whence(&inventory, "go").len(), 2);
    }
}
