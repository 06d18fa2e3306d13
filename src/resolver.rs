use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, RootPath, VERSION_VAR};
use crate::version::{Inventory, SYSTEM};
use crate::version_file::{
    self, read_go_mod, read_version_file, GO_MOD_FILE, TOOL_VERSIONS_FILE, VERSION_FILE,
};

/// Why a version is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    EnvironmentVariable,
    LocalFile(PathBuf),
    GlobalFile(PathBuf),
    GoModDirective(PathBuf),
    /// Named directly as a command argument
    CommandLine,
    Default,
}

impl VersionSource {
    /// Global and default selections may also run host-wide tools
    pub fn is_global(&self) -> bool {
        matches!(self, VersionSource::GlobalFile(_) | VersionSource::Default)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            VersionSource::LocalFile(path)
            | VersionSource::GlobalFile(path)
            | VersionSource::GoModDirective(path) => Some(path),
            VersionSource::EnvironmentVariable
            | VersionSource::CommandLine
            | VersionSource::Default => None,
        }
    }
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSource::EnvironmentVariable => write!(f, "{VERSION_VAR} environment variable"),
            VersionSource::LocalFile(path)
            | VersionSource::GlobalFile(path)
            | VersionSource::GoModDirective(path) => write!(f, "{}", path.display()),
            VersionSource::CommandLine => f.write_str("command line"),
            VersionSource::Default => f.write_str("default"),
        }
    }
}

/// The active version spec and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Colon-separated spec list exactly as configured
    pub version: String,
    pub source: VersionSource,
}

impl ResolvedVersion {
    pub fn new(version: impl Into<String>, source: VersionSource) -> Self {
        Self {
            version: version.into(),
            source,
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &str> {
        self.version
            .split(':')
            .map(str::trim)
            .filter(|spec| !spec.is_empty())
    }
}

/// Walks the precedence chain: GOENV_VERSION, directory files, global file, default
pub struct Resolver<'a> {
    config: &'a Config,
    inventory: &'a Inventory,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config, inventory: &'a Inventory) -> Self {
        Self { config, inventory }
    }

    pub fn resolve(&self) -> ResolvedVersion {
        self.from_environment()
            .or_else(|| self.from_directories())
            .or_else(|| self.from_global_file())
            .unwrap_or_else(|| self.default_version())
    }

    fn from_environment(&self) -> Option<ResolvedVersion> {
        let raw = self.config.var(VERSION_VAR)?;
        let origin = Path::new(VERSION_VAR);
        let entries = version_file::valid_entries(
            raw.split(':').map(str::trim).filter(|s| !s.is_empty()),
            origin,
        );
        if entries.is_empty() {
            return None;
        }
        Some(ResolvedVersion::new(
            entries.join(":"),
            VersionSource::EnvironmentVariable,
        ))
    }

    /// Local files, honoring GOENV_DIR unless the working directory pins its own version
    pub fn from_directories(&self) -> Option<ResolvedVersion> {
        let current_dir = self.config.current_dir();

        if let Some(dir_override) = self.config.dir_override() {
            if dir_override != current_dir {
                let own_file = current_dir.join(VERSION_FILE);
                if let Some(version) = read_version_file(&own_file) {
                    return Some(ResolvedVersion::new(
                        version,
                        VersionSource::LocalFile(own_file),
                    ));
                }
                if let Some(found) = self.search_upward(&dir_override) {
                    return Some(found);
                }
            }
        }

        self.search_upward(current_dir)
    }

    fn search_upward(&self, start: &Path) -> Option<ResolvedVersion> {
        for dir in start.ancestors() {
            match self.probe_directory(dir) {
                Probe::Found(resolved) => return Some(resolved),
                Probe::Stop => return None,
                Probe::Continue => continue,
            }
        }
        None
    }

    fn probe_directory(&self, dir: &Path) -> Probe {
        let version_path = dir.join(VERSION_FILE);
        let tool_versions_path = dir.join(TOOL_VERSIONS_FILE);
        let go_mod_path = dir.join(GO_MOD_FILE);

        if let Some(version) = read_version_file(&version_path) {
            return Probe::Found(ResolvedVersion::new(
                version,
                VersionSource::LocalFile(version_path),
            ));
        }
        if let Some(version) = read_version_file(&tool_versions_path) {
            return Probe::Found(ResolvedVersion::new(
                version,
                VersionSource::LocalFile(tool_versions_path),
            ));
        }

        match read_go_mod(&go_mod_path) {
            Ok(Some(version)) => Probe::Found(ResolvedVersion::new(
                version,
                VersionSource::GoModDirective(go_mod_path),
            )),
            Ok(None) if version_path.exists() => Probe::Stop,
            Ok(None) => Probe::Continue,
            Err(err) => {
                tracing::warn!("{}", err);
                Probe::Stop
            }
        }
    }

    pub fn from_global_file(&self) -> Option<ResolvedVersion> {
        let primary = self.config.path(RootPath::GlobalVersionFile);
        std::iter::once(primary)
            .chain(self.config.legacy_global_files())
            .find_map(|path| {
                read_version_file(&path)
                    .map(|version| ResolvedVersion::new(version, VersionSource::GlobalFile(path)))
            })
    }

    fn default_version(&self) -> ResolvedVersion {
        let version = self.inventory.latest().unwrap_or(SYSTEM);
        ResolvedVersion::new(version, VersionSource::Default)
    }
}

enum Probe {
    Found(ResolvedVersion),
    /// A version file lives here but yielded nothing usable
    Stop,
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DIR_VAR;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
            }
        }

        fn root(&self) -> PathBuf {
            self.temp.path().join("root")
        }

        fn dir(&self, relative: &str) -> PathBuf {
            let dir = self.temp.path().join(relative);
            fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn write(&self, relative: &str, contents: &str) {
            let path = self.temp.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn config(&self, cwd: &Path, extra: &[(&str, &str)]) -> Config {
            let mut vars: BTreeMap<String, String> = BTreeMap::new();
            vars.insert("HOME".into(), self.temp.path().to_string_lossy().into_owned());
            vars.insert(
                "GOENV_ROOT".into(),
                self.root().to_string_lossy().into_owned(),
            );
            for (k, v) in extra {
                vars.insert(k.to_string(), v.to_string());
            }
            Config::from_vars(vars, cwd.to_path_buf()).unwrap()
        }
    }

    fn resolve(config: &Config) -> ResolvedVersion {
        let inventory = Inventory::default();
        Resolver::new(config, &inventory).resolve()
    }

    #[test]
    fn test_environment_variable_wins() {
        let fx = Fixture::new();
        fx.write("project/.go-version", "1.20.0\n");
        let cwd = fx.dir("project");
        let config = fx.config(&cwd, &[(VERSION_VAR, "1.22.1")]);

        let resolved = resolve(&config);
        assert_eq!(resolved.version, "1.22.1");
        assert_eq!(resolved.source, VersionSource::EnvironmentVariable);
    }

    #[test]
    fn test_environment_list_keeps_valid_entries() {
        let fx = Fixture::new();
        let cwd = fx.dir("project");
        let config = fx.config(&cwd, &[(VERSION_VAR, "1.1:../bad:1.11.1:1.2")]);

        let resolved = resolve(&config);
        assert_eq!(resolved.version, "1.1:1.11.1:1.2");
        assert_eq!(resolved.specs().collect::<Vec<_>>(), ["1.1", "1.11.1", "1.2"]);
    }

    #[test]
    fn test_local_file_found_in_parent() {
        let fx = Fixture::new();
        fx.write("project/.go-version", "1.21.5\n");
        let cwd = fx.dir("project/cmd/tool");
        let config = fx.config(&cwd, &[]);

        let resolved = resolve(&config);
        assert_eq!(resolved.version, "1.21.5");
        assert_eq!(
            resolved.source,
            VersionSource::LocalFile(fx.temp.path().join("project/.go-version"))
        );
    }

    #[test]
    fn test_version_file_beats_go_mod_in_same_directory() {
        let fx = Fixture::new();
        fx.write("project/.go-version", "1.21.5\n");
        fx.write("project/go.mod", "module m\ngo 1.22\n");
        let cwd = fx.dir("project");

        let resolved = resolve(&fx.config(&cwd, &[]));
        assert_eq!(resolved.version, "1.21.5");
    }

    #[test]
    fn test_nearest_go_mod_stops_the_walk() {
        let fx = Fixture::new();
        fx.write("project/.go-version", "1.20.0\n");
        fx.write("project/sub/go.mod", "module m\ngo 1.21\ntoolchain go1.22.3\n");
        let cwd = fx.dir("project/sub/pkg");

        let resolved = resolve(&fx.config(&cwd, &[]));
        assert_eq!(resolved.version, "1.22.3");
        assert_eq!(
            resolved.source,
            VersionSource::GoModDirective(fx.temp.path().join("project/sub/go.mod"))
        );
    }

    #[test]
    fn test_unparseable_go_mod_falls_through_to_global() {
        let fx = Fixture::new();
        fx.write("project/.go-version", "1.20.0\n");
        fx.write("project/sub/go.mod", "module m\n");
        fx.write("root/version", "1.19.2\n");
        let cwd = fx.dir("project/sub");

        let resolved = resolve(&fx.config(&cwd, &[]));
        assert_eq!(resolved.version, "1.19.2");
        assert!(matches!(resolved.source, VersionSource::GlobalFile(_)));
    }

    #[test]
    fn test_current_directory_file_beats_dir_override() {
        let fx = Fixture::new();
        fx.write("elsewhere/.go-version", "1.20.0\n");
        fx.write("project/.go-version", "1.2.3\n");
        let cwd = fx.dir("project");
        let elsewhere = fx.temp.path().join("elsewhere");
        let config = fx.config(&cwd, &[(DIR_VAR, elsewhere.to_str().unwrap())]);

        let resolved = resolve(&config);
        assert_eq!(resolved.version, "1.2.3");
        assert_eq!(
            resolved.source,
            VersionSource::LocalFile(cwd.join(".go-version"))
        );
    }

    #[test]
    fn test_dir_override_consulted_before_current_parents() {
        let fx = Fixture::new();
        fx.write("elsewhere/.go-version", "1.20.0\n");
        fx.write("project/.go-version", "1.2.3\n");
        let cwd = fx.dir("project/nested");
        let elsewhere = fx.temp.path().join("elsewhere");
        let config = fx.config(&cwd, &[(DIR_VAR, elsewhere.to_str().unwrap())]);

        assert_eq!(resolve(&config).version, "1.20.0");
    }

    #[test]
    fn test_global_file_supports_lists_and_legacy_names() {
        let fx = Fixture::new();
        let cwd = fx.dir("project");
        fx.write("root/global", "1.21.0\n1.22.0\n");

        let resolved = resolve(&fx.config(&cwd, &[]));
        assert_eq!(resolved.version, "1.21.0:1.22.0");
        assert_eq!(
            resolved.source,
            VersionSource::GlobalFile(fx.root().join("global"))
        );
        assert!(resolved.source.is_global());
    }

    #[test]
    fn test_default_prefers_latest_installed() {
        let fx = Fixture::new();
        let cwd = fx.dir("project");
        let config = fx.config(&cwd, &[]);

        let empty = Inventory::default();
        let resolved = Resolver::new(&config, &empty).resolve();
        assert_eq!(resolved, ResolvedVersion::new("system", VersionSource::Default));

        let installed = Inventory::from_versions(vec!["1.21.0".into(), "1.22.4".into()]);
        let resolved = Resolver::new(&config, &installed).resolve();
        assert_eq!(resolved, ResolvedVersion::new("1.22.4", VersionSource::Default));
    }

    #[test]
    fn test_source_display() {
        assert_eq!(
            VersionSource::EnvironmentVariable.to_string(),
            "GOENV_VERSION environment variable"
        );
        assert_eq!(
            VersionSource::GlobalFile(PathBuf::from("/r/version")).to_string(),
            "/r/version"
        );
        assert!(!VersionSource::LocalFile(PathBuf::from("x")).is_global());
    }
}
