//! Environment construction, binary lookup and launch for `goenv exec`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::cache::{self, BuildInfo, CacheKey, WriteOutcome};
use crate::compat;
use crate::config::{Config, GopathPlacement, RootPath};
use crate::error::{Error, Result};
use crate::hooks::{HookContext, HookPoint};
use crate::resolver::{ResolvedVersion, Resolver, VersionSource};
use crate::session::Session;
use crate::shims::{find_executable, ShimManager};
use crate::version::{Inventory, Matcher, SYSTEM};

/// Variables `goenv env` reports when the active version changes them
pub const MANAGED_VARS: [&str; 5] = ["GOROOT", "GOPATH", "GOCACHE", "GOMODCACHE", "PATH"];

/// The resolved version list, matched against what is installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVersions {
    pub resolved: ResolvedVersion,
    /// Concrete versions (or `system`) in list order
    pub versions: Vec<String>,
}

/// Everything needed to launch one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub version: String,
    pub binary: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// PATH with the shims directory removed, so a shim never finds itself
pub fn search_path_without_shims(config: &Config) -> Option<OsString> {
    let path = config.var("PATH")?;
    let shims = config.path(RootPath::Shims);
    let entries: Vec<PathBuf> = std::env::split_paths(path)
        .filter(|entry| !entry.as_os_str().is_empty() && *entry != shims)
        .collect();
    std::env::join_paths(entries).ok()
}

/// Command as found on PATH outside goenv's management
pub fn find_system_command(config: &Config, command: &str) -> Option<PathBuf> {
    let path = search_path_without_shims(config)?;
    which::which_in(command, Some(path), config.current_dir()).ok()
}

pub fn system_available(config: &Config) -> bool {
    find_system_command(config, "go").is_some()
}

/// Resolve the active version list and match every element against `inventory`
pub fn select(config: &Config, inventory: &Inventory) -> Result<ActiveVersions> {
    let resolved = Resolver::new(config, inventory).resolve();
    let matcher = Matcher::new(inventory, system_available(config));
    let specs: Vec<&str> = resolved.specs().collect();

    let versions = match specs.as_slice() {
        [SYSTEM] if resolved.source == VersionSource::Default => {
            if matcher.find(SYSTEM).is_none() {
                return Err(Error::NoVersionResolvable);
            }
            vec![SYSTEM.to_string()]
        }
        [spec] => vec![matcher.resolve(spec, &resolved.source)?],
        _ => matcher
            .match_list(specs.iter().copied())
            .into_result(&resolved.source)?,
    };

    tracing::debug!(
        versions = ?versions,
        source = %resolved.source,
        "selected versions"
    );
    Ok(ActiveVersions { resolved, versions })
}

/// Like [`select`], offering a missing version to the installer once
pub fn select_or_install(session: &Session, inventory: &mut Inventory) -> Result<ActiveVersions> {
    let config = session.config();
    match select(config, inventory) {
        Err(Error::VersionNotInstalled {
            version,
            origin,
            installed,
        }) => {
            let installed_now = session.installer().offer_install(&version).unwrap_or_else(|err| {
                tracing::warn!("install of {} failed: {:#}", version, err);
                false
            });
            if !installed_now {
                return Err(Error::VersionNotInstalled {
                    version,
                    origin,
                    installed,
                });
            }
            *inventory = Inventory::scan(config, session.platform());
            select(config, inventory)
        }
        other => other,
    }
}

/// GOPATH entries for `version`, managed entry included unless disabled
pub fn gopath_entries(config: &Config, version: &str, separator: char) -> Vec<PathBuf> {
    let settings = config.settings();
    let base = config.gopath_base();

    let existing = config
        .var("GOPATH")
        .map(|value| {
            value
                .split(separator)
                .filter(|entry| !entry.is_empty())
                .map(|entry| config.expand(entry))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if settings.disable_gopath {
        return existing;
    }

    let managed = config.gopath_for(version);
    let existing = existing
        .into_iter()
        .filter(|entry| entry.parent() != Some(base.as_path()) && *entry != managed);

    match settings.gopath_placement {
        GopathPlacement::Append => std::iter::once(managed.clone()).chain(existing).collect(),
        GopathPlacement::Prepend => existing.chain(std::iter::once(managed.clone())).collect(),
    }
}

/// Builds the launch environment for one version
pub struct EnvBuilder<'a> {
    session: &'a Session,
}

impl<'a> EnvBuilder<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn build(&self, version: &str) -> BTreeMap<String, String> {
        let config = self.session.config();
        let mut env = config.vars().clone();
        if version == SYSTEM {
            return env;
        }

        let settings = config.settings();
        let separator = self.session.platform().list_separator();
        let version_dir = config.version_dir(version);
        let bin = version_dir.join("bin");

        if !settings.disable_goroot {
            env.insert("GOROOT".into(), display(&version_dir));
        }
        prepend_path(&mut env, &bin, separator);

        if !settings.disable_gopath {
            let entries: Vec<String> = gopath_entries(config, version, separator)
                .iter()
                .map(|entry| display(entry))
                .collect();
            env.insert("GOPATH".into(), entries.join(&separator.to_string()));
        }

        if !settings.disable_gocache {
            let cache_dir = self.cache_dir(version, &bin, &env);
            if cache::cgo_enabled(&env) {
                record_build_info(&cache_dir, &env);
            }
            env.insert("GOCACHE".into(), display(&cache_dir));
        }

        if !settings.disable_gomodcache && config.var("GOMODCACHE").is_none() {
            env.insert(
                "GOMODCACHE".into(),
                display(&config.path(RootPath::SharedModCache)),
            );
        }

        env
    }

    fn cache_dir(&self, version: &str, bin: &Path, env: &BTreeMap<String, String>) -> PathBuf {
        let abi_defaults = match find_executable(bin, "go", self.session.platform()) {
            Some(go) => self
                .session
                .abi_defaults(&go, || cache::discover_abi_defaults(&go)),
            None => cache::builtin_abi_defaults(),
        };
        let key = CacheKey::from_env(env, &abi_defaults);
        cache::cache_dir(self.session.config(), version, &key)
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn prepend_path(env: &mut BTreeMap<String, String>, dir: &Path, separator: char) {
    let dir = display(dir);
    let path = match env.get("PATH").filter(|path| !path.is_empty()) {
        Some(existing) => format!("{dir}{separator}{existing}"),
        None => dir,
    };
    env.insert("PATH".into(), path);
}

fn record_build_info(cache_dir: &Path, env: &BTreeMap<String, String>) {
    match cache::write_build_info(cache_dir, &BuildInfo::from_env(env)) {
        Ok(WriteOutcome::Written) => tracing::debug!("wrote build info in {:?}", cache_dir),
        Ok(WriteOutcome::Skipped) => tracing::debug!("build info locked in {:?}", cache_dir),
        Err(err) => tracing::debug!("could not write build info in {:?}: {}", cache_dir, err),
    }
}

/// Binary `command` maps to under `version`.
///
/// Order: version bin, host bin (global selections only), then each GOPATH bin.
pub fn locate(
    session: &Session,
    version: &str,
    source: &VersionSource,
    command: &str,
) -> Option<PathBuf> {
    let config = session.config();
    if version == SYSTEM {
        return find_system_command(config, command);
    }

    let platform = session.platform();
    let mut dirs = vec![config.version_dir(version).join("bin")];
    if source.is_global() {
        dirs.push(config.path(RootPath::HostBin));
    }
    dirs.extend(
        gopath_entries(config, version, platform.list_separator())
            .into_iter()
            .map(|entry| entry.join("bin")),
    );

    dirs.iter()
        .find_map(|dir| find_executable(dir, command, platform))
}

/// Pick the first active version providing `command` and build its environment
pub fn prepare(session: &Session, active: &ActiveVersions, command: &str) -> Result<Prepared> {
    for version in &active.versions {
        if let Some(binary) = locate(session, version, &active.resolved.source, command) {
            let env = EnvBuilder::new(session).build(version);
            return Ok(Prepared {
                version: version.clone(),
                binary,
                env,
            });
        }
    }

    Err(Error::CommandNotFound {
        command: command.to_string(),
        version: active.versions.join(":"),
    })
}

/// Run the prepared command with inherited stdio and return its exit code
pub fn launch(prepared: &Prepared, args: &[String]) -> Result<i32> {
    tracing::debug!(binary = ?prepared.binary, ?args, "launching");
    let status = Command::new(&prepared.binary)
        .args(args)
        .env_clear()
        .envs(&prepared.env)
        .status()
        .map_err(|err| Error::io(format!("Failed to execute {:?}", prepared.binary), err))?;
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// True for `go install ...` style invocations
pub fn wants_auto_rehash(command: &str, args: &[String]) -> bool {
    let name = Path::new(command)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(command);
    name == "go"
        && args
            .iter()
            .find(|arg| !arg.starts_with('-'))
            .is_some_and(|arg| arg == "install")
}

fn auto_rehash(session: &Session) {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    match ShimManager::new(config, session.platform()).try_rehash(&inventory) {
        Ok(Some(count)) => tracing::debug!("auto-rehash wrote {} shims", count),
        Ok(None) => tracing::debug!("auto-rehash skipped, another rehash is running"),
        Err(err) => tracing::debug!("auto-rehash failed: {}", err),
    }
}

/// Resolve, check and launch `command`, returning the child's exit code
pub fn run(session: &Session, command: &str, args: &[String]) -> Result<i32> {
    let config = session.config();
    let mut inventory = Inventory::scan(config, session.platform());
    let active = select_or_install(session, &mut inventory)?;
    let prepared = prepare(session, &active, command)?;

    compat::preflight(session, command, &prepared.binary)?;

    let context = HookContext {
        version: &prepared.version,
        command,
    };
    if let Err(err) = session.hooks().dispatch(HookPoint::PreExec, &context) {
        tracing::warn!("pre-exec hook failed: {:#}", err);
    }

    let code = launch(&prepared, args)?;

    if let Err(err) = session.hooks().dispatch(HookPoint::PostExec, &context) {
        tracing::warn!("post-exec hook failed: {:#}", err);
    }

    if code == 0 && config.settings().auto_rehash && wants_auto_rehash(command, args) {
        auto_rehash(session);
    }

    Ok(code)
}
