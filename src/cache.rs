use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::platform;

/// ABI-affecting variables with the toolchain's usual defaults
pub const ABI_DEFAULTS: [(&str, &str); 8] = [
    ("GOAMD64", "v1"),
    ("GOARM", "7"),
    ("GO386", "sse2"),
    ("GOMIPS", "hardfloat"),
    ("GOMIPS64", "hardfloat"),
    ("GOPPC64", "power8"),
    ("GORISCV64", "rva20u64"),
    ("GOWASM", ""),
];

const BUILD_INFO_FILE: &str = "build.info";
const LOCK_FILE: &str = ".goenv-cache.lock";
const TMP_DIR: &str = ".tmp";

/// Variables describing the native (cgo) toolchain, hashed in this order
const CGO_VARS: [&str; 13] = [
    "CC",
    "CXX",
    "CFLAGS",
    "CXXFLAGS",
    "LDFLAGS",
    "PKG_CONFIG",
    "PKG_CONFIG_PATH",
    "PKG_CONFIG_LIBDIR",
    "CGO_CFLAGS",
    "CGO_CXXFLAGS",
    "CGO_LDFLAGS",
    "AR",
    "SYSROOT",
];

pub fn abi_relevant(var: &str, goarch: &str) -> bool {
    match var {
        "GOAMD64" => goarch == "amd64",
        "GOARM" => goarch == "arm",
        "GO386" => goarch == "386",
        "GOMIPS" => matches!(goarch, "mips" | "mipsle"),
        "GOMIPS64" => matches!(goarch, "mips64" | "mips64le"),
        "GOPPC64" => matches!(goarch, "ppc64" | "ppc64le"),
        "GORISCV64" => goarch == "riscv64",
        "GOWASM" => goarch == "wasm",
        _ => false,
    }
}

fn sanitize(value: &str) -> String {
    value.replace([',', ' ', '/'], "-")
}

fn non_empty<'a>(env: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Identifies one build-cache partition of an installed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub os: String,
    pub arch: String,
    pub abi: String,
}

impl CacheKey {
    /// Derive the key from the launch environment.
    ///
    /// OS and arch read "host" unless GOOS/GOARCH request a cross build, so host
    /// and cross artifacts never share a directory.
    pub fn from_env(env: &BTreeMap<String, String>, abi_defaults: &HashMap<String, String>) -> Self {
        let os = non_empty(env, "GOOS").unwrap_or("host").to_string();
        let arch = non_empty(env, "GOARCH").unwrap_or("host").to_string();
        let target_arch = non_empty(env, "GOARCH").unwrap_or(platform::goarch());

        let abi = ABI_DEFAULTS
            .iter()
            .filter(|(var, _)| abi_relevant(var, target_arch))
            .filter_map(|(var, fallback)| {
                let value = non_empty(env, var)?;
                let default = abi_defaults.get(*var).map(String::as_str).unwrap_or(*fallback);
                (value != default).then(|| format!("-{}", sanitize(value)))
            })
            .collect();

        Self { os, arch, abi }
    }

    pub fn dir_name(&self) -> String {
        format!("go-build-{}-{}{}", self.os, self.arch, self.abi)
    }
}

/// Build-cache directory for `version` under the configured cache root
pub fn cache_dir(config: &Config, version: &str, key: &CacheKey) -> PathBuf {
    match &config.settings().gocache_dir {
        Some(root) => root.join(version).join(key.dir_name()),
        None => config.version_dir(version).join(key.dir_name()),
    }
}

/// ABI defaults assumed when the toolchain cannot be asked
pub fn builtin_abi_defaults() -> HashMap<String, String> {
    ABI_DEFAULTS
        .iter()
        .map(|(var, value)| (var.to_string(), value.to_string()))
        .collect()
}

/// Ask the toolchain for its ABI defaults, ignoring any overrides in our own environment
pub fn discover_abi_defaults(go_binary: &Path) -> HashMap<String, String> {
    let mut fallback = builtin_abi_defaults();

    let mut command = Command::new(go_binary);
    command.args(["env", "-json"]);
    for (var, _) in ABI_DEFAULTS {
        command.env_remove(var);
    }

    let reported: HashMap<String, String> = match command.output() {
        Ok(output) if output.status.success() => {
            match serde_json::from_slice(&output.stdout) {
                Ok(reported) => reported,
                Err(err) => {
                    tracing::debug!("unexpected `go env -json` output from {:?}: {}", go_binary, err);
                    return fallback;
                }
            }
        }
        Ok(output) => {
            tracing::debug!("`go env -json` exited with {}", output.status);
            return fallback;
        }
        Err(err) => {
            tracing::debug!("failed to run {:?}: {}", go_binary, err);
            return fallback;
        }
    };

    for (var, _) in ABI_DEFAULTS {
        if let Some(value) = reported.get(var) {
            fallback.insert(var.to_string(), value.clone());
        }
    }
    fallback
}

pub fn cgo_enabled(env: &BTreeMap<String, String>) -> bool {
    env.get("CGO_ENABLED").map(String::as_str) != Some("0")
}

/// Native toolchain configuration recorded next to a build cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cxx: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cflags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cxxflags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ldflags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pkg_config: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sysroot: String,
    pub toolchain_hash: String,
}

impl BuildInfo {
    pub fn from_env(env: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).cloned().unwrap_or_default();
        Self {
            created: Utc::now(),
            cc: get("CC"),
            cxx: get("CXX"),
            cflags: get("CFLAGS"),
            cxxflags: get("CXXFLAGS"),
            ldflags: get("LDFLAGS"),
            pkg_config: get("PKG_CONFIG"),
            sysroot: get("SYSROOT"),
            toolchain_hash: toolchain_hash(env),
        }
    }
}

/// SHA-256 over the cgo toolchain variables that are set; empty when none are
pub fn toolchain_hash(env: &BTreeMap<String, String>) -> String {
    let components: Vec<String> = CGO_VARS
        .iter()
        .filter_map(|key| non_empty(env, key).map(|value| format!("{key}={value}\n")))
        .collect();
    if components.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    for component in &components {
        hasher.update(component.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Result of a best-effort diagnostic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Another process holds the cache lock
    Skipped,
}

/// Write build.info into `cache_dir` under a non-blocking advisory lock.
///
/// Readers never observe a partial file: content goes to `.tmp` first and is
/// renamed into place.
pub fn write_build_info(cache_dir: &Path, info: &BuildInfo) -> io::Result<WriteOutcome> {
    fs::create_dir_all(cache_dir)?;

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(cache_dir.join(LOCK_FILE))?;
    match lock.try_lock_exclusive() {
        Ok(()) => {}
        Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
            return Ok(WriteOutcome::Skipped)
        }
        Err(err) => return Err(err),
    }

    let result = write_atomically(cache_dir, info);
    let _ = FileExt::unlock(&lock);
    result.map(|()| WriteOutcome::Written)
}

fn write_atomically(cache_dir: &Path, info: &BuildInfo) -> io::Result<()> {
    let tmp_dir = cache_dir.join(TMP_DIR);
    fs::create_dir_all(&tmp_dir)?;

    let data = serde_json::to_vec_pretty(info).map_err(io::Error::other)?;
    let tmp_path = tmp_dir.join(format!("{BUILD_INFO_FILE}.{}.tmp", std::process::id()));
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, cache_dir.join(BUILD_INFO_FILE))
}
