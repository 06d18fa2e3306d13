//! Native probing of the machine goenv runs on.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use super::binary::{highest_glibc_version, OsVersion};
use crate::config::Config;
use crate::platform;

const GLIBC_CANDIDATES: [&str; 8] = [
    "/lib/x86_64-linux-gnu/libc.so.6",
    "/lib/aarch64-linux-gnu/libc.so.6",
    "/lib/arm-linux-gnueabihf/libc.so.6",
    "/lib/i386-linux-gnu/libc.so.6",
    "/lib64/libc.so.6",
    "/usr/lib64/libc.so.6",
    "/lib/libc.so.6",
    "/usr/lib/libc.so.6",
];

const MACOS_VERSION_PLIST: &str = "/System/Library/CoreServices/SystemVersion.plist";
const ROSETTA_RUNTIME: &str = "/Library/Apple/usr/libexec/oah";

/// C library flavour of a Linux host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    Glibc(Option<(u32, u32)>),
    Musl,
}

/// C compilers that cgo can drive on Windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CCompiler {
    Msvc,
    MinGw,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowsHost {
    /// PROCESSOR_ARCHITECTURE as seen by this process
    pub process_arch: Option<String>,
    /// PROCESSOR_ARCHITEW6432, set when a 32-bit or emulated process runs on a wider machine
    pub machine_arch: Option<String>,
    pub arm64ec: bool,
    pub compilers: Vec<CCompiler>,
    pub vc_runtime: bool,
}

/// Facts about the host consulted by the compatibility checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// GOOS of the host
    pub os: String,
    /// GOARCH goenv itself was built for
    pub arch: String,
    pub is_64: bool,
    pub kernel: Option<OsVersion>,
    pub libc: Option<Libc>,
    pub macos: Option<OsVersion>,
    pub wsl: bool,
    pub rosetta: bool,
    pub windows: WindowsHost,
}

impl HostInfo {
    /// A host description with nothing probed, for the given GOOS/GOARCH
    pub fn bare(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            is_64: !matches!(arch, "386" | "arm" | "mips" | "mipsle" | "wasm"),
            kernel: None,
            libc: None,
            macos: None,
            wsl: false,
            rosetta: false,
            windows: WindowsHost::default(),
        }
    }

    pub fn probe(config: &Config) -> Self {
        let mut host = Self::bare(platform::goos(), platform::goarch());
        host.is_64 = cfg!(target_pointer_width = "64");

        match host.os.as_str() {
            "linux" => {
                host.kernel = fs::read_to_string("/proc/sys/kernel/osrelease")
                    .ok()
                    .and_then(|release| OsVersion::parse(&release));
                host.libc = probe_libc();
                host.wsl = probe_wsl();
            }
            "darwin" => {
                host.macos = fs::read_to_string(MACOS_VERSION_PLIST)
                    .ok()
                    .and_then(|plist| product_version(&plist));
                host.rosetta = Path::new(ROSETTA_RUNTIME).exists();
            }
            "windows" => host.windows = probe_windows(config),
            _ => {}
        }

        tracing::debug!(?host, "probed host");
        host
    }
}

fn probe_libc() -> Option<Libc> {
    let has_musl_loader = fs::read_dir("/lib")
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .any(|entry| entry.file_name().to_string_lossy().starts_with("ld-musl-"))
        })
        .unwrap_or(false);
    if has_musl_loader {
        return Some(Libc::Musl);
    }

    let libc = GLIBC_CANDIDATES
        .iter()
        .map(|candidate| Path::new(*candidate))
        .find(|path| path.exists())?;
    let version = fs::read(libc)
        .ok()
        .and_then(|bytes| highest_glibc_version(&bytes));
    Some(Libc::Glibc(version))
}

fn probe_wsl() -> bool {
    fs::read_to_string("/proc/version")
        .map(|version| is_wsl_kernel(&version))
        .unwrap_or(false)
}

pub fn is_wsl_kernel(proc_version: &str) -> bool {
    let lower = proc_version.to_lowercase();
    lower.contains("microsoft") || lower.contains("wsl")
}

/// ProductVersion from SystemVersion.plist
pub fn product_version(plist: &str) -> Option<OsVersion> {
    let pattern = Regex::new(r"<key>ProductVersion</key>\s*<string>([^<]+)</string>").ok()?;
    let captures = pattern.captures(plist)?;
    OsVersion::parse(&captures[1])
}

fn probe_windows(config: &Config) -> WindowsHost {
    let system_root = config
        .var("SystemRoot")
        .or_else(|| config.var("SYSTEMROOT"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));

    let mut compilers = Vec::new();
    if which::which("cl").is_ok() {
        compilers.push(CCompiler::Msvc);
    }
    if which::which("gcc").is_ok() {
        compilers.push(CCompiler::MinGw);
    }

    WindowsHost {
        process_arch: config.var("PROCESSOR_ARCHITECTURE").map(str::to_uppercase),
        machine_arch: config.var("PROCESSOR_ARCHITEW6432").map(str::to_uppercase),
        arm64ec: config.var("ProgramFiles(Arm)").is_some(),
        compilers,
        vc_runtime: system_root.join("System32").join("vcruntime140.dll").exists(),
    }
}
