use super::binary::BinaryFormat;
use super::host::{CCompiler, HostInfo};
use super::Issue;

pub fn check(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    if host.os != "windows" {
        return Vec::new();
    }

    let windows = &host.windows;
    let mut issues = Vec::new();

    if windows.compilers.is_empty() {
        issues.push(
            Issue::warning("no C compiler found; builds that use cgo will fail")
                .with_hint("Install Visual Studio Build Tools (cl) or MinGW-w64 (gcc), or set CGO_ENABLED=0"),
        );
    } else {
        tracing::debug!(compilers = ?windows.compilers, "C toolchain");
    }

    if !windows.vc_runtime && windows.compilers.contains(&CCompiler::Msvc) {
        issues.push(
            Issue::info("the Visual C++ runtime (vcruntime140.dll) was not found")
                .with_hint("Binaries linked against MSVC may need the VC++ Redistributable"),
        );
    }

    if let Some(mode) = emulation_mode(host) {
        issues.push(
            Issue::info(format!("running {}", mode))
                .with_hint("Install the windows/arm64 Go toolchain for native performance"),
        );
    }

    if let BinaryFormat::Pe(pe) = format {
        if pe.arch() == Some("amd64") && machine_arch(host) == Some("ARM64") {
            issues.push(Issue::info("x64 binary will run under emulation on this ARM64 machine"));
        }
    }

    issues
}

/// Architecture of the machine, as opposed to the current process
fn machine_arch(host: &HostInfo) -> Option<&str> {
    host.windows
        .machine_arch
        .as_deref()
        .or(host.windows.process_arch.as_deref())
}

fn emulation_mode(host: &HostInfo) -> Option<&'static str> {
    let process = host.windows.process_arch.as_deref()?;
    match (process, machine_arch(host)) {
        ("AMD64", Some("ARM64")) => Some("as an x64 process under emulation on ARM64"),
        ("X86", Some("ARM64")) => Some("as an x86 process under emulation on ARM64"),
        ("ARM64", _) if host.windows.arm64ec && host.arch == "amd64" => {
            Some("as an ARM64EC process")
        }
        _ => None,
    }
}
