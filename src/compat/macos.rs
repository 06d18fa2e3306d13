use super::binary::BinaryFormat;
use super::host::HostInfo;
use super::Issue;

pub fn check(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    if host.os != "darwin" {
        return Vec::new();
    }

    let BinaryFormat::MachO(macho) = format else {
        return Vec::new();
    };

    if !macho.targets_macos() {
        return vec![Issue::error(format!(
            "binary is built for {} and cannot run on macOS",
            macho.platform_name()
        ))
        .with_hint("Build it with GOOS=darwin for a macOS executable")];
    }

    match (macho.min_os, host.macos) {
        (Some(required), Some(current)) if required > current => vec![Issue::warning(format!(
            "binary requires macOS {} but this system runs {}",
            required, current
        ))
        .with_hint("The binary may refuse to start; upgrade macOS or use an older Go version")],
        _ => Vec::new(),
    }
}
