use std::path::Path;

use super::binary::{BinaryFormat, ElfInfo, OsVersion};
use super::host::{HostInfo, Libc};
use super::Issue;

/// Oldest kernel the Go runtime supports
const MIN_KERNEL: OsVersion = OsVersion {
    major: 3,
    minor: 2,
    patch: 0,
};

/// Below this, Go still runs but upcoming releases drop support
const WARN_KERNEL: OsVersion = OsVersion {
    major: 4,
    minor: 0,
    patch: 0,
};

pub fn check(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    if host.os != "linux" {
        return Vec::new();
    }

    let mut issues = Vec::new();
    if let Some(kernel) = host.kernel {
        issues.extend(check_kernel(kernel));
    }
    if let BinaryFormat::Elf(elf) = format {
        issues.extend(check_elf(elf, host));
    }
    issues
}

pub fn check_kernel(kernel: OsVersion) -> Option<Issue> {
    if kernel < MIN_KERNEL {
        Some(
            Issue::error(format!(
                "Linux kernel {} is not supported; Go requires Linux {} or later",
                kernel, MIN_KERNEL
            ))
            .with_hint("Upgrade the kernel or use a distribution released after 2012"),
        )
    } else if kernel < WARN_KERNEL {
        Some(
            Issue::warning(format!(
                "Linux kernel {} is old; newer Go releases may require {} or later",
                kernel, WARN_KERNEL
            ))
            .with_hint("Consider upgrading the kernel"),
        )
    } else {
        None
    }
}

fn check_elf(elf: &ElfInfo, host: &HostInfo) -> Vec<Issue> {
    let mut issues = Vec::new();

    if elf.is_64 != host.is_64 {
        issues.push(Issue::error(format!(
            "{}-bit binary cannot run in this {}-bit environment",
            if elf.is_64 { 64 } else { 32 },
            if host.is_64 { 64 } else { 32 }
        )));
    }

    if let Some(arch) = elf.arch() {
        if arch != host.arch && !(host.arch == "amd64" && arch == "386") {
            issues.push(
                Issue::warning(format!(
                    "binary is built for {} but this host is {}",
                    arch, host.arch
                ))
                .with_hint("It will only run through binfmt emulation such as qemu-user"),
            );
        }
    }

    let Some(interpreter) = &elf.interpreter else {
        // Statically linked; nothing below applies
        return issues;
    };

    if !Path::new(interpreter).exists() {
        issues.push(
            Issue::error(format!("dynamic loader {} is missing", interpreter))
                .with_hint(loader_hint(interpreter, host.libc)),
        );
    } else if let Some(issue) = libc_mismatch(interpreter, host.libc) {
        issues.push(issue);
    }

    if let (Some(required), Some(Libc::Glibc(Some(current)))) = (elf.glibc_required, host.libc)
    {
        if required > current {
            issues.push(
                Issue::error(format!(
                    "binary requires glibc {}.{} but this system has {}.{}",
                    required.0, required.1, current.0, current.1
                ))
                .with_hint(
                    "Rebuild with CGO_ENABLED=0 for a static binary, \
                     or build inside an older base image",
                ),
            );
        }
    }

    issues
}

fn expects_musl(interpreter: &str) -> bool {
    interpreter.contains("musl")
}

/// The loader is present but belongs to the other libc, as with gcompat
fn libc_mismatch(interpreter: &str, libc: Option<Libc>) -> Option<Issue> {
    match libc? {
        Libc::Glibc(_) if expects_musl(interpreter) => Some(
            Issue::warning("binary is linked against musl but this system uses glibc")
                .with_hint("Rebuild with CGO_ENABLED=0 if it fails to start"),
        ),
        Libc::Musl if !expects_musl(interpreter) => Some(
            Issue::warning("binary is linked against glibc but this system uses musl")
                .with_hint("It runs through a compatibility layer; rebuild with CGO_ENABLED=0 for a native binary"),
        ),
        _ => None,
    }
}

fn loader_hint(interpreter: &str, libc: Option<Libc>) -> String {
    match libc {
        Some(Libc::Musl) if !expects_musl(interpreter) => {
            "This is a musl system and the binary expects glibc; \
             rebuild with CGO_ENABLED=0 or install gcompat"
                .to_string()
        }
        Some(Libc::Glibc(_)) if expects_musl(interpreter) => {
            "The binary expects musl; rebuild with CGO_ENABLED=0 or install musl".to_string()
        }
        _ => "Rebuild with CGO_ENABLED=0 for a static binary".to_string(),
    }
}
