//! Advisories that cut across hosts: compatibility layers and CPU emulation.

use super::binary::BinaryFormat;
use super::host::HostInfo;
use super::Issue;

pub fn check(format: &BinaryFormat, host: &HostInfo) -> Vec<Issue> {
    let mut issues = Vec::new();

    if host.wsl {
        if let BinaryFormat::Pe(_) = format {
            issues.push(
                Issue::warning("running a Windows binary from inside WSL")
                    .with_hint("Install the linux toolchain inside WSL to build native binaries"),
            );
        }
    }

    if host.os == "darwin" {
        if let BinaryFormat::MachO(macho) = format {
            match (host.arch.as_str(), macho.arch()) {
                ("arm64", Some("amd64")) => issues.push(
                    Issue::warning("x86_64 binary will run under Rosetta 2 translation")
                        .with_hint("Install the darwin/arm64 Go toolchain for native performance"),
                ),
                ("amd64", Some("arm64")) if host.rosetta => issues.push(
                    Issue::warning("goenv itself is running under Rosetta 2 translation")
                        .with_hint("Install the arm64 build of goenv"),
                ),
                ("amd64", Some("arm64")) => issues.push(
                    Issue::warning("arm64 binary is unlikely to run on an Intel Mac")
                        .with_hint("Install the darwin/amd64 Go toolchain or rebuild with GOARCH=amd64"),
                ),
                _ => {}
            }
        }
    }

    issues
}
