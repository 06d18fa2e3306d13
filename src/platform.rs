use std::path::Path;

/// Operating-system capabilities used by shims, binary lookup and `env` output.
///
/// Call sites ask the host platform instead of branching on the OS name, and
/// tests can exercise either variant on any machine.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// File names a command may have on disk, in lookup order
    fn executable_candidates(&self, command: &str) -> Vec<String>;

    /// Command name for an executable file, or None if the file cannot be a command
    fn command_name(&self, file_name: &str) -> Option<String>;

    fn is_executable(&self, path: &Path) -> bool;

    fn shim_file_name(&self, command: &str) -> String;

    /// Command a shim file stands for
    fn shim_command(&self, file_name: &str) -> Option<String>;

    fn shim_script(&self, command: &str) -> String;

    fn export_line(&self, key: &str, value: &str) -> String;

    /// Separator for PATH-style lists
    fn list_separator(&self) -> char;
}

pub struct Unix;

pub struct Windows;

static UNIX: Unix = Unix;
static WINDOWS: Windows = Windows;

/// The platform goenv is running on
pub fn host() -> &'static dyn Platform {
    if cfg!(windows) {
        &WINDOWS
    } else {
        &UNIX
    }
}

/// GOOS name of the host
pub fn goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// GOARCH name of the host
pub fn goarch() -> &'static str {
    goarch_for(std::env::consts::ARCH)
}

/// Map a Rust architecture name onto GOARCH
pub fn goarch_for(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        "s390x" => "s390x",
        "riscv64" | "riscv64gc" => "riscv64",
        other => other,
    }
}

impl Platform for Unix {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn executable_candidates(&self, command: &str) -> Vec<String> {
        vec![command.to_string()]
    }

    fn command_name(&self, file_name: &str) -> Option<String> {
        if file_name.starts_with('.') {
            return None;
        }
        Some(file_name.to_string())
    }

    fn is_executable(&self, path: &Path) -> bool {
        let Ok(metadata) = path.metadata() else {
            return false;
        };
        if !metadata.is_file() {
            return false;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o111 != 0
        }

        #[cfg(not(unix))]
        {
            true
        }
    }

    fn shim_file_name(&self, command: &str) -> String {
        command.to_string()
    }

    fn shim_command(&self, file_name: &str) -> Option<String> {
        self.command_name(file_name)
    }

    fn shim_script(&self, command: &str) -> String {
        format!(
            r#"#!/usr/bin/env bash
# goenv shim for {command}
set -e
[ -n "$GOENV_DEBUG" ] && set -x

program="${{0##*/}}"
exec goenv exec "$program" "$@"
"#
        )
    }

    fn export_line(&self, key: &str, value: &str) -> String {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$")
            .replace('`', "\\`");
        format!("export {key}=\"{escaped}\"")
    }

    fn list_separator(&self) -> char {
        ':'
    }
}

const WINDOWS_EXTENSIONS: [&str; 4] = [".exe", ".bat", ".cmd", ".com"];

fn strip_extension_ci<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let split = file_name.len().checked_sub(extension.len())?;
    let (stem, ext) = (file_name.get(..split)?, file_name.get(split..)?);
    (ext.eq_ignore_ascii_case(extension) && !stem.is_empty()).then_some(stem)
}

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn executable_candidates(&self, command: &str) -> Vec<String> {
        if WINDOWS_EXTENSIONS
            .iter()
            .any(|ext| strip_extension_ci(command, ext).is_some())
        {
            return vec![command.to_string()];
        }
        WINDOWS_EXTENSIONS
            .iter()
            .map(|ext| format!("{command}{ext}"))
            .collect()
    }

    fn command_name(&self, file_name: &str) -> Option<String> {
        WINDOWS_EXTENSIONS
            .iter()
            .find_map(|ext| strip_extension_ci(file_name, ext))
            .map(str::to_string)
    }

    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| self.command_name(name))
                .is_some()
    }

    fn shim_file_name(&self, command: &str) -> String {
        format!("{command}.bat")
    }

    fn shim_command(&self, file_name: &str) -> Option<String> {
        strip_extension_ci(file_name, ".bat").map(str::to_string)
    }

    fn shim_script(&self, command: &str) -> String {
        format!(
            "@echo off\r\nREM goenv shim for {command}\r\nsetlocal\r\nif \"%GOENV_DEBUG%\"==\"1\" echo on\r\ngoenv exec \"%~n0\" %*\r\n"
        )
    }

    fn export_line(&self, key: &str, value: &str) -> String {
        format!("set \"{key}={value}\"")
    }

    fn list_separator(&self) -> char {
        ';'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("go.exe", Some("go"))]
    #[case("GOFMT.EXE", Some("GOFMT"))]
    #[case("tool.cmd", Some("tool"))]
    #[case("README.md", None)]
    #[case(".exe", None)]
    fn test_windows_command_name(#[case] file: &str, #[case] expected: Option<&str>) {
        assert_eq!(Windows.command_name(file).as_deref(), expected);
    }

    #[test]
    fn test_windows_candidates() {
        assert_eq!(
            Windows.executable_candidates("go"),
            vec!["go.exe", "go.bat", "go.cmd", "go.com"]
        );
        assert_eq!(Windows.executable_candidates("go.exe"), vec!["go.exe"]);
        assert_eq!(Unix.executable_candidates("go"), vec!["go"]);
    }

    #[test]
    fn test_shim_names_round_trip_to_commands() {
        assert_eq!(Windows.shim_file_name("gofmt"), "gofmt.bat");
        assert_eq!(Windows.shim_command("gofmt.bat").as_deref(), Some("gofmt"));
        assert_eq!(Unix.shim_file_name("gofmt"), "gofmt");
        assert_eq!(Unix.shim_command(".rehash"), None);
    }

    #[test]
    fn test_shim_scripts_forward_to_exec() {
        let unix = Unix.shim_script("gofmt");
        assert!(unix.starts_with("#!/usr/bin/env bash\n"));
        assert!(unix.contains("exec goenv exec \"$program\" \"$@\""));

        let windows = Windows.shim_script("gofmt");
        assert!(windows.starts_with("@echo off\r\n"));
        assert!(windows.contains("goenv exec \"%~n0\" %*"));
    }

    #[test]
    fn test_export_syntax() {
        assert_eq!(
            Unix.export_line("GOROOT", "/opt/go \"1\""),
            "export GOROOT=\"/opt/go \\\"1\\\"\""
        );
        assert_eq!(Windows.export_line("GOROOT", r"C:\go"), r#"set "GOROOT=C:\go""#);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        assert!(!Unix.is_executable(&tool));

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(Unix.is_executable(&tool));
        assert!(!Unix.is_executable(temp.path()));
    }

    #[test]
    fn test_windows_executable_by_extension() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("tool.exe");
        let doc = temp.path().join("tool.txt");
        fs::write(&tool, "MZ").unwrap();
        fs::write(&doc, "text").unwrap();

        assert!(Windows.is_executable(&tool));
        assert!(!Windows.is_executable(&doc));
    }

    #[rstest]
    #[case("x86_64", "amd64")]
    #[case("aarch64", "arm64")]
    #[case("x86", "386")]
    #[case("arm", "arm")]
    fn test_goarch_mapping(#[case] arch: &str, #[case] expected: &str) {
        assert_eq!(goarch_for(arch), expected);
    }
}
