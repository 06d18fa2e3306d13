use clap::{Parser, Subcommand};

/// goenv - Go version management
///
/// goenv picks a Go toolchain per directory (.go-version, .tool-versions or
/// go.mod), per shell (GOENV_VERSION) or globally, and routes every Go command
/// through shims so the right toolchain, GOPATH and build cache are used.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command with the selected Go version
    ///
    /// Sets GOROOT, GOPATH, GOCACHE and GOMODCACHE for the version, puts its
    /// bin directory first on PATH and runs the command. Shims call this.
    /// Everything after the command name is passed through untouched.
    #[command(disable_help_flag = true)]
    Exec {
        /// Command to run, followed by its arguments
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        argv: Vec<String>,
    },

    /// Regenerate shims for every installed version
    Rehash,

    /// List existing shims
    Shims {
        /// Print command names instead of full paths
        #[arg(long)]
        short: bool,
    },

    /// Show the full path of the executable the selected version would run
    Which {
        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// List installed versions that provide a command
    Whence {
        /// Print the executable paths instead of version names
        #[arg(long)]
        path: bool,

        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// List installed versions, marking the selected ones
    Versions {
        /// Print version names only
        #[arg(long)]
        bare: bool,

        /// Do not show alias names next to versions
        #[arg(long)]
        skip_aliases: bool,
    },

    /// Show the install directory of a version
    Prefix {
        /// Version spec to look up; defaults to the selected version
        #[arg(value_name = "VERSION")]
        version: Option<String>,
    },

    /// Show the selected version and where it was set
    Version,

    /// Show the selected concrete version(s), one per line
    #[command(name = "version-name")]
    VersionName,

    /// Show where the selected version was set
    #[command(name = "version-origin")]
    VersionOrigin,

    /// Output environment for the selected version (used in shell init)
    Env,
}
