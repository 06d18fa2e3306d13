use crate::cli::{Cli, Commands};
use crate::{Config, Session};
use anyhow::Result;

mod env;
mod exec;
mod prefix;
mod rehash;
mod shims;
mod version;
mod versions;
mod whence;
mod which;

/// Run a subcommand and return the process exit code
pub fn execute(cli: Cli) -> Result<i32> {
    // One session per invocation; every command below shares its memo
    let session = Session::new(Config::load()?);

    match cli.command {
        Commands::Exec { argv } => exec::execute(&session, argv),

        Commands::Rehash => rehash::execute(&session),

        Commands::Shims { short } => shims::execute(&session, short),

        Commands::Which { command } => which::execute(&session, &command),

        Commands::Whence { path, command } => whence::execute(&session, &command, path),

        Commands::Versions { bare, skip_aliases } => versions::execute(&session, bare, skip_aliases),

        Commands::Prefix { version } => prefix::execute(&session, version.as_deref()),

        Commands::Version => version::show(&session),

        Commands::VersionName => version::name(&session),

        Commands::VersionOrigin => version::origin(&session),

        Commands::Env => env::execute(&session),
    }
}
