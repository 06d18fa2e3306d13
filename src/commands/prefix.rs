use crate::version::{Matcher, SYSTEM};
use crate::{exec, Error, Inventory, Session, VersionSource};
use anyhow::Result;
use std::path::PathBuf;

/// `goenv prefix [VERSION]`: install directory of a spec or of the selection
pub fn execute(session: &Session, spec: Option<&str>) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());

    let versions = match spec.map(str::trim) {
        Some(SYSTEM) => vec![SYSTEM.to_string()],
        Some(spec) => {
            let matcher = Matcher::new(&inventory, exec::system_available(config));
            vec![matcher.resolve(spec, &VersionSource::CommandLine)?]
        }
        None => exec::select(config, &inventory)?.versions,
    };

    for version in versions {
        println!("{}", prefix(session, &version)?.display());
    }
    Ok(0)
}

/// For `system`, the tree above the bin directory holding PATH's go
fn prefix(session: &Session, version: &str) -> crate::Result<PathBuf> {
    if version != SYSTEM {
        return Ok(session.config().version_dir(version));
    }

    exec::find_system_command(session.config(), "go")
        .and_then(|go| Some(go.parent()?.parent()?.to_path_buf()))
        .ok_or(Error::SystemVersionNotFound)
}
