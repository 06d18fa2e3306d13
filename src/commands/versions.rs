use crate::config::RootPath;
use crate::hooks::AliasStore;
use crate::version::SYSTEM;
use crate::{exec, Error, Inventory, Session, VersionSource};
use anyhow::Result;

/// `goenv versions`: every installed version, selected ones starred
pub fn execute(session: &Session, bare: bool, skip_aliases: bool) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    let has_system = exec::system_available(config);

    if bare {
        for version in inventory.versions() {
            println!("{}", version);
        }
        return Ok(0);
    }

    if inventory.is_empty() && !has_system {
        return Err(Error::NoVersionResolvable.into());
    }

    // An unresolvable selection just means nothing is starred
    let (current, source) = match exec::select(config, &inventory) {
        Ok(active) => (active.versions, active.resolved.source),
        Err(err) => {
            tracing::debug!("nothing selected: {}", err);
            (Vec::new(), VersionSource::Default)
        }
    };
    let aliases = if skip_aliases {
        AliasStore::default()
    } else {
        AliasStore::load(&config.path(RootPath::Aliases))?
    };

    let line = |version: &str| {
        let mut line = if current.iter().any(|selected| selected == version) {
            match &source {
                VersionSource::Default => format!("* {}", version),
                source => format!("* {} (set by {})", version, source),
            }
        } else {
            format!("  {}", version)
        };
        let names = aliases.names_for(version);
        if !names.is_empty() {
            line.push_str(&format!(" [aliases: {}]", names.join(", ")));
        }
        line
    };

    if has_system || current.iter().any(|selected| selected == SYSTEM) {
        println!("{}", line(SYSTEM));
    }
    for version in inventory.versions() {
        println!("{}", line(version));
    }
    Ok(0)
}
