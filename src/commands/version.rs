use crate::config::RootPath;
use crate::hooks::AliasStore;
use crate::version::{MatchReport, Matcher};
use crate::{exec, Error, Inventory, ResolvedVersion, Resolver, Session};
use anyhow::Result;

struct Selection {
    resolved: ResolvedVersion,
    report: MatchReport,
    installed: Vec<String>,
}

impl Selection {
    fn load(session: &Session) -> Self {
        let config = session.config();
        let inventory = Inventory::scan(config, session.platform());
        let resolved = Resolver::new(config, &inventory).resolve();
        let report = Matcher::new(&inventory, exec::system_available(config))
            .match_list(resolved.specs());

        Self {
            resolved,
            report,
            installed: inventory.versions().to_vec(),
        }
    }

    /// Error for the missing part of the selection, if any
    fn missing_error(&self) -> Option<Error> {
        match (self.report.missing.as_slice(), self.report.available.is_empty()) {
            ([], _) => None,
            ([version], true) => Some(Error::VersionNotInstalled {
                version: version.clone(),
                origin: self.resolved.source.clone(),
                installed: self.installed.clone(),
            }),
            _ => Some(Error::VersionsNotInstalled {
                missing: self.report.missing.clone(),
                available: self.report.available.clone(),
                origin: self.resolved.source.clone(),
            }),
        }
    }
}

/// `goenv version`: each selected version with its origin and aliases
pub fn show(session: &Session) -> Result<i32> {
    let selection = Selection::load(session);
    let aliases = AliasStore::load(&session.config().path(RootPath::Aliases))?;

    for version in &selection.report.available {
        let names = aliases.names_for(version);
        if names.is_empty() {
            println!("{} (set by {})", version, selection.resolved.source);
        } else {
            println!(
                "{} (set by {}) [aliases: {}]",
                version,
                selection.resolved.source,
                names.join(", ")
            );
        }
    }

    match selection.missing_error() {
        Some(err) => Err(err.into()),
        None => Ok(0),
    }
}

/// `goenv version-name`: prints what resolves, then fails if anything did not
pub fn name(session: &Session) -> Result<i32> {
    let selection = Selection::load(session);
    for version in &selection.report.available {
        println!("{}", version);
    }

    match selection.missing_error() {
        Some(err) => Err(err.into()),
        None => Ok(0),
    }
}

pub fn origin(session: &Session) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    println!("{}", Resolver::new(config, &inventory).resolve().source);
    Ok(0)
}
