use crate::{exec, Error, Inventory, Session};
use anyhow::Result;

pub fn execute(session: &Session, command: &str) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    let active = exec::select(config, &inventory)?;

    let found = active
        .versions
        .iter()
        .find_map(|version| exec::locate(session, version, &active.resolved.source, command));

    match found {
        Some(path) => {
            println!("{}", path.display());
            Ok(0)
        }
        None => Err(Error::CommandNotFound {
            command: command.to_string(),
            version: active.versions.join(":"),
        }
        .into()),
    }
}
