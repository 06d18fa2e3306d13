use crate::{Inventory, Session, ShimManager};
use anyhow::Result;

/// Exits 1 when no installed version provides `command`
pub fn execute(session: &Session, command: &str, path: bool) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    let matches = ShimManager::new(config, session.platform()).whence(&inventory, command);

    for (version, binary) in &matches {
        if path {
            println!("{}", binary.display());
        } else {
            println!("{}", version);
        }
    }

    Ok(if matches.is_empty() { 1 } else { 0 })
}
