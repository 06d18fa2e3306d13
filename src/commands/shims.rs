use crate::{Session, ShimManager};
use anyhow::Result;

pub fn execute(session: &Session, short: bool) -> Result<i32> {
    let manager = ShimManager::new(session.config(), session.platform());
    for (command, path) in manager.list()? {
        if short {
            println!("{}", command);
        } else {
            println!("{}", path.display());
        }
    }
    Ok(0)
}
