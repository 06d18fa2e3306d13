use crate::{ui, Inventory, Session, ShimManager};
use anyhow::Result;

pub fn execute(session: &Session) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    let manager = ShimManager::new(config, session.platform());

    let count = manager.rehash(&inventory)?;
    ui::success(
        "Rehashed",
        format!("{} shims in {}", count, manager.shims_dir().display()),
    );
    Ok(0)
}
