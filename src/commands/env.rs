use crate::exec::{self, EnvBuilder, MANAGED_VARS};
use crate::{Inventory, Session};
use anyhow::Result;

pub fn execute(session: &Session) -> Result<i32> {
    let config = session.config();
    let inventory = Inventory::scan(config, session.platform());
    let active = exec::select(config, &inventory)?;

    let Some(version) = active.versions.first() else {
        return Ok(0);
    };
    let env = EnvBuilder::new(session).build(version);

    for key in MANAGED_VARS {
        match env.get(key) {
            Some(value) if config.vars().get(key) != Some(value) => {
                println!("{}", session.platform().export_line(key, value));
            }
            _ => {}
        }
    }

    Ok(0)
}
