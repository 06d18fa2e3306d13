use crate::{exec, Session};
use anyhow::{bail, Result};

/// `argv` is the command name followed by its arguments, exactly as given
pub fn execute(session: &Session, mut argv: Vec<String>) -> Result<i32> {
    // A separator is only ours when it comes before the command name
    if argv.first().map(String::as_str) == Some("--") {
        argv.remove(0);
    }
    if argv.is_empty() {
        bail!("no command given to exec");
    }

    let command = argv.remove(0);
    Ok(exec::run(session, &command, &argv)?)
}
