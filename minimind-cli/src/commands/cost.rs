//! Price a command without running it.

use super::session::{load_config, Overrides};
use anyhow::{Context, Result};
use minimind_core::{CommandParser, Scheduler};
use std::path::Path;

pub fn print_cost(config_path: &Path, line: &str) -> Result<()> {
    let config = load_config(config_path, &Overrides::default())?;
    let parser = CommandParser::new(&config.commands);
    let command = parser
        .parse(line)
        .with_context(|| format!("Cannot price {:?}", line))?;

    let scheduler = Scheduler::new(config.turns.clone(), parser);
    println!("{}", scheduler.cost_of(&command));
    Ok(())
}
