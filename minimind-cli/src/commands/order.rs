//! Show who moves first.

use super::session::{build_session, load_config, Overrides};
use anyhow::Result;
use minimind_core::ActorStanding;
use std::path::Path;

pub fn print_order(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path, &Overrides::default())?;
    let session = build_session(config)?;
    let standings = session.ctx.scheduler.lock().snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&standings)?);
    } else {
        print_standings(&standings);
    }
    Ok(())
}

pub fn print_standings(standings: &[ActorStanding]) {
    for (position, row) in standings.iter().enumerate() {
        let kind = if row.is_human { "human" } else { "agent" };
        println!(
            "{}. {} ({}) cost {} pending {}",
            position + 1,
            row.actor,
            kind,
            row.cost,
            row.pending
        );
    }
}
