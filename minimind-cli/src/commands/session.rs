//! Config loading and cast setup shared by every command.

use anyhow::{bail, Context, Result};
use minimind_core::config::CastMember;
use minimind_core::{AgentMind, HumanJournal, SharedContext, SimConfig};
use minimind_types::ActorId;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Command-line values that win over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub model: Option<String>,
}

pub fn load_config(path: &Path, overrides: &Overrides) -> Result<SimConfig> {
    let mut config = SimConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(url) = &overrides.backend_url {
        config.backend.base_url = url.clone();
    }
    if let Some(model) = &overrides.model {
        config.backend.model = model.clone();
    }
    Ok(config)
}

/// A populated world
pub struct Session {
    pub ctx: SharedContext,
    pub human: Option<ActorId>,
    pub agents: Vec<ActorId>,
}

/// Enroll the configured human and agents into a sandbox world
pub fn build_session(config: SimConfig) -> Result<Session> {
    let cast = config.world.clone();
    let ctx = SharedContext::sandbox(config);
    let mut names = HashSet::new();

    let human = match &cast.human {
        Some(member) => {
            let id = claim(&mut names, member)?;
            let start = start_of(&ctx, member)?;
            ctx.enroll(id.clone(), true, start, Arc::new(HumanJournal::new(id.clone())));
            Some(id)
        }
        None => None,
    };

    let mut agents = Vec::new();
    for member in &cast.agents {
        let id = claim(&mut names, member)?;
        let start = start_of(&ctx, member)?;
        ctx.enroll(
            id.clone(),
            false,
            start,
            Arc::new(AgentMind::new(id.clone(), member.profile.clone())),
        );
        agents.push(id);
    }

    if human.is_none() && agents.is_empty() {
        bail!("The cast is empty: configure world.human or world.agents");
    }
    Ok(Session { ctx, human, agents })
}

fn claim(names: &mut HashSet<String>, member: &CastMember) -> Result<ActorId> {
    let name = member.name.trim();
    if name.is_empty() {
        bail!("Cast member with an empty name");
    }
    if !names.insert(name.to_lowercase()) {
        bail!("Duplicate cast member: {}", name);
    }
    Ok(ActorId::new(name))
}

fn start_of(ctx: &SharedContext, member: &CastMember) -> Result<minimind_types::Location> {
    ctx.world.resolve_place(&member.start).with_context(|| {
        format!(
            "{} starts in {:?}, which is not one of world.places",
            member.name, member.start
        )
    })
}
