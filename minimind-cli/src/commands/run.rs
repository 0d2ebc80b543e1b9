//! Interactive play loop.

use super::order::print_standings;
use super::session::{build_session, load_config, Overrides, Session};
use anyhow::{Context, Result};
use minimind_core::memory::{MemoryKind, MemoryStore};
use minimind_core::{CommandPipeline, TurnMode};
use minimind_stream::{backend_from_config, BackendSynthesizer, TurnResolution, TurnRunner};
use minimind_types::ActorId;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// What a line typed by the human asked for
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Pass,
    Mode(TurnMode),
    Override(bool),
    Order,
    Unknown(&'a str),
    Command(&'a str),
}

fn parse_input(line: &str) -> Option<Input<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let input = match line.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Input::Quit,
        "pass" => Input::Pass,
        "/mode cost" => Input::Mode(TurnMode::Cost),
        "/mode pending" => Input::Mode(TurnMode::PendingCount),
        "/override on" => Input::Override(true),
        "/override off" => Input::Override(false),
        "/order" => Input::Order,
        _ if line.starts_with('/') => Input::Unknown(line),
        _ => Input::Command(line),
    };
    Some(input)
}

pub async fn run_world(
    config_path: &Path,
    overrides: &Overrides,
    max_turns: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let backend = backend_from_config(&config.backend);
    let Session { ctx, human, agents } = build_session(config)?;

    info!(backend = backend.name(), agents = agents.len(), "starting world");
    let pipeline = CommandPipeline::new(ctx.clone())
        .with_synthesizer(Arc::new(BackendSynthesizer::new(backend.clone())));
    let runner = TurnRunner::new(pipeline.clone(), backend);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seen = 0usize;
    let mut turns = 0usize;

    while max_turns.map_or(true, |max| turns < max) {
        let next = ctx
            .scheduler
            .lock()
            .next_actor()
            .context("Nobody left to take a turn")?;

        if human.as_ref() != Some(&next) {
            let outcome = runner.run_agent_turn(&next).await?;
            narrate(&next, &outcome.resolution);
            turns += 1;
            continue;
        }

        if let Some(store) = ctx.mind(&next) {
            seen = show_observations(store.as_ref(), seen);
        }
        print!("{}> ", next);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let Some(input) = parse_input(&line) else {
            continue;
        };

        match input {
            Input::Quit => break,
            Input::Pass => {
                if ctx.scheduler.lock().pass_turn(&next) {
                    println!("You let the moment pass.");
                    turns += 1;
                } else {
                    println!("You can't pass right now.");
                }
            }
            Input::Mode(mode) => {
                ctx.scheduler.lock().set_mode(mode);
                println!("Turn order now follows {} mode.", mode);
            }
            Input::Override(enabled) => {
                ctx.scheduler.lock().set_override_mode(enabled);
                println!("Override {}.", if enabled { "on" } else { "off" });
            }
            Input::Order => print_standings(&ctx.scheduler.lock().snapshot()),
            Input::Unknown(other) => println!("Unknown directive: {}", other),
            Input::Command(text) => match pipeline.execute(&next, text, None, None).await {
                Ok(report) => {
                    println!("{}", report.message);
                    turns += 1;
                }
                Err(err) => println!("{}", err),
            },
        }
    }

    if let Some(store) = human.as_ref().and_then(|h| ctx.mind(h)) {
        show_observations(store.as_ref(), seen);
    }
    Ok(())
}

/// Print observations recorded since `seen`; returns the new high-water mark
fn show_observations(store: &dyn MemoryStore, seen: usize) -> usize {
    let memories = store.memories(usize::MAX);
    for memory in memories.iter().skip(seen) {
        if memory.kind == MemoryKind::Observed {
            println!("{}", memory.content);
        }
    }
    memories.len()
}

fn narrate(actor: &ActorId, resolution: &TurnResolution) {
    match resolution {
        TurnResolution::Executed(report) => {
            let command = report
                .command
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            match &report.rationale {
                Some(why) => info!(actor = %actor, command = %command, why = %why, "agent acted"),
                None => info!(actor = %actor, command = %command, "agent acted"),
            }
        }
        TurnResolution::Forfeited(report) | TurnResolution::TimedOut(Some(report)) => {
            info!(actor = %actor, why = report.rationale.as_deref().unwrap_or(""), "agent forfeited")
        }
        TurnResolution::TimedOut(None) => info!(actor = %actor, "agent timed out"),
        TurnResolution::Rejected(err) => info!(actor = %actor, error = %err, "agent rejected"),
        TurnResolution::Abandoned(why) => info!(actor = %actor, why = %why, "agent turn abandoned"),
    }
}
