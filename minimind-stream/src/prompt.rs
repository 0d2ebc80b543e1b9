//! Prompt construction for generated turns

use minimind_core::bus::Whereabouts;
use minimind_core::command::Verb;
use minimind_core::config::SimConfig;
use minimind_core::memory::MemoryStore;
use minimind_core::SharedContext;
use minimind_types::ActorId;
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    recent_memories: usize,
    recent_notes: usize,
    reasoning_open: String,
    reasoning_close: Option<String>,
    separator: String,
}

impl PromptBuilder {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            recent_memories: config.memory.recent_memories,
            recent_notes: config.memory.recent_notes,
            reasoning_open: config.streaming.reasoning_open.clone(),
            reasoning_close: config.streaming.reasoning_close.clone(),
            separator: config.commands.rationale_separator.clone(),
        }
    }

    /// Returns `(prompt, system)`
    pub fn build(
        &self,
        ctx: &SharedContext,
        actor: &ActorId,
        store: &dyn MemoryStore,
    ) -> (String, String) {
        (self.prompt(ctx, actor, store), self.system(actor, store))
    }

    fn system(&self, actor: &ActorId, store: &dyn MemoryStore) -> String {
        let mut system = String::new();
        if let Some(profile) = store.profile().filter(|p| !p.trim().is_empty()) {
            let _ = writeln!(system, "{}\n", profile.trim());
        }
        let _ = writeln!(
            system,
            "You are {actor}, a character living in a small text world alongside other people."
        );
        if let Some(close) = &self.reasoning_close {
            let _ = writeln!(
                system,
                "Think privately between {} and {} first.",
                self.reasoning_open, close
            );
        }
        let _ = writeln!(
            system,
            "Then reply with exactly one command on its own line, optionally followed by \
             `{} your reason`. Nothing after the command is read.\n",
            self.separator
        );
        let _ = writeln!(system, "Commands:");
        for verb in Verb::ALL {
            let _ = writeln!(system, "{}", usage(verb));
        }
        system
    }

    fn prompt(&self, ctx: &SharedContext, actor: &ActorId, store: &dyn MemoryStore) -> String {
        let mut prompt = String::new();

        if let Some(location) = ctx.location_of(actor) {
            let _ = writeln!(prompt, "# {location}\n");
            let exits: Vec<&str> = ctx
                .config
                .world
                .places
                .iter()
                .map(String::as_str)
                .filter(|place| !place.eq_ignore_ascii_case(location.as_str()))
                .collect();
            let _ = writeln!(prompt, "{}", exits_line(&exits));

            let others: Vec<String> = ctx
                .roster
                .actors_at(&location)
                .into_iter()
                .filter(|other| other != actor)
                .map(|other| other.to_string())
                .collect();
            let _ = writeln!(prompt, "{}\n", company_line(&others));
        }

        let memories = store.memories(self.recent_memories);
        if !memories.is_empty() {
            let _ = writeln!(prompt, "## Recent memories");
            for memory in memories {
                let _ = writeln!(prompt, "- {}", memory.content.trim());
            }
            prompt.push('\n');
        }

        let notes = store.notes(self.recent_notes);
        if !notes.is_empty() {
            let _ = writeln!(prompt, "## Notes");
            for note in notes {
                let _ = writeln!(prompt, "### {}\n{}", note.title, note.content.trim());
            }
            prompt.push('\n');
        }

        let last = store.last_turn();
        if let (Some(command), Some(result)) = (&last.command, &last.result) {
            let _ = writeln!(prompt, "## Last turn\n{command}\n{result}\n");
        }

        let _ = write!(prompt, "What does {actor} do next?");
        prompt
    }
}

fn usage(verb: Verb) -> &'static str {
    match verb {
        Verb::GoTo => "GO TO <place> - walk somewhere else",
        Verb::Say => "SAY <text> - speak to everyone here",
        Verb::Shout => "SHOUT <text> - heard everywhere",
        Verb::Note => "NOTE <title>: <content> - write something down",
        Verb::Recall => "RECALL <query> - search your notes",
        Verb::Look => "LOOK - look around",
        Verb::Emote => "EMOTE <action> - do something visible",
        Verb::Dream => "DREAM - reflect deeply on everything so far",
    }
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn exits_line(exits: &[&str]) -> String {
    if exits.is_empty() {
        "There is nowhere else to GO TO from here.".to_string()
    } else {
        format!("You can GO TO {} from here.", join_names(exits))
    }
}

fn company_line(others: &[String]) -> String {
    match others.len() {
        0 => "You are alone here. Nobody will hear you SAY anything, but someone may hear you SHOUT."
            .to_string(),
        1 => format!(
            "{} is here and will hear what you SAY and see what you EMOTE.",
            others[0]
        ),
        _ => {
            let names: Vec<&str> = others.iter().map(String::as_str).collect();
            format!(
                "{} are here and will hear what you SAY and see what you EMOTE.",
                join_names(&names)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minimind_core::{AgentMind, MemoryKind};
    use minimind_types::Location;
    use std::sync::Arc;

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&["a"]), "a");
        assert_eq!(join_names(&["a", "b", "c"]), "a, b and c");
    }

    #[test]
    fn test_prompt_mentions_company_memories_and_notes() {
        let config = SimConfig::default();
        let ctx = SharedContext::sandbox(config.clone());
        let ada = ActorId::from("Ada");
        let bram = ActorId::from("Bram");
        let mind = Arc::new(AgentMind::new(ada.clone(), "A curious librarian."));
        ctx.enroll(ada.clone(), false, Location::from("Kitchen"), mind.clone());
        ctx.enroll(
            bram.clone(),
            false,
            Location::from("Kitchen"),
            Arc::new(AgentMind::new(bram.clone(), "")),
        );
        mind.add_memory(MemoryKind::Observed, "Bram says: \"bread?\"", None);
        mind.create_note("bread", "we are out", None);

        let (prompt, system) = PromptBuilder::new(&config).build(&ctx, &ada, mind.as_ref());

        assert!(prompt.starts_with("# Kitchen\n"));
        assert!(prompt.contains("You can GO TO Town Square and Library from here."));
        assert!(prompt.contains("Bram is here"));
        assert!(prompt.contains("- Bram says: \"bread?\""));
        assert!(prompt.contains("### bread\nwe are out"));
        assert!(prompt.ends_with("What does Ada do next?"));

        assert!(system.starts_with("A curious librarian."));
        assert!(system.contains("between <think> and </think>"));
        assert!(system.contains("GO TO <place>"));
    }
}
