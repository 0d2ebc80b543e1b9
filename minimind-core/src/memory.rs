//! Actor memory: what happened, what was noted, what was last attempted
//!
//! Persistence is someone else's problem. [`Journal`] keeps everything in
//! memory; [`HumanJournal`] and [`AgentMind`] wrap it for the two kinds of
//! actor and expose it through [`MemoryStore`].

use chrono::{DateTime, Utc};
use minimind_types::ActorId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something the actor did
    Action,
    /// Something the actor saw someone else do
    Observed,
    /// What the world said back
    Response,
    /// A reasoning block from generation
    Reasoning,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemoryKind::Action => "action",
            MemoryKind::Observed => "observed",
            MemoryKind::Response => "response",
            MemoryKind::Reasoning => "reasoning",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub kind: MemoryKind,
    pub content: String,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A note returned by recall, with a relevance score in `0.0..=1.0`
#[derive(Debug, Clone, PartialEq)]
pub struct RecallHit {
    pub note: Note,
    pub score: f32,
}

/// What a generated turn was built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnArtifacts {
    pub prompt: String,
    pub system_prompt: String,
    pub response: String,
}

/// The last command an actor issued and how it went
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastTurn {
    pub command: Option<String>,
    pub result: Option<String>,
    pub rationale: Option<String>,
    pub artifacts: Option<TurnArtifacts>,
    pub thought_chain: Option<String>,
}

/// Memory capability shared by every kind of actor
pub trait MemoryStore: Send + Sync {
    fn owner(&self) -> &ActorId;

    /// Persona text for prompt building, if the actor has one
    fn profile(&self) -> Option<&str> {
        None
    }

    /// The most recent `max` memories, oldest first
    fn memories(&self, max: usize) -> Vec<Memory>;

    fn add_memory(&self, kind: MemoryKind, content: &str, reason: Option<&str>);

    /// Write a note, replacing any note with the same title (ignoring case)
    fn create_note(&self, title: &str, content: &str, reason: Option<&str>) -> Note;

    /// The `max` most recently written notes, newest first
    fn notes(&self, max: usize) -> Vec<Note>;

    fn recall(&self, query: &str, limit: usize) -> Vec<RecallHit>;

    fn record_reasoning(&self, chain: &str);

    fn record_turn(&self, turn: LastTurn);

    fn last_turn(&self) -> LastTurn;
}

#[derive(Debug, Default)]
struct JournalState {
    memories: Vec<Memory>,
    notes: Vec<Note>,
    last_turn: LastTurn,
}

/// In-memory record shared by both actor kinds
#[derive(Debug, Default)]
pub struct Journal {
    state: Mutex<JournalState>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memories(&self, max: usize) -> Vec<Memory> {
        let state = self.state.lock();
        let skip = state.memories.len().saturating_sub(max);
        state.memories[skip..].to_vec()
    }

    pub fn add_memory(&self, kind: MemoryKind, content: &str, reason: Option<&str>) {
        self.state.lock().memories.push(Memory {
            kind,
            content: content.to_string(),
            reason: reason.map(str::to_string),
            recorded_at: Utc::now(),
        });
    }

    pub fn create_note(&self, title: &str, content: &str, reason: Option<&str>) -> Note {
        let note = Note {
            title: title.trim().to_string(),
            content: content.to_string(),
            reason: reason.map(str::to_string),
            updated_at: Utc::now(),
        };
        let mut state = self.state.lock();
        state
            .notes
            .retain(|existing| !existing.title.eq_ignore_ascii_case(&note.title));
        state.notes.push(note.clone());
        note
    }

    pub fn notes(&self, max: usize) -> Vec<Note> {
        self.state
            .lock()
            .notes
            .iter()
            .rev()
            .take(max)
            .cloned()
            .collect()
    }

    /// Exact title matches first, then keyword overlap, then the rest
    pub fn recall(&self, query: &str, limit: usize) -> Vec<RecallHit> {
        let query = query.trim();
        let wanted = keywords(query);
        let notes = self.notes(usize::MAX);

        let mut hits: Vec<RecallHit> = notes
            .into_iter()
            .map(|note| {
                let score = if note.title.eq_ignore_ascii_case(query) {
                    1.0
                } else if wanted.is_empty() {
                    0.0
                } else {
                    let have = keywords(&format!("{} {}", note.title, note.content));
                    // exact title matches keep the top slot
                    let overlap = wanted.intersection(&have).count() as f32 / wanted.len() as f32;
                    overlap * 0.99
                };
                RecallHit { note, score }
            })
            .collect();

        // stable sort keeps newest-first among equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }

    pub fn set_thought_chain(&self, chain: &str) {
        self.state.lock().last_turn.thought_chain = Some(chain.to_string());
    }

    pub fn record_turn(&self, turn: LastTurn) {
        let mut state = self.state.lock();
        let thought_chain = turn
            .thought_chain
            .clone()
            .or_else(|| state.last_turn.thought_chain.take());
        state.last_turn = LastTurn {
            thought_chain,
            ..turn
        };
    }

    pub fn last_turn(&self) -> LastTurn {
        self.state.lock().last_turn.clone()
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Memory for the human participant
///
/// Humans don't produce reasoning blocks, so none are kept.
#[derive(Debug)]
pub struct HumanJournal {
    name: ActorId,
    journal: Journal,
}

impl HumanJournal {
    pub fn new(name: ActorId) -> Self {
        Self {
            name,
            journal: Journal::new(),
        }
    }
}

impl MemoryStore for HumanJournal {
    fn owner(&self) -> &ActorId {
        &self.name
    }

    fn memories(&self, max: usize) -> Vec<Memory> {
        self.journal.memories(max)
    }

    fn add_memory(&self, kind: MemoryKind, content: &str, reason: Option<&str>) {
        self.journal.add_memory(kind, content, reason)
    }

    fn create_note(&self, title: &str, content: &str, reason: Option<&str>) -> Note {
        self.journal.create_note(title, content, reason)
    }

    fn notes(&self, max: usize) -> Vec<Note> {
        self.journal.notes(max)
    }

    fn recall(&self, query: &str, limit: usize) -> Vec<RecallHit> {
        self.journal.recall(query, limit)
    }

    fn record_reasoning(&self, _chain: &str) {
        tracing::debug!(actor = %self.name, "ignoring reasoning for human actor");
    }

    fn record_turn(&self, turn: LastTurn) {
        self.journal.record_turn(turn)
    }

    fn last_turn(&self) -> LastTurn {
        self.journal.last_turn()
    }
}

/// Memory and persona of a generated actor
#[derive(Debug)]
pub struct AgentMind {
    name: ActorId,
    profile: String,
    journal: Journal,
}

impl AgentMind {
    pub fn new(name: ActorId, profile: impl Into<String>) -> Self {
        Self {
            name,
            profile: profile.into(),
            journal: Journal::new(),
        }
    }
}

impl MemoryStore for AgentMind {
    fn owner(&self) -> &ActorId {
        &self.name
    }

    fn profile(&self) -> Option<&str> {
        Some(&self.profile)
    }

    fn memories(&self, max: usize) -> Vec<Memory> {
        self.journal.memories(max)
    }

    fn add_memory(&self, kind: MemoryKind, content: &str, reason: Option<&str>) {
        self.journal.add_memory(kind, content, reason)
    }

    fn create_note(&self, title: &str, content: &str, reason: Option<&str>) -> Note {
        self.journal.create_note(title, content, reason)
    }

    fn notes(&self, max: usize) -> Vec<Note> {
        self.journal.notes(max)
    }

    fn recall(&self, query: &str, limit: usize) -> Vec<RecallHit> {
        self.journal.recall(query, limit)
    }

    fn record_reasoning(&self, chain: &str) {
        self.journal.set_thought_chain(chain);
        self.journal.add_memory(MemoryKind::Reasoning, chain, None);
    }

    fn record_turn(&self, turn: LastTurn) {
        self.journal.record_turn(turn)
    }

    fn last_turn(&self) -> LastTurn {
        self.journal.last_turn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memories_are_most_recent_oldest_first() {
        let journal = Journal::new();
        for i in 0..5 {
            journal.add_memory(MemoryKind::Action, &format!("step {i}"), None);
        }
        let recent: Vec<String> = journal.memories(2).into_iter().map(|m| m.content).collect();
        assert_eq!(recent, ["step 3", "step 4"]);
        assert_eq!(journal.memories(100).len(), 5);
    }

    #[test]
    fn test_note_titles_are_case_insensitive() {
        let journal = Journal::new();
        journal.create_note("Dream", "first", None);
        journal.create_note("dream", "second", Some("again"));
        let notes = journal.notes(10);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "second");
        assert_eq!(notes[0].reason.as_deref(), Some("again"));
    }

    #[test]
    fn test_recall_ranks_exact_title_first() {
        let journal = Journal::new();
        journal.create_note("Kitchen", "the bread is stale", None);
        journal.create_note("bread plan", "bake fresh bread tomorrow", None);
        journal.create_note("weather", "rain all week", None);

        let hits = journal.recall("kitchen", 16);
        assert_eq!(hits[0].note.title, "Kitchen");
        assert_eq!(hits[0].score, 1.0);

        let hits = journal.recall("fresh bread", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].note.title, "bread plan");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_agent_keeps_reasoning() {
        let mind = AgentMind::new(ActorId::from("Ada"), "curious");
        mind.record_reasoning("I should look around");
        mind.record_turn(LastTurn {
            command: Some("LOOK".into()),
            ..LastTurn::default()
        });

        let last = mind.last_turn();
        assert_eq!(last.thought_chain.as_deref(), Some("I should look around"));
        assert_eq!(mind.memories(1)[0].kind, MemoryKind::Reasoning);

        let human = HumanJournal::new(ActorId::from("T"));
        human.record_reasoning("ignored");
        assert!(human.memories(10).is_empty());
    }
}
