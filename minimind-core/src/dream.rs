//! Dream synthesis helpers
//!
//! A dream is a shuffled retelling of an actor's memories. Recent memories are
//! mixed with a random sample of older ones, cut into short runs so local
//! order survives, and the runs are shuffled before being handed to the
//! synthesizer.

use crate::memory::Memory;
use minimind_types::ActorId;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

/// Prefix of the memory a dream leaves behind
pub const DREAM_MEMORY_PREFIX: &str = "You've had a dream: ";

/// Title of the note a dream is stored under
pub const DREAM_NOTE_TITLE: &str = "Dream";

pub const DEFAULT_DREAM_QUESTION: &str = "Who am I?";

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block pattern"));

fn is_dream_memory(memory: &Memory) -> bool {
    memory
        .content
        .to_lowercase()
        .contains(&DREAM_MEMORY_PREFIX.to_lowercase())
}

/// Pick and shuffle the memories a dream is built from. `history` is oldest
/// first; the last `recent` non-dream memories are always included.
pub fn dream_fragments<R: Rng + ?Sized>(history: &[Memory], recent: usize, rng: &mut R) -> Vec<Memory> {
    let usable: Vec<&Memory> = history.iter().filter(|m| !is_dream_memory(m)).collect();
    let split = usable.len().saturating_sub(recent);
    let (older, latest) = usable.split_at(split);

    let wanted = (latest.len() * 2).max(1).min(older.len());
    let mut combined: Vec<&Memory> = latest.to_vec();
    combined.extend(older.choose_multiple(rng, wanted).copied());

    let mut chunks: Vec<&[&Memory]> = Vec::new();
    let mut rest: &[&Memory] = &combined;
    while !rest.is_empty() {
        let size = rng.gen_range(2..=4).min(rest.len());
        let (chunk, tail) = rest.split_at(size);
        chunks.push(chunk);
        rest = tail;
    }
    chunks.shuffle(rng);

    chunks
        .into_iter()
        .flatten()
        .map(|memory| (*memory).clone())
        .collect()
}

/// Build `(prompt, system)` for a dream
pub fn dream_prompt(actor: &ActorId, question: Option<&str>, fragments: &[Memory]) -> (String, String) {
    let question = question
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_DREAM_QUESTION);

    let mut memories = String::new();
    for memory in fragments {
        memories.push_str(memory.content.trim());
        memories.push_str("\n\n");
    }

    let prompt = format!(
        "{memories}\nYou are telling the story of {actor}, who sends you this message to consider:\n\n\
         ```\n{question}\n```\n\n\
         Write a dream-like, second-person stream of consciousness through everything {actor} \
         has experienced above, good and bad, exciting and mundane. Pose counterfactuals and let \
         their consequences play out. What are they not doing, not seeing, not wondering about? \
         Change any detail that makes the point more vivid, and borrow the usual dream themes \
         freely. Write it as a first-person dream narrative that feels true to the character."
    );
    let system = format!(
        "You are telling the story of a character's memories, who wants: '{question}'. \
         Create a dream-like reflection of the whole of their experience that helps them see \
         what their memories do not already say. Do not repeat any previous dreams."
    );
    (prompt, system)
}

/// Remove `<think>...</think>` blocks and trim. Falls back to the raw text if
/// nothing would be left.
pub fn strip_reasoning(text: &str) -> String {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        text.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKind;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn memory(content: &str) -> Memory {
        Memory {
            kind: MemoryKind::Action,
            content: content.to_string(),
            reason: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_fragments_skip_old_dreams_and_keep_recent() {
        let mut history: Vec<Memory> = (0..20).map(|i| memory(&format!("m{i}"))).collect();
        history.push(memory("You've had a dream: flying"));
        history.push(memory("m20"));

        let mut rng = StdRng::seed_from_u64(7);
        let fragments = dream_fragments(&history, 3, &mut rng);
        let contents: Vec<&str> = fragments.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(fragments.len(), 3 + 6);
        assert!(!contents.iter().any(|c| c.contains("dream")));
        for recent in ["m18", "m19", "m20"] {
            assert!(contents.contains(&recent));
        }
    }

    #[test]
    fn test_fragments_with_short_history() {
        let history = vec![memory("only")];
        let mut rng = StdRng::seed_from_u64(1);
        let fragments = dream_fragments(&history, 256, &mut rng);
        assert_eq!(fragments.len(), 1);
        assert!(dream_fragments(&[], 256, &mut rng).is_empty());
    }

    #[test]
    fn test_prompt_uses_question() {
        let (prompt, system) = dream_prompt(&ActorId::from("Ada"), None, &[memory("saw a cat")]);
        assert!(prompt.starts_with("saw a cat"));
        assert!(prompt.contains("Who am I?"));
        assert!(system.contains("Who am I?"));

        let (prompt, _) = dream_prompt(&ActorId::from("Ada"), Some("Why the kitchen?"), &[]);
        assert!(prompt.contains("Why the kitchen?"));
    }

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(
            strip_reasoning("<think>plan\nmore</think>\nI was flying."),
            "I was flying."
        );
        assert_eq!(strip_reasoning("<think>only</think>"), "<think>only</think>");
    }
}
