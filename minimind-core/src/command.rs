//! Command surface: verbs, the parsed command enum, and the line parser
//!
//! One command per line, verb first and case-insensitive, with an optional
//! trailing rationale after the separator:
//!
//! ```text
//! GO TO Kitchen | because hungry
//! NOTE groceries: eggs, flour
//! ```

use crate::config::CommandConfig;
use crate::error::{ValidationError, ValidationResult};
use minimind_types::Location;
use std::fmt;

/// Known command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    GoTo,
    Say,
    Shout,
    Note,
    Recall,
    Look,
    Emote,
    Dream,
}

impl Verb {
    pub const ALL: [Verb; 8] = [
        Verb::GoTo,
        Verb::Say,
        Verb::Shout,
        Verb::Note,
        Verb::Recall,
        Verb::Look,
        Verb::Emote,
        Verb::Dream,
    ];

    /// Canonical spelling as typed by actors
    pub fn keyword(&self) -> &'static str {
        match self {
            Verb::GoTo => "GO TO",
            Verb::Say => "SAY",
            Verb::Shout => "SHOUT",
            Verb::Note => "NOTE",
            Verb::Recall => "RECALL",
            Verb::Look => "LOOK",
            Verb::Emote => "EMOTE",
            Verb::Dream => "DREAM",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Verb> {
        Verb::ALL
            .into_iter()
            .find(|v| v.keyword().eq_ignore_ascii_case(word.trim()))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GoTo { place: Location },
    Say { text: String },
    Shout { text: String },
    Note { title: String, content: String },
    Recall { query: String },
    Look,
    Emote { action: String },
    Dream,
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Command::GoTo { .. } => Verb::GoTo,
            Command::Say { .. } => Verb::Say,
            Command::Shout { .. } => Verb::Shout,
            Command::Note { .. } => Verb::Note,
            Command::Recall { .. } => Verb::Recall,
            Command::Look => Verb::Look,
            Command::Emote { .. } => Verb::Emote,
            Command::Dream => Verb::Dream,
        }
    }

    /// Reflective commands are handled by the pipeline itself and never reach
    /// the world
    pub fn is_reflective(&self) -> bool {
        matches!(self, Command::Recall { .. } | Command::Dream)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::GoTo { place } => write!(f, "GO TO {place}"),
            Command::Say { text } => write!(f, "SAY {text}"),
            Command::Shout { text } => write!(f, "SHOUT {text}"),
            Command::Note { title, content } if content.is_empty() => write!(f, "NOTE {title}"),
            Command::Note { title, content } => write!(f, "NOTE {title}: {content}"),
            Command::Recall { query } => write!(f, "RECALL {query}"),
            Command::Look => f.write_str("LOOK"),
            Command::Emote { action } => write!(f, "EMOTE {action}"),
            Command::Dream => f.write_str("DREAM"),
        }
    }
}

/// Decorative lines are never commands: bullets, headers, quotes, and
/// anything talking about "command"
pub fn is_decorative(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with(['*', '#', '-', '>', '"']) {
        return true;
    }
    trimmed.to_ascii_lowercase().contains("command")
}

/// Line parser with the configured separator and aliases
#[derive(Debug, Clone)]
pub struct CommandParser {
    separator: String,
    /// (phrase, verb), longest phrase first so `GO TO` beats a `GO` alias
    phrases: Vec<(String, Verb)>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(&CommandConfig::default())
    }
}

impl CommandParser {
    pub fn new(config: &CommandConfig) -> Self {
        let mut phrases: Vec<(String, Verb)> = Verb::ALL
            .into_iter()
            .map(|v| (v.keyword().to_string(), v))
            .collect();

        for (alias, target) in &config.aliases {
            match Verb::from_keyword(target) {
                Some(verb) => phrases.push((alias.trim().to_ascii_uppercase(), verb)),
                None => tracing::warn!(alias = %alias, target = %target, "alias targets an unknown verb, ignoring"),
            }
        }
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            separator: config.rationale_separator.clone(),
            phrases,
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Split `command | rationale`. The rationale is `None` when absent or blank.
    pub fn split_rationale<'a>(&self, line: &'a str) -> (&'a str, Option<&'a str>) {
        match line.split_once(self.separator.as_str()) {
            Some((command, rationale)) => {
                let rationale = rationale.trim();
                (
                    command.trim(),
                    (!rationale.is_empty()).then_some(rationale),
                )
            }
            None => (line.trim(), None),
        }
    }

    /// Match a leading verb (or alias). Returns the verb and the remainder of
    /// the line after it.
    pub fn match_verb<'a>(&self, line: &'a str) -> Option<(Verb, &'a str)> {
        let line = line.trim_start();
        for (phrase, verb) in &self.phrases {
            let Some(head) = line.get(..phrase.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(phrase) {
                continue;
            }
            let rest = &line[phrase.len()..];
            let bounded = rest.is_empty()
                || rest.starts_with(char::is_whitespace)
                || rest.starts_with(self.separator.as_str());
            if bounded {
                return Some((*verb, rest));
            }
        }
        None
    }

    /// True when the line is a candidate command (not decorative, known verb)
    pub fn is_command_line(&self, line: &str) -> bool {
        let line = line.trim();
        !line.is_empty() && !is_decorative(line) && self.match_verb(line).is_some()
    }

    /// Parse one command line. Any rationale suffix is ignored here; use
    /// [`split_rationale`](Self::split_rationale) to get it.
    pub fn parse(&self, text: &str) -> ValidationResult<Command> {
        let (command, _) = self.split_rationale(text.lines().next().unwrap_or(""));
        if command.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        let (verb, rest) = self
            .match_verb(command)
            .ok_or_else(|| ValidationError::UnrecognizedVerb(command.to_string()))?;
        let arg = rest.trim();

        let require = |expected: &'static str| -> ValidationResult<String> {
            if arg.is_empty() {
                Err(ValidationError::MissingArgument {
                    verb: verb.keyword(),
                    expected,
                })
            } else {
                Ok(arg.to_string())
            }
        };

        Ok(match verb {
            Verb::GoTo => Command::GoTo {
                place: Location::new(require("a place")?),
            },
            Verb::Say => Command::Say {
                text: require("something to say")?,
            },
            Verb::Shout => Command::Shout {
                text: require("something to shout")?,
            },
            Verb::Emote => Command::Emote {
                action: require("an action")?,
            },
            Verb::Recall => Command::Recall {
                query: require("a query")?,
            },
            Verb::Note => {
                let (title, content) = match arg.split_once(':') {
                    Some((title, content)) => (title.trim(), content.trim()),
                    None => (arg, ""),
                };
                if title.is_empty() {
                    return Err(ValidationError::MissingArgument {
                        verb: verb.keyword(),
                        expected: "a title",
                    });
                }
                Command::Note {
                    title: title.to_string(),
                    content: content.to_string(),
                }
            }
            Verb::Look => Command::Look,
            Verb::Dream => Command::Dream,
        })
    }
}
