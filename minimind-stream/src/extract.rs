//! Command extraction from generated text
//!
//! Generated text is a reasoning segment wrapped in markers followed by one
//! command line. Lines are only trusted once they are complete (newline seen,
//! or the stream has ended).

use minimind_core::command::is_decorative;
use minimind_core::config::StreamingConfig;
use minimind_core::CommandParser;
use regex::Regex;

/// A command line pulled out of generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// The command without its rationale
    pub command: String,
    pub rationale: Option<String>,
    /// The full line as generated
    pub line: String,
    /// True when no line matched a verb and the first plain line was taken
    pub best_effort: bool,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    parser: CommandParser,
    open: String,
    close: Option<String>,
    blocks: Option<Regex>,
}

impl Extractor {
    pub fn new(parser: CommandParser, config: &StreamingConfig) -> Self {
        let close = config
            .reasoning_close
            .clone()
            .filter(|marker| !marker.is_empty());
        let blocks = close.as_ref().and_then(|close| {
            Regex::new(&format!(
                "(?s){}.*?{}",
                regex::escape(&config.reasoning_open),
                regex::escape(close)
            ))
            .ok()
        });
        Self {
            parser,
            open: config.reasoning_open.clone(),
            close,
            blocks,
        }
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// True when extraction has to wait for a reasoning close marker
    pub fn expects_reasoning(&self) -> bool {
        self.close.is_some()
    }

    /// Byte offset just past the first close marker in `raw`
    pub fn find_close(&self, raw: &str) -> Option<usize> {
        let close = self.close.as_deref()?;
        raw.find(close).map(|start| start + close.len())
    }

    /// The reasoning segment of `raw`: the text between the markers, or
    /// everything before the close marker when the open marker is missing
    pub fn reasoning_block(&self, raw: &str) -> Option<String> {
        let close = self.close.as_deref()?;
        let before = &raw[..raw.find(close)?];
        let inner = match before.find(self.open.as_str()) {
            Some(start) => &before[start + self.open.len()..],
            None => before,
        };
        let inner = inner.trim();
        (!inner.is_empty()).then(|| inner.to_string())
    }

    /// First complete command line in `buffer`. Until `ended`, a trailing
    /// line without a newline is still being written and is not considered.
    pub fn extract_complete_lines(&self, buffer: &str, ended: bool) -> Option<Extracted> {
        let complete = if ended {
            buffer
        } else {
            &buffer[..buffer.rfind('\n')? + 1]
        };
        complete
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !is_decorative(line))
            .find(|line| self.parser.match_verb(line).is_some())
            .map(|line| self.split(line, false))
    }

    /// Extraction over a finished response: strip reasoning, rerun the line
    /// rules, then fall back to the first plain line
    pub fn extract_final(&self, full: &str) -> Option<Extracted> {
        let text = self.strip_reasoning(full);
        if let Some(found) = self.extract_complete_lines(&text, true) {
            return Some(found);
        }
        text.lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !is_decorative(line))
            .map(|line| self.split(line, true))
    }

    /// Remove every reasoning block; an unmatched close marker drops
    /// everything before it
    pub fn strip_reasoning(&self, text: &str) -> String {
        let Some(close) = self.close.as_deref() else {
            return text.to_string();
        };
        let stripped = match &self.blocks {
            Some(blocks) => blocks.replace_all(text, "").into_owned(),
            None => text.to_string(),
        };
        match stripped.rfind(close) {
            Some(start) => stripped[start + close.len()..].to_string(),
            None => stripped,
        }
    }

    fn split(&self, line: &str, best_effort: bool) -> Extracted {
        let (command, rationale) = self.parser.split_rationale(line);
        Extracted {
            command: command.to_string(),
            rationale: rationale.map(str::to_string),
            line: line.to_string(),
            best_effort,
        }
    }
}
