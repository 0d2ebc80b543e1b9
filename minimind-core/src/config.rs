//! Configuration parsing and management.
//!
//! Everything tunable lives in one YAML file (`minimind.yml`). Every section is
//! optional; a missing section falls back to the defaults below, so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::TurnMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration struct matching the minimind.yml schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub turns: TurnRules,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub world: WorldConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

/// Scheduling currency rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRules {
    #[serde(default)]
    pub mode: TurnMode,

    #[serde(default = "default_base_cost")]
    pub base_cost: u64,

    /// When false every command costs `base_cost` (RECALL keeps its fixed cost)
    #[serde(default = "default_true")]
    pub scale_with_content: bool,

    #[serde(default = "default_say_divisor")]
    pub say_divisor: u64,

    #[serde(default = "default_shout_divisor")]
    pub shout_divisor: u64,

    #[serde(default = "default_note_divisor")]
    pub note_divisor: u64,

    #[serde(default = "default_note_divisor")]
    pub emote_divisor: u64,

    /// Total cost of a RECALL, replacing the base cost
    #[serde(default = "default_recall_cost")]
    pub recall_cost: u64,

    /// Added to the base cost for a DREAM
    #[serde(default = "default_dream_surcharge")]
    pub dream_surcharge: u64,

    /// Charged for commands the world rejects and for forfeited turns
    #[serde(default = "default_base_cost")]
    pub failure_cost: u64,
}

/// Event fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    #[serde(default = "default_dedup_threshold_ms")]
    pub dedup_threshold_ms: u64,
}

/// Streaming extraction and turn timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_reasoning_open")]
    pub reasoning_open: String,

    /// `None` means the model emits no reasoning segment and extraction starts
    /// immediately
    #[serde(default = "default_reasoning_close")]
    pub reasoning_close: Option<String>,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_cancel_ack_timeout_ms")]
    pub cancel_ack_timeout_ms: u64,

    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
}

/// Command surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_separator")]
    pub rationale_separator: String,

    /// Alias phrase -> canonical verb phrase, e.g. `"MOVE TO": "GO TO"`
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Ollama,
    Scripted,
}

/// Generation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default = "default_backend_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_context_tokens")]
    pub context_tokens: u32,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    #[serde(default = "default_stop_tokens")]
    pub stop_tokens: Vec<String>,

    /// Canned responses for the scripted backend, replayed round-robin
    #[serde(default)]
    pub script: Vec<String>,
}

/// Memory sampling sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_recent_memories")]
    pub recent_memories: usize,

    #[serde(default = "default_recent_notes")]
    pub recent_notes: usize,

    #[serde(default = "default_dream_memories")]
    pub dream_memories: usize,

    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Upper bound on one dream synthesis; kept below the turn timeout so an
    /// agent's DREAM settles inside its own turn
    #[serde(default = "default_dream_timeout_ms")]
    pub dream_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub start: String,

    /// Persona handed to the backend; ignored for the human
    #[serde(default)]
    pub profile: String,
}

/// Sandbox world layout and cast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_places")]
    pub places: Vec<String>,

    #[serde(default = "default_human")]
    pub human: Option<CastMember>,

    #[serde(default = "default_agents")]
    pub agents: Vec<CastMember>,
}

fn default_true() -> bool {
    true
}

fn default_base_cost() -> u64 {
    1
}

fn default_say_divisor() -> u64 {
    3
}

fn default_shout_divisor() -> u64 {
    2
}

fn default_note_divisor() -> u64 {
    7
}

fn default_recall_cost() -> u64 {
    2
}

fn default_dream_surcharge() -> u64 {
    4
}

fn default_window_capacity() -> usize {
    30
}

fn default_dedup_threshold_ms() -> u64 {
    2_000
}

fn default_reasoning_open() -> String {
    String::from("<think>")
}

fn default_reasoning_close() -> Option<String> {
    Some(String::from("</think>"))
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_cancel_ack_timeout_ms() -> u64 {
    2_000
}

fn default_turn_timeout_ms() -> u64 {
    60_000
}

fn default_separator() -> String {
    String::from("|")
}

fn default_backend_url() -> String {
    String::from("http://localhost:11434")
}

fn default_model() -> String {
    String::from("deepseek-r1:14b")
}

fn default_temperature() -> f32 {
    0.7
}

fn default_context_tokens() -> u32 {
    32_768
}

fn default_repeat_penalty() -> f32 {
    1.1
}

fn default_stop_tokens() -> Vec<String> {
    vec![
        "Explanation:".into(),
        "Let me explain:".into(),
        "To explain my reasoning:".into(),
    ]
}

fn default_recent_memories() -> usize {
    13
}

fn default_recent_notes() -> usize {
    7
}

fn default_dream_memories() -> usize {
    256
}

fn default_recall_limit() -> usize {
    16
}

fn default_dream_timeout_ms() -> u64 {
    45_000
}

fn default_places() -> Vec<String> {
    vec!["Town Square".into(), "Kitchen".into(), "Library".into()]
}

fn default_human() -> Option<CastMember> {
    Some(CastMember {
        name: "T".into(),
        start: "Town Square".into(),
        profile: String::new(),
    })
}

fn default_agents() -> Vec<CastMember> {
    vec![
        CastMember {
            name: "Ada".into(),
            start: "Town Square".into(),
            profile: "Ada is a restless inventor who talks to anyone nearby.".into(),
        },
        CastMember {
            name: "Bram".into(),
            start: "Kitchen".into(),
            profile: "Bram is a baker of few words who notices everything.".into(),
        },
    ]
}

impl Default for TurnRules {
    fn default() -> Self {
        Self {
            mode: TurnMode::default(),
            base_cost: default_base_cost(),
            scale_with_content: true,
            say_divisor: default_say_divisor(),
            shout_divisor: default_shout_divisor(),
            note_divisor: default_note_divisor(),
            emote_divisor: default_note_divisor(),
            recall_cost: default_recall_cost(),
            dream_surcharge: default_dream_surcharge(),
            failure_cost: default_base_cost(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            dedup_threshold_ms: default_dedup_threshold_ms(),
        }
    }
}

impl BusConfig {
    pub fn dedup_threshold(&self) -> Duration {
        Duration::from_millis(self.dedup_threshold_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            reasoning_open: default_reasoning_open(),
            reasoning_close: default_reasoning_close(),
            settle_delay_ms: default_settle_delay_ms(),
            cancel_ack_timeout_ms: default_cancel_ack_timeout_ms(),
            turn_timeout_ms: default_turn_timeout_ms(),
        }
    }
}

impl StreamingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_ack_timeout_ms)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            rationale_separator: default_separator(),
            aliases: HashMap::new(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_backend_url(),
            model: default_model(),
            temperature: default_temperature(),
            context_tokens: default_context_tokens(),
            repeat_penalty: default_repeat_penalty(),
            stop_tokens: default_stop_tokens(),
            script: Vec::new(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_memories: default_recent_memories(),
            recent_notes: default_recent_notes(),
            dream_memories: default_dream_memories(),
            recall_limit: default_recall_limit(),
            dream_timeout_ms: default_dream_timeout_ms(),
        }
    }
}

impl MemoryConfig {
    pub fn dream_timeout(&self) -> Duration {
        Duration::from_millis(self.dream_timeout_ms)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            places: default_places(),
            human: default_human(),
            agents: default_agents(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;

        // Store config file path for diagnostics
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // serde_yaml maps an empty document to unit, not to an empty mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SimConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let divisors = [
            ("turns.say_divisor", self.turns.say_divisor),
            ("turns.shout_divisor", self.turns.shout_divisor),
            ("turns.note_divisor", self.turns.note_divisor),
            ("turns.emote_divisor", self.turns.emote_divisor),
        ];
        for (field, value) in divisors {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "divisor must be at least 1".into(),
                });
            }
        }
        if self.bus.window_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "bus.window_capacity",
                reason: "window must hold at least one event".into(),
            });
        }
        if self.commands.rationale_separator.is_empty() {
            return Err(ConfigError::Invalid {
                field: "commands.rationale_separator",
                reason: "separator cannot be empty".into(),
            });
        }
        Ok(())
    }
}
