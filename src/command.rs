//! Keyword classification of finalized recognizer text.
//!
//! Matching is whole-word: a keyword matches only at token boundaries, so
//! "остановка" does not trigger the stop set even though it contains
//! "стоп". Multi-word phrases match as a consecutive token run.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// Control action carried by a classified utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Begin an utterance recording.
    Start,
    /// Suspend command recognition.
    Pause,
    /// Resume command recognition.
    Resume,
    /// Shut the whole front end down.
    Stop,
    /// Recognized text that matched no keyword set.
    None,
}

/// A finalized, normalized utterance with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub text: String,
    pub kind: CommandKind,
}

/// Configurable keyword sets, one per control action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeywordSets {
    pub start: Vec<String>,
    pub pause: Vec<String>,
    pub resume: Vec<String>,
    pub stop: Vec<String>,
}

impl Default for KeywordSets {
    fn default() -> Self {
        let owned = |set: &[&str]| set.iter().map(|s| s.to_string()).collect();
        Self {
            start: owned(defaults::START_COMMANDS),
            pause: owned(defaults::PAUSE_COMMANDS),
            resume: owned(defaults::RESUME_COMMANDS),
            stop: owned(defaults::STOP_COMMANDS),
        }
    }
}

/// Normalizes recognizer text: trim plus lowercase.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Classifies normalized text against the configured keyword sets.
pub struct CommandClassifier {
    start: Vec<Vec<String>>,
    pause: Vec<Vec<String>>,
    resume: Vec<Vec<String>>,
    stop: Vec<Vec<String>>,
}

impl CommandClassifier {
    pub fn new(sets: KeywordSets) -> Self {
        let prepare = |phrases: Vec<String>| -> Vec<Vec<String>> {
            phrases
                .iter()
                .map(|p| {
                    tokenize(&normalize(p))
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .filter(|tokens: &Vec<String>| !tokens.is_empty())
                .collect()
        };
        Self {
            start: prepare(sets.start),
            pause: prepare(sets.pause),
            resume: prepare(sets.resume),
            stop: prepare(sets.stop),
        }
    }

    /// Classifies `text` (assumed already normalized).
    ///
    /// Overlapping matches resolve by precedence: Stop wins over Start,
    /// Start over Pause, Pause over Resume.
    pub fn classify(&self, text: &str) -> CommandKind {
        let tokens = tokenize(text);
        if contains_phrase(&tokens, &self.stop) {
            CommandKind::Stop
        } else if contains_phrase(&tokens, &self.start) {
            CommandKind::Start
        } else if contains_phrase(&tokens, &self.pause) {
            CommandKind::Pause
        } else if contains_phrase(&tokens, &self.resume) {
            CommandKind::Resume
        } else {
            CommandKind::None
        }
    }

    /// Normalizes raw recognizer text and wraps it with its classification.
    pub fn event(&self, raw: &str) -> CommandEvent {
        let text = normalize(raw);
        let kind = self.classify(&text);
        CommandEvent { text, kind }
    }
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new(KeywordSets::default())
    }
}

fn contains_phrase(tokens: &[&str], phrases: &[Vec<String>]) -> bool {
    phrases.iter().any(|phrase| {
        tokens
            .windows(phrase.len())
            .any(|window| window.iter().zip(phrase.iter()).all(|(t, p)| *t == p))
    })
}
