use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-session identifier used to derive the channel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session-local card identifier chosen by the player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Spanish,
    English,
    Portuguese,
    Dutch,
}

impl Language {
    /// Declaration order; the first entry doubles as the classifier fallback.
    pub const ALL: [Language; 4] = [
        Language::Spanish,
        Language::English,
        Language::Portuguese,
        Language::Dutch,
    ];

    pub const DEFAULT: Language = Language::ALL[0];

    pub const fn layout(self) -> CardLayout {
        match self {
            Language::Spanish => CardLayout::new(3, 5),
            Language::English => CardLayout::new(2, 7),
            Language::Portuguese => CardLayout::new(4, 4),
            Language::Dutch => CardLayout::new(3, 4),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Language::Spanish => "spanish",
            Language::English => "english",
            Language::Portuguese => "portuguese",
            Language::Dutch => "dutch",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grid shape of a card for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLayout {
    pub rows: usize,
    pub cols: usize,
}

impl CardLayout {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub const fn total(self) -> usize {
        self.rows * self.cols
    }
}

/// Maps a card's word count to its language.
///
/// Counts that match no layout fall back to [`Language::DEFAULT`]; the result
/// says nothing about the words themselves.
pub fn classify(word_count: usize) -> Language {
    Language::ALL
        .into_iter()
        .find(|language| language.layout().total() == word_count)
        .unwrap_or(Language::DEFAULT)
}
