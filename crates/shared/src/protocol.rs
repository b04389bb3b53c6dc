use serde::{Deserialize, Serialize};

use crate::{
    domain::{CardId, Language},
    error::ProtocolError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub id: CardId,
    pub words: Vec<String>,
    pub language: Language,
}

/// Frames sent from the client to the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Register { user: String },
    BingoCard { card: CardPayload },
    Play,
}

/// Frames pushed by the game server, dispatched on the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    PlayerCount {
        count: u32,
    },
    GameStarted,
    RoundStart {
        language: Language,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round_number: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_rounds: Option<u32>,
    },
    WordSelected {
        word: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<Language>,
        #[serde(default)]
        card_ids: Vec<CardId>,
    },
    RoundEnd {
        language: Language,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winners: Option<Vec<String>>,
    },
    GameEnd {
        #[serde(default)]
        winners: Vec<String>,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::PlayerCount { .. } => "player_count",
            ServerEvent::GameStarted => "game_started",
            ServerEvent::RoundStart { .. } => "round_start",
            ServerEvent::WordSelected { .. } => "word_selected",
            ServerEvent::RoundEnd { .. } => "round_end",
            ServerEvent::GameEnd { .. } => "game_end",
            ServerEvent::Unknown => "unknown",
        }
    }
}
