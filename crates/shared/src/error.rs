use thiserror::Error;

/// Local input rejected at the point of entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("player name must not be empty")]
    EmptyUserName,
    #[error("card id must not be empty")]
    EmptyCardId,
    #[error("card {card_id} has no words")]
    EmptyWordList { card_id: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed server event: {0}")]
    Malformed(#[from] serde_json::Error),
}
