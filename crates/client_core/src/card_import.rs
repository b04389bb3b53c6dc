//! Parsing of card files and manual card entry.

use shared::{domain::CardId, error::InputError};
use tracing::debug;

use crate::card_store::Card;

/// Parses one card per line: `<id> <word> <word> ...`.
///
/// Lines with fewer than two tokens are skipped.
pub fn parse_card_file(text: &str) -> Vec<Card> {
    text.lines()
        .enumerate()
        .filter_map(|(line_no, line)| {
            let mut tokens = line.split_whitespace();
            let id = tokens.next()?;
            let words: Vec<String> = tokens.map(str::to_string).collect();
            if words.is_empty() {
                debug!(line = line_no + 1, "skipping card line without words");
                return None;
            }
            Some(Card::new(CardId::new(id), words))
        })
        .collect()
}

/// Builds a card from a free-text id and a newline separated word list.
pub fn manual_card(id: &str, word_list: &str) -> Result<Card, InputError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(InputError::EmptyCardId);
    }
    let words: Vec<String> = word_list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        return Err(InputError::EmptyWordList {
            card_id: id.to_string(),
        });
    }
    Ok(Card::new(CardId::new(id), words))
}

pub fn validate_user_name(name: &str) -> Result<String, InputError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InputError::EmptyUserName);
    }
    Ok(name.to_string())
}

#[cfg(test)]
#[path = "tests/card_import_tests.rs"]
mod tests;
