use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use shared::{
    domain::{classify, CardId, CardLayout, Language},
    protocol::CardPayload,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub words: Vec<String>,
    pub language: Language,
    pub marked_words: BTreeSet<String>,
    pub transmitted: bool,
}

impl Card {
    /// Builds a fresh card whose language is inferred from its word count.
    pub fn new(id: CardId, words: Vec<String>) -> Self {
        let language = classify(words.len());
        Self::with_language(id, words, language)
    }

    pub fn with_language(id: CardId, words: Vec<String>, language: Language) -> Self {
        Self {
            id,
            words,
            language,
            marked_words: BTreeSet::new(),
            transmitted: false,
        }
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|candidate| candidate == word)
    }

    pub fn is_marked(&self, word: &str) -> bool {
        self.marked_words.contains(word)
    }

    pub fn marked_count(&self) -> usize {
        self.marked_words.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.words.is_empty() && self.marked_words.len() == self.words.len()
    }

    pub fn layout(&self) -> CardLayout {
        self.language.layout()
    }

    /// Words laid out in grid rows for this card's language.
    ///
    /// Cards whose word count fell back to the default language may end
    /// with a short final row.
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.words.chunks(self.layout().cols.max(1))
    }

    pub fn payload(&self) -> CardPayload {
        CardPayload {
            id: self.id.clone(),
            words: self.words.clone(),
            language: self.language,
        }
    }

    fn with_marked(&self, word: &str) -> Option<Card> {
        if !self.contains_word(word) || self.is_marked(word) {
            return None;
        }
        let mut next = self.clone();
        next.marked_words.insert(word.to_string());
        Some(next)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardStoreError {
    #[error("card {0} is already loaded")]
    DuplicateId(CardId),
    #[error("card index {index} out of range for {len} cards")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered collection of this session's cards.
///
/// Every mutation swaps in a new `Arc<Card>`, so snapshots handed out earlier
/// never observe a half-applied update.
#[derive(Debug, Default)]
pub struct CardStore {
    cards: Vec<Arc<Card>>,
    positions: HashMap<CardId, usize>,
}

impl CardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Appends a card with cleared marks and transmission state, returning its index.
    pub fn append(&mut self, mut card: Card) -> Result<usize, CardStoreError> {
        if self.positions.contains_key(&card.id) {
            return Err(CardStoreError::DuplicateId(card.id));
        }
        card.marked_words.clear();
        card.transmitted = false;
        let index = self.cards.len();
        self.positions.insert(card.id.clone(), index);
        self.cards.push(Arc::new(card));
        Ok(index)
    }

    pub fn get(&self, card_id: &CardId) -> Option<Arc<Card>> {
        self.positions
            .get(card_id)
            .map(|&index| Arc::clone(&self.cards[index]))
    }

    pub fn select(&self, index: usize) -> Result<Arc<Card>, CardStoreError> {
        self.cards
            .get(index)
            .cloned()
            .ok_or(CardStoreError::IndexOutOfRange {
                index,
                len: self.cards.len(),
            })
    }

    pub fn snapshot(&self) -> Vec<Arc<Card>> {
        self.cards.clone()
    }

    pub fn cards(&self) -> &[Arc<Card>] {
        &self.cards
    }

    /// Marks `word` on one card. Returns whether the card changed.
    pub fn mark_word(&mut self, card_id: &CardId, word: &str) -> bool {
        let Some(&index) = self.positions.get(card_id) else {
            return false;
        };
        match self.cards[index].with_marked(word) {
            Some(next) => {
                self.cards[index] = Arc::new(next);
                true
            }
            None => false,
        }
    }

    /// Marks `word` on every listed card that holds it, then hands the
    /// committed collection to `after_commit`.
    ///
    /// `after_commit` runs exactly once per call, even when nothing changed.
    /// Returns the ids of the cards that gained a mark.
    pub fn mark_word_on<F>(&mut self, card_ids: &[CardId], word: &str, after_commit: F) -> Vec<CardId>
    where
        F: FnOnce(&[Arc<Card>]),
    {
        let mut marked = Vec::new();
        for card_id in card_ids {
            if self.mark_word(card_id, word) {
                marked.push(card_id.clone());
            }
        }
        after_commit(&self.cards);
        marked
    }

    /// Flags a card as delivered. Returns whether the flag flipped.
    pub fn set_transmitted(&mut self, card_id: &CardId) -> bool {
        let Some(&index) = self.positions.get(card_id) else {
            return false;
        };
        if self.cards[index].transmitted {
            return false;
        }
        let mut next = Card::clone(&self.cards[index]);
        next.transmitted = true;
        self.cards[index] = Arc::new(next);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.cards.iter().filter(|card| !card.transmitted).count()
    }

    pub fn all_transmitted(&self) -> bool {
        self.cards.iter().all(|card| card.transmitted)
    }
}

#[cfg(test)]
#[path = "tests/card_store_tests.rs"]
mod tests;
