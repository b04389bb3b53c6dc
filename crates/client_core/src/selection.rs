use std::sync::Arc;

use shared::domain::Language;

use crate::card_store::Card;

/// Picks the card to present after a word call.
///
/// The best card in the round's language wins as long as it has at least one
/// mark; otherwise the best card overall is used. Ties go to the lowest index.
pub fn select_best_card(cards: &[Arc<Card>], round_language: Option<Language>) -> Option<usize> {
    let mut best_overall: Option<(usize, usize)> = None;
    let mut best_for_language: Option<(usize, usize)> = None;

    for (index, card) in cards.iter().enumerate() {
        let marked = card.marked_count();
        if best_overall.map_or(true, |(_, best)| marked > best) {
            best_overall = Some((index, marked));
        }
        if Some(card.language) == round_language
            && best_for_language.map_or(true, |(_, best)| marked > best)
        {
            best_for_language = Some((index, marked));
        }
    }

    match best_for_language {
        Some((index, marked)) if marked > 0 => Some(index),
        _ => best_overall.map(|(index, _)| index),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SelectionState {
    selected: Option<usize>,
    automatic: bool,
}

impl SelectionState {
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Applies a manual pick. Ignored once a word call has driven selection.
    pub fn choose(&mut self, index: usize) -> bool {
        if self.automatic {
            return false;
        }
        self.selected = Some(index);
        true
    }

    /// Re-runs the heuristic; returns whether the selected index moved.
    pub fn recompute(&mut self, cards: &[Arc<Card>], round_language: Option<Language>) -> bool {
        self.automatic = true;
        let next = select_best_card(cards, round_language);
        let changed = next != self.selected;
        self.selected = next;
        changed
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
