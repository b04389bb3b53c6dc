use shared::{
    domain::{CardId, Language},
    protocol::ServerEvent,
};
use tracing::{debug, info, warn};

use crate::{card_store::CardStore, selection::SelectionState, ClientEvent};

/// Ambient round and game state driven by the server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundState {
    pub current_word: Option<String>,
    /// Language the server attached to the current word, if any.
    pub word_language: Option<Language>,
    pub current_language: Option<Language>,
    pub round_number: Option<u32>,
    pub total_rounds: Option<u32>,
    pub player_count: u32,
    pub game_started: bool,
    pub game_over: bool,
    pub round_winners: Option<Vec<String>>,
    pub final_winners: Option<Vec<String>>,
}

/// Everything one session mutates in response to local input and server events.
#[derive(Debug, Default)]
pub struct SessionState {
    pub cards: CardStore,
    pub round: RoundState,
    pub selection: SelectionState,
    pub needs_reload: bool,
}

impl SessionState {
    /// Flags the session for a rebuild. Returns whether this call set the flag.
    pub fn require_reload(&mut self) -> bool {
        !std::mem::replace(&mut self.needs_reload, true)
    }

    /// Decodes and applies one inbound text frame.
    ///
    /// Malformed frames are logged and dropped without touching state.
    pub fn apply_frame(&mut self, text: &str) -> Vec<ClientEvent> {
        match ServerEvent::decode(text) {
            Ok(event) => self.apply(event),
            Err(err) => {
                warn!(error = %err, "dropping malformed server frame");
                vec![ClientEvent::Error(err.to_string())]
            }
        }
    }

    /// Applies one server event in full and returns the notifications it produced.
    pub fn apply(&mut self, event: ServerEvent) -> Vec<ClientEvent> {
        if self.round.game_over && !matches!(event, ServerEvent::PlayerCount { .. }) {
            debug!(kind = event.kind(), "ignoring event after game end");
            return Vec::new();
        }

        match event {
            ServerEvent::PlayerCount { count } => {
                self.round.player_count = count;
                vec![ClientEvent::PlayerCountChanged(count)]
            }
            ServerEvent::GameStarted => {
                if self.round.game_started {
                    return Vec::new();
                }
                info!("game started");
                self.round.game_started = true;
                vec![ClientEvent::GameStarted]
            }
            ServerEvent::RoundStart {
                language,
                round_number,
                total_rounds,
            } => {
                info!(%language, ?round_number, ?total_rounds, "round started");
                self.round.current_language = Some(language);
                self.round.round_number = round_number;
                self.round.total_rounds = total_rounds;
                self.round.round_winners = None;
                vec![ClientEvent::RoundStarted {
                    language,
                    round_number,
                    total_rounds,
                }]
            }
            ServerEvent::WordSelected {
                word,
                language,
                card_ids,
            } => self.apply_word_selected(word, language, card_ids),
            ServerEvent::RoundEnd { language, winners } => {
                info!(%language, ?winners, "round ended");
                self.round.current_word = None;
                self.round.word_language = None;
                self.round.current_language = None;
                match winners.filter(|winners| !winners.is_empty()) {
                    Some(winners) => {
                        self.round.round_winners = Some(winners.clone());
                        vec![ClientEvent::RoundWinners { language, winners }]
                    }
                    None => Vec::new(),
                }
            }
            ServerEvent::GameEnd { winners } => {
                info!(?winners, "game ended");
                self.round.current_word = None;
                self.round.word_language = None;
                self.round.current_language = None;
                self.round.game_over = true;
                self.round.final_winners = Some(winners.clone());
                vec![ClientEvent::FinalWinners { winners }]
            }
            ServerEvent::Unknown => {
                debug!("ignoring unrecognized server event");
                Vec::new()
            }
        }
    }

    fn apply_word_selected(
        &mut self,
        word: String,
        language: Option<Language>,
        card_ids: Vec<CardId>,
    ) -> Vec<ClientEvent> {
        debug!(%word, ?language, targets = card_ids.len(), "word selected");
        self.round.current_word = Some(word.clone());
        self.round.word_language = language;

        let round_language = language.or(self.round.current_language);
        let selection = &mut self.selection;
        let mut selection_changed = false;
        let marked = self.cards.mark_word_on(&card_ids, &word, |cards| {
            selection_changed = selection.recompute(cards, round_language);
        });

        let mut events = vec![ClientEvent::WordCalled {
            word,
            language,
            marked,
        }];
        if selection_changed {
            if let Some(index) = self.selection.selected() {
                events.push(ClientEvent::SelectionChanged { index });
            }
        }
        events
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
