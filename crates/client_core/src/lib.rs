use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use shared::{
    domain::{CardId, Language, SessionId},
    protocol::ClientRequest,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{error, info, warn};

pub mod card_import;
pub mod card_store;
pub mod reconciler;
pub mod selection;
pub mod sequencer;
pub mod transport;

pub use card_store::{Card, CardStore, CardStoreError};
pub use reconciler::{RoundState, SessionState};
pub use sequencer::{SequencerConfig, SequencerHandle, TransmissionSequencer};
pub use transport::{OutboundChannel, WsOutbound};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    PlayerCountChanged(u32),
    GameStarted,
    RoundStarted {
        language: Language,
        round_number: Option<u32>,
        total_rounds: Option<u32>,
    },
    WordCalled {
        word: String,
        language: Option<Language>,
        marked: Vec<CardId>,
    },
    SelectionChanged {
        index: usize,
    },
    RoundWinners {
        language: Language,
        winners: Vec<String>,
    },
    FinalWinners {
        winners: Vec<String>,
    },
    CardTransmitted(CardId),
    PlaySent,
    /// The channel closed; the session has to be rebuilt from scratch.
    Disconnected {
        reason: String,
    },
    Error(String),
}

/// Read-only view of a session for presentation.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub cards: Vec<Arc<Card>>,
    pub round: RoundState,
    pub selected: Option<usize>,
    pub needs_reload: bool,
}

/// One player session: identity, card state, outbound channel and the
/// transmission sequencer bound to it.
pub struct BingoClient {
    session_id: SessionId,
    user: String,
    state: Arc<Mutex<SessionState>>,
    outbound: Arc<dyn OutboundChannel>,
    sequencer: SequencerHandle,
    sequencer_task: JoinHandle<()>,
    /// Serialises append-then-enqueue so queue order matches store order.
    intake: Mutex<()>,
    events: broadcast::Sender<ClientEvent>,
}

impl BingoClient {
    /// Opens the session channel, registers and starts reading server events.
    pub async fn connect(
        server_url: &str,
        user: &str,
        config: SequencerConfig,
    ) -> Result<Arc<Self>> {
        let user = card_import::validate_user_name(user)?;
        let session_id = SessionId::random();
        let url = transport::session_ws_url(server_url, session_id)?;
        let (outbound, reader) = transport::connect(&url).await?;
        let client = Self::with_outbound(session_id, &user, Arc::new(outbound), config).await?;
        client.spawn_inbound(reader);
        Ok(client)
    }

    /// Builds a session over an already open channel.
    ///
    /// `register` goes out before anything else is queued on `outbound`.
    pub async fn with_outbound(
        session_id: SessionId,
        user: &str,
        outbound: Arc<dyn OutboundChannel>,
        config: SequencerConfig,
    ) -> Result<Arc<Self>> {
        let user = card_import::validate_user_name(user)?;
        outbound
            .send(&ClientRequest::Register { user: user.clone() })
            .await
            .context("failed to register player")?;
        info!(%session_id, %user, "player registered");

        let (events, _) = broadcast::channel(1024);
        let state = Arc::new(Mutex::new(SessionState::default()));
        let (sequencer, sequencer_task) = TransmissionSequencer::spawn(
            Arc::clone(&state),
            Arc::clone(&outbound),
            events.clone(),
            config,
        );
        Ok(Arc::new(Self {
            session_id,
            user,
            state,
            outbound,
            sequencer,
            sequencer_task,
            intake: Mutex::new(()),
            events,
        }))
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Reads frames until the stream ends, then tears the session down.
    pub fn spawn_inbound<S>(self: &Arc<Self>, mut reader: S) -> JoinHandle<()>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Send + Unpin + 'static,
    {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let reason = loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => client.handle_frame(&text).await,
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        error!(error = %err, "websocket receive failed");
                        let _ = client
                            .events
                            .send(ClientEvent::Error(format!("websocket receive failed: {err}")));
                        break err.to_string();
                    }
                    None => break "connection ended".to_string(),
                }
            };
            client.close(reason).await;
        })
    }

    /// Applies one inbound frame and publishes what it produced.
    pub async fn handle_frame(&self, text: &str) {
        let produced = {
            let mut guard = self.state.lock().await;
            guard.apply_frame(text)
        };
        for event in produced {
            let _ = self.events.send(event);
        }
    }

    /// Marks the channel closed; queued transmissions become no-ops.
    pub async fn close(&self, reason: String) {
        self.outbound.mark_closed();
        let first_close = self.state.lock().await.require_reload();
        if first_close {
            warn!(session_id = %self.session_id, %reason, "session channel closed; reload required");
            let _ = self.events.send(ClientEvent::Disconnected { reason });
        }
    }

    /// Appends cards in order and queues each for transmission.
    ///
    /// Cards whose id is already loaded are skipped and reported. Returns the
    /// ids that were accepted.
    pub async fn add_cards(&self, cards: Vec<Card>) -> Result<Vec<CardId>> {
        let _intake = self.intake.lock().await;
        let mut accepted = Vec::with_capacity(cards.len());
        {
            let mut guard = self.state.lock().await;
            for card in cards {
                let card_id = card.id.clone();
                match guard.cards.append(card) {
                    Ok(_) => accepted.push(card_id),
                    Err(err) => {
                        warn!(card_id = %card_id, error = %err, "card rejected");
                        let _ = self.events.send(ClientEvent::Error(err.to_string()));
                    }
                }
            }
        }
        for card_id in &accepted {
            self.sequencer.enqueue(card_id.clone()).await?;
        }
        Ok(accepted)
    }

    pub async fn import_card_file(&self, text: &str) -> Result<Vec<CardId>> {
        let cards = card_import::parse_card_file(text);
        info!(count = cards.len(), "cards parsed from file");
        self.add_cards(cards).await
    }

    pub async fn add_manual_card(&self, id: &str, word_list: &str) -> Result<CardId> {
        let card = card_import::manual_card(id, word_list)?;
        let card_id = card.id.clone();
        let accepted = self.add_cards(vec![card]).await?;
        if accepted.is_empty() {
            return Err(CardStoreError::DuplicateId(card_id).into());
        }
        Ok(card_id)
    }

    /// Queues `play` behind every card loaded so far.
    pub async fn play(&self) -> Result<()> {
        self.sequencer.request_play().await
    }

    /// Manual card pick; has no effect once word calls drive the selection.
    pub async fn choose_card(&self, index: usize) -> Result<Arc<Card>> {
        let mut guard = self.state.lock().await;
        let card = guard.cards.select(index)?;
        if guard.selection.choose(index) {
            drop(guard);
            let _ = self.events.send(ClientEvent::SelectionChanged { index });
        }
        Ok(card)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let guard = self.state.lock().await;
        SessionSnapshot {
            cards: guard.cards.snapshot(),
            round: guard.round.clone(),
            selected: guard.selection.selected(),
            needs_reload: guard.needs_reload,
        }
    }
}

impl Drop for BingoClient {
    fn drop(&mut self) {
        self.sequencer_task.abort();
    }
}

#[cfg(test)]
#[path = "tests/test_support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
