//! Ordered, one-at-a-time delivery of locally loaded cards.
//!
//! A single consumer task owns the receiving end of a bounded queue. Cards are
//! sent in the order their ids were enqueued, and the consumer never starts a
//! send before the previous one has completed. Consecutive card sends are at
//! least `send_interval` apart. A card that cannot be sent
//! because the channel is not open stays at the head of the pending list and
//! is retried when the next command arrives; there is no retry timer.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use shared::{domain::CardId, protocol::ClientRequest};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{reconciler::SessionState, transport::OutboundChannel, ClientEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Pause between two consecutive card sends.
    pub send_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(200),
            queue_capacity: 64,
        }
    }
}

#[derive(Debug)]
enum SequencerCommand {
    Transmit(CardId),
    Play,
}

#[derive(Debug, Clone)]
pub struct SequencerHandle {
    tx: mpsc::Sender<SequencerCommand>,
}

impl SequencerHandle {
    pub async fn enqueue(&self, card_id: CardId) -> Result<()> {
        self.tx
            .send(SequencerCommand::Transmit(card_id))
            .await
            .map_err(|_| anyhow!("transmission queue is closed"))
    }

    /// Asks for `play` once every card enqueued so far has been delivered.
    pub async fn request_play(&self) -> Result<()> {
        self.tx
            .send(SequencerCommand::Play)
            .await
            .map_err(|_| anyhow!("transmission queue is closed"))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Sent,
    AlreadySent,
    Unavailable,
}

pub struct TransmissionSequencer {
    state: Arc<Mutex<SessionState>>,
    outbound: Arc<dyn OutboundChannel>,
    events: broadcast::Sender<ClientEvent>,
    config: SequencerConfig,
    pending: VecDeque<CardId>,
    play_requested: bool,
    last_card_sent: Option<Instant>,
}

impl TransmissionSequencer {
    pub fn spawn(
        state: Arc<Mutex<SessionState>>,
        outbound: Arc<dyn OutboundChannel>,
        events: broadcast::Sender<ClientEvent>,
        config: SequencerConfig,
    ) -> (SequencerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let sequencer = Self {
            state,
            outbound,
            events,
            config,
            pending: VecDeque::new(),
            play_requested: false,
            last_card_sent: None,
        };
        let task = tokio::spawn(sequencer.run(rx));
        (SequencerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SequencerCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SequencerCommand::Transmit(card_id) => self.pending.push_back(card_id),
                SequencerCommand::Play => self.play_requested = true,
            }
            self.drain().await;
        }
        debug!(
            pending = self.pending.len(),
            "transmission queue closed; sequencer stopping"
        );
    }

    async fn drain(&mut self) {
        while let Some(card_id) = self.pending.front().cloned() {
            match self.transmit(&card_id).await {
                Ok(Delivery::Sent | Delivery::AlreadySent) => {
                    self.pending.pop_front();
                }
                Ok(Delivery::Unavailable) => {
                    let unsent = self.state.lock().await.cards.pending_count();
                    warn!(
                        card_id = %card_id,
                        queued = self.pending.len(),
                        unsent,
                        "channel not open; card transmission stalled"
                    );
                    return;
                }
                Err(err) => {
                    warn!(card_id = %card_id, error = %err, "card transmission failed");
                    let _ = self.events.send(ClientEvent::Error(format!(
                        "failed to send card {card_id}: {err}"
                    )));
                    self.end_session_if_closed(&err).await;
                    return;
                }
            }
        }

        if self.play_requested {
            self.maybe_send_play().await;
        }
    }

    async fn transmit(&mut self, card_id: &CardId) -> Result<Delivery> {
        let card = {
            let guard = self.state.lock().await;
            match guard.cards.get(card_id) {
                Some(card) if !card.transmitted => card,
                Some(_) => return Ok(Delivery::AlreadySent),
                None => {
                    warn!(card_id = %card_id, "queued card is not in the store");
                    return Ok(Delivery::AlreadySent);
                }
            }
        };

        if !self.outbound.is_open() {
            return Ok(Delivery::Unavailable);
        }
        if let Some(last) = self.last_card_sent {
            sleep_until(last + self.config.send_interval).await;
        }
        self.outbound
            .send(&ClientRequest::BingoCard {
                card: card.payload(),
            })
            .await?;
        self.last_card_sent = Some(Instant::now());

        self.state.lock().await.cards.set_transmitted(card_id);
        info!(card_id = %card_id, language = %card.language, "card transmitted");
        let _ = self
            .events
            .send(ClientEvent::CardTransmitted(card_id.clone()));
        Ok(Delivery::Sent)
    }

    async fn maybe_send_play(&mut self) {
        let all_transmitted = self.state.lock().await.cards.all_transmitted();
        if !all_transmitted {
            debug!("play deferred until every card is transmitted");
            return;
        }
        if !self.outbound.is_open() {
            warn!("channel not open; play signal stalled");
            return;
        }
        match self.outbound.send(&ClientRequest::Play).await {
            Ok(()) => {
                self.play_requested = false;
                info!("play sent");
                let _ = self.events.send(ClientEvent::PlaySent);
            }
            Err(err) => {
                warn!(error = %err, "play signal failed");
                let _ = self
                    .events
                    .send(ClientEvent::Error(format!("failed to send play: {err}")));
                self.end_session_if_closed(&err).await;
            }
        }
    }

    /// A send that left the channel latched closed ends the session, without
    /// waiting for the reader to notice the broken socket.
    async fn end_session_if_closed(&self, err: &anyhow::Error) {
        if self.outbound.is_open() {
            return;
        }
        let first_close = self.state.lock().await.require_reload();
        if first_close {
            warn!(error = %err, "channel closed by failed send; reload required");
            let _ = self.events.send(ClientEvent::Disconnected {
                reason: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
