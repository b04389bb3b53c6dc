use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{BingoClient, ClientEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Settings file; missing files fall back to defaults.
    #[arg(long, default_value = "bingo.toml")]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user: Option<String>,
    /// Card file: one card per line, `<id> <word> <word> ...`.
    #[arg(long)]
    cards: Option<PathBuf>,
    #[arg(long, requires = "words")]
    card_id: Option<String>,
    /// Comma separated words for `--card-id`.
    #[arg(long, requires = "card_id")]
    words: Option<String>,
    /// Submit cards without asking the server to start.
    #[arg(long)]
    no_play: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.config);
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(user) = args.user {
        settings.user_name = Some(user);
    }
    if let Some(cards) = args.cards {
        settings.cards_file = Some(cards);
    }
    let user = settings
        .user_name
        .clone()
        .ok_or_else(|| anyhow!("a player name is required (--user or BINGO_USER)"))?;

    let client =
        BingoClient::connect(&settings.server_url, &user, settings.sequencer_config()).await?;
    let mut events = client.subscribe_events();
    println!(
        "Connected as {} (session {})",
        client.user(),
        client.session_id()
    );

    if let Some(path) = &settings.cards_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read card file {}", path.display()))?;
        let accepted = client.import_card_file(&text).await?;
        println!("Loaded {} card(s) from {}", accepted.len(), path.display());
    }
    if let (Some(card_id), Some(words)) = (args.card_id, args.words) {
        let word_list = words.split(',').collect::<Vec<_>>().join("\n");
        let card_id = client.add_manual_card(&card_id, &word_list).await?;
        println!("Loaded card {card_id}");
    }
    if !args.no_play {
        client.play().await?;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let done = matches!(
                        event,
                        ClientEvent::FinalWinners { .. } | ClientEvent::Disconnected { .. }
                    );
                    print_event(&client, &event).await;
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    Ok(())
}

async fn print_event(client: &BingoClient, event: &ClientEvent) {
    match event {
        ClientEvent::PlayerCountChanged(count) => println!("Players online: {count}"),
        ClientEvent::GameStarted => println!("Game started"),
        ClientEvent::RoundStarted {
            language,
            round_number,
            total_rounds,
        } => match (round_number, total_rounds) {
            (Some(round), Some(total)) => println!("Round {round}/{total}: {language}"),
            _ => println!("Round started: {language}"),
        },
        ClientEvent::WordCalled {
            word,
            language,
            marked,
        } => match language {
            Some(language) => println!(
                "Word called: {word} [{language}] (marked on {} card(s))",
                marked.len()
            ),
            None => println!("Word called: {word} (marked on {} card(s))", marked.len()),
        },
        ClientEvent::SelectionChanged { index } => {
            let snapshot = client.snapshot().await;
            if let Some(card) = snapshot.cards.get(*index) {
                println!(
                    "Best card: {} ({}/{} marked)",
                    card.id,
                    card.marked_count(),
                    card.words.len()
                );
                for row in card.rows() {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|word| {
                            if card.is_marked(word) {
                                format!("[{word}]")
                            } else {
                                word.clone()
                            }
                        })
                        .collect();
                    println!("  {}", cells.join(" "));
                }
            }
        }
        ClientEvent::RoundWinners { language, winners } => {
            println!("Round winners ({language}): {}", winners.join(", "))
        }
        ClientEvent::FinalWinners { winners } => {
            println!("Game over. Winners: {}", winners.join(", "))
        }
        ClientEvent::CardTransmitted(card_id) => println!("Card {card_id} submitted"),
        ClientEvent::PlaySent => println!("Waiting for the game to start"),
        ClientEvent::Disconnected { reason } => {
            println!("Disconnected: {reason}. Restart to join again.")
        }
        ClientEvent::Error(message) => eprintln!("Error: {message}"),
    }
}
