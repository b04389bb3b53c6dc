use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{channel::mpsc as futures_mpsc, SinkExt};
use tokio::{net::TcpListener, sync::mpsc};

use super::*;
use crate::test_support::{wait_until, RecordingOutbound};

fn fast_config() -> SequencerConfig {
    SequencerConfig {
        send_interval: Duration::from_millis(1),
        queue_capacity: 8,
    }
}

async fn client_with(outbound: Arc<RecordingOutbound>) -> Arc<BingoClient> {
    BingoClient::with_outbound(SessionId::random(), "Ana", outbound, fast_config())
        .await
        .expect("client")
}

async fn next_matching<F>(rx: &mut broadcast::Receiver<ClientEvent>, wanted: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event stream");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

fn text(frame: &str) -> Result<Message, tungstenite::Error> {
    Ok(Message::Text(frame.to_string()))
}

#[tokio::test]
async fn registration_is_the_first_frame() {
    let outbound = Arc::new(RecordingOutbound::new());
    let client = client_with(outbound.clone()).await;
    client
        .import_card_file("c1 SOL LUNA MAR")
        .await
        .expect("import");

    let probe = outbound.clone();
    wait_until(move || probe.sent().len() == 2).await;
    assert_eq!(
        outbound.sent()[0],
        ClientRequest::Register {
            user: "Ana".to_string()
        }
    );
    assert_eq!(client.user(), "Ana");
}

#[tokio::test]
async fn blank_user_name_is_rejected_before_sending() {
    let outbound = Arc::new(RecordingOutbound::new());
    let result =
        BingoClient::with_outbound(SessionId::random(), "   ", outbound.clone(), fast_config())
            .await;
    assert!(result.is_err());
    assert!(outbound.sent().is_empty());
}

#[tokio::test]
async fn imported_cards_are_sent_in_file_order_before_play() {
    let outbound = Arc::new(RecordingOutbound::with_send_delay(Duration::from_millis(2)));
    let client = client_with(outbound.clone()).await;

    let accepted = client
        .import_card_file("c1 SOL LUNA MAR\nlonely\nc2 HOND KAT\nc3 DOG")
        .await
        .expect("import");
    assert_eq!(
        accepted,
        vec![CardId::new("c1"), CardId::new("c2"), CardId::new("c3")]
    );
    client.play().await.expect("play");

    let probe = outbound.clone();
    wait_until(move || probe.sent().len() == 5).await;
    let sent = outbound.sent();
    assert!(matches!(sent[0], ClientRequest::Register { .. }));
    assert_eq!(
        outbound.sent_card_ids(),
        vec![CardId::new("c1"), CardId::new("c2"), CardId::new("c3")]
    );
    assert_eq!(sent[4], ClientRequest::Play);
    assert_eq!(outbound.max_in_flight(), 1);
}

#[tokio::test]
async fn duplicate_card_ids_are_reported_and_skipped() {
    let outbound = Arc::new(RecordingOutbound::new());
    let client = client_with(outbound.clone()).await;
    let mut events = client.subscribe_events();

    client.add_manual_card("c1", "SOL\nLUNA").await.expect("manual");
    let accepted = client.import_card_file("c1 MAR RIO").await.expect("import");
    assert!(accepted.is_empty());
    next_matching(&mut events, |event| matches!(event, ClientEvent::Error(_))).await;

    assert!(client.add_manual_card("c1", "OTRA").await.is_err());
    assert!(client.add_manual_card("", "OTRA").await.is_err());

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.cards.len(), 1);
    assert_eq!(snapshot.cards[0].words, vec!["SOL", "LUNA"]);
}

#[tokio::test]
async fn inbound_frames_drive_marks_and_selection() {
    let outbound = Arc::new(RecordingOutbound::new());
    let client = client_with(outbound.clone()).await;
    client
        .import_card_file("en DOG CAT\nnl HOND KAT")
        .await
        .expect("import");
    let mut events = client.subscribe_events();

    let (tx, rx) = futures_mpsc::unbounded();
    client.spawn_inbound(rx);
    tx.unbounded_send(text(r#"{"type":"player_count","count":2}"#))
        .expect("frame");
    tx.unbounded_send(text("definitely not json")).expect("frame");
    tx.unbounded_send(text(r#"{"type":"round_start","language":"dutch"}"#))
        .expect("frame");
    tx.unbounded_send(text(
        r#"{"type":"word_selected","word":"HOND","card_ids":["nl"]}"#,
    ))
    .expect("frame");

    next_matching(&mut events, |event| {
        matches!(event, ClientEvent::Error(message) if message.contains("malformed"))
    })
    .await;
    let selection = next_matching(&mut events, |event| {
        matches!(event, ClientEvent::SelectionChanged { .. })
    })
    .await;
    assert_eq!(selection, ClientEvent::SelectionChanged { index: 1 });

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.round.player_count, 2);
    assert_eq!(snapshot.round.current_word.as_deref(), Some("HOND"));
    assert_eq!(snapshot.selected, Some(1));
    assert!(snapshot.cards[1].is_marked("HOND"));
    assert!(snapshot.cards[0].marked_words.is_empty());
}

#[tokio::test]
async fn stream_end_closes_session_and_halts_sends() {
    let outbound = Arc::new(RecordingOutbound::new());
    let client = client_with(outbound.clone()).await;
    let mut events = client.subscribe_events();

    let (tx, rx) = futures_mpsc::unbounded::<Result<Message, tungstenite::Error>>();
    client.spawn_inbound(rx);
    drop(tx);

    let event = next_matching(&mut events, |event| {
        matches!(event, ClientEvent::Disconnected { .. })
    })
    .await;
    assert_eq!(
        event,
        ClientEvent::Disconnected {
            reason: "connection ended".to_string()
        }
    );
    assert!(!outbound.is_open());

    client
        .import_card_file("late SOL")
        .await
        .expect("import still accepted locally");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(outbound.sent().len(), 1, "only registration went out");

    let snapshot = client.snapshot().await;
    assert!(snapshot.needs_reload);
    assert!(!snapshot.cards[0].transmitted);
}

#[tokio::test]
async fn manual_choice_holds_until_first_word_call() {
    let outbound = Arc::new(RecordingOutbound::new());
    let client = client_with(outbound).await;
    client
        .import_card_file("a DOG CAT\nb SOL LUNA")
        .await
        .expect("import");

    let chosen = client.choose_card(1).await.expect("choose");
    assert_eq!(chosen.id, CardId::new("b"));
    assert_eq!(client.snapshot().await.selected, Some(1));
    assert!(client.choose_card(7).await.is_err());

    client
        .handle_frame(r#"{"type":"word_selected","word":"DOG","card_ids":["a"]}"#)
        .await;
    assert_eq!(client.snapshot().await.selected, Some(0));

    client.choose_card(1).await.expect("valid index");
    assert_eq!(client.snapshot().await.selected, Some(0));
}

#[derive(Clone)]
struct FakeGameServer {
    received: mpsc::UnboundedSender<ClientRequest>,
    script: Arc<Vec<String>>,
}

async fn game_ws(
    ws: WebSocketUpgrade,
    Path(_session_id): Path<String>,
    State(server): State<FakeGameServer>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| game_socket(socket, server))
}

async fn game_socket(socket: WebSocket, server: FakeGameServer) {
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(message)) = receiver.next().await {
        let AxumMessage::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<ClientRequest>(&text) else {
            continue;
        };
        let is_play = request == ClientRequest::Play;
        let _ = server.received.send(request);
        if is_play {
            for frame in server.script.iter() {
                if sender.send(AxumMessage::Text(frame.clone())).await.is_err() {
                    return;
                }
            }
            let _ = sender.send(AxumMessage::Close(None)).await;
            return;
        }
    }
}

async fn spawn_game_server(
    script: Vec<String>,
) -> Result<(String, mpsc::UnboundedReceiver<ClientRequest>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (received, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/ws/:session_id", get(game_ws))
        .with_state(FakeGameServer {
            received,
            script: Arc::new(script),
        });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), rx))
}

#[tokio::test]
async fn plays_a_full_game_over_websocket() {
    let script = [
        r#"{"type":"player_count","count":1}"#,
        r#"{"type":"game_started"}"#,
        r#"{"type":"round_start","language":"english","round_number":1,"total_rounds":1}"#,
        r#"{"type":"word_selected","word":"DOG","language":"english","card_ids":["c1"]}"#,
        r#"{"type":"round_end","language":"english","winners":["Ana"]}"#,
        r#"{"type":"game_end","winners":["Ana"]}"#,
    ]
    .iter()
    .map(|frame| frame.to_string())
    .collect();
    let (server_url, mut received) = spawn_game_server(script).await.expect("server");

    let client = BingoClient::connect(&server_url, "Ana", fast_config())
        .await
        .expect("connect");
    let mut events = client.subscribe_events();
    client
        .import_card_file("c1 DOG CAT\nc2 HOND KAT")
        .await
        .expect("import");
    client.play().await.expect("play");

    let winners = next_matching(&mut events, |event| {
        matches!(event, ClientEvent::RoundWinners { .. })
    })
    .await;
    assert_eq!(
        winners,
        ClientEvent::RoundWinners {
            language: Language::English,
            winners: vec!["Ana".to_string()],
        }
    );
    next_matching(&mut events, |event| {
        matches!(event, ClientEvent::FinalWinners { .. })
    })
    .await;
    next_matching(&mut events, |event| {
        matches!(event, ClientEvent::Disconnected { .. })
    })
    .await;

    let mut frames = Vec::new();
    while let Ok(request) = received.try_recv() {
        frames.push(request);
    }
    assert_eq!(frames.len(), 4);
    assert_eq!(
        frames[0],
        ClientRequest::Register {
            user: "Ana".to_string()
        }
    );
    assert!(matches!(&frames[1], ClientRequest::BingoCard { card } if card.id.as_str() == "c1"));
    assert!(matches!(&frames[2], ClientRequest::BingoCard { card } if card.id.as_str() == "c2"));
    assert_eq!(frames[3], ClientRequest::Play);

    let snapshot = client.snapshot().await;
    assert!(snapshot.cards[0].is_marked("DOG"));
    assert_eq!(snapshot.round.current_word, None);
    assert_eq!(snapshot.round.final_winners, Some(vec!["Ana".to_string()]));
    assert!(snapshot.round.game_started);
    assert!(snapshot.needs_reload);
}
