//! Integration tests for slp-relay.
//!
//! These tests drive whole games through the public API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use slp_relay::codec::PREAMBLE_SIZE;
use slp_relay::protocol::{
    build_frame, encode_handshake, PayloadSizeTable, StreamReassembler, GAME_END, GAME_START,
    KEEP_ALIVE, POST_FRAME_UPDATE, PRE_FRAME_UPDATE,
};
use slp_relay::status::{BoxFuture, SceneBackend, SceneInfo, StatusIndicator};
use slp_relay::{FileEvent, RelayConfig, RelaySession, RelayService};

/// Scene backend that counts visibility changes.
#[derive(Default)]
struct CountingBackend {
    toggles: Mutex<Vec<bool>>,
}

impl SceneBackend for CountingBackend {
    fn list_scenes(&self) -> BoxFuture<'_, slp_relay::error::Result<Vec<SceneInfo>>> {
        Box::pin(async {
            Ok(vec![SceneInfo {
                name: "Main".to_string(),
                sources: vec!["slp-live".to_string()],
            }])
        })
    }

    fn set_source_visible<'a>(
        &'a self,
        _scene: &'a str,
        _source: &'a str,
        visible: bool,
    ) -> BoxFuture<'a, slp_relay::error::Result<()>> {
        Box::pin(async move {
            self.toggles.lock().push(visible);
            Ok(())
        })
    }
}

fn config(dir: &std::path::Path) -> RelayConfig {
    let mut config = RelayConfig {
        output_dir: dir.to_path_buf(),
        console_nick: "Netplay".to_string(),
        ..RelayConfig::default()
    };
    config.id = 0;
    config.relay.base_port = 0;
    config.relay.bind_address = [127, 0, 0, 1].into();
    config
}

fn post_frame(frame_index: i32, player: u8, follower: bool, character: u8) -> Vec<u8> {
    let mut payload = frame_index.to_be_bytes().to_vec();
    payload.extend_from_slice(&[player, follower as u8, character, 0, 0, 0]);
    build_frame(POST_FRAME_UPDATE, &payload)
}

/// Handshake, one post-frame update at -100, game end with `end_method`.
fn short_game(end_method: u8) -> Vec<u8> {
    let mut bytes = encode_handshake(&[(POST_FRAME_UPDATE, 10), (GAME_END, 1)]);
    bytes.extend(post_frame(-100, 0, false, 18));
    bytes.extend(build_frame(GAME_END, &[end_method]));
    bytes
}

/// A game with `frames` frame updates for two players.
fn long_game(frames: i32) -> Vec<u8> {
    let mut bytes = encode_handshake(&[
        (GAME_START, 4),
        (PRE_FRAME_UPDATE, 3),
        (POST_FRAME_UPDATE, 10),
        (GAME_END, 1),
    ]);
    bytes.extend(build_frame(GAME_START, &[1, 2, 3, 4]));
    for i in 0..frames {
        let frame_index = -123 + i;
        for player in 0..2u8 {
            bytes.extend(build_frame(PRE_FRAME_UPDATE, &[player, 0, 0]));
            bytes.extend(post_frame(frame_index, player, false, 2 + player));
        }
        bytes.extend(post_frame(frame_index, 1, true, 14));
    }
    bytes.extend(build_frame(GAME_END, &[2]));
    bytes
}

fn finished_paths(events: &Mutex<Vec<FileEvent>>) -> Vec<std::path::PathBuf> {
    events
        .lock()
        .iter()
        .filter_map(|e| match e {
            FileEvent::RecordingFinished(path) => Some(path.clone()),
            _ => None,
        })
        .collect()
}

fn collect_events(session: RelaySession) -> (RelaySession, Arc<Mutex<Vec<FileEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let session = session.with_file_change(Arc::new(move |e| sink.lock().push(e)));
    (session, events)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// A no-contest game below the pulse threshold.
#[tokio::test(start_paused = true)]
async fn test_no_contest_game_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(CountingBackend::default());
    let status = StatusIndicator::new(backend.clone(), "slp-live", -60);
    status.refresh_targets().await.unwrap();

    let (mut session, events) =
        collect_events(RelaySession::new(&config(dir.path())).with_status(status));

    session.ingest(&short_game(7)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(backend.toggles.lock().is_empty());

    let paths = finished_paths(&events);
    assert_eq!(paths.len(), 1);
    let bytes = std::fs::read(&paths[0]).unwrap();

    let body_len = short_game(7).len();
    assert_eq!(&bytes[11..15], &(body_len as u32).to_be_bytes());
    assert_eq!(&bytes[PREAMBLE_SIZE..PREAMBLE_SIZE + body_len], &short_game(7)[..]);

    let trailer = &bytes[PREAMBLE_SIZE + body_len..];
    assert!(trailer.starts_with(b"U\x08metadata{"));
    assert!(contains(trailer, b"U\x09lastFrame"));
    assert!(contains(trailer, &[b'l', 0xFF, 0xFF, 0xFF, 0x9C]));
    assert!(contains(trailer, b"U\x0bconsoleNickSU\x07Netplay"));
    assert!(contains(trailer, b"U\x0218l\x00\x00\x00\x01"));
    assert!(trailer.ends_with(b"}}"));
}

/// A normal game end holds the indicator for the extended time.
#[tokio::test(start_paused = true)]
async fn test_game_end_extends_hold() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(CountingBackend::default());
    let status = StatusIndicator::new(backend.clone(), "slp-live", -60);
    status.refresh_targets().await.unwrap();
    let mut session = RelaySession::new(&config(dir.path())).with_status(status);

    let mut game = encode_handshake(&[(POST_FRAME_UPDATE, 10), (GAME_END, 1)]);
    game.extend(post_frame(100, 0, false, 9));
    game.extend(build_frame(GAME_END, &[2]));
    session.ingest(&game).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(session.status().unwrap().is_visible());
    assert_eq!(*backend.toggles.lock(), vec![true]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!session.status().unwrap().is_visible());
    assert_eq!(*backend.toggles.lock(), vec![true, false]);
}

/// Files are identical whatever the delivery boundaries.
#[tokio::test]
async fn test_chunking_does_not_change_output() {
    let game = long_game(40);
    let mut outputs = Vec::new();

    for chunk_size in [1usize, 7, 64, game.len()] {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, events) = collect_events(RelaySession::new(&config(dir.path())));

        for chunk in game.chunks(chunk_size) {
            session.ingest(chunk).await.unwrap();
        }

        let paths = finished_paths(&events);
        assert_eq!(paths.len(), 1, "chunk size {}", chunk_size);
        let bytes = std::fs::read(&paths[0]).unwrap();

        // Start time differs per run; compare body and length only.
        outputs.push(bytes[..PREAMBLE_SIZE + game.len()].to_vec());
    }

    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

/// Keep-alive tokens between frames are relayed but never recorded.
#[tokio::test]
async fn test_keep_alive_elided_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, events) = collect_events(RelaySession::new(&config(dir.path())));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session.broadcaster_mut().connect(1, tx);

    let game = short_game(2);
    let split = game.len() - 2;
    let mut stream = game[..split].to_vec();
    stream.extend_from_slice(KEEP_ALIVE);
    stream.extend_from_slice(&game[split..]);

    // Split the token across deliveries too.
    let cut = split + 2;
    session.ingest(&stream[..cut]).await.unwrap();
    session.ingest(&stream[cut..]).await.unwrap();

    let bytes = std::fs::read(&finished_paths(&events)[0]).unwrap();
    assert_eq!(&bytes[PREAMBLE_SIZE..PREAMBLE_SIZE + game.len()], &game[..]);
    assert_eq!(&bytes[11..15], &(game.len() as u32).to_be_bytes());

    let mut relayed = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        relayed.extend_from_slice(&chunk);
    }
    assert_eq!(relayed, stream);
}

/// Two back-to-back games produce two files and reset the relay backlog.
#[tokio::test]
async fn test_consecutive_games() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, events) = collect_events(RelaySession::new(&config(dir.path())));

    session.ingest(&long_game(3)).await.unwrap();
    let first_backlog = session.broadcaster().buffered_len();
    assert_eq!(first_backlog, long_game(3).len());

    session.ingest(&short_game(2)).await.unwrap();
    assert_eq!(session.broadcaster().buffered_len(), short_game(2).len());

    let paths = finished_paths(&events);
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);
    assert_eq!(events.lock().len(), 4);
}

/// A handshake mid-recording abandons the first file.
#[tokio::test]
async fn test_handshake_mid_recording_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, events) = collect_events(RelaySession::new(&config(dir.path())));

    let game = long_game(2);
    session.ingest(&game[..game.len() - 2]).await.unwrap();
    session.ingest(&short_game(2)).await.unwrap();

    let events = events.lock();
    assert_eq!(events.len(), 3);
    let FileEvent::RecordingStarted(abandoned) = &events[0] else {
        panic!("expected start event");
    };
    let bytes = std::fs::read(abandoned).unwrap();
    assert_eq!(&bytes[11..15], &[0, 0, 0, 0]);
}

/// Frame extraction for the recording uses the table of its own session.
#[test]
fn test_table_drives_reassembly() {
    let game = long_game(1);
    let handshake_len = encode_handshake(&[
        (GAME_START, 4),
        (PRE_FRAME_UPDATE, 3),
        (POST_FRAME_UPDATE, 10),
        (GAME_END, 1),
    ])
    .len();

    let table = PayloadSizeTable::from_handshake(&game[1..handshake_len]).unwrap();
    let mut reassembler = StreamReassembler::new();
    let frames = reassembler.ingest(&game[handshake_len..], &table);

    // game start, 2x (pre, post), follower post, game end
    assert_eq!(frames.len(), 7);
    assert_eq!(frames[0].code, GAME_START);
    assert_eq!(frames[6].code, GAME_END);
    assert!(reassembler.is_empty());
}

/// A client joining mid-game receives everything since the handshake.
#[tokio::test]
async fn test_late_joiner_receives_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let service = RelayService::builder(config(dir.path()))
        .start()
        .await
        .unwrap();
    let addr = service.relay_addr().unwrap();

    let game = long_game(30);
    let (head, tail) = game.split_at(500);
    service.ingest(Bytes::copy_from_slice(head)).await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.ingest(Bytes::copy_from_slice(tail)).await.unwrap();

    let mut received = vec![0u8; game.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, game);

    service.shutdown().await.unwrap();
}

/// A client that never receives anything is dropped after the idle timeout.
#[tokio::test]
async fn test_idle_client_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.relay.idle_timeout_secs = 1;
    let service = RelayService::builder(config).start().await.unwrap();

    let mut client = TcpStream::connect(service.relay_addr().unwrap()).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    service.shutdown().await.unwrap();
}
