//! Connection-lifecycle tests against an in-process WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use voicegate_engine::{
    ClassicDialect, ConnectionConfig, Engine, EngineError, HandlerTable, StreamingTaskDialect,
};

/// Session state for tests: everything a handler observes goes down this
/// channel.
struct Session {
    tx: mpsc::UnboundedSender<String>,
}

fn session_channel() -> (Session, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Session { tx }, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn config_for(addr: std::net::SocketAddr) -> ConnectionConfig {
    ConnectionConfig::with_token(format!("ws://{addr}/ws/v1"), "app", "tok")
}

#[tokio::test]
async fn retry_budget_allows_four_transient_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let server_attempts = attempts.clone();
    tokio::spawn(async move {
        // Drop the first four sockets before the upgrade completes, then
        // accept a real WebSocket connection and hold it open.
        for _ in 0..4 {
            let (stream, _) = listener.accept().await.unwrap();
            server_attempts.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
        let (stream, _) = listener.accept().await.unwrap();
        server_attempts.fetch_add(1, Ordering::SeqCst);
        let ws = accept_async(stream).await.unwrap();
        let (_sink, mut source) = ws.split();
        while let Some(Ok(_)) = source.next().await {}
    });

    let (session, _rx) = session_channel();
    let engine = Engine::new(config_for(addr), HandlerTable::new(), ClassicDialect, session);
    engine.connect().await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    engine.shutdown().unwrap();
}

#[tokio::test]
async fn retry_budget_is_exhausted_after_five_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let server_attempts = attempts.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            server_attempts.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let (session, _rx) = session_channel();
    let engine = Engine::new(config_for(addr), HandlerTable::new(), ClassicDialect, session);
    let err = engine.connect().await.unwrap_err();
    assert!(matches!(err, EngineError::Transport(_)));

    // No further dials happen after the budget is spent.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn connected_handler_fires_before_connect_returns() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (_sink, mut source) = ws.split();
        while let Some(Ok(_)) = source.next().await {}
    });

    let (session, mut rx) = session_channel();
    let table = HandlerTable::for_namespace("SpeechRecognizer").on_connected(
        |engine: &Engine<Session>, _| {
            engine.session().tx.send("connected".into()).ok();
        },
    );
    let engine = Engine::new(config_for(addr), table, ClassicDialect, session);
    engine.connect().await.unwrap();
    // The handler ran synchronously inside connect, so the event is already
    // buffered.
    assert_eq!(rx.try_recv().unwrap(), "connected");
    engine.shutdown().unwrap();
}

#[tokio::test]
async fn reconnect_closes_previous_connection_and_observes_grace() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let server_connections = connections.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            server_connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    let (_sink, mut source) = ws.split();
                    while let Some(Ok(_)) = source.next().await {}
                }
            });
        }
    });

    let (session, mut rx) = session_channel();
    let table = HandlerTable::for_namespace("SpeechRecognizer").on_connected(
        |engine: &Engine<Session>, _| {
            engine.session().tx.send("connected".into()).ok();
        },
    );
    let engine = Engine::new(config_for(addr), table, ClassicDialect, session);

    engine.connect().await.unwrap();
    assert_eq!(next_event(&mut rx).await, "connected");

    let reconnect_started = Instant::now();
    engine.connect().await.unwrap();
    assert!(reconnect_started.elapsed() >= Duration::from_millis(100));
    assert_eq!(next_event(&mut rx).await, "connected");
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    engine.shutdown().unwrap();
}

#[tokio::test]
async fn commands_and_raw_data_reach_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (_sink, mut source) = ws.split();
        while let Some(Ok(message)) = source.next().await {
            match message {
                Message::Text(text) => {
                    frames_tx.send(format!("text:{text}")).ok();
                }
                Message::Binary(data) => {
                    frames_tx.send(format!("binary:{}", data.len())).ok();
                }
                _ => {}
            }
        }
    });

    let (session, _rx) = session_channel();
    let engine = Engine::new(config_for(addr), HandlerTable::new(), ClassicDialect, session);
    engine.connect().await.unwrap();

    engine.cmd("hello gateway").unwrap();
    engine.send_raw_data(vec![0u8; 320]).unwrap();

    assert_eq!(next_event(&mut frames_rx).await, "text:hello gateway");
    assert_eq!(next_event(&mut frames_rx).await, "binary:320");
    engine.shutdown().unwrap();
}

#[tokio::test]
async fn inbound_frames_are_dispatched_in_arrival_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        sink.send(Message::Text(
            r#"{"header":{"namespace":"SpeechRecognizer","name":"RecognitionStarted","task_id":"t1"}}"#.into(),
        ))
        .await
        .unwrap();
        sink.send(Message::Text(
            r#"{"header":{"namespace":"SpeechRecognizer","name":"RecognitionCompleted","task_id":"t1"}}"#.into(),
        ))
        .await
        .unwrap();
        while let Some(Ok(_)) = source.next().await {}
    });

    let (session, mut rx) = session_channel();
    let table = HandlerTable::for_namespace("SpeechRecognizer")
        .on("RecognitionStarted", |engine: &Engine<Session>, _| {
            engine.session().tx.send("started".into()).ok();
        })
        .on("RecognitionCompleted", |engine: &Engine<Session>, _| {
            engine.session().tx.send("completed".into()).ok();
        });
    let engine = Engine::new(config_for(addr), table, ClassicDialect, session);
    engine.connect().await.unwrap();

    assert_eq!(next_event(&mut rx).await, "started");
    assert_eq!(next_event(&mut rx).await, "completed");
    engine.shutdown().unwrap();
}

#[tokio::test]
async fn binary_frame_without_raw_handler_halts_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        sink.send(Message::Binary(vec![0u8; 16])).await.unwrap();
        while let Some(Ok(_)) = source.next().await {}
    });

    let (session, _rx) = session_channel();
    let engine = Engine::new(
        config_for(addr),
        HandlerTable::new(),
        StreamingTaskDialect,
        session,
    );
    engine.connect().await.unwrap();

    // The invariant violation tears down this session's connection; other
    // sessions (and the process) are unaffected.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if matches!(engine.cmd("ping"), Err(EngineError::NotConnected)) {
            break;
        }
        assert!(Instant::now() < deadline, "engine did not halt");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn peer_close_reaches_closed_handler_with_error_flag() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(None).await.ok();
    });

    let (session, mut rx) = session_channel();
    let table = HandlerTable::for_namespace("SpeechRecognizer").on_closed(
        |engine: &Engine<Session>, event| {
            engine
                .session()
                .tx
                .send(format!("closed:{}", event.is_error))
                .ok();
        },
    );
    let engine = Engine::new(config_for(addr), table, ClassicDialect, session);
    engine.connect().await.unwrap();

    assert_eq!(next_event(&mut rx).await, "closed:true");
}

#[tokio::test]
async fn shutdown_is_idempotent_at_the_session_level() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (_sink, mut source) = ws.split();
        while let Some(Ok(_)) = source.next().await {}
    });

    let (session, _rx) = session_channel();
    let engine = Engine::new(config_for(addr), HandlerTable::new(), ClassicDialect, session);

    // Never-connected engines report the absence rather than crashing.
    assert!(matches!(engine.shutdown(), Err(EngineError::NotConnected)));

    engine.connect().await.unwrap();
    engine.shutdown().unwrap();
    assert!(matches!(engine.shutdown(), Err(EngineError::NotConnected)));
    assert!(matches!(engine.cmd("late"), Err(EngineError::NotConnected)));
}
